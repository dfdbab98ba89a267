//! Splitting of each level into contiguous x slabs, one per process. Level 0
//! is split as evenly as possible; each finer level is split along the image
//! of its parent's slabs through the window, so a process owns exactly the
//! fine cells lying over its own coarse cells (possibly none).

use serde::{Deserialize, Serialize};
use crate::error::ValidationError;
use crate::hierarchy::{Hierarchy, Level};




#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    XLow,
    XHigh,
}




// ============================================================================
impl Side {

    pub fn opposite(&self) -> Side {
        match self {
            Side::XLow => Side::XHigh,
            Side::XHigh => Side::XLow,
        }
    }
}




/**
 * How the ghost rows on one x side of a slab are filled.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SideKind {
    /// From the level's physical boundary condition.
    Physical,
    /// By halo exchange with the given rank.
    Neighbour(usize),
    /// By prolongation from the parent level.
    CoarseFine,
}




/**
 * The part of one level owned by one process: global interior x rows
 * `start..end`.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slab {
    pub level: usize,
    pub start: usize,
    pub end: usize,
    pub low: SideKind,
    pub high: SideKind,
}




// ============================================================================
impl Slab {

    pub fn width(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn side(&self, side: Side) -> SideKind {
        match side {
            Side::XLow => self.low,
            Side::XHigh => self.high,
        }
    }
}




/**
 * The slabs of every level, for every rank.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Decomposition {
    slabs: Vec<Vec<Slab>>,
}




// ============================================================================
impl Decomposition {

    pub fn new(hierarchy: &Hierarchy, size: usize, periodic: bool) -> Result<Self, ValidationError> {
        let mut slabs: Vec<Vec<Slab>> = Vec::with_capacity(hierarchy.len());

        for level in hierarchy.levels() {
            let ranges: Vec<(usize, usize)> = match (level.window, slabs.last()) {
                (Some(window), Some(parent)) => parent
                    .iter()
                    .map(|p| {
                        let lo = (p.start as i64).max(window.offset.0);
                        let hi = (p.end as i64).min(window.offset.0 + window.extent.0).max(lo);
                        (((lo - window.offset.0) * window.ratio) as usize, ((hi - window.offset.0) * window.ratio) as usize)
                    })
                    .map(|(a, b)| if a == b { (0, 0) } else { (a, b) })
                    .collect(),
                _ => even_split(level.shape.nx, size),
            };
            slabs.push(Self::close(level, &ranges, periodic, size)?);
        }
        Ok(Self { slabs })
    }

    fn close(level: &Level, ranges: &[(usize, usize)], periodic: bool, size: usize) -> Result<Vec<Slab>, ValidationError> {
        let active: Vec<usize> = (0..ranges.len()).filter(|&r| ranges[r].0 < ranges[r].1).collect();
        let edge = |neighbour: Option<&usize>, wrap: Option<&usize>| -> SideKind {
            match neighbour {
                Some(&n) => SideKind::Neighbour(n),
                None if level.window.is_some() => SideKind::CoarseFine,
                None if periodic && active.len() > 1 => wrap.map_or(SideKind::Physical, |&n| SideKind::Neighbour(n)),
                None => SideKind::Physical,
            }
        };

        if active.len() > 1 {
            if let Some(&r) = active.iter().find(|&&r| ranges[r].1 - ranges[r].0 < level.shape.ng) {
                return Err(ValidationError::Decomposition {
                    level: level.index,
                    size,
                    reason: format!("rank {} would own {} rows, fewer than ng = {}", r, ranges[r].1 - ranges[r].0, level.shape.ng),
                });
            }
        }

        Ok(ranges.iter().enumerate().map(|(rank, &(start, end))| {
            match active.iter().position(|&r| r == rank) {
                Some(n) => Slab {
                    level: level.index,
                    start,
                    end,
                    low: edge(if n > 0 { active.get(n - 1) } else { None }, active.last()),
                    high: edge(active.get(n + 1), active.first()),
                },
                None => Slab { level: level.index, start, end, low: SideKind::Physical, high: SideKind::Physical },
            }
        }).collect())
    }

    pub fn slab(&self, level: usize, rank: usize) -> &Slab {
        &self.slabs[level][rank]
    }

    pub fn slabs(&self, level: usize) -> &[Slab] {
        &self.slabs[level]
    }
}




/**
 * Split `n` rows over `size` ranks; the first `n % size` ranks get one extra
 * row.
 */
pub fn even_split(n: usize, size: usize) -> Vec<(usize, usize)> {
    let (base, rem) = (n / size, n % size);
    let mut start = 0;

    (0..size).map(|rank| {
        let width = base + if rank < rem { 1 } else { 0 };
        let range = (start, start + width);
        start += width;
        if width == 0 { (n, n) } else { range }
    }).collect()
}
