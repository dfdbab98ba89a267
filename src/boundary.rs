use rayon::prelude::*;
use crate::grid::Grid;




/**
 * How the physical edges of the coarsest level are closed.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
    /// Ghost cells copy the opposite interior edge.
    Periodic,
    /// Ghost cells copy the nearest interior cell.
    Outflow,
}




/**
 * The edges of a grid whose ghost cells are to be filled. Edges left out are
 * filled some other way: by halo exchange with a neighbouring process, or by
 * prolongation from the parent level.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sides {
    pub x_low: bool,
    pub x_high: bool,
    pub y_low: bool,
    pub y_high: bool,
}




// ============================================================================
impl Sides {

    pub fn all() -> Self {
        Self { x_low: true, x_high: true, y_low: true, y_high: true }
    }

    pub fn y_only() -> Self {
        Self { x_low: false, x_high: false, y_low: true, y_high: true }
    }
}




// ============================================================================
impl Boundary {

    pub fn from_periodic(periodic: bool) -> Self {
        if periodic {
            Boundary::Periodic
        } else {
            Boundary::Outflow
        }
    }

    /**
     * The interior index whose value a ghost index `i` copies, on an axis of
     * `n` interior cells.
     */
    pub fn source_index(&self, i: i64, n: usize) -> i64 {
        match self {
            Boundary::Periodic => i.rem_euclid(n as i64),
            Boundary::Outflow => i.max(0).min(n as i64 - 1),
        }
    }

    /**
     * Fill the ghost frame of the grid on the selected sides. The y ghosts of
     * the interior x rows are filled first, and then the x ghosts as whole
     * rows, so that corner cells are consistent with both edges.
     */
    pub fn apply(&self, grid: &mut Grid, sides: Sides) {
        let shape = grid.shape();

        if shape.nx == 0 || shape.ny == 0 {
            return
        }
        let ng = shape.ng as i64;
        let nx = shape.nx as i64;
        let ny = shape.ny as i64;
        let m = shape.column_len();
        let row_len = shape.row_len();

        if sides.y_low || sides.y_high {
            grid.rows_mut(0, shape.nx).par_chunks_mut(row_len).for_each(|row| {
                let ghosts = (-ng..0).filter(|_| sides.y_low).chain((ny..ny + ng).filter(|_| sides.y_high));

                for j in ghosts {
                    let src = ((self.source_index(j, shape.ny) + ng) as usize) * m;
                    let dst = ((j + ng) as usize) * m;
                    row.copy_within(src..src + m, dst);
                }
            });
        }

        let ghosts = (-ng..0).filter(|_| sides.x_low).chain((nx..nx + ng).filter(|_| sides.x_high));

        for i in ghosts {
            let src = shape.column_offset(self.source_index(i, shape.nx), -ng);
            let dst = shape.column_offset(i, -ng);
            grid.data_mut().copy_within(src..src + row_len, dst);
        }
    }
}




/**
 * Fill the ghost frame of a raw level buffer of shape `(nx + 2 ng) x (ny + 2
 * ng) x nz x vec_dim`, on every side.
 */
pub fn bcs(data: &mut [f32], nx: usize, ny: usize, nz: usize, vec_dim: usize, ng: usize, boundary: Boundary) -> crate::error::Result<()> {
    let shape = crate::grid::GridShape::new(nx, ny, nz, ng, vec_dim);
    let mut grid = Grid::from_vec(shape, data.to_vec())?;
    boundary.apply(&mut grid, Sides::all());
    data.copy_from_slice(grid.data());
    Ok(())
}
