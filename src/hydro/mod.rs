//! Physics kernels for the four models a level can carry. Each model module
//! provides its conserved/primitive conversions, physical fluxes, signal speed
//! estimates, and the HLLE face flux; this module holds the shared pieces:
//! the closed set of models, the generic HLLE solver, and the per-cell flux
//! divergence sweep.

pub mod burning;
pub mod compressible;
mod error;
pub mod geometry;
pub mod low_mach;
pub mod swe;

use std::fmt;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use crate::error::ValidationError;
use crate::grid::Grid;
use crate::num_vec::{Vec3, Vector};
use geometry::{Direction, Metric};

pub use error::Error;




/**
 * The physical model evolved on one level of the hierarchy.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Model {
    SingleLayerSwe,
    MultilayerSwe,
    Compressible,
    LowMach,
}




// ============================================================================
impl Model {

    /**
     * Parse a model tag: one of the letters `S`, `M`, `C`, `L`, or the long
     * names `single-layer-swe`, `multilayer-swe`, `compressible`, `low-mach`.
     * The level is only used to name the offending level in the error.
     */
    pub fn from_tag(tag: &str, level: usize) -> Result<Self, ValidationError> {
        match tag {
            "S" | "single-layer-swe" => Ok(Model::SingleLayerSwe),
            "M" | "multilayer-swe" => Ok(Model::MultilayerSwe),
            "C" | "compressible" => Ok(Model::Compressible),
            "L" | "low-mach" => Ok(Model::LowMach),
            _ => Err(ValidationError::InvalidModel { level, tag: tag.into() }),
        }
    }

    pub fn tag(&self) -> char {
        match self {
            Model::SingleLayerSwe => 'S',
            Model::MultilayerSwe => 'M',
            Model::Compressible => 'C',
            Model::LowMach => 'L',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Model::SingleLayerSwe => "single-layer-swe",
            Model::MultilayerSwe => "multilayer-swe",
            Model::Compressible => "compressible",
            Model::LowMach => "low-mach",
        }
    }

    pub fn is_swe(&self) -> bool {
        matches!(self, Model::SingleLayerSwe | Model::MultilayerSwe)
    }

    pub fn is_3d(&self) -> bool {
        !self.is_swe()
    }

    /**
     * The number of conserved components per cell. Shallow water layers are
     * stacked along the z axis of the state array, so each layer is one cell.
     */
    pub fn vec_dim(&self) -> usize {
        if self.is_swe() {
            swe::NUM_CONS
        } else {
            compressible::NUM_CONS
        }
    }

    /**
     * Whether a level with model `child` may be nested inside a level with
     * this model. Matching vertical resolution is checked separately.
     */
    pub fn can_nest(&self, child: Model) -> bool {
        *self == child || (self.is_3d() && child.is_3d()) || (self.is_swe() && child.is_3d())
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}




/**
 * Constants consumed by the physics kernels, shared read-only by all levels.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Physics {
    pub metric: Metric,
    pub gamma: f32,
    pub rho: Vec<f32>,
    pub p_const: f32,
}




/**
 * Cell sizes of one level.
 */
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spacing {
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
}




// ============================================================================
pub fn riemann_hlle<const N: usize>(
    ul: Vector<f32, N>,
    ur: Vector<f32, N>,
    fl: Vector<f32, N>,
    fr: Vector<f32, N>,
    sl: (f32, f32),
    sr: (f32, f32)) -> Vector<f32, N>
{
    let ap = sl.1.max(sr.1).max(0.0);
    let am = sl.0.min(sr.0).min(0.0);

    if ap - am <= 0.0 {
        return (fl + fr) * 0.5
    }
    (fl * ap - fr * am - (ul - ur) * ap * am) / (ap - am)
}

/**
 * The face flux between the cell states `ul` and `ur` of a level with the
 * given model, exactly as the model's time derivative evaluates it.
 */
pub fn face_flux(model: Model, physics: &Physics, ul: &[f32], ur: &[f32], direction: Direction) -> Result<Vec<f32>, Error> {
    let metric = &physics.metric;

    let flux = match model {
        Model::SingleLayerSwe | Model::MultilayerSwe => {
            swe::face_flux(Vec3::from_slice(ul), Vec3::from_slice(ur), metric, direction)?.as_array().to_vec()
        }
        Model::Compressible => {
            compressible::face_flux(Vector::from_slice(ul), Vector::from_slice(ur), physics.gamma, metric, direction)?.as_array().to_vec()
        }
        Model::LowMach => {
            low_mach::face_flux(Vector::from_slice(ul), Vector::from_slice(ur), physics.gamma, physics.p_const, metric, direction)?.as_array().to_vec()
        }
    };
    Ok(flux)
}

/**
 * Check that every component of a cell state is finite.
 */
pub fn check_finite(u: &[f32]) -> Result<(), Error> {
    match u.iter().position(|x| !x.is_finite()) {
        Some(n) => Err(Error::NonFinite(n)),
        None => Ok(()),
    }
}




/**
 * Subtract the divergence of the face fluxes from `rhs`, for every interior
 * cell of `grid`. `rhs` has the layout of the grid; only interior cells are
 * written, each by the x row that owns it, so rows are processed in
 * parallel.
 *
 * With `vertical` set, the z axis of the grid is a spatial axis bounded by
 * reflecting walls, whose ghost states are produced by `wall`. Otherwise the z
 * axis indexes independent layers and carries no flux.
 */
pub fn flux_divergence<const N: usize, F, W>(
    grid: &Grid,
    spacing: Spacing,
    vertical: bool,
    face_flux: F,
    wall: W,
    rhs: &mut [f32]) -> Result<(), Error>
where
    F: Fn(Vector<f32, N>, Vector<f32, N>, Direction) -> Result<Vector<f32, N>, Error> + Sync,
    W: Fn(Vector<f32, N>) -> Vector<f32, N> + Sync,
{
    let shape = grid.shape();
    let ng = shape.ng as i64;
    let nx = shape.nx as i64;
    let ny = shape.ny as i64;
    let nz = shape.nz;
    let u = |i: i64, j: i64, k: usize| Vector::<f32, N>::from_slice(grid.cell(i, j, k));

    rhs.par_chunks_mut(shape.row_len()).enumerate().try_for_each(|(row, out)| {
        let i = row as i64 - ng;

        if i < 0 || i >= nx {
            return Ok(())
        }
        for j in 0..ny {
            for k in 0..nz {
                let uc = u(i, j, k);
                let fxl = face_flux(u(i - 1, j, k), uc, Direction::I)?;
                let fxr = face_flux(uc, u(i + 1, j, k), Direction::I)?;
                let fyl = face_flux(u(i, j - 1, k), uc, Direction::J)?;
                let fyr = face_flux(uc, u(i, j + 1, k), Direction::J)?;
                let mut div = (fxr - fxl) / spacing.dx + (fyr - fyl) / spacing.dy;

                if vertical {
                    let below = if k == 0 { wall(uc) } else { u(i, j, k - 1) };
                    let above = if k + 1 == nz { wall(uc) } else { u(i, j, k + 1) };
                    let fzl = face_flux(below, uc, Direction::K)?;
                    let fzr = face_flux(uc, above, Direction::K)?;
                    div = div + (fzr - fzl) / spacing.dz;
                }
                let n = ((j + ng) as usize * nz + k) * shape.vec_dim;

                for (c, x) in out[n..n + N].iter_mut().enumerate() {
                    *x -= div[c]
                }
            }
        }
        Ok(())
    })
}
