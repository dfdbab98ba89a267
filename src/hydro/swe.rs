//! The shallow water equations in 3+1 form with a constant lapse, shift and
//! spatial metric. Each layer carries the conserved variables `(D, Sx, Sy)`;
//! layers are coupled through the pressure exerted by the layers above and
//! the interface displacement of the layers below.

use rayon::prelude::*;
use crate::grid::Grid;
use crate::num_vec::Vec3;
use super::geometry::{Direction, Metric};
use super::{riemann_hlle, Error, Spacing};

pub const NUM_CONS: usize = 3;




// ============================================================================
fn check(u: Vec3) -> Result<Vec3, Error> {
    if !u.is_finite() {
        Err(Error::NonFinite((0..NUM_CONS).find(|&n| !u[n].is_finite()).unwrap_or(0)))
    } else if u[0] <= 0.0 {
        Err(Error::NonPositiveDepth(u[0]))
    } else {
        Ok(u)
    }
}

/**
 * The contravariant velocity u^i = gamma^ij S_j / D in the horizontal plane.
 */
pub fn velocity(u: Vec3, metric: &Metric, direction: Direction) -> f32 {
    let g = metric.gamma_up();
    let i = direction.index();
    (g[(i, 0)] * u[1] + g[(i, 1)] * u[2]) / u[0]
}

/**
 * The physical flux in the given horizontal direction.
 */
pub fn flux_vector(u: Vec3, metric: &Metric, direction: Direction) -> Vec3 {
    let alpha = metric.alpha();
    let vn = alpha * velocity(u, metric, direction) - metric.shift(direction);
    let p = 0.5 * alpha * u[0] * u[0];

    Vec3::new([
        u[0] * vn,
        u[1] * vn + p * direction.along(Direction::I),
        u[2] * vn + p * direction.along(Direction::J),
    ])
}

/**
 * The slowest and fastest signal speeds in the given direction.
 */
pub fn outer_wavespeeds(u: Vec3, metric: &Metric, direction: Direction) -> (f32, f32) {
    let alpha = metric.alpha();
    let vn = alpha * velocity(u, metric, direction) - metric.shift(direction);
    let cs = alpha * (u[0] * metric.inverse_diagonal(direction)).sqrt();
    (vn - cs, vn + cs)
}

pub fn face_flux(ul: Vec3, ur: Vec3, metric: &Metric, direction: Direction) -> Result<Vec3, Error> {
    let ul = check(ul)?;
    let ur = check(ur)?;
    let fl = flux_vector(ul, metric, direction);
    let fr = flux_vector(ur, metric, direction);
    let sl = outer_wavespeeds(ul, metric, direction);
    let sr = outer_wavespeeds(ur, metric, direction);
    Ok(riemann_hlle(ul, ur, fl, fr, sl, sr))
}

/**
 * The weight with which layer `j` contributes to the pressure gradient felt
 * by layer `k`. Layer 0 is on top.
 */
pub fn coupling_weight(rho: &[f32], k: usize, j: usize) -> f32 {
    if j < k {
        rho[j] / rho[k]
    } else {
        1.0
    }
}

/**
 * The potential sum_{j != k} c_kj D_j sensed by layer `k`, given the layer
 * depths of a column.
 */
pub fn layer_potential(depths: &[f32], rho: &[f32], k: usize) -> f32 {
    depths
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != k)
        .map(|(j, d)| coupling_weight(rho, k, j) * d)
        .sum()
}




/**
 * Compute the time derivative of a shallow water level. The z axis of the
 * grid indexes the layers; with a single layer the coupling term vanishes.
 * Ghost columns must be filled. The result overwrites `rhs` on interior cells.
 */
pub fn rhs(grid: &Grid, metric: &Metric, rho: &[f32], spacing: Spacing, rhs: &mut [f32]) -> Result<(), Error> {
    for x in rhs.iter_mut() {
        *x = 0.0
    }
    super::flux_divergence::<NUM_CONS, _, _>(
        grid,
        spacing,
        false,
        |ul, ur, d| face_flux(ul, ur, metric, d),
        |u| u,
        rhs)?;

    let shape = grid.shape();

    if shape.nz < 2 {
        return Ok(())
    }
    let ng = shape.ng as i64;
    let nx = shape.nx as i64;
    let ny = shape.ny as i64;
    let nz = shape.nz;
    let alpha = metric.alpha();
    let depths = |i: i64, j: i64| -> Vec<f32> { (0..nz).map(|k| grid.cell(i, j, k)[0]).collect() };

    rhs.par_chunks_mut(shape.row_len()).enumerate().for_each(|(row, out)| {
        let i = row as i64 - ng;

        if i < 0 || i >= nx {
            return
        }
        for j in 0..ny {
            let (dl, dr) = (depths(i - 1, j), depths(i + 1, j));
            let (db, dt) = (depths(i, j - 1), depths(i, j + 1));
            let dc = depths(i, j);

            for k in 0..nz {
                let gx = (layer_potential(&dr, rho, k) - layer_potential(&dl, rho, k)) / (2.0 * spacing.dx);
                let gy = (layer_potential(&dt, rho, k) - layer_potential(&db, rho, k)) / (2.0 * spacing.dy);
                let n = ((j + ng) as usize * nz + k) * NUM_CONS;
                out[n + 1] -= alpha * dc[k] * gx;
                out[n + 2] -= alpha * dc[k] * gy;
            }
        }
    });
    Ok(())
}

/**
 * Check that every interior cell has positive, finite depth.
 */
pub fn validate(grid: &Grid) -> Result<(), Error> {
    let shape = grid.shape();

    for (i, j) in shape.interior().iter() {
        for k in 0..shape.nz {
            check(Vec3::from_slice(grid.cell(i, j, k)))?;
        }
    }
    Ok(())
}
