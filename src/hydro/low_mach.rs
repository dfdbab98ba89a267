//! A reduced, low Mach number formulation of Newtonian hydrodynamics. The
//! thermodynamic pressure is pinned to a constant background `p0`, so the
//! momentum flux carries only the dynamic pressure `pi = p - p0`, and the
//! enthalpy density is advected without the acoustic `Dp/Dt` work term. The
//! conserved variables are `(rho, rho v_j, rho h)` with `h = gamma eps`.

use crate::grid::Grid;
use crate::num_vec::{Vec3, Vector};
use super::compressible;
use super::geometry::{Direction, Metric};
use super::{riemann_hlle, Error, Spacing};

pub const NUM_CONS: usize = 5;




// ============================================================================
pub type Conserved = Vector<f32, NUM_CONS>;




/**
 * Return the primitive state `(rho, v_j, p)` of a low Mach cell. The
 * primitive type is shared with the compressible model.
 */
pub fn recover_primitive(u: Conserved, gamma_law_index: f32) -> Result<compressible::Primitive, Error> {
    super::check_finite(&u.as_array())?;

    let rho = u[0];

    if rho <= 0.0 {
        return Err(Error::NegativeMassDensity(rho))
    }
    let p = (gamma_law_index - 1.0) / gamma_law_index * u[4];

    if p < 0.0 {
        return Err(Error::NegativeGasPressure(p))
    }
    Ok(compressible::Primitive {
        rho,
        v: Vec3::new([u[1], u[2], u[3]]) / rho,
        p,
    })
}

pub fn to_conserved(prim: &compressible::Primitive, gamma_law_index: f32) -> Conserved {
    let rho = prim.rho;
    Conserved::new([
        rho,
        rho * prim.v[0],
        rho * prim.v[1],
        rho * prim.v[2],
        gamma_law_index / (gamma_law_index - 1.0) * prim.p,
    ])
}

/**
 * The physical flux in the given direction, given the background pressure
 * `p0`.
 */
pub fn flux_vector(u: Conserved, prim: &compressible::Primitive, p0: f32, metric: &Metric, direction: Direction) -> Conserved {
    let an = metric.alpha() * prim.velocity(metric, direction) - metric.shift(direction);
    let pi = metric.alpha() * (prim.p - p0);

    Conserved::new([
        u[0] * an,
        u[1] * an + pi * direction.along(Direction::I),
        u[2] * an + pi * direction.along(Direction::J),
        u[3] * an + pi * direction.along(Direction::K),
        u[4] * an,
    ])
}

/**
 * Signal speed bounds: the transport velocity plus or minus the adiabatic
 * sound speed.
 */
pub fn outer_wavespeeds(prim: &compressible::Primitive, gamma_law_index: f32, metric: &Metric, direction: Direction) -> (f32, f32) {
    let alpha = metric.alpha();
    let an = alpha * prim.velocity(metric, direction) - metric.shift(direction);
    let cs = alpha * (gamma_law_index * prim.p / prim.rho * metric.inverse_diagonal(direction)).sqrt();
    (an - cs, an + cs)
}

pub fn face_flux(ul: Conserved, ur: Conserved, gamma_law_index: f32, p0: f32, metric: &Metric, direction: Direction) -> Result<Conserved, Error> {
    let pl = recover_primitive(ul, gamma_law_index)?;
    let pr = recover_primitive(ur, gamma_law_index)?;
    let fl = flux_vector(ul, &pl, p0, metric, direction);
    let fr = flux_vector(ur, &pr, p0, metric, direction);
    let sl = outer_wavespeeds(&pl, gamma_law_index, metric, direction);
    let sr = outer_wavespeeds(&pr, gamma_law_index, metric, direction);
    Ok(riemann_hlle(ul, ur, fl, fr, sl, sr))
}

/**
 * Compute the time derivative of a low Mach level. Ghost columns must be
 * filled; the top and bottom of each column are reflecting walls.
 */
pub fn rhs(grid: &Grid, gamma_law_index: f32, p0: f32, metric: &Metric, spacing: Spacing, rhs: &mut [f32]) -> Result<(), Error> {
    for x in rhs.iter_mut() {
        *x = 0.0
    }
    super::flux_divergence::<NUM_CONS, _, _>(
        grid,
        spacing,
        true,
        |ul, ur, d| face_flux(ul, ur, gamma_law_index, p0, metric, d),
        compressible::reflect_vertical,
        rhs)
}

pub fn validate(grid: &Grid, gamma_law_index: f32) -> Result<(), Error> {
    let shape = grid.shape();

    for (i, j) in shape.interior().iter() {
        for k in 0..shape.nz {
            recover_primitive(Conserved::from_slice(grid.cell(i, j, k)), gamma_law_index)?;
        }
    }
    Ok(())
}
