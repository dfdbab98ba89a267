//! Relativistic hydrodynamics in the Valencia formulation, on a constant
//! background geometry (so the geometric source terms vanish). The conserved
//! variables are `D = rho W`, `S_j = rho h W^2 v_j` and
//! `tau = rho h W^2 - p - D`, with an ideal gas equation of state
//! `p = (gamma - 1) rho eps`.

use crate::grid::Grid;
use crate::num_vec::{Vec3, Vector};
use super::geometry::{Direction, Metric};
use super::{riemann_hlle, Error, Spacing};

pub const NUM_CONS: usize = 5;

const MAX_RECOVERY_ITERATIONS: usize = 100;
const RECOVERY_TOLERANCE: f32 = 1e-6;




// ============================================================================
pub type Conserved = Vector<f32, NUM_CONS>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Primitive {
    pub rho: f32,
    pub v: Vec3,
    pub p: f32,
}




// ============================================================================
impl Primitive {

    pub fn new(rho: f32, v: [f32; 3], p: f32) -> Self {
        Self { rho, v: v.into(), p }
    }

    pub fn specific_internal_energy(&self, gamma_law_index: f32) -> f32 {
        self.p / self.rho / (gamma_law_index - 1.0)
    }

    pub fn specific_enthalpy(&self, gamma_law_index: f32) -> f32 {
        1.0 + self.specific_internal_energy(gamma_law_index) + self.p / self.rho
    }

    pub fn sound_speed_squared(&self, gamma_law_index: f32) -> f32 {
        gamma_law_index * self.p / (self.rho * self.specific_enthalpy(gamma_law_index))
    }

    /**
     * The contravariant component v^i of the Eulerian velocity.
     */
    pub fn velocity(&self, metric: &Metric, direction: Direction) -> f32 {
        metric.raise(self.v)[direction.index()]
    }

    pub fn lorentz_factor(&self, metric: &Metric) -> Result<f32, Error> {
        let vsq = metric.norm_squared(self.v);

        if vsq >= 1.0 {
            Err(Error::Superluminal(vsq))
        } else {
            Ok(1.0 / (1.0 - vsq).sqrt())
        }
    }

    pub fn to_conserved(&self, gamma_law_index: f32, metric: &Metric) -> Result<Conserved, Error> {
        let w = self.lorentz_factor(metric)?;
        let rhohw2 = self.rho * self.specific_enthalpy(gamma_law_index) * w * w;
        let d = self.rho * w;

        Ok(Conserved::new([
            d,
            rhohw2 * self.v[0],
            rhohw2 * self.v[1],
            rhohw2 * self.v[2],
            rhohw2 - self.p - d,
        ]))
    }

    /**
     * The physical flux in the given direction. The conserved state is passed
     * in so that it is not recomputed.
     */
    pub fn flux_vector(&self, u: Conserved, metric: &Metric, direction: Direction) -> Conserved {
        let alpha = metric.alpha();
        let vn = self.velocity(metric, direction);
        let an = alpha * vn - metric.shift(direction);
        let p = alpha * self.p;

        Conserved::new([
            u[0] * an,
            u[1] * an + p * direction.along(Direction::I),
            u[2] * an + p * direction.along(Direction::J),
            u[3] * an + p * direction.along(Direction::K),
            u[4] * an + p * vn,
        ])
    }

    /**
     * The characteristic speeds of the fast acoustic waves.
     */
    pub fn outer_wavespeeds(&self, gamma_law_index: f32, metric: &Metric, direction: Direction) -> (f32, f32) {
        let alpha = metric.alpha();
        let vn = self.velocity(metric, direction);
        let vsq = metric.norm_squared(self.v);
        let csq = self.sound_speed_squared(gamma_law_index);
        let gii = metric.inverse_diagonal(direction);
        let root = ((1.0 - vsq) * (gii * (1.0 - vsq * csq) - vn * vn * (1.0 - csq))).max(0.0).sqrt();
        let scale = alpha / (1.0 - vsq * csq);
        let beta = metric.shift(direction);

        (
            scale * (vn * (1.0 - csq) - csq.sqrt() * root) - beta,
            scale * (vn * (1.0 - csq) + csq.sqrt() * root) - beta,
        )
    }
}




/**
 * Recover the primitive state from the conserved one by Newton iteration on
 * the pressure.
 */
pub fn recover_primitive(u: Conserved, gamma_law_index: f32, metric: &Metric) -> Result<Primitive, Error> {
    super::check_finite(&u.as_array())?;

    let d = u[0];
    let s = Vec3::new([u[1], u[2], u[3]]);
    let tau = u[4];

    if d <= 0.0 {
        return Err(Error::NegativeMassDensity(d))
    }
    let ssq = metric.norm_squared(s);
    let p_min = (ssq.sqrt() - tau - d).max(0.0);
    let mut p = ((gamma_law_index - 1.0) * tau).max(p_min + f32::EPSILON * (tau + d));

    for _ in 0..MAX_RECOVERY_ITERATIONS {
        let e = tau + p + d;
        let vsq = ssq / (e * e);

        if vsq >= 1.0 {
            return Err(Error::Superluminal(vsq))
        }
        let w = 1.0 / (1.0 - vsq).sqrt();
        let rho = d / w;
        let eps = (tau + d * (1.0 - w) + p * (1.0 - w * w)) / (d * w);
        let f = (gamma_law_index - 1.0) * rho * eps - p;
        let csq = (gamma_law_index - 1.0) * gamma_law_index * eps / (1.0 + gamma_law_index * eps);
        let dfdp = vsq * csq - 1.0;
        let p_new = (p - f / dfdp).max(p_min);
        let converged = (p_new - p).abs() <= RECOVERY_TOLERANCE * p_new.max(f32::MIN_POSITIVE);
        p = p_new;

        if converged {
            let e = tau + p + d;
            let w = 1.0 / (1.0 - ssq / (e * e)).sqrt();
            let rho = d / w;

            if p < 0.0 {
                return Err(Error::NegativeGasPressure(p))
            }
            return Ok(Primitive { rho, v: s / e, p })
        }
    }
    Err(Error::RecoveryFailed { d, tau })
}




/**
 * Mirror the conserved momentum normal to a horizontal wall.
 */
pub fn reflect_vertical(u: Conserved) -> Conserved {
    let mut u = u;
    u[3] = -u[3];
    u
}

pub fn face_flux(ul: Conserved, ur: Conserved, gamma_law_index: f32, metric: &Metric, direction: Direction) -> Result<Conserved, Error> {
    let pl = recover_primitive(ul, gamma_law_index, metric)?;
    let pr = recover_primitive(ur, gamma_law_index, metric)?;
    let fl = pl.flux_vector(ul, metric, direction);
    let fr = pr.flux_vector(ur, metric, direction);
    let sl = pl.outer_wavespeeds(gamma_law_index, metric, direction);
    let sr = pr.outer_wavespeeds(gamma_law_index, metric, direction);
    Ok(riemann_hlle(ul, ur, fl, fr, sl, sr))
}

/**
 * Compute the time derivative of a compressible level. Ghost columns must be
 * filled; the top and bottom of each column are reflecting walls.
 */
pub fn rhs(grid: &Grid, gamma_law_index: f32, metric: &Metric, spacing: Spacing, rhs: &mut [f32]) -> Result<(), Error> {
    for x in rhs.iter_mut() {
        *x = 0.0
    }
    super::flux_divergence::<NUM_CONS, _, _>(
        grid,
        spacing,
        true,
        |ul, ur, d| face_flux(ul, ur, gamma_law_index, metric, d),
        reflect_vertical,
        rhs)
}

/**
 * Check that every interior cell holds a recoverable state.
 */
pub fn validate(grid: &Grid, gamma_law_index: f32, metric: &Metric) -> Result<(), Error> {
    let shape = grid.shape();

    for (i, j) in shape.interior().iter() {
        for k in 0..shape.nz {
            recover_primitive(Conserved::from_slice(grid.cell(i, j, k)), gamma_law_index, metric)?;
        }
    }
    Ok(())
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{recover_primitive, rhs, Primitive};
    use crate::grid::{Grid, GridShape};
    use crate::hydro::geometry::{Direction, Metric};
    use crate::hydro::Spacing;

    const GAMMA: f32 = 5.0 / 3.0;

    #[test]
    fn primitive_recovery_inverts_to_conserved() {
        let metric = Metric::new(0.9, [0.1, 0.0, 0.0], [1.2, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        let prim = Primitive::new(1.5, [0.3, -0.2, 0.1], 0.4);
        let cons = prim.to_conserved(GAMMA, &metric).unwrap();
        let back = recover_primitive(cons, GAMMA, &metric).unwrap();

        assert!((back.rho - prim.rho).abs() < 1e-4);
        assert!((back.p - prim.p).abs() < 1e-4);
        for i in 0..3 {
            assert!((back.v[i] - prim.v[i]).abs() < 1e-4);
        }
    }

    #[test]
    fn rest_state_recovers_its_pressure() {
        let prim = Primitive::new(1.0, [0.0; 3], 0.1);
        let cons = prim.to_conserved(GAMMA, &Metric::flat()).unwrap();
        let back = recover_primitive(cons, GAMMA, &Metric::flat()).unwrap();
        assert!((back.p - 0.1).abs() < 1e-6);
        assert_eq!(back.v.as_array(), [0.0; 3]);
    }

    #[test]
    fn superluminal_states_are_rejected() {
        assert!(Primitive::new(1.0, [1.0, 0.5, 0.0], 1.0).to_conserved(GAMMA, &Metric::flat()).is_err());
    }

    #[test]
    fn wavespeeds_at_rest_are_symmetric_and_subluminal() {
        let prim = Primitive::new(1.0, [0.0; 3], 1.0);
        let (am, ap) = prim.outer_wavespeeds(GAMMA, &Metric::flat(), Direction::K);
        assert!((am + ap).abs() < 1e-6);
        assert!(ap > 0.0 && ap < 1.0);
    }

    #[test]
    fn uniform_rest_state_has_zero_time_derivative() {
        let shape = GridShape::new(3, 3, 4, 2, 5);
        let cons = Primitive::new(1.0, [0.0; 3], 0.1).to_conserved(GAMMA, &Metric::flat()).unwrap();
        let mut grid = Grid::zeros(shape);

        for cell in grid.data_mut().chunks_exact_mut(5) {
            cell.copy_from_slice(&cons.as_array());
        }
        let mut out = vec![0.0; shape.len()];
        rhs(&grid, GAMMA, &Metric::flat(), Spacing { dx: 0.5, dy: 0.5, dz: 0.25 }, &mut out).unwrap();
        assert!(out.iter().all(|&x| x == 0.0));
    }
}
