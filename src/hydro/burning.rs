//! Burning source terms: accretion of fresh fuel onto the top of the ocean,
//! and thermonuclear heating in the 3D levels. Heating is stiff, so it is
//! applied linearly-implicitly: `(I - dt dS/dU) dU = dt S(U)`.

use rayon::prelude::*;
use crate::error::Result;
use crate::grid::Grid;
use crate::num_vec::{SquareMatrix, Vector};
use super::{compressible, low_mach, Model, Physics};

/// Fraction of the ignition temperature below which no heating occurs.
pub const IGNITION_THRESHOLD: f32 = 0.05;

type Cell = Vector<f32, 5>;




/**
 * The burning parameters: mass transfer rate, energy release per unit mass,
 * and specific heat at constant volume.
 */
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Burning {
    pub q: f32,
    pub e_he: f32,
    pub cv: f32,
}




// ============================================================================
impl Burning {

    pub fn ignition_temperature(&self) -> f32 {
        self.e_he / self.cv
    }

    pub fn temperature(&self, eps: f32) -> f32 {
        eps / self.cv
    }

    /**
     * Energy released per unit volume per unit time, for gas of density `rho`
     * and specific internal energy `eps`. Zero below the ignition threshold.
     */
    pub fn heating_rate(&self, rho: f32, eps: f32) -> f32 {
        let t = self.temperature(eps);
        let t_ign = self.ignition_temperature();

        if t <= 0.0 || t < IGNITION_THRESHOLD * t_ign {
            0.0
        } else {
            self.e_he * rho * rho * (-t_ign / t).exp()
        }
    }

    /**
     * Add `Q dt` to the depth of the top layer (layer 0) of every interior
     * column of a shallow water level. The accreted fluid arrives at rest.
     */
    pub fn accrete_swe(&self, grid: &mut Grid, dt: f32) {
        let shape = grid.shape();
        let dd = self.q * dt;

        for (i, j) in shape.interior().iter() {
            grid.cell_mut(i, j, 0)[0] += dd;
        }
    }

    /**
     * Add `Q dt / dz` to the mass of the top cell of every interior column of
     * a 3D level. The accreted gas has the specific state of the cell it
     * joins, so every conserved component is scaled by the same factor.
     */
    pub fn accrete_3d(&self, grid: &mut Grid, dt: f32, dz: f32) {
        let shape = grid.shape();
        let k = shape.nz - 1;
        let dd = self.q * dt / dz;

        for (i, j) in shape.interior().iter() {
            let cell = grid.cell_mut(i, j, k);
            let factor = 1.0 + dd / cell[0];

            for x in cell.iter_mut() {
                *x *= factor
            }
        }
    }

    /**
     * The heating source vector for one cell of a 3D level.
     */
    pub fn source(&self, u: Cell, model: Model, physics: &Physics) -> Result<Cell> {
        let gamma = physics.gamma;
        let mut s = Cell::zeros();

        match model {
            Model::Compressible => {
                let prim = compressible::recover_primitive(u, gamma, &physics.metric)?;
                let eps = prim.specific_internal_energy(gamma);
                s[4] = physics.metric.alpha() * self.heating_rate(prim.rho, eps);
            }
            Model::LowMach => {
                let prim = low_mach::recover_primitive(u, gamma)?;
                let eps = prim.specific_internal_energy(gamma);
                s[4] = physics.metric.alpha() * gamma * self.heating_rate(prim.rho, eps);
            }
            Model::SingleLayerSwe | Model::MultilayerSwe => {}
        }
        Ok(s)
    }

    /**
     * The Jacobian dS/dU of the heating source, by one-sided finite
     * differences.
     */
    pub fn source_jacobian(&self, u: Cell, s: Cell, model: Model, physics: &Physics) -> Result<SquareMatrix<5>> {
        let mut jac = SquareMatrix::<5>::zeros();

        for m in 0..5 {
            let delta = f32::EPSILON.sqrt() * u[m].abs().max(1.0);
            let mut v = u;
            v[m] += delta;
            let ds = (self.source(v, model, physics)? - s) / delta;

            for n in 0..5 {
                jac[(n, m)] = ds[n];
            }
        }
        Ok(jac)
    }

    /**
     * Return the linearly-implicit update `dU = (I - dt J)^-1 dt S` of a
     * single cell.
     */
    pub fn implicit_update(&self, u: Cell, model: Model, physics: &Physics, dt: f32) -> Result<Cell> {
        let s = self.source(u, model, physics)?;

        if s.iter().all(|&x| x == 0.0) {
            return Ok(Cell::zeros())
        }
        let jac = self.source_jacobian(u, s, model, physics)?;
        let system = SquareMatrix::<5>::identity() - jac * dt;
        Ok(system.inverse()? * (s * dt))
    }

    /**
     * Apply the heating source to every interior cell of a 3D level.
     */
    pub fn heat(&self, grid: &mut Grid, model: Model, physics: &Physics, dt: f32) -> Result<()> {
        let shape = grid.shape();
        let ng = shape.ng as i64;
        let nx = shape.nx as i64;

        grid.data_mut().par_chunks_mut(shape.row_len()).enumerate().try_for_each(|(row, data)| {
            let i = row as i64 - ng;

            if i < 0 || i >= nx {
                return Ok(())
            }
            for j in 0..shape.ny {
                for k in 0..shape.nz {
                    let n = ((j + shape.ng) * shape.nz + k) * shape.vec_dim;
                    let cell = &mut data[n..n + 5];
                    let du = self.implicit_update(Cell::from_slice(cell), model, physics, dt)?;
                    (Cell::from_slice(cell) + du).write_to_slice(cell);
                }
            }
            Ok(())
        })
    }
}
