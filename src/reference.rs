//! A deliberately simple single-grid multilayer shallow water solver, used as
//! a baseline for the single-level behaviour of the nested engine. It has no
//! hierarchy and no communication: one grid with one ghost column, advanced by
//! a Lax-Wendroff step written in terms of the flux Jacobians.

use crate::boundary::{Boundary, Sides};
use crate::config::SeaParams;
use crate::error::{Result, ValidationError};
use crate::grid::{Grid, GridShape};
use crate::hydro::geometry::{Direction, Metric};
use crate::hydro::swe::{self, NUM_CONS};
use crate::num_vec::{Matrix3, Vec3};




/**
 * The flux Jacobian dF/dU of one layer in the given horizontal direction.
 */
pub fn jacobian(u: Vec3, metric: &Metric, direction: Direction) -> Matrix3 {
    let alpha = metric.alpha();
    let g = metric.gamma_up();
    let i = direction.index();
    let d = u[0];
    let vn = alpha * swe::velocity(u, metric, direction) - metric.shift(direction);
    let dvn = [-alpha * swe::velocity(u, metric, direction) / d, alpha * g[(i, 0)] / d, alpha * g[(i, 1)] / d];
    let dp = [alpha * d, 0.0, 0.0];
    let push = [0.0, direction.along(Direction::I), direction.along(Direction::J)];

    let mut jac = Matrix3::zeros();

    for a in 0..NUM_CONS {
        for b in 0..NUM_CONS {
            jac[(a, b)] = (if a == b { vn } else { 0.0 }) + u[a] * dvn[b] + push[a] * dp[b];
        }
    }
    jac
}

pub fn jx(u: Vec3, metric: &Metric) -> Matrix3 {
    jacobian(u, metric, Direction::I)
}

pub fn jy(u: Vec3, metric: &Metric) -> Matrix3 {
    jacobian(u, metric, Direction::J)
}




/**
 * A single-grid multilayer shallow water simulation.
 */
#[derive(Clone, Debug)]
pub struct ReferenceSea {
    grid: Grid,
    nt: usize,
    dx: f32,
    dy: f32,
    dt: f32,
    rho: Vec<f32>,
    q: Vec<f32>,
    metric: Metric,
    boundary: Boundary,
}




// ============================================================================
impl ReferenceSea {

    /**
     * Build a reference sea over the coarsest level described by the
     * parameters, which must be a shallow water level. The per-layer mass
     * sources start at zero.
     */
    pub fn new(params: &SeaParams) -> Result<Self> {
        params.validate()?;

        let model = params.models[0];
        let nlayers = params.nzs[0];

        if !model.is_swe() {
            return Err(ValidationError::invalid("models", format!("level 0 carries the {} model", model)).into())
        }
        let dx = (params.xmax - params.xmin) / params.nx as f32;
        let dy = (params.ymax - params.ymin) / params.ny as f32;

        Ok(Self {
            grid: Grid::zeros(GridShape::new(params.nx, params.ny, nlayers, 1, NUM_CONS)),
            nt: params.nt,
            dx,
            dy,
            dt: 0.1 * dx.min(dy),
            rho: params.rho.clone(),
            q: vec![0.0; nlayers],
            metric: Metric::new(params.alpha, params.beta, params.gamma_down)?,
            boundary: Boundary::from_periodic(params.periodic),
        })
    }

    /**
     * Set the mass source of each layer.
     */
    pub fn with_sources(mut self, q: Vec<f32>) -> Result<Self> {
        if q.len() != self.nlayers() {
            return Err(ValidationError::LengthMismatch { field: "Q".into(), expected: self.nlayers(), actual: q.len() }.into())
        }
        self.q = q;
        Ok(self)
    }

    pub fn nlayers(&self) -> usize {
        self.grid.shape().nz
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn time_step(&self) -> f32 {
        self.dt
    }

    /**
     * The state of one layer in one interior (or ghost) cell.
     */
    pub fn state(&self, layer: usize, i: i64, j: i64) -> Vec3 {
        Vec3::from_slice(self.grid.cell(i, j, layer))
    }

    /**
     * Set the initial state. Each field has one value per cell, ghosts
     * included, in the layout of the state array.
     */
    pub fn initial_data(&mut self, d0: &[f32], sx0: &[f32], sy0: &[f32]) -> Result<()> {
        let expected = self.grid.shape().field_len();

        for (name, field) in [("D0", d0), ("Sx0", sx0), ("Sy0", sy0)] {
            if field.len() != expected {
                return Err(ValidationError::LengthMismatch { field: name.into(), expected, actual: field.len() }.into())
            }
        }
        for (c, cell) in self.grid.data_mut().chunks_exact_mut(NUM_CONS).enumerate() {
            cell.copy_from_slice(&[d0[c], sx0[c], sy0[c]]);
        }
        Ok(())
    }

    pub fn bcs(&mut self) {
        self.boundary.apply(&mut self.grid, Sides::all())
    }

    /**
     * Take one Lax-Wendroff step, then refill the ghost cells.
     */
    pub fn evolve(&mut self) -> Result<()> {
        self.bcs();

        let shape = self.grid.shape();
        let (dt, dx, dy) = (self.dt, self.dx, self.dy);
        let alpha = self.metric.alpha();
        let old = self.grid.clone();
        let u = |i: i64, j: i64, k: usize| Vec3::from_slice(old.cell(i, j, k));

        for (i, j) in shape.interior().iter() {
            let depths = |i: i64, j: i64| -> Vec<f32> { (0..shape.nz).map(|k| old.cell(i, j, k)[0]).collect() };
            let (dl, dr, db, du) = (depths(i - 1, j), depths(i + 1, j), depths(i, j - 1), depths(i, j + 1));

            for k in 0..shape.nz {
                let c = u(i, j, k);
                let ax = jx(c, &self.metric);
                let ay = jy(c, &self.metric);
                let (l, r, b, t) = (u(i - 1, j, k), u(i + 1, j, k), u(i, j - 1, k), u(i, j + 1, k));
                let cross = u(i + 1, j + 1, k) - u(i + 1, j - 1, k) - u(i - 1, j + 1, k) + u(i - 1, j - 1, k);

                let mut next = c
                    - ax * (r - l) * (dt / (2.0 * dx))
                    - ay * (t - b) * (dt / (2.0 * dy))
                    + (ax * ax) * (r - c * 2.0 + l) * (dt * dt / (2.0 * dx * dx))
                    + (ay * ay) * (t - c * 2.0 + b) * (dt * dt / (2.0 * dy * dy))
                    + (ax * ay + ay * ax) * cross * (dt * dt / (8.0 * dx * dy));

                if shape.nz > 1 {
                    let gx = (swe::layer_potential(&dr, &self.rho, k) - swe::layer_potential(&dl, &self.rho, k)) / (2.0 * dx);
                    let gy = (swe::layer_potential(&du, &self.rho, k) - swe::layer_potential(&db, &self.rho, k)) / (2.0 * dy);
                    next[1] -= dt * alpha * c[0] * gx;
                    next[2] -= dt * alpha * c[0] * gy;
                }
                next[0] += dt * self.q[k];

                if !next.is_finite() || next[0] <= 0.0 {
                    return Err(crate::hydro::Error::NonPositiveDepth(next[0]).into())
                }
                next.write_to_slice(self.grid.cell_mut(i, j, k));
            }
        }
        self.bcs();
        Ok(())
    }

    /**
     * Take `nt` steps.
     */
    pub fn run(&mut self) -> Result<()> {
        for _ in 0..self.nt {
            self.evolve()?;
        }
        Ok(())
    }
}
