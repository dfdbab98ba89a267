//! The time integration and coupling driver. Each process advances its own
//! x slab of every level: level 0 takes steps of `dt` with a two-stage SSP
//! Runge-Kutta scheme, and each finer level is subcycled `r` times per step
//! of its parent (Berger-Oliger), then restricted back into it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use log::{debug, error, info};
use crate::boundary::{Boundary, Sides};
use crate::config::SeaParams;
use crate::coupling::Coupler;
use crate::decomposition::{Decomposition, Side, SideKind, Slab};
use crate::error::{Error, Result, ValidationError};
use crate::grid::Grid;
use crate::hierarchy::Hierarchy;
use crate::hydro::burning::Burning;
use crate::hydro::{compressible, low_mach, swe, Model, Physics};
use crate::message::{Communicator, Mailbox};
use crate::output::{Snapshot, SnapshotWriter};
use crate::reflux::{self, FluxRegister};




/**
 * A handle shared between a running simulation and whoever is watching it:
 * the current step can be read from another thread, and setting the
 * interrupt flag (for example from a signal handler) stops the run at the
 * start of the next step, on every process.
 */
#[derive(Clone, Debug, Default)]
pub struct RunStatus {
    interrupt: Arc<AtomicBool>,
    step: Arc<AtomicUsize>,
}




// ============================================================================
impl RunStatus {

    pub fn new() -> Self {
        Self::default()
    }

    /**
     * The flag itself, for registering with `signal_hook::flag`.
     */
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn step(&self) -> usize {
        self.step.load(Ordering::SeqCst)
    }
}




/**
 * The slab of one level owned by this process. The grid has the full ghost
 * frame around the slab's interior rows. `register` collects the flux
 * corrections for the cells around this level's child window during one
 * step.
 */
struct LevelState {
    slab: Slab,
    grid: Grid,
    previous: Option<Grid>,
    rhs: Vec<f32>,
    register: Grid,
}




pub(crate) struct Driver<'a, C: Communicator> {
    params: &'a SeaParams,
    hierarchy: &'a Hierarchy,
    physics: &'a Physics,
    height: f32,
    boundary: Boundary,
    burning: Option<Burning>,
    mailbox: Mailbox<'a, C>,
    levels: Vec<LevelState>,
    step: usize,
}




// ============================================================================
impl<'a, C: Communicator> Driver<'a, C> {

    /**
     * Cut this process's slab of every level out of the global grids.
     */
    pub fn new(
        params: &'a SeaParams,
        hierarchy: &'a Hierarchy,
        physics: &'a Physics,
        grids: &[Grid],
        comm: &'a C) -> Result<Self>
    {
        let decomposition = Decomposition::new(hierarchy, comm.size(), params.periodic)?;
        let rank = comm.rank();

        let levels = grids.iter().enumerate().map(|(l, global)| {
            let slab = *decomposition.slab(l, rank);
            let shape = global.shape().with_nx(slab.width());
            let mut grid = Grid::zeros(shape);

            if !slab.is_empty() {
                let rows = slab.width() + 2 * shape.ng;
                grid.data_mut().copy_from_slice(global.rows(slab.start as i64 - shape.ng as i64, rows));
            }
            debug!("rank {} level {}: rows {}..{} ({:?} / {:?})", rank, l, slab.start, slab.end, slab.low, slab.high);
            LevelState { slab, grid, previous: None, rhs: vec![0.0; shape.len()], register: Grid::zeros(shape) }
        }).collect();

        Ok(Self {
            params,
            hierarchy,
            physics,
            height: params.zmax - params.zmin,
            boundary: Boundary::from_periodic(params.periodic),
            burning: if params.burning {
                Some(Burning { q: params.q, e_he: params.e_he, cv: params.cv })
            } else {
                None
            },
            mailbox: Mailbox::new(comm),
            levels,
            step: 0,
        })
    }

    /**
     * Take the coarse steps `tstart..nt`, then gather the interior of every
     * level onto every process. Returns `None` if no step was taken. On any
     * failure the other processes are told to abort.
     */
    pub fn run<W: SnapshotWriter>(&mut self, status: &RunStatus, tstart: usize, writer: &mut W) -> Result<Option<Vec<Vec<f32>>>> {
        match self.run_steps(status, tstart, writer) {
            Err(e) => {
                if !matches!(e, Error::Aborted { .. }) {
                    error!("rank {}: {}", self.mailbox.rank(), e);
                    self.mailbox.abort(&e.to_string());
                }
                Err(e)
            }
            ok => ok,
        }
    }

    fn run_steps<W: SnapshotWriter>(&mut self, status: &RunStatus, tstart: usize, writer: &mut W) -> Result<Option<Vec<Vec<f32>>>> {
        self.check_parameters_agree()?;

        let dt = self.hierarchy.time_step();
        let nt = self.params.nt;

        if tstart >= nt {
            info!("nothing to do: tstart = {} and nt = {}", tstart, nt);
            return Ok(None)
        }
        info!("rank {} of {}: steps {}..{} with dt = {}", self.mailbox.rank(), self.mailbox.size(), tstart, nt, dt);

        for t in tstart..nt {
            self.step = t;
            status.step.store(t, Ordering::SeqCst);

            if status.is_interrupted() {
                return Err(Error::Interrupted { step: t })
            }
            self.advance(0, dt, 0.0, 1.0)?;

            if (t + 1) % self.params.dprint == 0 {
                self.output(t + 1, (t + 1) as f32 * dt, writer)?;
            }
        }
        status.step.store(nt, Ordering::SeqCst);

        let interiors = (0..self.levels.len())
            .map(|l| self.gather(l, true).map(|data| data.unwrap_or_default()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(interiors))
    }

    /**
     * Every process must have been started with identical parameters.
     */
    fn check_parameters_agree(&mut self) -> Result<()> {
        let encoded = rmp_serde::to_vec(self.params)?;

        self.mailbox.all_reduce(|a, b| {
            if a == b {
                Ok(a)
            } else {
                Err(ValidationError::invalid("parameters", "processes were started with different parameters").into())
            }
        }, encoded)?;
        Ok(())
    }

    /**
     * Advance level `l` by `dt`, from the fraction `theta0` to `theta1` of its
     * parent's current step, then subcycle and restrict its child.
     */
    fn advance(&mut self, l: usize, dt: f32, theta0: f32, theta1: f32) -> Result<()> {
        let (rank, step) = (self.mailbox.rank(), self.step);
        self.advance_level(l, dt, theta0, theta1).map_err(|e| e.in_level(l, rank, step))
    }

    fn advance_level(&mut self, l: usize, dt: f32, theta0: f32, theta1: f32) -> Result<()> {
        let has_child = self.hierarchy.has_child(l);

        if self.refluxes(l) {
            for x in self.levels[l].register.data_mut() {
                *x = 0.0
            }
        }
        self.fill_ghosts(l, theta0)?;

        if has_child {
            self.levels[l].previous = Some(self.levels[l].grid.clone());
        }
        let u0 = self.levels[l].grid.data().to_vec();

        self.compute_rhs(l)?;
        self.record_fluxes(l, 0.5 * dt)?;
        {
            let state = &mut self.levels[l];
            for (u, du) in state.grid.data_mut().iter_mut().zip(&state.rhs) {
                *u += dt * du
            }
        }
        self.fill_ghosts(l, theta1)?;
        self.compute_rhs(l)?;
        self.record_fluxes(l, 0.5 * dt)?;
        {
            let state = &mut self.levels[l];
            for ((u, du), u0) in state.grid.data_mut().iter_mut().zip(&state.rhs).zip(&u0) {
                *u = 0.5 * u0 + 0.5 * (*u + dt * du)
            }
        }
        self.apply_burning(l, dt)?;
        self.validate(l)?;

        if has_child {
            let r = self.hierarchy.ratio();
            self.fill_ghosts(l, theta1)?;

            for s in 0..r {
                let a = s as f32 / r as f32;
                let b = (s + 1) as f32 / r as f32;
                self.advance(l + 1, dt / r as f32, a, b)?;
            }
            self.restrict(l)?;

            if self.refluxes(l) {
                self.reflux(l)?;
                self.validate(l)?;
            }
            self.fill_ghosts(l, theta1)?;
        }
        Ok(())
    }

    fn compute_rhs(&mut self, l: usize) -> Result<()> {
        let level = self.hierarchy.level(l);
        let physics = self.physics;
        let state = &mut self.levels[l];
        let metric = &physics.metric;

        match level.model {
            Model::SingleLayerSwe | Model::MultilayerSwe => {
                swe::rhs(&state.grid, metric, &physics.rho, level.spacing, &mut state.rhs)?
            }
            Model::Compressible => {
                compressible::rhs(&state.grid, physics.gamma, metric, level.spacing, &mut state.rhs)?
            }
            Model::LowMach => {
                low_mach::rhs(&state.grid, physics.gamma, physics.p_const, metric, level.spacing, &mut state.rhs)?
            }
        }
        Ok(())
    }

    fn apply_burning(&mut self, l: usize, dt: f32) -> Result<()> {
        let burning = match self.burning {
            Some(burning) => burning,
            None => return Ok(()),
        };
        let level = self.hierarchy.level(l);
        let grid = &mut self.levels[l].grid;

        if level.model.is_swe() {
            burning.accrete_swe(grid, dt);
        } else {
            burning.accrete_3d(grid, dt, level.spacing.dz);
            burning.heat(grid, level.model, self.physics, dt)?;
        }
        Ok(())
    }

    fn validate(&self, l: usize) -> Result<()> {
        let grid = &self.levels[l].grid;
        let physics = self.physics;

        match self.hierarchy.level(l).model {
            Model::SingleLayerSwe | Model::MultilayerSwe => swe::validate(grid)?,
            Model::Compressible => compressible::validate(grid, physics.gamma, &physics.metric)?,
            Model::LowMach => low_mach::validate(grid, physics.gamma)?,
        }
        Ok(())
    }

    /**
     * Overwrite the window of level `l` with the average of level `l + 1`.
     */
    fn restrict(&mut self, l: usize) -> Result<()> {
        let coupler = Coupler::new(self.physics, self.height, self.hierarchy.level(l), self.hierarchy.level(l + 1))?;
        let (coarse, fine) = self.levels.split_at_mut(l + 1);
        let (parent, child) = (&mut coarse[l], &fine[0]);

        if child.slab.is_empty() {
            return Ok(())
        }
        coupler.restrict(&child.grid, child.slab.start as i64, &mut parent.grid, parent.slab.start as i64)
    }

    /**
     * Whether the cells around the window of level `l + 1` are flux
     * corrected. Only nestings of one model are.
     */
    fn refluxes(&self, l: usize) -> bool {
        self.hierarchy.has_child(l) && self.hierarchy.level(l + 1).model == self.hierarchy.level(l).model
    }

    /**
     * Record the border fluxes of the stage just computed on level `l`: as
     * the parent of a refluxed window, and as the refluxed child of level
     * `l - 1`.
     */
    fn record_fluxes(&mut self, l: usize, weight: f32) -> Result<()> {
        let physics = self.physics;

        if self.refluxes(l) {
            let register = FluxRegister::new(physics, self.hierarchy.level(l), self.hierarchy.level(l + 1))?;
            let state = &mut self.levels[l];

            if !state.slab.is_empty() {
                register.add_parent_fluxes(&state.grid, state.slab.start as i64, weight, &mut state.register)?;
            }
        }
        if l > 0 && self.refluxes(l - 1) {
            let register = FluxRegister::new(physics, self.hierarchy.level(l - 1), self.hierarchy.level(l))?;
            let (coarse, fine) = self.levels.split_at_mut(l);
            let (parent, child) = (&mut coarse[l - 1], &fine[0]);

            if !parent.slab.is_empty() && !child.slab.is_empty() {
                register.add_child_fluxes(
                    &child.grid,
                    child.slab.start as i64,
                    parent.slab.start as i64,
                    parent.slab.width(),
                    weight,
                    &mut parent.register)?;
            }
        }
        Ok(())
    }

    /**
     * Add the flux corrections collected over the last step to level `l`.
     * Corrections for a cell in an x ghost row belong to the neighbouring
     * process, so those rows are exchanged first.
     */
    fn reflux(&mut self, l: usize) -> Result<()> {
        let seq = self.mailbox.next_seq();
        let state = &mut self.levels[l];
        let slab = state.slab;

        if slab.is_empty() {
            return Ok(())
        }
        let nx = state.grid.shape().nx as i64;

        if let SideKind::Neighbour(n) = slab.low {
            self.mailbox.send_halo(n, seq, Side::XHigh, state.register.rows(-1, 1).to_vec())?;
        }
        if let SideKind::Neighbour(n) = slab.high {
            self.mailbox.send_halo(n, seq, Side::XLow, state.register.rows(nx, 1).to_vec())?;
        }
        for (side, row) in [(Side::XLow, 0), (Side::XHigh, nx - 1)] {
            if let SideKind::Neighbour(n) = slab.side(side) {
                let data = self.mailbox.recv_halo(seq, n, side)?;
                let rows = state.register.rows_mut(row, 1);

                if data.len() != rows.len() {
                    return Err(Error::communication(format!(
                        "flux correction from rank {} has {} values, expected {}", n, data.len(), rows.len()), false))
                }
                for (x, dx) in rows.iter_mut().zip(&data) {
                    *x += dx
                }
            }
        }
        reflux::apply(&state.register, &mut state.grid);
        Ok(())
    }

    /**
     * Fill the ghost frame of level `l`. The y ghosts and any physical x
     * sides come from the boundary condition on level 0, or from the parent
     * (at the fraction `theta` of its step) on finer levels; then internal x
     * sides are exchanged with the neighbouring processes. Every process opens
     * the exchange, even if it owns none of the level.
     */
    fn fill_ghosts(&mut self, l: usize, theta: f32) -> Result<()> {
        let seq = self.mailbox.next_seq();
        let (parents, rest) = self.levels.split_at_mut(l);
        let state = &mut rest[0];
        let slab = state.slab;

        if slab.is_empty() {
            return Ok(())
        }
        let shape = state.grid.shape();
        let ng = shape.ng as i64;
        let nx = shape.nx as i64;
        let ny = shape.ny as i64;

        match parents.last() {
            None => {
                let sides = Sides {
                    x_low: slab.low == SideKind::Physical,
                    x_high: slab.high == SideKind::Physical,
                    y_low: true,
                    y_high: true,
                };
                self.boundary.apply(&mut state.grid, sides)
            }
            Some(parent) => {
                let coupler = Coupler::new(self.physics, self.height, self.hierarchy.level(l - 1), self.hierarchy.level(l))?;
                let full_rows = |rows: std::ops::Range<i64>| rows.flat_map(move |i| (-ng..ny + ng).map(move |j| (i, j)));
                let mut columns: Vec<(i64, i64)> = (0..nx)
                    .flat_map(|i| (-ng..0).chain(ny..ny + ng).map(move |j| (i, j)))
                    .collect();

                if slab.low == SideKind::CoarseFine {
                    columns.extend(full_rows(-ng..0));
                }
                if slab.high == SideKind::CoarseFine {
                    columns.extend(full_rows(nx..nx + ng));
                }
                coupler.prolong_columns(
                    parent.previous.as_ref(),
                    &parent.grid,
                    parent.slab.start as i64,
                    theta,
                    &mut state.grid,
                    slab.start as i64,
                    columns)?;
            }
        }

        let count = shape.ng;

        if let SideKind::Neighbour(n) = slab.low {
            self.mailbox.send_halo(n, seq, Side::XHigh, state.grid.rows(0, count).to_vec())?;
        }
        if let SideKind::Neighbour(n) = slab.high {
            self.mailbox.send_halo(n, seq, Side::XLow, state.grid.rows(nx - ng, count).to_vec())?;
        }
        for (side, first) in [(Side::XLow, -ng), (Side::XHigh, nx)] {
            if let SideKind::Neighbour(n) = slab.side(side) {
                let data = self.mailbox.recv_halo(seq, n, side)?;
                let rows = state.grid.rows_mut(first, count);

                if data.len() != rows.len() {
                    return Err(Error::communication(format!(
                        "halo from rank {} has {} values, expected {}", n, data.len(), rows.len()), false))
                }
                rows.copy_from_slice(&data);
            }
        }
        Ok(())
    }

    /**
     * Collect the interior of level `l` from every process, in global x
     * order. With `all` every process receives it; otherwise only rank 0
     * does, and the others get `None`.
     */
    fn gather(&mut self, l: usize, all: bool) -> Result<Option<Vec<f32>>> {
        type Pieces = Vec<(usize, Vec<f32>)>;

        let state = &self.levels[l];
        let piece: Pieces = vec![(state.slab.start, state.grid.interior_data())];
        let merge = |a: Vec<u8>, b: Vec<u8>| -> Result<Vec<u8>> {
            let mut a: Pieces = rmp_serde::from_slice(&a)?;
            let b: Pieces = rmp_serde::from_slice(&b)?;
            a.extend(b);
            Ok(rmp_serde::to_vec(&a)?)
        };
        let bytes = rmp_serde::to_vec(&piece)?;

        let merged = if all {
            Some(self.mailbox.all_reduce(merge, bytes)?)
        } else {
            self.mailbox.reduce(merge, bytes)?
        };

        match merged {
            None => Ok(None),
            Some(bytes) => {
                let mut pieces: Pieces = rmp_serde::from_slice(&bytes)?;
                pieces.sort_by_key(|piece| piece.0);
                Ok(Some(pieces.into_iter().flat_map(|piece| piece.1).collect()))
            }
        }
    }

    fn output<W: SnapshotWriter>(&mut self, step: usize, time: f32, writer: &mut W) -> Result<()> {
        let print_levels = self.params.print_levels.clone();

        for l in print_levels {
            if let Some(data) = self.gather(l, false)? {
                let level = self.hierarchy.level(l);
                let shape = level.shape;

                info!("step {} t = {:.6}: writing level {}", step, time, l);
                writer.write(Snapshot {
                    step,
                    time,
                    level: l,
                    model: level.model,
                    shape: [shape.nx, shape.ny, shape.nz, shape.vec_dim],
                    xs: level.x_coordinates(),
                    ys: level.y_coordinates(),
                    zs: level.z_coordinates(),
                    data,
                })?;
            }
        }
        Ok(())
    }
}
