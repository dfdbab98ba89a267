use std::fmt;
use std::path::Path;
use log::info;
use crate::boundary::{self, Boundary, Sides};
use crate::config::SeaParams;
use crate::coupling::Coupler;
use crate::driver::{Driver, RunStatus};
use crate::error::{Result, ValidationError};
use crate::grid::Grid;
use crate::hierarchy::Hierarchy;
use crate::hydro::geometry::Metric;
use crate::hydro::{Model, Physics};
use crate::linalg;
use crate::message::{Communicator, Mailbox};
use crate::output::{CborWriter, Discard, SnapshotWriter};




/**
 * A multi-level, multi-physics simulation of an ocean layer: the hierarchy of
 * nested levels, the physical constants shared by every level, and the state
 * array of every level (interior and ghost cells). Cloning a `Sea` copies
 * all of its state.
 */
#[derive(Clone, Debug)]
pub struct Sea {
    params: SeaParams,
    hierarchy: Hierarchy,
    physics: Physics,
    grids: Vec<Grid>,
}




// ============================================================================
impl Sea {

    /**
     * Validate the parameters and build the hierarchy. Every level's state
     * starts zeroed; initial data must be supplied before running.
     */
    pub fn new(params: SeaParams) -> Result<Self> {
        params.validate()?;

        let hierarchy = Hierarchy::new(&params)?;
        let physics = Physics {
            metric: Metric::new(params.alpha, params.beta, params.gamma_down)?,
            gamma: params.gamma,
            rho: params.rho.clone(),
            p_const: params.p_const,
        };
        let grids = hierarchy.levels().iter().map(|level| Grid::zeros(level.shape)).collect();

        Ok(Self { params, hierarchy, physics, grids })
    }

    pub fn from_param_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(SeaParams::from_file(path)?)
    }

    pub fn from_param_str(text: &str) -> Result<Self> {
        Self::new(SeaParams::parse(text)?)
    }

    pub fn params(&self) -> &SeaParams {
        &self.params
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn physics(&self) -> &Physics {
        &self.physics
    }

    pub fn nlevels(&self) -> usize {
        self.grids.len()
    }

    pub fn grid(&self, level: usize) -> &Grid {
        &self.grids[level]
    }

    pub fn grids(&self) -> &[Grid] {
        &self.grids
    }

    pub fn time_step(&self) -> f32 {
        self.hierarchy.time_step()
    }

    pub fn boundary(&self) -> Boundary {
        Boundary::from_periodic(self.params.periodic)
    }

    fn height(&self) -> f32 {
        self.params.zmax - self.params.zmin
    }

    /**
     * Check that `level` exists and carries one of the given models.
     */
    fn require_model(&self, level: usize, models: &[Model]) -> Result<()> {
        match self.hierarchy.levels().get(level) {
            None => Err(ValidationError::invalid("level", format!("there is no level {}", level)).into()),
            Some(l) if !models.contains(&l.model) => Err(ValidationError::InvalidInitialData {
                level,
                reason: format!("level carries the {} model", l.model),
            }.into()),
            Some(_) => Ok(()),
        }
    }

    /**
     * Place per-cell fields into the state array of a level, one field per
     * conserved component. Each field has one value per cell of the level,
     * ghosts included, in the layout of the state array. The first field
     * must be positive everywhere.
     */
    fn place_fields(&mut self, level: usize, names: &[&str], fields: &[&[f32]]) -> Result<()> {
        let shape = self.grids[level].shape();
        let expected = shape.field_len();

        for (name, field) in names.iter().zip(fields) {
            if field.len() != expected {
                return Err(ValidationError::LengthMismatch { field: name.to_string(), expected, actual: field.len() }.into())
            }
            if let Some(n) = field.iter().position(|x| !x.is_finite()) {
                return Err(ValidationError::InvalidInitialData {
                    level,
                    reason: format!("{}[{}] is not finite", name, n),
                }.into())
            }
        }
        if let Some(n) = fields[0].iter().position(|&x| x <= 0.0) {
            return Err(ValidationError::InvalidInitialData {
                level,
                reason: format!("{}[{}] = {} is not positive", names[0], n, fields[0][n]),
            }.into())
        }
        for (c, cell) in self.grids[level].data_mut().chunks_exact_mut(shape.vec_dim).enumerate() {
            for (x, field) in cell.iter_mut().zip(fields) {
                *x = field[c]
            }
        }
        Ok(())
    }

    /**
     * Set the initial state of level 0, which must be a shallow water level.
     */
    pub fn initial_swe_data(&mut self, d0: &[f32], sx0: &[f32], sy0: &[f32]) -> Result<()> {
        self.initial_swe_data_on(0, d0, sx0, sy0)
    }

    pub fn initial_swe_data_on(&mut self, level: usize, d0: &[f32], sx0: &[f32], sy0: &[f32]) -> Result<()> {
        self.require_model(level, &[Model::SingleLayerSwe, Model::MultilayerSwe])?;
        self.place_fields(level, &["D0", "Sx0", "Sy0"], &[d0, sx0, sy0])
    }

    /**
     * Set the initial state of the first compressible level.
     */
    pub fn initial_compressible_data(&mut self, d0: &[f32], sx0: &[f32], sy0: &[f32], sz0: &[f32], tau0: &[f32]) -> Result<()> {
        let level = self
            .hierarchy
            .levels()
            .iter()
            .position(|l| l.model == Model::Compressible)
            .ok_or_else(|| ValidationError::invalid("models", "there is no compressible level"))?;
        self.initial_compressible_data_on(level, d0, sx0, sy0, sz0, tau0)
    }

    pub fn initial_compressible_data_on(&mut self, level: usize, d0: &[f32], sx0: &[f32], sy0: &[f32], sz0: &[f32], tau0: &[f32]) -> Result<()> {
        self.require_model(level, &[Model::Compressible])?;
        self.place_fields(level, &["D0", "Sx0", "Sy0", "Sz0", "tau0"], &[d0, sx0, sy0, sz0, tau0])
    }

    pub fn initial_low_mach_data_on(&mut self, level: usize, rho0: &[f32], sx0: &[f32], sy0: &[f32], sz0: &[f32], rho_h0: &[f32]) -> Result<()> {
        self.require_model(level, &[Model::LowMach])?;
        self.place_fields(level, &["rho0", "Sx0", "Sy0", "Sz0", "rho_h0"], &[rho0, sx0, sy0, sz0, rho_h0])
    }

    /**
     * Fill the whole of a fine level, ghosts included, from the current
     * state of its parent (which must already be fully set).
     */
    pub fn prolong_initial_data(&mut self, level: usize) -> Result<()> {
        if level == 0 || level >= self.nlevels() {
            return Err(ValidationError::invalid("level", format!("level {} has no parent to prolong from", level)).into())
        }
        let height = self.height();
        let coupler = Coupler::new(&self.physics, height, self.hierarchy.level(level - 1), self.hierarchy.level(level))?;
        let (coarse, fine) = self.grids.split_at_mut(level);
        let child = &mut fine[0];
        let columns = child.shape().index_space();

        coupler.prolong_columns(None, &coarse[level - 1], 0, 1.0, child, 0, columns.iter())
    }

    /**
     * Fill the ghost frame of a raw level buffer, with this sea's ghost
     * width and boundary mode.
     */
    pub fn bcs(&self, grid: &mut [f32], nx: usize, ny: usize, nz: usize, vec_dim: usize) -> Result<()> {
        boundary::bcs(grid, nx, ny, nz, vec_dim, self.params.ng, self.boundary())
    }

    /**
     * Invert the `m x n` row-major matrix `a` in place; see
     * `linalg::invert_mat`.
     */
    pub fn invert_mat(a: &mut [f32], m: usize, n: usize) -> Result<()> {
        linalg::invert_mat(a, m, n)
    }

    /**
     * Run coarse steps `tstart..nt` over the processes of `comm`, writing
     * snapshots to the parameter file's `outfile` (from rank 0) if one is
     * given.
     */
    pub fn run<C: Communicator>(&mut self, comm: &C, status: &RunStatus, tstart: usize) -> Result<()> {
        match (&self.params.outfile, comm.rank()) {
            (Some(path), 0) => {
                let mut writer = match CborWriter::create(path) {
                    Ok(writer) => writer,
                    Err(e) => {
                        Mailbox::new(comm).abort(&e.to_string());
                        return Err(e)
                    }
                };
                self.run_with_writer(comm, status, tstart, &mut writer)
            }
            _ => self.run_with_writer(comm, status, tstart, &mut Discard),
        }
    }

    /**
     * Run coarse steps `tstart..nt`, handing snapshots to the given writer on
     * rank 0. On success every process holds the full final state of every
     * level.
     */
    pub fn run_with_writer<C: Communicator, W: SnapshotWriter>(
        &mut self,
        comm: &C,
        status: &RunStatus,
        tstart: usize,
        writer: &mut W) -> Result<()>
    {
        let interiors = {
            let mut driver = Driver::new(&self.params, &self.hierarchy, &self.physics, &self.grids, comm)?;
            driver.run(status, tstart, writer)?
        };

        if let Some(interiors) = interiors {
            for (grid, data) in self.grids.iter_mut().zip(interiors) {
                grid.set_interior_data(&data)?;
            }
            self.refresh_ghosts()?;
        }
        Ok(())
    }

    /**
     * Fill the ghost frame of every level from the interiors: level 0 from
     * its boundary condition, finer levels from their parents.
     */
    pub fn refresh_ghosts(&mut self) -> Result<()> {
        let height = self.height();
        let boundary = self.boundary();

        if let Some(grid) = self.grids.first_mut() {
            boundary.apply(grid, Sides::all());
        }
        for l in 1..self.grids.len() {
            let coupler = Coupler::new(&self.physics, height, self.hierarchy.level(l - 1), self.hierarchy.level(l))?;
            let (coarse, fine) = self.grids.split_at_mut(l);
            let child = &mut fine[0];
            let shape = child.shape();
            let interior = shape.interior();
            let ghosts: Vec<_> = shape.index_space().iter().filter(|&index| !interior.contains(index)).collect();

            coupler.prolong_columns(None, &coarse[l - 1], 0, 1.0, child, 0, ghosts)?;
        }
        Ok(())
    }

    /**
     * Log the parameters and the level layout.
     */
    pub fn print_inputs(&self) {
        for line in self.to_string().lines() {
            info!("{}", line);
        }
    }
}




// ============================================================================
impl fmt::Display for Sea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.params)?;
        writeln!(f, "# dt {}", self.time_step())?;

        for level in self.hierarchy.levels() {
            let s = level.shape;
            write!(f, "# level {}: {} {} x {} x {} (vec_dim {})", level.index, level.model, s.nx, s.ny, s.nz, s.vec_dim)?;

            match level.window {
                Some(window) => writeln!(f, ", window {:?}", window.matching_indices())?,
                None => writeln!(f)?,
            }
        }
        Ok(())
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::Sea;
    use crate::config::test::TWO_LEVELS;
    use crate::error::{Error, ValidationError};

    fn uniform(sea: &Sea, level: usize, value: f32) -> Vec<f32> {
        vec![value; sea.grid(level).shape().field_len()]
    }

    #[test]
    fn initial_data_is_placed_unchanged() {
        let mut sea = Sea::from_param_str(TWO_LEVELS).unwrap();
        let n = sea.grid(0).shape().field_len();
        let d: Vec<f32> = (0..n).map(|c| 1.0 + c as f32).collect();
        let sx = uniform(&sea, 0, 0.5);
        let sy = uniform(&sea, 0, -0.5);
        sea.initial_swe_data(&d, &sx, &sy).unwrap();

        let grid = sea.grid(0);
        assert_eq!(grid.cell(-2, -2, 0), &[1.0, 0.5, -0.5]);
        assert_eq!(grid.cell(0, 0, 0)[0], 1.0 + (2 * 14 + 2) as f32);
    }

    #[test]
    fn short_fields_are_rejected() {
        let mut sea = Sea::from_param_str(TWO_LEVELS).unwrap();
        let d = vec![1.0; 3];
        let e = sea.initial_swe_data(&d, &d, &d).unwrap_err();
        assert!(matches!(e, Error::Validation(ValidationError::LengthMismatch { .. })));
    }

    #[test]
    fn non_positive_depth_names_the_level() {
        let mut sea = Sea::from_param_str(TWO_LEVELS).unwrap();
        let mut d = uniform(&sea, 1, 1.0);
        let z = uniform(&sea, 1, 0.0);
        d[7] = 0.0;
        let e = sea.initial_compressible_data(&d, &z, &z, &z, &z).unwrap_err();
        assert!(matches!(e, Error::Validation(ValidationError::InvalidInitialData { level: 1, .. })));
    }

    #[test]
    fn clones_are_independent() {
        let mut sea = Sea::from_param_str(TWO_LEVELS).unwrap();
        let copy = sea.clone();
        let one = uniform(&sea, 0, 1.0);
        let zero = uniform(&sea, 0, 0.0);
        sea.initial_swe_data(&one, &zero, &zero).unwrap();

        assert!(copy.grid(0).data().iter().all(|&x| x == 0.0));
        assert_eq!(sea.grid(0).data()[0], 1.0);
    }

    #[test]
    fn prolonged_rest_state_is_uniform() {
        let mut sea = Sea::from_param_str(TWO_LEVELS).unwrap();
        let one = uniform(&sea, 0, 1.0);
        let zero = uniform(&sea, 0, 0.0);
        sea.initial_swe_data(&one, &zero, &zero).unwrap();
        sea.prolong_initial_data(1).unwrap();

        let fine = sea.grid(1);
        let first = fine.cell(0, 0, 0).to_vec();
        assert!((first[0] - 1.0).abs() < 1e-6);
        assert!(fine.data().chunks_exact(5).all(|cell| cell == &first[..]));
    }

    #[test]
    fn display_lists_every_level() {
        let sea = Sea::from_param_str(TWO_LEVELS).unwrap();
        let text = sea.to_string();
        assert!(text.contains("# level 0: single-layer-swe 10 x 10 x 1"));
        assert!(text.contains("# level 1: compressible 8 x 8 x 4 (vec_dim 5), window [3, 7, 3, 7]"));
    }
}
