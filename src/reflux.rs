//! Conservation at coarse/fine boundaries. Restriction replaces the parent
//! cells under a window by the average of their children, but the parent
//! cells just outside the window were updated with the parent's own fluxes
//! through the window border. A `FluxRegister` accumulates, for each of those
//! cells, the difference between the parent flux and the time- and
//! area-averaged child fluxes through the same face, so that adding it after
//! restriction leaves the parent level with exactly the mass the two levels
//! exchanged.

use crate::error::{Result, ValidationError};
use crate::grid::Grid;
use crate::hierarchy::{Level, Window};
use crate::hydro::geometry::Direction;
use crate::hydro::{self, Physics};




/**
 * One coarse face on the border of a window: the parent cell outside the
 * window which receives the correction, the parent cell inside it, and the
 * normal direction. `sign` is `+1` when the outside cell lies on the low side
 * of the face.
 */
#[derive(Clone, Copy, Debug, PartialEq)]
struct Face {
    outside: (i64, i64),
    inside: (i64, i64),
    direction: Direction,
    sign: f32,
}




// ============================================================================
impl Face {

    /**
     * Order the two states by increasing index along the face normal.
     */
    fn order<'b>(&self, outside: &'b [f32], inside: &'b [f32]) -> (&'b [f32], &'b [f32]) {
        if self.sign > 0.0 {
            (outside, inside)
        } else {
            (inside, outside)
        }
    }
}




/**
 * Computes flux corrections for the parent cells bordering one window. Both
 * levels must carry the same model. Corrections are accumulated into a grid
 * with the shape of the parent slab; `parent_start` and `child_start` are the
 * global x indexes of the first interior rows of the slabs.
 */
pub struct FluxRegister<'a> {
    physics: &'a Physics,
    parent: &'a Level,
    window: Window,
    faces: Vec<Face>,
}




// ============================================================================
impl<'a> FluxRegister<'a> {

    pub fn new(physics: &'a Physics, parent: &'a Level, child: &'a Level) -> Result<Self> {
        let window = child.window.ok_or_else(|| ValidationError::invalid(
            "nlevels", format!("level {} has no window in level {}", child.index, parent.index)))?;

        if parent.model != child.model {
            return Err(ValidationError::UnsupportedNesting {
                level: child.index,
                parent: parent.model.to_string(),
                child: child.model.to_string(),
            }.into())
        }
        let (i0, i1, j0, j1) = (
            window.offset.0,
            window.offset.0 + window.extent.0,
            window.offset.1,
            window.offset.1 + window.extent.1);

        let x_faces = (j0..j1).flat_map(|j| vec![
            Face { outside: (i0 - 1, j), inside: (i0, j), direction: Direction::I, sign: 1.0 },
            Face { outside: (i1, j), inside: (i1 - 1, j), direction: Direction::I, sign: -1.0 },
        ]);
        let y_faces = (i0..i1).flat_map(|i| vec![
            Face { outside: (i, j0 - 1), inside: (i, j0), direction: Direction::J, sign: 1.0 },
            Face { outside: (i, j1), inside: (i, j1 - 1), direction: Direction::J, sign: -1.0 },
        ]);
        let interior = parent.shape.interior();
        let faces = x_faces
            .chain(y_faces)
            .filter(|face| interior.contains(face.outside))
            .collect();

        Ok(Self { physics, parent, window, faces })
    }

    /**
     * The number of border faces whose outside cell lies on the parent level.
     */
    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    fn spacing(&self, direction: Direction) -> f32 {
        match direction {
            Direction::I => self.parent.spacing.dx,
            Direction::J => self.parent.spacing.dy,
            Direction::K => self.parent.spacing.dz,
        }
    }

    fn held_faces(&self, parent_start: i64, parent_width: usize) -> impl Iterator<Item = &Face> + '_ {
        let rows = parent_start..parent_start + parent_width as i64;
        self.faces.iter().filter(move |face| rows.contains(&face.inside.0))
    }

    /**
     * Add the parent's own border fluxes, evaluated on the current parent
     * state with the weight `weight` (the stage's share of the time step).
     */
    pub fn add_parent_fluxes(&self, parent: &Grid, parent_start: i64, weight: f32, register: &mut Grid) -> Result<()> {
        let shape = parent.shape();

        for face in self.held_faces(parent_start, shape.nx) {
            let (oi, oj) = (face.outside.0 - parent_start, face.outside.1);
            let (ii, ij) = (face.inside.0 - parent_start, face.inside.1);
            let scale = face.sign * weight / self.spacing(face.direction);

            for k in 0..shape.nz {
                let (ul, ur) = face.order(parent.cell(oi, oj, k), parent.cell(ii, ij, k));
                let flux = hydro::face_flux(self.parent.model, self.physics, ul, ur, face.direction)?;

                for (x, f) in register.cell_mut(oi, oj, k).iter_mut().zip(&flux) {
                    *x += scale * f
                }
            }
        }
        Ok(())
    }

    /**
     * Subtract the child's fluxes through the window border, evaluated on
     * the current child state with the weight `weight`, averaged over the
     * `r` child faces covering each parent face.
     */
    pub fn add_child_fluxes(&self, child: &Grid, child_start: i64, parent_start: i64, parent_width: usize, weight: f32, register: &mut Grid) -> Result<()> {
        let r = self.window.ratio;
        let nz = child.shape().nz;

        for face in self.held_faces(parent_start, parent_width) {
            let children = self.window.children_of(face.inside);
            let (start, end) = (children.start(), children.end());
            let pairs: Vec<((i64, i64), (i64, i64))> = match (face.direction, face.sign > 0.0) {
                (Direction::I, true) => (start.1..end.1).map(|j| ((start.0 - 1, j), (start.0, j))).collect(),
                (Direction::I, false) => (start.1..end.1).map(|j| ((end.0 - 1, j), (end.0, j))).collect(),
                (_, true) => (start.0..end.0).map(|i| ((i, start.1 - 1), (i, start.1))).collect(),
                (_, false) => (start.0..end.0).map(|i| ((i, end.1 - 1), (i, end.1))).collect(),
            };
            let (oi, oj) = (face.outside.0 - parent_start, face.outside.1);
            let scale = -face.sign * weight / (r as f32 * self.spacing(face.direction));

            for (left, right) in pairs {
                for k in 0..nz {
                    let ul = child.cell(left.0 - child_start, left.1, k);
                    let ur = child.cell(right.0 - child_start, right.1, k);
                    let flux = hydro::face_flux(self.parent.model, self.physics, ul, ur, face.direction)?;

                    for (x, f) in register.cell_mut(oi, oj, k).iter_mut().zip(&flux) {
                        *x += scale * f
                    }
                }
            }
        }
        Ok(())
    }
}




/**
 * Add the accumulated corrections on the interior rows of `register` to
 * `grid`.
 */
pub fn apply(register: &Grid, grid: &mut Grid) {
    let nx = grid.shape().nx;

    for (u, du) in grid.rows_mut(0, nx).iter_mut().zip(register.rows(0, nx)) {
        *u += du
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{apply, FluxRegister};
    use crate::config::test::TWO_LEVELS;
    use crate::config::SeaParams;
    use crate::grid::Grid;
    use crate::hierarchy::Hierarchy;
    use crate::hydro::geometry::Metric;
    use crate::hydro::{Model, Physics};

    fn shallow_water_hierarchy() -> Hierarchy {
        let mut params = SeaParams::parse(TWO_LEVELS).unwrap();
        params.models = vec![Model::SingleLayerSwe, Model::SingleLayerSwe];
        params.nzs = vec![1, 1];
        Hierarchy::new(&params).unwrap()
    }

    fn physics() -> Physics {
        Physics { metric: Metric::flat(), gamma: 5.0 / 3.0, rho: vec![1.0], p_const: 0.1 }
    }

    fn uniform(grid: &mut Grid, d: f32, sx: f32) {
        for cell in grid.data_mut().chunks_exact_mut(3) {
            cell.copy_from_slice(&[d, sx, 0.0]);
        }
    }

    #[test]
    fn corrections_land_on_the_ring_around_the_window() {
        let hierarchy = shallow_water_hierarchy();
        let (coarse, fine) = (hierarchy.level(0), hierarchy.level(1));
        let physics = physics();
        let register = FluxRegister::new(&physics, coarse, fine).unwrap();
        assert_eq!(register.len(), 16);

        let mut parent = Grid::zeros(coarse.shape);
        let mut sum = Grid::zeros(coarse.shape);
        uniform(&mut parent, 1.0, 0.2);
        register.add_parent_fluxes(&parent, 0, 0.1, &mut sum).unwrap();

        let touched: Vec<_> = coarse.shape.index_space().iter().filter(|&(i, j)| sum.column(i, j)[0] != 0.0).collect();
        assert_eq!(touched.len(), 8);
        assert!(touched.iter().all(|&(i, j)| (i == 2 || i == 7) && (3..7).contains(&j)));
        assert!(sum.column(2, 4)[0] > 0.0);
        assert!(sum.column(7, 4)[0] < 0.0);
    }

    #[test]
    fn matching_fluxes_cancel() {
        let hierarchy = shallow_water_hierarchy();
        let (coarse, fine) = (hierarchy.level(0), hierarchy.level(1));
        let physics = physics();
        let register = FluxRegister::new(&physics, coarse, fine).unwrap();

        let mut parent = Grid::zeros(coarse.shape);
        let mut child = Grid::zeros(fine.shape);
        let mut sum = Grid::zeros(coarse.shape);
        uniform(&mut parent, 1.5, 0.3);
        uniform(&mut child, 1.5, 0.3);

        register.add_parent_fluxes(&parent, 0, 0.1, &mut sum).unwrap();
        for _ in 0..2 {
            register.add_child_fluxes(&child, 0, 0, coarse.shape.nx, 0.05, &mut sum).unwrap();
        }
        assert!(sum.data().iter().all(|x| x.abs() < 1e-6));
    }

    #[test]
    fn correction_restores_the_child_mass_flux() {
        let hierarchy = shallow_water_hierarchy();
        let (coarse, fine) = (hierarchy.level(0), hierarchy.level(1));
        let physics = physics();
        let register = FluxRegister::new(&physics, coarse, fine).unwrap();

        let mut parent = Grid::zeros(coarse.shape);
        let mut child = Grid::zeros(fine.shape);
        let mut sum = Grid::zeros(coarse.shape);
        uniform(&mut parent, 1.0, 0.0);
        uniform(&mut child, 1.0, 0.1);

        register.add_parent_fluxes(&parent, 0, 1.0, &mut sum).unwrap();
        register.add_child_fluxes(&child, 0, 0, coarse.shape.nx, 1.0, &mut sum).unwrap();

        let mut grid = parent.clone();
        apply(&sum, &mut grid);

        // the child carries mass out through its high x side and in through
        // its low x side
        assert!((grid.column(7, 4)[0] - 1.1).abs() < 1e-5);
        assert!((grid.column(2, 4)[0] - 0.9).abs() < 1e-5);
        assert_eq!(grid.column(4, 4), parent.column(4, 4));
    }

    #[test]
    fn different_models_are_not_refluxed() {
        let params = SeaParams::parse(TWO_LEVELS).unwrap();
        let hierarchy = Hierarchy::new(&params).unwrap();
        assert!(FluxRegister::new(&physics(), hierarchy.level(0), hierarchy.level(1)).is_err());
    }
}
