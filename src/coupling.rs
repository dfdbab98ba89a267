//! Transfer of state between a level and its parent: prolongation fills fine
//! columns from the parent (linear in time, minmod-limited linear in space),
//! and restriction overwrites the parent window with the volume average of
//! its children. When the two levels carry different models, every column is
//! converted on the way through.

use crate::error::{Result, ValidationError};
use crate::grid::Grid;
use crate::hierarchy::{Level, Window};
use crate::hydro::compressible::{self, Primitive};
use crate::hydro::{low_mach, Error as HydroError, Model, Physics};
use crate::num_vec::Vector;




/**
 * The primitive state of one cell of a 3D level.
 */
fn primitive_3d(model: Model, u: &[f32], physics: &Physics) -> Result<Primitive> {
    let u = Vector::from_slice(u);

    match model {
        Model::LowMach => Ok(low_mach::recover_primitive(u, physics.gamma)?),
        _ => Ok(compressible::recover_primitive(u, physics.gamma, &physics.metric)?),
    }
}

fn conserved_3d(model: Model, prim: &Primitive, physics: &Physics) -> Result<compressible::Conserved> {
    match model {
        Model::LowMach => Ok(low_mach::to_conserved(prim, physics.gamma)),
        _ => Ok(prim.to_conserved(physics.gamma, &physics.metric)?),
    }
}

fn minmod(a: f32, b: f32) -> f32 {
    if a * b <= 0.0 {
        0.0
    } else if a.abs() < b.abs() {
        a
    } else {
        b
    }
}




/**
 * Convert one column of model `from` into model `to`, writing into `dst`. On
 * entry `dst` holds the current target column, which is used as a template
 * when a single depth must be split over several layers. `height` is the
 * vertical extent of the domain.
 *
 * A shallow water column becomes a stack of identical 3D cells with density
 * `D / height`, the column's mean horizontal velocity, no vertical velocity,
 * and the reference pressure. A 3D column becomes a depth `sum rho dz` with
 * the mass-weighted velocity, split over the target layers in proportion to
 * the template's depths (or equally, if the template has none).
 *
 * A compressible cell needs a speed below 1, so a shallow water column with
 * `|S| / D >= 1` has no compressible image and its conversion fails with a
 * numerical divergence error. Shallow water levels may carry such speeds
 * only where no compressible level is nested under them.
 */
pub fn convert_column(physics: &Physics, height: f32, from: Model, src: &[f32], to: Model, dst: &mut [f32]) -> Result<()> {
    if from == to {
        dst.copy_from_slice(src);
        return Ok(())
    }
    match (from.is_3d(), to.is_3d()) {
        (true, true) => {
            for (s, d) in src.chunks_exact(from.vec_dim()).zip(dst.chunks_exact_mut(to.vec_dim())) {
                let prim = primitive_3d(from, s, physics)?;
                conserved_3d(to, &prim, physics)?.write_to_slice(d);
            }
        }
        (false, true) => {
            let (mut d, mut sx, mut sy) = (0.0, 0.0, 0.0);

            for layer in src.chunks_exact(from.vec_dim()) {
                d += layer[0];
                sx += layer[1];
                sy += layer[2];
            }
            if !(d > 0.0) {
                return Err(HydroError::NonPositiveDepth(d).into())
            }
            let prim = Primitive::new(d / height, [sx / d, sy / d, 0.0], physics.p_const);
            let u = conserved_3d(to, &prim, physics)?;

            for cell in dst.chunks_exact_mut(to.vec_dim()) {
                u.write_to_slice(cell)
            }
        }
        (true, false) => {
            let dz = height / (src.len() / from.vec_dim()) as f32;
            let (mut d, mut mx, mut my) = (0.0, 0.0, 0.0);

            for cell in src.chunks_exact(from.vec_dim()) {
                let prim = primitive_3d(from, cell, physics)?;
                d += prim.rho * dz;
                mx += prim.rho * prim.v[0] * dz;
                my += prim.rho * prim.v[1] * dz;
            }
            if !(d > 0.0) {
                return Err(HydroError::NonPositiveDepth(d).into())
            }
            let (vx, vy) = (mx / d, my / d);
            let layers = dst.len() / to.vec_dim();
            let total: f32 = dst.chunks_exact(to.vec_dim()).map(|layer| layer[0]).sum();

            for layer in dst.chunks_exact_mut(to.vec_dim()) {
                let fraction = if total > 0.0 { layer[0] / total } else { 1.0 / layers as f32 };
                let dk = fraction * d;
                layer[0] = dk;
                layer[1] = dk * vx;
                layer[2] = dk * vy;
            }
        }
        (false, false) => {
            return Err(ValidationError::UnsupportedNesting {
                level: 0,
                parent: from.to_string(),
                child: to.to_string(),
            }.into())
        }
    }
    Ok(())
}




/**
 * Moves data between a level and its parent. Both grids may be slabs of
 * their levels; `parent_start` and `child_start` are the global x indexes of
 * their first interior rows.
 */
pub struct Coupler<'a> {
    physics: &'a Physics,
    height: f32,
    parent: &'a Level,
    child: &'a Level,
    window: Window,
}




// ============================================================================
impl<'a> Coupler<'a> {

    pub fn new(physics: &'a Physics, height: f32, parent: &'a Level, child: &'a Level) -> Result<Self> {
        let window = child.window.ok_or_else(|| ValidationError::invalid(
            "nlevels", format!("level {} has no window in level {}", child.index, parent.index)))?;

        Ok(Self { physics, height, parent, child, window })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /**
     * Fill the given child columns (local indexes, ghosts allowed) from the
     * parent. The parent state is taken at the fraction `theta` of the way
     * from `parent_prev` to `parent`; without a previous state, or at `theta
     * >= 1`, the current parent state is used as is. Slopes are limited with
     * minmod, and vanish where a neighbour is not held locally.
     */
    pub fn prolong_columns<I>(
        &self,
        parent_prev: Option<&Grid>,
        parent: &Grid,
        parent_start: i64,
        theta: f32,
        child: &mut Grid,
        child_start: i64,
        columns: I) -> Result<()>
    where
        I: IntoIterator<Item = (i64, i64)>
    {
        let held = parent.shape().index_space();
        let value = |i: i64, j: i64| -> Option<Vec<f32>> {
            if !held.contains((i, j)) {
                return None
            }
            let cur = parent.column(i, j);

            match parent_prev {
                Some(prev) if theta <= 0.0 => Some(prev.column(i, j).to_vec()),
                Some(prev) if theta < 1.0 => Some(prev
                    .column(i, j)
                    .iter()
                    .zip(cur)
                    .map(|(a, b)| a + theta * (b - a))
                    .collect()),
                _ => Some(cur.to_vec()),
            }
        };
        let mut scratch = vec![0.0; parent.shape().column_len()];

        for (i, j) in columns {
            let fine = (i + child_start, j);
            let (pi, pj) = self.window.parent_of(fine);
            let pi = pi - parent_start;

            let centre = value(pi, pj).ok_or_else(|| ValidationError::invalid("ng", format!(
                "level {}: parent column ({}, {}) of fine column ({}, {}) is not held locally",
                self.child.index, pi + parent_start, pj, fine.0, fine.1)))?;
            let (xl, xr) = (value(pi - 1, pj), value(pi + 1, pj));
            let (yl, yr) = (value(pi, pj - 1), value(pi, pj + 1));
            let (xi, eta) = self.window.subcell_offset(fine);

            for (n, x) in scratch.iter_mut().enumerate() {
                let c = centre[n];
                let sx = match (&xl, &xr) {
                    (Some(l), Some(r)) => minmod(r[n] - c, c - l[n]),
                    _ => 0.0,
                };
                let sy = match (&yl, &yr) {
                    (Some(l), Some(r)) => minmod(r[n] - c, c - l[n]),
                    _ => 0.0,
                };
                *x = c + xi * sx + eta * sy;
            }
            convert_column(self.physics, self.height, self.parent.model, &scratch, self.child.model, child.column_mut(i, j))?;
        }
        Ok(())
    }

    /**
     * Overwrite every parent cell under the window (and held by this parent
     * slab) with the average of its `r x r` children, converted to the
     * parent model.
     */
    pub fn restrict(&self, child: &Grid, child_start: i64, parent: &mut Grid, parent_start: i64) -> Result<()> {
        let shape = parent.shape();
        let covered = shape
            .interior()
            .translate((parent_start, 0))
            .intersect(&self.window.coarse_space());
        let count = (self.window.ratio * self.window.ratio) as f32;
        let mut sum = vec![0.0; shape.column_len()];
        let mut converted = vec![0.0; shape.column_len()];

        for (pi, pj) in covered.iter() {
            let template = parent.column(pi - parent_start, pj).to_vec();

            for x in sum.iter_mut() {
                *x = 0.0
            }
            for (fi, fj) in self.window.children_of((pi, pj)).iter() {
                converted.copy_from_slice(&template);
                convert_column(
                    self.physics,
                    self.height,
                    self.child.model,
                    child.column(fi - child_start, fj),
                    self.parent.model,
                    &mut converted)?;

                for (s, c) in sum.iter_mut().zip(&converted) {
                    *s += c
                }
            }
            for (p, s) in parent.column_mut(pi - parent_start, pj).iter_mut().zip(&sum) {
                *p = s / count
            }
        }
        Ok(())
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{convert_column, Coupler};
    use crate::config::test::TWO_LEVELS;
    use crate::config::SeaParams;
    use crate::grid::Grid;
    use crate::hierarchy::Hierarchy;
    use crate::hydro::compressible::Primitive;
    use crate::hydro::geometry::Metric;
    use crate::hydro::{low_mach, Model, Physics};

    fn physics() -> Physics {
        Physics { metric: Metric::flat(), gamma: 5.0 / 3.0, rho: vec![1.0, 2.0], p_const: 0.1 }
    }

    #[test]
    fn shallow_water_column_expands_to_uniform_cells() {
        let physics = physics();
        let src = [0.5, 0.05, 0.0, 1.5, 0.15, 0.0];
        let mut dst = vec![0.0; 10];
        convert_column(&physics, 2.0, Model::MultilayerSwe, &src, Model::LowMach, &mut dst).unwrap();

        let prim = low_mach::recover_primitive(crate::num_vec::Vector::from_slice(&dst[5..]), physics.gamma).unwrap();
        assert!((prim.rho - 1.0).abs() < 1e-6);
        assert!((prim.v[0] - 0.1).abs() < 1e-6);
        assert!((prim.p - 0.1).abs() < 1e-6);
        assert_eq!(dst[..5], dst[5..]);
    }

    #[test]
    fn fast_shallow_water_has_no_compressible_image() {
        let physics = physics();
        let src = [1.0, 1.2, 0.0];
        let mut dst = vec![0.0; 5];
        let e = convert_column(&physics, 1.0, Model::SingleLayerSwe, &src, Model::Compressible, &mut dst).unwrap_err();
        assert!(matches!(e, crate::error::Error::NumericalDivergence(_)), "{:?}", e);
    }

    #[test]
    fn column_collapse_keeps_layer_fractions() {
        let physics = physics();
        let cell = Primitive::new(2.0, [0.0; 3], 0.1).to_conserved(physics.gamma, &physics.metric).unwrap();
        let src: Vec<f32> = cell.as_array().iter().chain(cell.as_array().iter()).cloned().collect();
        let mut dst = vec![1.0, 0.0, 0.0, 3.0, 0.0, 0.0];
        convert_column(&physics, 1.0, Model::Compressible, &src, Model::MultilayerSwe, &mut dst).unwrap();

        assert!((dst[0] - 0.5).abs() < 1e-6);
        assert!((dst[3] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn compressible_and_low_mach_convert_through_primitives() {
        let physics = physics();
        let prim = Primitive::new(1.0, [0.01, 0.0, 0.0], 0.2);
        let u = prim.to_conserved(physics.gamma, &physics.metric).unwrap().as_array();
        let mut l = vec![0.0; 5];
        let mut c = vec![0.0; 5];
        convert_column(&physics, 1.0, Model::Compressible, &u, Model::LowMach, &mut l).unwrap();
        convert_column(&physics, 1.0, Model::LowMach, &l, Model::Compressible, &mut c).unwrap();

        for n in 0..5 {
            assert!((c[n] - u[n]).abs() < 1e-4);
        }
    }

    #[test]
    fn restriction_undoes_prolongation() {
        let mut params = SeaParams::parse(TWO_LEVELS).unwrap();
        params.models = vec![Model::SingleLayerSwe, Model::SingleLayerSwe];
        params.nzs = vec![1, 1];
        let hierarchy = Hierarchy::new(&params).unwrap();
        let (coarse, fine) = (hierarchy.level(0), hierarchy.level(1));
        let physics = physics();
        let coupler = Coupler::new(&physics, 1.0, coarse, fine).unwrap();

        let mut parent = Grid::zeros(coarse.shape);
        for (i, j) in coarse.shape.index_space().iter() {
            let d = 1.0 + 0.1 * i as f32 + 0.02 * (j * j) as f32;
            parent.column_mut(i, j).copy_from_slice(&[d, 0.1 * d, 0.0]);
        }
        let mut child = Grid::zeros(fine.shape);
        coupler.prolong_columns(None, &parent, 0, 1.0, &mut child, 0, fine.shape.index_space().iter()).unwrap();

        let mut restricted = parent.clone();
        coupler.restrict(&child, 0, &mut restricted, 0).unwrap();
        assert!(restricted.max_interior_difference(&parent) < 1e-5);
    }

    #[test]
    fn time_interpolation_blends_parent_states() {
        let mut params = SeaParams::parse(TWO_LEVELS).unwrap();
        params.models = vec![Model::SingleLayerSwe, Model::SingleLayerSwe];
        params.nzs = vec![1, 1];
        let hierarchy = Hierarchy::new(&params).unwrap();
        let (coarse, fine) = (hierarchy.level(0), hierarchy.level(1));
        let physics = physics();
        let coupler = Coupler::new(&physics, 1.0, coarse, fine).unwrap();

        let mut prev = Grid::zeros(coarse.shape);
        let mut cur = Grid::zeros(coarse.shape);
        for cell in prev.data_mut().chunks_exact_mut(3) {
            cell[0] = 1.0;
        }
        for cell in cur.data_mut().chunks_exact_mut(3) {
            cell[0] = 2.0;
        }
        let mut child = Grid::zeros(fine.shape);
        coupler.prolong_columns(Some(&prev), &cur, 0, 0.25, &mut child, 0, vec![(-1, 0), (3, 3)]).unwrap();
        assert_eq!(child.column(-1, 0)[0], 1.25);
        assert_eq!(child.column(3, 3)[0], 1.25);
        assert_eq!(child.column(0, 0)[0], 0.0);
    }
}
