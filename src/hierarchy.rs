use crate::config::SeaParams;
use crate::error::ValidationError;
use crate::grid::GridShape;
use crate::hydro::{Model, Spacing};
use crate::index_space::{range2d, IndexSpace};




/**
 * The footprint of a fine level in its parent: an affine map between the
 * parent's index space and the fine level's, given by the offset of the
 * window in parent cells, its extent in parent cells, and the refinement
 * ratio. Built once, when the hierarchy is constructed.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub offset: (i64, i64),
    pub extent: (i64, i64),
    pub ratio: i64,
}




// ============================================================================
impl Window {

    /**
     * Place a window covering the fraction `df` of a parent of `n` cells in
     * each direction, centred on the parent. The window width is `round(df *
     * n)` parent cells and the fine level has `ratio` times as many.
     */
    pub fn centred(n: (usize, usize), df: f32, ratio: usize, level: usize) -> Result<Self, ValidationError> {
        let width = |n: usize| -> Result<usize, ValidationError> {
            let w = (df * n as f32).round() as usize;

            if w < 1 || w > n {
                Err(ValidationError::invalid("df", format!(
                    "level {}: window of {} cells does not fit a parent of {} cells", level, w, n)))
            } else {
                Ok(w)
            }
        };
        let (wx, wy) = (width(n.0)?, width(n.1)?);

        Ok(Self {
            offset: (((n.0 - wx) / 2) as i64, ((n.1 - wy) / 2) as i64),
            extent: (wx as i64, wy as i64),
            ratio: ratio as i64,
        })
    }

    /**
     * The parent cells covered by the window, in the parent's index space.
     */
    pub fn coarse_space(&self) -> IndexSpace {
        range2d(
            self.offset.0..self.offset.0 + self.extent.0,
            self.offset.1..self.offset.1 + self.extent.1)
    }

    /**
     * The number of fine cells in each direction.
     */
    pub fn fine_dim(&self) -> (usize, usize) {
        ((self.extent.0 * self.ratio) as usize, (self.extent.1 * self.ratio) as usize)
    }

    /**
     * The parent cell containing the given fine cell. Fine indexes outside
     * the window (in the ghost frame) map to parent cells outside it.
     */
    pub fn parent_of(&self, fine: (i64, i64)) -> (i64, i64) {
        (self.offset.0 + fine.0.div_euclid(self.ratio),
         self.offset.1 + fine.1.div_euclid(self.ratio))
    }

    /**
     * The position of a fine cell centre relative to its parent cell centre,
     * in units of the parent cell size. The offsets of the `ratio` sub-cells
     * along each axis sum to zero.
     */
    pub fn subcell_offset(&self, fine: (i64, i64)) -> (f32, f32) {
        let r = self.ratio as f32;
        let a = fine.0.rem_euclid(self.ratio) as f32;
        let b = fine.1.rem_euclid(self.ratio) as f32;
        ((a + 0.5) / r - 0.5, (b + 0.5) / r - 0.5)
    }

    /**
     * The fine cells covering a parent cell, in the fine index space.
     */
    pub fn children_of(&self, coarse: (i64, i64)) -> IndexSpace {
        range2d(coarse.0..coarse.0 + 1, coarse.1..coarse.1 + 1)
            .translate((-self.offset.0, -self.offset.1))
            .scale(self.ratio)
    }

    /**
     * The window as `[i0, i1, j0, j1]` in parent coordinates (end exclusive).
     */
    pub fn matching_indices(&self) -> [i64; 4] {
        [self.offset.0, self.offset.0 + self.extent.0, self.offset.1, self.offset.1 + self.extent.1]
    }
}




/**
 * Static description of one level of the hierarchy.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Level {
    pub index: usize,
    pub model: Model,
    /// The shape of the whole level, across all processes.
    pub shape: GridShape,
    pub spacing: Spacing,
    /// Lower corner of the level's interior.
    pub origin: (f32, f32, f32),
    /// Placement in the parent level; `None` for the coarsest level.
    pub window: Option<Window>,
}




// ============================================================================
impl Level {

    pub fn x_coordinates(&self) -> Vec<f32> {
        (0..self.shape.nx).map(|i| self.origin.0 + (i as f32 + 0.5) * self.spacing.dx).collect()
    }

    pub fn y_coordinates(&self) -> Vec<f32> {
        (0..self.shape.ny).map(|j| self.origin.1 + (j as f32 + 0.5) * self.spacing.dy).collect()
    }

    /**
     * Cell centre heights on a 3D level, or layer indexes on a shallow water
     * level.
     */
    pub fn z_coordinates(&self) -> Vec<f32> {
        if self.model.is_3d() {
            (0..self.shape.nz).map(|k| self.origin.2 + (k as f32 + 0.5) * self.spacing.dz).collect()
        } else {
            (0..self.shape.nz).map(|k| k as f32).collect()
        }
    }

    /**
     * The smallest cell size relevant to the time step: the horizontal sizes,
     * and the vertical size on 3D levels.
     */
    pub fn min_spacing(&self) -> f32 {
        let h = self.spacing.dx.min(self.spacing.dy);

        if self.model.is_3d() {
            h.min(self.spacing.dz)
        } else {
            h
        }
    }
}




/**
 * The fixed chain of nested levels: level 0 covers the whole domain and each
 * further level refines a centred window of the one before it.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Hierarchy {
    levels: Vec<Level>,
    ratio: usize,
}




// ============================================================================
impl Hierarchy {

    /**
     * Build the hierarchy, checking the model, the vertical resolution, and
     * the nesting of every level. The parameters must already have passed
     * `SeaParams::validate`.
     */
    pub fn new(params: &SeaParams) -> Result<Self, ValidationError> {
        let mut levels: Vec<Level> = Vec::with_capacity(params.nlevels);
        let height = params.zmax - params.zmin;

        for (index, (&model, &nz)) in params.models.iter().zip(&params.nzs).enumerate() {
            let expected = match model {
                Model::SingleLayerSwe => Some(1),
                Model::MultilayerSwe => Some(params.rho.len()),
                Model::Compressible | Model::LowMach => None,
            };
            if nz == 0 || expected.map_or(false, |e| e != nz) {
                return Err(ValidationError::invalid("nzs", format!(
                    "level {}: a {} level cannot have {} cells in z", index, model, nz)));
            }
            let dz = height / nz as f32;

            let level = match levels.last() {
                None => Level {
                    index,
                    model,
                    shape: GridShape::new(params.nx, params.ny, nz, params.ng, model.vec_dim()),
                    spacing: Spacing {
                        dx: (params.xmax - params.xmin) / params.nx as f32,
                        dy: (params.ymax - params.ymin) / params.ny as f32,
                        dz,
                    },
                    origin: (params.xmin, params.ymin, params.zmin),
                    window: None,
                },
                Some(parent) => {
                    if !parent.model.can_nest(model) {
                        return Err(ValidationError::UnsupportedNesting {
                            level: index,
                            parent: parent.model.to_string(),
                            child: model.to_string(),
                        });
                    }
                    if parent.model.is_3d() == model.is_3d() && parent.shape.nz != nz {
                        return Err(ValidationError::invalid("nzs", format!(
                            "level {}: must have the same {} cells in z as its parent", index, parent.shape.nz)));
                    }
                    let window = Window::centred((parent.shape.nx, parent.shape.ny), params.df, params.r, index)?;

                    if !parent.shape.interior().contains_space(&window.coarse_space()) {
                        return Err(ValidationError::invalid("df", format!(
                            "level {}: window lies outside its parent", index)));
                    }
                    let (nx, ny) = window.fine_dim();
                    let r = params.r as f32;

                    Level {
                        index,
                        model,
                        shape: GridShape::new(nx, ny, nz, params.ng, model.vec_dim()),
                        spacing: Spacing { dx: parent.spacing.dx / r, dy: parent.spacing.dy / r, dz },
                        origin: (
                            parent.origin.0 + window.offset.0 as f32 * parent.spacing.dx,
                            parent.origin.1 + window.offset.1 as f32 * parent.spacing.dy,
                            params.zmin,
                        ),
                        window: Some(window),
                    }
                }
            };
            levels.push(level);
        }
        Ok(Self { levels, ratio: params.r })
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level(&self, index: usize) -> &Level {
        &self.levels[index]
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn ratio(&self) -> usize {
        self.ratio
    }

    pub fn has_child(&self, index: usize) -> bool {
        index + 1 < self.levels.len()
    }

    /**
     * The coarse time step: one tenth of the smallest cell size of any level,
     * with each level's size scaled by `r^l` since level `l` takes `r^l`
     * substeps per coarse step.
     */
    pub fn time_step(&self) -> f32 {
        self.levels
            .iter()
            .map(|level| level.min_spacing() * (self.ratio as f32).powi(level.index as i32))
            .fold(f32::INFINITY, f32::min) * 0.1
    }
}
