use crate::error::{Result, ValidationError};
use crate::index_space::{range2d, IndexSpace};




/**
 * The shape of a level state array: `nx x ny` interior columns surrounded by
 * `ng` ghost columns on each side, each column holding `nz` cells of
 * `vec_dim` components. The buffer is laid out with x slowest and the
 * component index fastest.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridShape {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub ng: usize,
    pub vec_dim: usize,
}




// ============================================================================
impl GridShape {

    pub fn new(nx: usize, ny: usize, nz: usize, ng: usize, vec_dim: usize) -> Self {
        Self { nx, ny, nz, ng, vec_dim }
    }

    /**
     * The same shape with a different number of interior x rows; used for
     * the slab of a level owned by one process.
     */
    pub fn with_nx(self, nx: usize) -> Self {
        Self { nx, ..self }
    }

    /**
     * Return the number of columns on each axis, including ghosts.
     */
    pub fn extended_dim(&self) -> (usize, usize) {
        (self.nx + 2 * self.ng, self.ny + 2 * self.ng)
    }

    pub fn len(&self) -> usize {
        let (l, m) = self.extended_dim();
        l * m * self.column_len()
    }

    /**
     * The number of values per (x, y) column.
     */
    pub fn column_len(&self) -> usize {
        self.nz * self.vec_dim
    }

    /**
     * The number of values in one x row, ghost columns included.
     */
    pub fn row_len(&self) -> usize {
        self.extended_dim().1 * self.column_len()
    }

    /**
     * The number of values per field (one component) over the whole buffer.
     */
    pub fn field_len(&self) -> usize {
        self.len() / self.vec_dim
    }

    /**
     * The interior columns, indexed from zero.
     */
    pub fn interior(&self) -> IndexSpace {
        range2d(0..self.nx as i64, 0..self.ny as i64)
    }

    /**
     * All columns, ghosts included.
     */
    pub fn index_space(&self) -> IndexSpace {
        self.interior().extend_all(self.ng as i64)
    }

    /**
     * Return the buffer offset of the first value in column (i, j), where the
     * indexes are relative to the first interior column and may be negative
     * inside the ghost frame.
     */
    pub fn column_offset(&self, i: i64, j: i64) -> usize {
        self.index_space().row_major_offset((i, j)) * self.column_len()
    }

    pub fn cell_offset(&self, i: i64, j: i64, k: usize) -> usize {
        self.column_offset(i, j) + k * self.vec_dim
    }
}




/**
 * A level state array, or the slab of one owned by a single process. The
 * buffer is exclusively owned; cloning a grid copies it.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    shape: GridShape,
    data: Vec<f32>,
}




// ============================================================================
impl Grid {

    /**
     * A zero-filled grid of the given shape.
     */
    pub fn zeros(shape: GridShape) -> Self {
        Self { shape, data: vec![0.0; shape.len()] }
    }

    /**
     * Wrap an existing buffer, which must have exactly `shape.len()` values.
     */
    pub fn from_vec(shape: GridShape, data: Vec<f32>) -> Result<Self> {
        if data.len() != shape.len() {
            return Err(ValidationError::LengthMismatch {
                field: "grid".into(),
                expected: shape.len(),
                actual: data.len(),
            }
            .into());
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn column(&self, i: i64, j: i64) -> &[f32] {
        let n = self.shape.column_offset(i, j);
        &self.data[n..n + self.shape.column_len()]
    }

    pub fn column_mut(&mut self, i: i64, j: i64) -> &mut [f32] {
        let n = self.shape.column_offset(i, j);
        let m = self.shape.column_len();
        &mut self.data[n..n + m]
    }

    pub fn cell(&self, i: i64, j: i64, k: usize) -> &[f32] {
        let n = self.shape.cell_offset(i, j, k);
        &self.data[n..n + self.shape.vec_dim]
    }

    pub fn cell_mut(&mut self, i: i64, j: i64, k: usize) -> &mut [f32] {
        let n = self.shape.cell_offset(i, j, k);
        let m = self.shape.vec_dim;
        &mut self.data[n..n + m]
    }

    /**
     * Return `count` consecutive whole x rows starting at row `i`, ghost
     * columns included.
     */
    pub fn rows(&self, i: i64, count: usize) -> &[f32] {
        let n = self.shape.column_offset(i, -(self.shape.ng as i64));
        &self.data[n..n + count * self.shape.row_len()]
    }

    pub fn rows_mut(&mut self, i: i64, count: usize) -> &mut [f32] {
        let n = self.shape.column_offset(i, -(self.shape.ng as i64));
        let m = count * self.shape.row_len();
        &mut self.data[n..n + m]
    }

    /**
     * Copy the interior columns out into a dense `nx x ny x nz x vec_dim`
     * buffer.
     */
    pub fn interior_data(&self) -> Vec<f32> {
        let region = self.shape.interior().memory_region_in(&self.shape.index_space());
        region
            .iter_slice(&self.data, self.shape.column_len())
            .flat_map(|c| c.iter().cloned())
            .collect()
    }

    /**
     * Overwrite the interior columns from a dense buffer laid out as in
     * `interior_data`.
     */
    pub fn set_interior_data(&mut self, values: &[f32]) -> Result<()> {
        let m = self.shape.column_len();
        let expected = self.shape.interior().len() * m;

        if values.len() != expected {
            return Err(ValidationError::LengthMismatch {
                field: "interior".into(),
                expected,
                actual: values.len(),
            }
            .into());
        }
        let region = self.shape.interior().memory_region_in(&self.shape.index_space());

        for (dst, src) in region.iter_slice_mut(&mut self.data, m).zip(values.chunks_exact(m)) {
            dst.copy_from_slice(src)
        }
        Ok(())
    }

    /**
     * Return the largest absolute difference between two grids of the same
     * shape, over the interior only.
     */
    pub fn max_interior_difference(&self, other: &Grid) -> f32 {
        self.interior_data()
            .iter()
            .zip(other.interior_data().iter())
            .fold(0.0, |a: f32, (x, y)| a.max((x - y).abs()))
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{Grid, GridShape};

    #[test]
    fn offsets_account_for_ghosts_and_components() {
        let shape = GridShape::new(4, 3, 2, 1, 5);
        assert_eq!(shape.len(), 6 * 5 * 2 * 5);
        assert_eq!(shape.column_offset(-1, -1), 0);
        assert_eq!(shape.column_offset(0, 0), (5 + 1) * 10);
        assert_eq!(shape.cell_offset(0, 0, 1), 65);
    }

    #[test]
    fn interior_data_round_trips() {
        let shape = GridShape::new(2, 2, 1, 2, 3);
        let mut grid = Grid::zeros(shape);
        let values: Vec<f32> = (0..12).map(|x| x as f32).collect();
        grid.set_interior_data(&values).unwrap();

        assert_eq!(grid.interior_data(), values);
        assert_eq!(grid.cell(1, 0, 0), &[6.0, 7.0, 8.0]);
        assert_eq!(grid.column(-2, -2), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn wrong_buffer_length_is_rejected() {
        assert!(Grid::from_vec(GridShape::new(2, 2, 1, 1, 3), vec![0.0; 5]).is_err());
    }

    #[test]
    fn rows_include_ghost_columns() {
        let shape = GridShape::new(3, 2, 1, 1, 1);
        let grid = Grid::from_vec(shape, (0..20).map(|x| x as f32).collect()).unwrap();
        assert_eq!(grid.rows(0, 1), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(grid.rows(-1, 2).len(), 8);
    }
}
