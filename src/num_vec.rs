use core::ops::{Add, Div, Index, IndexMut, Mul, Sub};
use crate::error::Result;
use crate::linalg;




/**
 * A statically-sized numeric vector over a generic scalar data type T, which
 * supports arithmetic operations also supported by T.
 */
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vector<T, const DIM: usize> {
    data: [T; DIM],
}

/// The 3-component state / flux vector of the shallow water equations.
pub type Vec3 = Vector<f32, 3>;




// ============================================================================
impl<T: Copy, const DIM: usize> Vector<T, DIM> {

    pub fn new(data: [T; DIM]) -> Self {
        Self { data }
    }

    pub fn as_array(&self) -> [T; DIM] {
        self.data
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
}

impl<const DIM: usize> Vector<f32, DIM> {

    pub fn zeros() -> Self {
        Self { data: [0.0; DIM] }
    }

    /**
     * Read a vector from the first DIM entries of a slice.
     */
    pub fn from_slice(slice: &[f32]) -> Self {
        let mut data = [0.0; DIM];
        data.copy_from_slice(&slice[..DIM]);
        Self { data }
    }

    pub fn write_to_slice(&self, slice: &mut [f32]) {
        slice[..DIM].copy_from_slice(&self.data)
    }

    pub fn dot(&self, other: &Self) -> f32 {
        self.data.iter().zip(&other.data).map(|(a, b)| a * b).sum()
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }
}

impl<T, const DIM: usize> From<[T; DIM]> for Vector<T, DIM> {
    fn from(data: [T; DIM]) -> Self {
        Self { data }
    }
}




// ============================================================================
impl<T, U, V, const DIM: usize> Add<Vector<U, DIM>> for Vector<T, DIM>
where
    T: Copy + Add<U, Output = V>,
    U: Copy,
    V: Copy + Default
{
    type Output = Vector<V, DIM>;

    fn add(self, other: Vector<U, DIM>) -> Self::Output {
        let mut data = [V::default(); DIM];

        for (i, x) in data.iter_mut().enumerate() {
            *x = self[i].add(other[i])
        }
        Self::Output { data }
    }
}

impl<T, U, V, const DIM: usize> Sub<Vector<U, DIM>> for Vector<T, DIM>
where
    T: Copy + Sub<U, Output = V>,
    U: Copy,
    V: Copy + Default
{
    type Output = Vector<V, DIM>;

    fn sub(self, other: Vector<U, DIM>) -> Self::Output {
        let mut data = [V::default(); DIM];

        for (i, x) in data.iter_mut().enumerate() {
            *x = self[i].sub(other[i])
        }
        Self::Output { data }
    }
}

impl<T, V, const DIM: usize> Mul<f32> for Vector<T, DIM>
where
    T: Copy + Mul<f32, Output = V>,
    V: Copy + Default
{
    type Output = Vector<V, DIM>;

    fn mul(self, a: f32) -> Self::Output {
        let mut data = [V::default(); DIM];

        for (i, x) in data.iter_mut().enumerate() {
            *x = self[i].mul(a)
        }
        Self::Output { data }
    }
}

impl<T, V, const DIM: usize> Div<f32> for Vector<T, DIM>
where
    T: Copy + Div<f32, Output = V>,
    V: Copy + Default
{
    type Output = Vector<V, DIM>;

    fn div(self, a: f32) -> Self::Output {
        let mut data = [V::default(); DIM];

        for (i, x) in data.iter_mut().enumerate() {
            *x = self[i].div(a)
        }
        Self::Output { data }
    }
}




// ============================================================================
impl<T, const DIM: usize> Index<usize> for Vector<T, DIM> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}

impl<T, const DIM: usize> IndexMut<usize> for Vector<T, DIM> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.data[index]
    }
}




/**
 * A dense, statically-sized square matrix of single-precision floats, stored
 * in row-major order. Used for flux Jacobians, the spatial metric, and the
 * small implicit systems in the source terms.
 */
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SquareMatrix<const DIM: usize> {
    rows: [[f32; DIM]; DIM],
}

/// A 3x3 matrix, e.g. a shallow water flux Jacobian or the spatial metric.
pub type Matrix3 = SquareMatrix<3>;




// ============================================================================
impl<const DIM: usize> SquareMatrix<DIM> {

    pub fn zeros() -> Self {
        Self { rows: [[0.0; DIM]; DIM] }
    }

    pub fn identity() -> Self {
        let mut m = Self::zeros();
        for i in 0..DIM {
            m.rows[i][i] = 1.0;
        }
        m
    }

    pub fn from_rows(rows: [[f32; DIM]; DIM]) -> Self {
        Self { rows }
    }

    /**
     * Build a matrix from a row-major slice of DIM * DIM entries.
     */
    pub fn from_row_major(entries: &[f32]) -> Self {
        let mut m = Self::zeros();
        for (i, row) in entries.chunks_exact(DIM).take(DIM).enumerate() {
            m.rows[i].copy_from_slice(row);
        }
        m
    }

    pub fn to_row_major(&self) -> Vec<f32> {
        self.rows.iter().flat_map(|row| row.iter().cloned()).collect()
    }

    pub fn transpose(&self) -> Self {
        let mut m = Self::zeros();
        for i in 0..DIM {
            for j in 0..DIM {
                m.rows[i][j] = self.rows[j][i];
            }
        }
        m
    }

    pub fn max_abs(&self) -> f32 {
        self.rows.iter().flatten().fold(0.0, |a: f32, x| a.max(x.abs()))
    }

    /**
     * Return the inverse of this matrix, computed by Gaussian elimination
     * with partial pivoting.
     */
    pub fn inverse(&self) -> Result<Self> {
        let mut entries = self.to_row_major();
        linalg::invert_mat(&mut entries, DIM, DIM)?;
        Ok(Self::from_row_major(&entries))
    }
}




// ============================================================================
impl<const DIM: usize> Mul<f32> for SquareMatrix<DIM> {
    type Output = Self;

    fn mul(self, a: f32) -> Self {
        let mut m = self;
        for x in m.rows.iter_mut().flatten() {
            *x *= a;
        }
        m
    }
}

impl<const DIM: usize> Mul<Vector<f32, DIM>> for SquareMatrix<DIM> {
    type Output = Vector<f32, DIM>;

    fn mul(self, v: Vector<f32, DIM>) -> Self::Output {
        let mut data = [0.0; DIM];

        for (i, x) in data.iter_mut().enumerate() {
            *x = self.rows[i].iter().zip(v.iter()).map(|(a, b)| a * b).sum()
        }
        Vector { data }
    }
}

impl<const DIM: usize> Mul<SquareMatrix<DIM>> for SquareMatrix<DIM> {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        let mut m = Self::zeros();
        for i in 0..DIM {
            for j in 0..DIM {
                m.rows[i][j] = (0..DIM).map(|k| self.rows[i][k] * other.rows[k][j]).sum();
            }
        }
        m
    }
}

impl<const DIM: usize> Add<SquareMatrix<DIM>> for SquareMatrix<DIM> {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        let mut m = self;
        for (x, y) in m.rows.iter_mut().flatten().zip(other.rows.iter().flatten()) {
            *x += y;
        }
        m
    }
}

impl<const DIM: usize> Sub<SquareMatrix<DIM>> for SquareMatrix<DIM> {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        let mut m = self;
        for (x, y) in m.rows.iter_mut().flatten().zip(other.rows.iter().flatten()) {
            *x -= y;
        }
        m
    }
}

impl<const DIM: usize> Index<(usize, usize)> for SquareMatrix<DIM> {
    type Output = f32;

    fn index(&self, index: (usize, usize)) -> &f32 {
        &self.rows[index.0][index.1]
    }
}

impl<const DIM: usize> IndexMut<(usize, usize)> for SquareMatrix<DIM> {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut f32 {
        &mut self.rows[index.0][index.1]
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{Matrix3, SquareMatrix, Vec3};

    #[test]
    fn scalar_times_vector_scales_each_component() {
        let v = Vec3::new([1.0, -2.0, 3.0]) * 2.0;
        assert_eq!(v.as_array(), [2.0, -4.0, 6.0]);
    }

    #[test]
    fn matrix_times_vector_works() {
        let m = Matrix3::from_rows([[1.0, 2.0, 0.0], [0.0, 1.0, 0.0], [3.0, 0.0, 1.0]]);
        let v = m * Vec3::new([1.0, 1.0, 1.0]);
        assert_eq!(v.as_array(), [3.0, 1.0, 4.0]);
    }

    #[test]
    fn matrix_products_and_scaling_work() {
        let a = Matrix3::from_rows([[1.0, 2.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 2.0]]);
        assert_eq!(a * Matrix3::identity(), a);
        assert_eq!((a * 2.0)[(0, 1)], 4.0);
        assert_eq!((a * a)[(0, 1)], 4.0);
        assert_eq!(a.transpose()[(1, 0)], 2.0);
    }

    #[test]
    fn inverse_of_a_5x5_matrix_is_a_right_inverse() {
        let mut a = SquareMatrix::<5>::identity() * 4.0;
        for i in 0..4 {
            a[(i, i + 1)] = 1.0;
            a[(i + 1, i)] = -1.0;
        }
        let p = a * a.inverse().unwrap();
        for i in 0..5 {
            for j in 0..5 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((p[(i, j)] - expected).abs() < 1e-5);
            }
        }
    }
}
