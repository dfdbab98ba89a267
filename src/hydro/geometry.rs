use crate::error::{Result, ValidationError};
use crate::num_vec::{Matrix3, Vec3};




/**
 * Enum to hold a unit vector in 3D space
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    I,
    J,
    K,
}




// ============================================================================
impl Direction {
    pub fn along(&self, other: Direction) -> f32 {
        if *self == other {
            1.0
        } else {
            0.0
        }
    }

    /**
     * The component index of this direction in a 3-vector.
     */
    pub fn index(&self) -> usize {
        match self {
            Direction::I => 0,
            Direction::J => 1,
            Direction::K => 2,
        }
    }
}




/**
 * The constant 3+1 geometry shared by every level: the lapse, the shift
 * vector, and the covariant spatial metric together with its inverse. The
 * inverse is computed once, at construction.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    alpha: f32,
    beta: Vec3,
    gamma_down: Matrix3,
    gamma_up: Matrix3,
}




// ============================================================================
impl Metric {

    /**
     * Build a metric from the lapse, the shift, and the row-major covariant
     * spatial metric. Fails if the lapse is not positive, if any entry is not
     * finite, or if the spatial metric is asymmetric or singular.
     */
    pub fn new(alpha: f32, beta: [f32; 3], gamma_down: [f32; 9]) -> Result<Self> {
        if !(alpha > 0.0) || !alpha.is_finite() {
            return Err(ValidationError::invalid("alpha", format!("lapse must be positive, got {}", alpha)).into());
        }
        if !beta.iter().all(|b| b.is_finite()) {
            return Err(ValidationError::invalid("beta", "shift must be finite").into());
        }
        if !gamma_down.iter().all(|g| g.is_finite()) {
            return Err(ValidationError::invalid("gamma_down", "metric must be finite").into());
        }
        let gamma_down = Matrix3::from_row_major(&gamma_down);

        for i in 0..3 {
            for j in 0..i {
                let (a, b) = (gamma_down[(i, j)], gamma_down[(j, i)]);
                if (a - b).abs() > f32::EPSILON * gamma_down.max_abs() {
                    return Err(ValidationError::invalid("gamma_down", "metric must be symmetric").into());
                }
            }
        }
        let gamma_up = gamma_down
            .inverse()
            .map_err(|e| ValidationError::invalid("gamma_down", e.to_string()))?;

        Ok(Self { alpha, beta: beta.into(), gamma_down, gamma_up })
    }

    /**
     * Unit lapse, zero shift, Euclidean spatial metric.
     */
    pub fn flat() -> Self {
        Self {
            alpha: 1.0,
            beta: Vec3::zeros(),
            gamma_down: Matrix3::identity(),
            gamma_up: Matrix3::identity(),
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn beta(&self) -> Vec3 {
        self.beta
    }

    pub fn shift(&self, direction: Direction) -> f32 {
        self.beta[direction.index()]
    }

    pub fn gamma_down(&self) -> &Matrix3 {
        &self.gamma_down
    }

    pub fn gamma_up(&self) -> &Matrix3 {
        &self.gamma_up
    }

    /**
     * The diagonal entry gamma^ii of the inverse metric.
     */
    pub fn inverse_diagonal(&self, direction: Direction) -> f32 {
        let i = direction.index();
        self.gamma_up[(i, i)]
    }

    /**
     * Raise the index of a covariant vector: v^i = gamma^ij v_j.
     */
    pub fn raise(&self, v: Vec3) -> Vec3 {
        self.gamma_up * v
    }

    /**
     * Lower the index of a contravariant vector: v_i = gamma_ij v^j.
     */
    pub fn lower(&self, v: Vec3) -> Vec3 {
        self.gamma_down * v
    }

    /**
     * The squared norm v_i gamma^ij v_j of a covariant vector.
     */
    pub fn norm_squared(&self, v: Vec3) -> f32 {
        v.dot(&self.raise(v))
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{Direction, Metric};
    use crate::num_vec::Vec3;

    #[test]
    fn raising_then_lowering_is_the_identity() {
        let metric = Metric::new(1.0, [0.0; 3], [2.0, 0.5, 0.0, 0.5, 1.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        let v = Vec3::new([1.0, -2.0, 0.5]);
        let w = metric.lower(metric.raise(v));

        for i in 0..3 {
            assert!((v[i] - w[i]).abs() < 1e-5);
        }
    }

    #[test]
    fn inverse_diagonal_of_diagonal_metric_works() {
        let metric = Metric::new(0.5, [0.1, 0.0, 0.0], [4.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(metric.inverse_diagonal(Direction::I), 0.25);
        assert_eq!(metric.inverse_diagonal(Direction::J), 0.5);
        assert_eq!(metric.shift(Direction::I), 0.1);
        assert_eq!(metric.norm_squared(Vec3::new([2.0, 0.0, 0.0])), 1.0);
    }

    #[test]
    fn bad_metrics_are_rejected() {
        assert!(Metric::new(0.0, [0.0; 3], [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]).is_err());
        assert!(Metric::new(1.0, [0.0; 3], [1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]).is_err());
        assert!(Metric::new(1.0, [0.0; 3], [1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0]).unwrap_err().is_validation());
    }

    #[test]
    fn along_works() {
        assert_eq!(Direction::I.along(Direction::I), 1.0);
        assert_eq!(Direction::I.along(Direction::K), 0.0);
    }
}
