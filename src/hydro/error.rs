use thiserror::Error;




/**
 * Error to represent invalid hydrodynamics data or primitive variable recovery.
 */
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("negative gas pressure: {0}")]
    NegativeGasPressure(f32),

    #[error("negative mass density: {0}")]
    NegativeMassDensity(f32),

    #[error("non-positive layer depth: {0}")]
    NonPositiveDepth(f32),

    #[error("superluminal velocity: v^2 = {0}")]
    Superluminal(f32),

    #[error("primitive recovery failed to converge: D = {d}, tau = {tau}")]
    RecoveryFailed { d: f32, tau: f32 },

    #[error("non-finite value in component {0}")]
    NonFinite(usize),
}
