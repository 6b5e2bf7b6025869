//! Common error types for Rescue Link components.

use thiserror::Error;

/// A coordinate pair failed validation.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum CoordinateError {
    /// Latitude is non-finite or outside `[-90, 90]`
    #[error("Latitude out of range: {0}")]
    Latitude(f64),

    /// Longitude is non-finite or outside `[-180, 180]`
    #[error("Longitude out of range: {0}")]
    Longitude(f64),
}
