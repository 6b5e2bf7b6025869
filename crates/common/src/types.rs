//! Common data types for Rescue Link components.

use crate::error::CoordinateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier for one client connection.
///
/// Assigned by the transport when a socket is accepted. A reconnecting
/// client always receives a fresh handle; handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionHandle(pub Uuid);

impl ConnectionHandle {
    /// Create a new random connection handle
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a stored user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Create a new random user ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A latitude/longitude pair in decimal degrees.
///
/// Deserialization accepts any pair of numbers; call [`Coordinates::validate`]
/// before storing a position received from a client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees, `[-90, 90]`.
    pub lat: f64,
    /// Longitude in degrees, `[-180, 180]`.
    pub lon: f64,
}

impl Coordinates {
    /// Build a validated coordinate pair.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] if either component is non-finite or out of range.
    pub fn new(lat: f64, lon: f64) -> Result<Self, CoordinateError> {
        Self { lat, lon }.validate()
    }

    /// Check that both components are finite and within range.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] describing the first offending component.
    pub fn validate(self) -> Result<Self, CoordinateError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(CoordinateError::Latitude(self.lat));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(CoordinateError::Longitude(self.lon));
        }
        Ok(self)
    }

    /// Straight-line distance in degree space.
    ///
    /// This is planar Euclidean distance on raw lat/lon, not geodesic
    /// distance. It ignores meridian convergence and is only a reasonable
    /// ranking metric over the small radius an officer search covers.
    #[must_use]
    pub fn planar_distance(&self, other: &Coordinates) -> f64 {
        (self.lat - other.lat).hypot(self.lon - other.lon)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_handles_are_unique() {
        let a = ConnectionHandle::new();
        let b = ConnectionHandle::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_connection_handle_serializes_as_uuid_string() {
        let handle = ConnectionHandle::new();
        let json = serde_json::to_string(&handle).unwrap();
        assert_eq!(json, format!("\"{}\"", handle.0));
        assert_eq!(handle.to_string(), handle.0.to_string());
    }

    #[test]
    fn test_coordinates_accept_boundaries() {
        assert!(Coordinates::new(90.0, 180.0).is_ok());
        assert!(Coordinates::new(-90.0, -180.0).is_ok());
        assert!(Coordinates::new(0.0, 0.0).is_ok());
    }

    #[test]
    fn test_coordinates_reject_out_of_range() {
        assert_eq!(
            Coordinates::new(90.5, 0.0),
            Err(CoordinateError::Latitude(90.5))
        );
        assert_eq!(
            Coordinates::new(0.0, -180.5),
            Err(CoordinateError::Longitude(-180.5))
        );
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
        assert!(Coordinates::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_planar_distance() {
        let origin = Coordinates::new(0.0, 0.0).unwrap();
        let point = Coordinates::new(3.0, 4.0).unwrap();
        assert!((origin.planar_distance(&point) - 5.0).abs() < f64::EPSILON);
        assert!(origin.planar_distance(&origin).abs() < f64::EPSILON);
    }
}
