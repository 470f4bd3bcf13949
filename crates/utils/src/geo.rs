//! Great-circle geometry for device positions.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the spherical model, in metres.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A WGS84 coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Haversine distance to `other` in metres.
    pub fn distance_to(&self, other: &Position) -> f64 {
        haversine_distance(self, other)
    }

    /// True when both coordinates are finite and inside their valid ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Great-circle distance between two positions in metres.
///
/// Uses the haversine formula on a sphere of radius [`EARTH_RADIUS_METERS`].
/// NaN inputs yield NaN.
pub fn haversine_distance(a: &Position, b: &Position) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_points_are_zero() {
        let points = [
            Position::new(0.0, 0.0),
            Position::new(29.6516, -82.3248),
            Position::new(-33.8688, 151.2093),
            Position::new(89.9, 179.9),
        ];
        for p in points {
            assert_eq!(haversine_distance(&p, &p), 0.0);
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let gainesville = Position::new(29.6516, -82.3248);
        let orlando = Position::new(28.5383, -81.3792);
        let sydney = Position::new(-33.8688, 151.2093);

        for (a, b) in [(gainesville, orlando), (orlando, sydney), (sydney, gainesville)] {
            assert_eq!(haversine_distance(&a, &b), haversine_distance(&b, &a));
        }
    }

    #[test]
    fn test_one_degree_of_longitude_at_equator() {
        let d = haversine_distance(&Position::new(0.0, 0.0), &Position::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 111_195.0 * 0.01, "got {d}");
    }

    #[test]
    fn test_small_offset_is_metres() {
        // ~0.0001 degrees of latitude is about 11 metres
        let a = Position::new(29.6516, -82.3248);
        let b = Position::new(29.6517, -82.3248);
        let d = a.distance_to(&b);
        assert!(d > 10.0 && d < 12.0, "got {d}");
    }

    #[test]
    fn test_nan_propagates() {
        let d = haversine_distance(&Position::new(f64::NAN, 0.0), &Position::new(0.0, 0.0));
        assert!(d.is_nan());
    }

    #[test]
    fn test_validity_bounds() {
        assert!(Position::new(45.0, 90.0).is_valid());
        assert!(!Position::new(91.0, 0.0).is_valid());
        assert!(!Position::new(0.0, -181.0).is_valid());
        assert!(!Position::new(f64::NAN, 0.0).is_valid());
    }
}
