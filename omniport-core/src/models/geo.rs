use serde::{Deserialize, Serialize};

/// WGS84 position captured by a driver's device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn validate(&self) -> Result<(), String> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(format!("latitude {} out of range", self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(format!("longitude {} out of range", self.longitude));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_bounds() {
        assert!(GeoPoint { latitude: 6.9271, longitude: 79.8612 }.validate().is_ok());
        assert!(GeoPoint { latitude: 91.0, longitude: 0.0 }.validate().is_err());
        assert!(GeoPoint { latitude: 0.0, longitude: -180.5 }.validate().is_err());
        assert!(GeoPoint { latitude: f64::NAN, longitude: 0.0 }.validate().is_err());
    }
}
