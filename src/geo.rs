// 📍 Distance from a contractor's facility to the project site

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Project site (Barcelona)
pub const PROJECT_LOCATION: GeoPoint = GeoPoint {
    lat: 41.390608,
    lon: 2.177505,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }

    /// Great-circle distance in kilometers (haversine)
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }
}

/// `None` when the contractor has not given a location
pub fn distance_to_project(location: Option<&GeoPoint>) -> Option<f64> {
    location.map(|point| point.distance_km(&PROJECT_LOCATION))
}

/// Rounded display form, e.g. "504 km"
pub fn distance_label(location: Option<&GeoPoint>) -> Option<String> {
    distance_to_project(location).map(|km| format!("{:.0} km", km))
}
