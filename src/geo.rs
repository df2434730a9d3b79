// src/geo.rs
//! Spherical earth helpers used to advance the simulated position

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84-ish position in degrees.
///
/// No validation happens on construction; out of range values are passed on
/// to the device as they are.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True when latitude is within [-90, 90] and longitude within [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        distance(*self, *other)
    }

    pub fn bearing_to(&self, other: &Coordinate) -> f64 {
        bearing(*self, *other)
    }

    pub fn destination(&self, bearing_deg: f64, distance_m: f64) -> Coordinate {
        destination(*self, bearing_deg, distance_m)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}

fn to_radians(degrees: f64) -> f64 {
    degrees * PI / 180.0
}

fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / PI
}

/// Wrap a heading into [0, 360).
pub fn normalize_heading(heading: f64) -> f64 {
    let wrapped = heading % 360.0;
    if wrapped < 0.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Move `distance_m` meters from `from` in direction `bearing_deg`.
///
/// The longitude scale is taken at the latitude *after* the latitude step has
/// been applied. Existing route data and the waypoint snapping in the spoofer
/// depend on this exact order, so keep it.
pub fn destination(from: Coordinate, bearing_deg: f64, distance_m: f64) -> Coordinate {
    let earth_circle = 2.0 * PI * EARTH_RADIUS_M;

    let lat_distance = distance_m * to_radians(bearing_deg).cos();
    let lat_per_meter = 360.0 / earth_circle;
    let new_lat = from.latitude + lat_distance * lat_per_meter;

    let lng_distance = distance_m * to_radians(bearing_deg).sin();
    let radius_at_lat = EARTH_RADIUS_M * to_radians(new_lat).cos();
    let circle_at_lat = 2.0 * PI * radius_at_lat;
    let lng_per_meter = 360.0 / circle_at_lat;
    let new_lng = from.longitude + lng_distance * lng_per_meter;

    Coordinate::new(new_lat, new_lng)
}

/// Initial bearing from `from` to `to` in degrees, 0 = north, 90 = east.
pub fn bearing(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = to_radians(from.latitude);
    let lat2 = to_radians(to.latitude);
    let delta_lon = to_radians(to.longitude - from.longitude);

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();

    normalize_heading(to_degrees(y.atan2(x)))
}

/// Haversine distance in meters.
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = to_radians(a.latitude);
    let lat2 = to_radians(b.latitude);
    let delta_lat = to_radians(b.latitude - a.latitude);
    let delta_lon = to_radians(b.longitude - a.longitude);

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}
