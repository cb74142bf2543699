//! Events, stations and surface distances

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Mean Earth radius in km
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A seismic event
///
/// Identity is the event id; location and origin time are carried along for
/// distance computation only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub origin_time: DateTime<Utc>,
}

impl Event {
    pub fn new(event_id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            event_id: event_id.into(),
            latitude,
            longitude,
            origin_time: DateTime::<Utc>::default(),
        }
    }

    pub fn with_origin_time(mut self, origin_time: DateTime<Utc>) -> Self {
        self.origin_time = origin_time;
        self
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.event_id == other.event_id
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.event_id.hash(state);
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.event_id.cmp(&other.event_id)
    }
}

/// A recording station, identified by network and station name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub network_name: String,
    pub station_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Station {
    pub fn new(
        network_name: impl Into<String>,
        station_name: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            network_name: network_name.into(),
            station_name: station_name.into(),
            latitude,
            longitude,
        }
    }

    fn key(&self) -> (&str, &str) {
        (&self.network_name, &self.station_name)
    }
}

impl PartialEq for Station {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Station {}

impl Hash for Station {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Station {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Station {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Great-circle surface distance in km between an event and a station
///
/// Haversine on a spherical Earth of mean radius.
pub fn great_circle_distance_km(event: &Event, station: &Station) -> f64 {
    let lat1 = event.latitude.to_radians();
    let lat2 = station.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (station.longitude - event.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_one_degree_of_latitude() {
        let event = Event::new("e1", 0.0, 0.0);
        let station = Station::new("XX", "STA", 1.0, 0.0);
        let d = great_circle_distance_km(&event, &station);
        assert!((d - 111.19).abs() < 0.1, "got {}", d);
    }

    #[test]
    fn test_distance_zero_at_same_point() {
        let event = Event::new("e1", 37.5, -118.2);
        let station = Station::new("XX", "STA", 37.5, -118.2);
        assert!(great_circle_distance_km(&event, &station).abs() < 1e-9);
    }

    #[test]
    fn test_identity_ignores_location() {
        let a = Station::new("XX", "STA", 1.0, 2.0);
        let b = Station::new("XX", "STA", 3.0, 4.0);
        assert_eq!(a, b);
        assert_ne!(a, Station::new("YY", "STA", 1.0, 2.0));

        assert_eq!(Event::new("e1", 0.0, 0.0), Event::new("e1", 5.0, 5.0));
    }
}
