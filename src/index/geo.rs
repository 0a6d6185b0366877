use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;

const EARTH_RADIUS_M: f64 = 6_372_797.560856;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoUnit {
    Meters,
    Kilometers,
    Miles,
    Feet,
}

impl GeoUnit {
    pub fn from_str(s: &str) -> Result<GeoUnit> {
        match s.to_ascii_lowercase().as_str() {
            "m" => Ok(GeoUnit::Meters),
            "km" => Ok(GeoUnit::Kilometers),
            "mi" => Ok(GeoUnit::Miles),
            "ft" => Ok(GeoUnit::Feet),
            _ => Err(Error::new(ErrorKind::BadVal, format!("unknown geo unit `{s}`"))),
        }
    }

    pub fn to_meters(&self, v: f64) -> f64 {
        match self {
            GeoUnit::Meters => v,
            GeoUnit::Kilometers => v * 1000.0,
            GeoUnit::Miles => v * 1609.344,
            GeoUnit::Feet => v * 0.3048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFilter {
    pub field: String,
    pub lon: f64,
    pub lat: f64,
    pub radius: f64,
    pub unit: GeoUnit,
}

/// Great-circle distance in meters.
pub fn haversine(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lat1r, lat2r) = (lat1.to_radians(), lat2.to_radians());
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1r.cos() * lat2r.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Per-field geo index. Point entries are "on demand deletable": a replace
/// purges the old document's entries eagerly rather than waiting for gc.
#[derive(Debug, Default)]
pub struct GeoIndex {
    points: BTreeMap<u64, (f64, f64)>,
}

impl GeoIndex {
    pub fn new() -> Self {
        GeoIndex::default()
    }

    pub fn add_entry(&mut self, doc_id: DocId, lon: f64, lat: f64) {
        self.points.insert(doc_id.0, (lon, lat));
    }

    pub fn remove_entries(&mut self, doc_id: DocId) {
        self.points.remove(&doc_id.0);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bounding-box prefilter followed by an exact haversine check. Results
    /// come back in docId order (BTreeMap iteration order).
    pub fn query(&self, filter: &GeoFilter) -> Vec<(DocId, f64)> {
        let radius_m = filter.unit.to_meters(filter.radius);
        let lat_delta = (radius_m / EARTH_RADIUS_M).to_degrees();
        let lon_delta = if filter.lat.abs() < 89.9 {
            lat_delta / filter.lat.to_radians().cos().abs().max(1e-6)
        } else {
            180.0
        };

        self.points
            .iter()
            .filter(|(_, (lon, lat))| {
                (lat - filter.lat).abs() <= lat_delta && (lon - filter.lon).abs() <= lon_delta
            })
            .filter_map(|(&id, &(lon, lat))| {
                let dist = haversine(filter.lon, filter.lat, lon, lat);
                if dist <= radius_m {
                    Some((DocId(id), dist))
                } else {
                    None
                }
            })
            .collect()
    }
}
