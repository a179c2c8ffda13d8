//! Minimal geographic types used by task requests and responses.
//!
//! All coordinates are geographic (EPSG:4326) unless stated otherwise. These
//! types only exist to build request payloads and to read response envelopes;
//! they are not a geometry library.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A geographic point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LngLat {
    /// Longitude in degrees.
    pub lng: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl LngLat {
    /// Creates a new point.
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// A geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    /// Western edge, degrees.
    pub west: f64,
    /// Southern edge, degrees.
    pub south: f64,
    /// Eastern edge, degrees.
    pub east: f64,
    /// Northern edge, degrees.
    pub north: f64,
}

impl Extent {
    /// Creates a new extent from its edges.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Formats the extent as the `w,s,e,n` string the REST API expects.
    pub(crate) fn to_bbox_string(self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

/// Pixel dimensions of the canvas a request is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ScreenSize {
    /// Creates a new size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Geometry accepted by query endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// A single point.
    Point(LngLat),
    /// An envelope.
    Extent(Extent),
}

impl Geometry {
    /// The `geometryType` wire name for this geometry.
    pub(crate) fn esri_type(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "esriGeometryPoint",
            Geometry::Extent(_) => "esriGeometryEnvelope",
        }
    }

    /// The ArcGIS JSON representation of this geometry.
    pub(crate) fn to_esri_json(&self) -> Value {
        match self {
            Geometry::Point(point) => json!({
                "x": point.lng,
                "y": point.lat,
                "spatialReference": {"wkid": 4326},
            }),
            Geometry::Extent(extent) => json!({
                "xmin": extent.west,
                "ymin": extent.south,
                "xmax": extent.east,
                "ymax": extent.north,
                "spatialReference": {"wkid": 4326},
            }),
        }
    }
}

/// An extent as reported by ArcGIS services.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EsriExtent {
    /// Minimum x coordinate.
    pub xmin: f64,
    /// Minimum y coordinate.
    pub ymin: f64,
    /// Maximum x coordinate.
    pub xmax: f64,
    /// Maximum y coordinate.
    pub ymax: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_string_order_is_wsen() {
        let extent = Extent::new(-95.0, 29.0, -94.0, 30.0);
        assert_eq!(extent.to_bbox_string(), "-95,29,-94,30");
    }

    #[test]
    fn point_geometry_json() {
        let geometry = Geometry::Point(LngLat::new(-95.7, 29.5));
        let value = geometry.to_esri_json();
        assert_eq!(value["x"], json!(-95.7));
        assert_eq!(value["spatialReference"]["wkid"], json!(4326));
        assert_eq!(geometry.esri_type(), "esriGeometryPoint");
    }
}
