//! Parameter types for one-shot task requests (identify, find, query).
//!
//! Tasks are independent of the renderer lifecycle: they borrow the adapter's
//! option state to build a single GET request and hand back parsed JSON. They
//! never touch the registered source.

use crate::error::ArclinkError;
use crate::geometry::{Extent, Geometry, LngLat, ScreenSize};
use crate::params::ParamList;
use serde::Serialize;

/// Parameters of an `identify` request.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifyParameters {
    /// The clicked point.
    pub point: LngLat,
    /// Current map bounds, sent as `mapExtent`.
    pub map_extent: Extent,
    /// Canvas size in pixels, sent as `imageDisplay`.
    pub display: ScreenSize,
    /// Search tolerance around the point, in pixels.
    pub tolerance: u32,
    /// Whether feature geometries are returned.
    pub return_geometry: bool,
}

impl IdentifyParameters {
    /// Creates identify parameters with the default tolerance of 3 pixels and
    /// no geometry in the response.
    pub fn new(point: LngLat, map_extent: Extent, display: ScreenSize) -> Self {
        Self {
            point,
            map_extent,
            display,
            tolerance: 3,
            return_geometry: false,
        }
    }

    /// Sets the search tolerance.
    pub fn with_tolerance(mut self, tolerance: u32) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Requests feature geometries in the response.
    pub fn with_return_geometry(mut self, return_geometry: bool) -> Self {
        self.return_geometry = return_geometry;
        self
    }

    /// The endpoint-independent part of the identify query string. The `96`
    /// DPI suffix of `imageDisplay` is fixed by the protocol.
    pub(crate) fn to_params(&self) -> Result<ParamList, ArclinkError> {
        let geometry = Geometry::Point(self.point);
        let mut params = ParamList::new();
        params.push("f", "json");
        params.push("sr", "4326");
        params.push("geometryType", geometry.esri_type());
        params.push_json("geometry", &geometry.to_esri_json())?;
        params.push("tolerance", self.tolerance.to_string());
        params.push("returnGeometry", self.return_geometry.to_string());
        params.push(
            "imageDisplay",
            format!("{},{},96", self.display.width, self.display.height),
        );
        params.push("mapExtent", self.map_extent.to_bbox_string());
        Ok(params)
    }
}

/// Parameters of a `find` request.
#[derive(Debug, Clone, PartialEq)]
pub struct FindParameters {
    /// Text to search for.
    pub search_text: String,
    /// Whether the text may match partially (`contains=true`) or must match
    /// whole values.
    pub contains: bool,
    /// Fields to search. Unset searches all fields.
    pub search_fields: Option<Vec<String>>,
    /// Sublayers to search. Unset searches all layers.
    pub layers: Option<Vec<u32>>,
    /// Whether feature geometries are returned.
    pub return_geometry: bool,
}

impl FindParameters {
    /// Creates find parameters for a contains search across all fields.
    pub fn new(search_text: impl Into<String>) -> Self {
        Self {
            search_text: search_text.into(),
            contains: true,
            search_fields: None,
            layers: None,
            return_geometry: false,
        }
    }

    /// Restricts the search to the given fields.
    pub fn with_search_fields(mut self, fields: Vec<String>) -> Self {
        self.search_fields = Some(fields);
        self
    }

    /// Restricts the search to the given sublayers.
    pub fn with_layers(mut self, layers: Vec<u32>) -> Self {
        self.layers = Some(layers);
        self
    }

    /// Requires whole-value matches.
    pub fn exact(mut self) -> Self {
        self.contains = false;
        self
    }

    /// Requests feature geometries in the response.
    pub fn with_return_geometry(mut self, return_geometry: bool) -> Self {
        self.return_geometry = return_geometry;
        self
    }

    pub(crate) fn to_params(&self) -> ParamList {
        let mut params = ParamList::new();
        params.push("f", "json");
        params.push("sr", "4326");
        params.push("searchText", self.search_text.clone());
        params.push("contains", self.contains.to_string());
        if let Some(fields) = &self.search_fields {
            params.push("searchFields", fields.join(","));
        }
        if let Some(layers) = &self.layers {
            params.push("layers", crate::params::csv(layers));
        }
        params.push("returnGeometry", self.return_geometry.to_string());
        params
    }
}

/// Parameters of a feature `query` request.
///
/// Unset fields fall back to the adapter's option state (`where`, output
/// fields) or to protocol defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureQuery {
    /// `where` clause. Unset uses the adapter's configured clause.
    pub where_clause: Option<String>,
    /// Fields to return. Unset uses the adapter's configured fields.
    pub out_fields: Option<Vec<String>>,
    /// Spatial filter. Geometry-dependent parameters are only emitted when
    /// this is set.
    pub geometry: Option<Geometry>,
    /// Whether feature geometries are returned.
    pub return_geometry: bool,
    /// `ORDER BY` clause.
    pub order_by: Option<String>,
    /// Maximum number of features returned.
    pub result_record_count: Option<u32>,
}

impl FeatureQuery {
    /// Creates a query returning geometries, with everything else falling
    /// back to adapter state.
    pub fn new() -> Self {
        Self {
            return_geometry: true,
            ..Default::default()
        }
    }

    /// Sets the `where` clause.
    pub fn with_where(mut self, where_clause: impl Into<String>) -> Self {
        self.where_clause = Some(where_clause.into());
        self
    }

    /// Sets the returned fields.
    pub fn with_out_fields(mut self, fields: Vec<String>) -> Self {
        self.out_fields = Some(fields);
        self
    }

    /// Sets a spatial filter.
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Sets the `ORDER BY` clause.
    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// Limits the number of returned features.
    pub fn with_result_record_count(mut self, count: u32) -> Self {
        self.result_record_count = Some(count);
        self
    }
}

/// The statistic kinds accepted by `outStatistics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticType {
    /// Number of features.
    Count,
    /// Sum of field values.
    Sum,
    /// Minimum field value.
    Min,
    /// Maximum field value.
    Max,
    /// Average field value.
    Avg,
    /// Standard deviation of field values.
    Stddev,
    /// Variance of field values.
    Var,
}

/// One entry of the `outStatistics` parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticDefinition {
    /// Statistic to compute.
    pub statistic_type: StatisticType,
    /// Field the statistic is computed on.
    pub on_statistic_field: String,
    /// Name of the output field.
    pub out_statistic_field_name: String,
}

impl StatisticDefinition {
    /// Creates a statistic definition.
    pub fn new(
        statistic_type: StatisticType,
        on_field: impl Into<String>,
        out_name: impl Into<String>,
    ) -> Self {
        Self {
            statistic_type,
            on_statistic_field: on_field.into(),
            out_statistic_field_name: out_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_params_carry_fixed_dpi_suffix() {
        let params = IdentifyParameters::new(
            LngLat::new(-95.4, 29.7),
            Extent::new(-96.0, 29.0, -95.0, 30.0),
            ScreenSize::new(800, 600),
        )
        .with_tolerance(5)
        .to_params()
        .expect("params");

        assert_eq!(params.get("imageDisplay"), Some("800,600,96"));
        assert_eq!(params.get("mapExtent"), Some("-96,29,-95,30"));
        assert_eq!(params.get("tolerance"), Some("5"));
        assert_eq!(params.get("geometryType"), Some("esriGeometryPoint"));
        assert_eq!(params.get("sr"), Some("4326"));
        assert_eq!(params.get("f"), Some("json"));
    }

    #[test]
    fn find_params_join_fields_and_layers_as_csv() {
        let params = FindParameters::new("Main St")
            .with_search_fields(vec!["NAME".into(), "ADDRESS".into()])
            .with_layers(vec![0, 2])
            .to_params();

        assert_eq!(params.get("searchText"), Some("Main St"));
        assert_eq!(params.get("searchFields"), Some("NAME,ADDRESS"));
        assert_eq!(params.get("layers"), Some("0,2"));
        assert_eq!(params.get("contains"), Some("true"));
    }

    #[test]
    fn statistic_definition_wire_form() {
        let stat = StatisticDefinition::new(StatisticType::Avg, "POP", "AVG_POP");
        let value = serde_json::to_value([stat]).expect("serializable");
        assert_eq!(value[0]["statisticType"], "avg");
        assert_eq!(value[0]["onStatisticField"], "POP");
        assert_eq!(value[0]["outStatisticFieldName"], "AVG_POP");
    }
}
