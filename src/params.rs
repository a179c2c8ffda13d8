//! Assembly of REST query strings from option state.
//!
//! All ArcGIS endpoints take flat `key=value` query parameters with a handful
//! of coercion rules: arrays become CSV, objects become JSON, dates become
//! epoch milliseconds. [`ParamList`] keeps parameters in insertion order and
//! percent-encodes them on output, with one carve-out for renderer bbox
//! placeholder tokens that must stay literal inside tile URL templates.

use serde::Serialize;
use web_time::SystemTime;

use crate::error::ArclinkError;

/// Milliseconds since the Unix epoch, the timestamp format of the REST API.
pub type EpochMs = i64;

/// A time range applied to time-aware services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeExtent {
    /// Start of the range.
    pub from: EpochMs,
    /// End of the range. While unset, no `time` parameter is emitted at all.
    pub to: Option<EpochMs>,
}

impl TimeExtent {
    /// Creates a range starting at `from` with no end.
    pub fn starting_at(from: EpochMs) -> Self {
        Self { from, to: None }
    }

    /// Creates a closed range.
    pub fn new(from: EpochMs, to: EpochMs) -> Self {
        Self { from, to: Some(to) }
    }

    /// Converts a [`SystemTime`] to epoch milliseconds. Times before the epoch
    /// clamp to zero.
    pub fn epoch_ms(time: SystemTime) -> EpochMs {
        time.duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as EpochMs)
            .unwrap_or(0)
    }
}

/// An ordered list of query parameters.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParamList {
    pairs: Vec<(String, String)>,
    /// Pairs appended verbatim, without percent-encoding.
    raw_pairs: Vec<(String, String)>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter.
    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.pairs.push((key.to_string(), value.into()));
    }

    /// Appends a parameter if the value is present.
    pub fn push_opt(&mut self, key: &str, value: Option<String>) {
        if let Some(value) = value {
            self.push(key, value);
        }
    }

    /// Appends a parameter whose value is the JSON serialization of `value`.
    pub fn push_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), ArclinkError> {
        self.push(key, serde_json::to_string(value)?);
        Ok(())
    }

    /// Appends a parameter that must not be percent-encoded, such as the
    /// `{bbox-epsg-3857}` template token substituted by the renderer.
    pub fn push_raw(&mut self, key: &str, value: impl Into<String>) {
        self.raw_pairs.push((key.to_string(), value.into()));
    }

    /// Value of the first parameter with the given key, if any.
    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .chain(self.raw_pairs.iter())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Percent-encodes the list into a query string. Raw pairs come first so
    /// bbox templates stay at a predictable position in tile URLs.
    pub fn encode(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.pairs {
            serializer.append_pair(key, value);
        }
        let encoded = serializer.finish();

        let mut query = String::new();
        for (key, value) in &self.raw_pairs {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(key);
            query.push('=');
            query.push_str(value);
        }
        if !encoded.is_empty() {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(&encoded);
        }
        query
    }

    /// Appends the encoded query string to a URL.
    pub fn append_to(&self, url: &str) -> String {
        let query = self.encode();
        if query.is_empty() {
            url.to_string()
        } else if url.contains('?') {
            format!("{url}&{query}")
        } else {
            format!("{url}?{query}")
        }
    }
}

/// Joins items with commas, the wire form of array-valued parameters.
pub(crate) fn csv<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Builds the `layers` parameter value for the given endpoint prefix
/// (`show` for export URLs, `visible` for identify URLs).
///
/// An unset selector means "let the server decide" and emits no parameter. An
/// explicitly empty selector also emits no parameter; that is how "show
/// nothing" rides the wire.
pub(crate) fn layers_param(prefix: &str, layers: Option<&[u32]>) -> Option<String> {
    match layers {
        Some(ids) if !ids.is_empty() => Some(format!("{prefix}:{}", csv(ids))),
        _ => None,
    }
}

/// Builds the `time` parameter value.
///
/// Only a closed range is emitted; a `from` without a `to` is silently
/// dropped. Half-open ranges are not supported by this parameter.
pub(crate) fn time_param(time: Option<&TimeExtent>) -> Option<String> {
    time.and_then(|t| t.to.map(|to| format!("{},{}", t.from, to)))
}
