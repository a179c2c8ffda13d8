//! Structured layer filters and their SQL `where` clause compiler.
//!
//! Sublayer filtering on ArcGIS services is expressed as a SQL-like
//! `definitionExpression`. Building that string by hand invites quoting bugs,
//! so adapters accept a typed [`LayerFilter`] tree and compile it. Operators
//! are a closed enum; no caller-controlled operator string ever reaches the
//! output. The only escape hatch is [`LayerFilter::Raw`], which passes a
//! caller-written clause through unchanged.

use crate::params::EpochMs;

/// A comparison operator allowed in a filter expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `LIKE`
    Like,
}

impl ComparisonOp {
    fn as_sql(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Like => "LIKE",
        }
    }
}

/// Operator joining the children of a filter group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOp {
    /// All children must hold.
    And,
    /// At least one child must hold.
    Or,
}

impl GroupOp {
    fn as_sql(self) -> &'static str {
        match self {
            GroupOp::And => "AND",
            GroupOp::Or => "OR",
        }
    }
}

/// A literal value in a filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Numeric literal, emitted unquoted.
    Number(f64),
    /// Boolean literal, emitted as `'1'` or `'0'`.
    Bool(bool),
    /// Timestamp, emitted as unquoted epoch milliseconds.
    Date(EpochMs),
    /// String literal, single-quoted with `'` doubled.
    Text(String),
    /// SQL `NULL`.
    Null,
}

impl FilterValue {
    fn to_sql(&self) -> String {
        match self {
            FilterValue::Number(n) => n.to_string(),
            FilterValue::Bool(true) => "'1'".to_string(),
            FilterValue::Bool(false) => "'0'".to_string(),
            FilterValue::Date(ms) => ms.to_string(),
            FilterValue::Text(text) => format!("'{}'", text.replace('\'', "''")),
            FilterValue::Null => "NULL".to_string(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Number(value as f64)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

/// A typed filter expression over sublayer attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerFilter {
    /// A raw SQL fragment, passed through trimmed. The caller is responsible
    /// for any escaping.
    Raw(String),
    /// `field op value`.
    Comparison {
        /// Attribute name.
        field: String,
        /// Comparison operator.
        op: ComparisonOp,
        /// Right-hand value.
        value: FilterValue,
    },
    /// `field BETWEEN from AND to`.
    Between {
        /// Attribute name.
        field: String,
        /// Lower bound, inclusive.
        from: FilterValue,
        /// Upper bound, inclusive.
        to: FilterValue,
    },
    /// `field IN (v1, v2, ...)`.
    In {
        /// Attribute name.
        field: String,
        /// Accepted values.
        values: Vec<FilterValue>,
    },
    /// `field IS NULL` / `field IS NOT NULL`.
    Null {
        /// Attribute name.
        field: String,
        /// When true, compiles to `IS NOT NULL`.
        negated: bool,
    },
    /// A boolean combination of nested filters.
    Group {
        /// Joining operator.
        op: GroupOp,
        /// Child filters.
        filters: Vec<LayerFilter>,
    },
}

impl LayerFilter {
    /// Shorthand for an equality comparison.
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        LayerFilter::Comparison {
            field: field.into(),
            op: ComparisonOp::Eq,
            value: value.into(),
        }
    }

    /// Shorthand for an `AND` group.
    pub fn all(filters: Vec<LayerFilter>) -> Self {
        LayerFilter::Group {
            op: GroupOp::And,
            filters,
        }
    }

    /// Shorthand for an `OR` group.
    pub fn any(filters: Vec<LayerFilter>) -> Self {
        LayerFilter::Group {
            op: GroupOp::Or,
            filters,
        }
    }
}

/// Compiles a filter to a SQL `where` fragment.
///
/// Returns `None` when the filter carries no constraint: an empty group, or a
/// group whose every child compiles to `None`. Callers must treat `None` as
/// "do not append a `where` clause" rather than emitting an empty string.
pub fn compile(filter: &LayerFilter) -> Option<String> {
    match filter {
        LayerFilter::Raw(sql) => Some(sql.trim().to_string()),
        LayerFilter::Comparison { field, op, value } => {
            Some(format!("{field} {} {}", op.as_sql(), value.to_sql()))
        }
        LayerFilter::Between { field, from, to } => Some(format!(
            "{field} BETWEEN {} AND {}",
            from.to_sql(),
            to.to_sql()
        )),
        LayerFilter::In { field, values } => {
            // An empty value list carries no constraint rather than emitting
            // invalid `IN ()`.
            if values.is_empty() {
                return None;
            }
            let list: Vec<String> = values.iter().map(FilterValue::to_sql).collect();
            Some(format!("{field} IN ({})", list.join(", ")))
        }
        LayerFilter::Null { field, negated } => {
            if *negated {
                Some(format!("{field} IS NOT NULL"))
            } else {
                Some(format!("{field} IS NULL"))
            }
        }
        LayerFilter::Group { op, filters } => {
            let compiled: Vec<String> = filters.iter().filter_map(compile).collect();
            match compiled.len() {
                0 => None,
                1 => Some(compiled.into_iter().next().expect("checked length")),
                _ => Some(format!("({})", compiled.join(&format!(" {} ", op.as_sql())))),
            }
        }
    }
}
