//! Data models for chart evaluation.
//!
//! This module contains the chart definitions read from configuration,
//! the request context handed to computed fields, and the series
//! produced for the chart renderer.

use crate::error::ChartError;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Granularity that bucket timestamps are collapsed onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Day,
    /// Keyed per day like `Day`; there is no week-number form.
    Week,
    Month,
    Year,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Day => write!(f, "day"),
            Interval::Week => write!(f, "week"),
            Interval::Month => write!(f, "month"),
            Interval::Year => write!(f, "year"),
        }
    }
}

impl FromStr for Interval {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Interval::Day),
            "week" => Ok(Interval::Week),
            "month" => Ok(Interval::Month),
            "year" => Ok(Interval::Year),
            other => Err(ChartError::InvalidInterval(other.to_string())),
        }
    }
}

/// Kind of value a chart plots, read from the chart's `valueType` symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Amount,
    Number,
    Percentage,
    /// Durations; computed millisecond values are reported in whole days.
    Days,
    Other(String),
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Amount => write!(f, "amount"),
            ValueType::Number => write!(f, "number"),
            ValueType::Percentage => write!(f, "percentage"),
            ValueType::Days => write!(f, "days"),
            ValueType::Other(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ValueType {
    fn from(s: &str) -> Self {
        match s {
            "amount" => ValueType::Amount,
            "number" => ValueType::Number,
            "percentage" => ValueType::Percentage,
            "days" => ValueType::Days,
            other => ValueType::Other(other.to_string()),
        }
    }
}

/// One derived-field step declared by a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedFieldDescriptor {
    /// Registry name of the action to run.
    pub action_name: String,
    /// Bucket fields the action reads, in declared order.
    #[serde(alias = "inputFields")]
    pub fields: IndexSet<String>,
    /// Name under which the derived value is recorded.
    #[serde(alias = "outputFieldName")]
    pub new_field: String,
    /// Free-form action parameters.
    #[serde(default, alias = "postAggregationTheory", skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Definition of one line chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    /// Chart identifier, echoed in the output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Renderer hint, echoed in the output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,

    /// Metric paths to plot, one series each, in output order.
    #[serde(rename = "aggsPath", alias = "aggregationPaths")]
    pub aggs_path: Vec<String>,

    /// Value-type symbol (`amount`, `number`, `percentage`, `days`, ...).
    #[serde(default = "default_value_type")]
    pub value_type: String,

    /// Granularity; a request-level interval takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Emit running totals instead of per-interval amounts.
    #[serde(default)]
    pub is_cumulative: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_fields: Option<Vec<ComputedFieldDescriptor>>,
}

fn default_value_type() -> String {
    "number".to_string()
}

impl ChartConfig {
    /// Parsed value-type symbol.
    pub fn value_type(&self) -> ValueType {
        ValueType::from(self.value_type.as_str())
    }

    /// Computed fields to run per bucket, if the chart declares any.
    pub fn computed_fields(&self) -> Option<&[ComputedFieldDescriptor]> {
        self.computed_fields.as_deref()
    }
}

/// Inclusive request date range in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: i64,
    pub end: i64,
}

/// Request-level data available while evaluating a chart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Interval chosen by the caller; overrides the chart's own.
    #[serde(default)]
    pub interval: Option<String>,

    #[serde(default)]
    pub visualization_code: Option<String>,

    #[serde(default)]
    pub date_range: Option<DateRange>,

    /// Arbitrary caller filters, available to computed fields.
    #[serde(default)]
    pub filters: Map<String, Value>,
}

impl RequestContext {
    /// Request interval, ignoring blank values.
    pub fn requested_interval(&self) -> Option<&str> {
        self.interval
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A single chart point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Interval key, e.g. `Apr-2019`.
    pub key: String,
    pub value: f64,
}

impl Point {
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// One named series of a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Metric path the series was built from.
    pub name: String,
    /// Sum of every bucket contribution, before any cumulative pass.
    pub total: f64,
    pub points: Vec<Point>,
}

impl Series {
    /// Value at `key`, if present.
    #[allow(dead_code)] // Lookup helper for embedding callers
    pub fn value_at(&self, key: &str) -> Option<f64> {
        self.points.iter().find(|p| p.key == key).map(|p| p.value)
    }

    /// Keys in point order.
    #[allow(dead_code)] // Lookup helper for embedding callers
    pub fn keys(&self) -> Vec<&str> {
        self.points.iter().map(|p| p.key.as_str()).collect()
    }
}

/// Evaluated chart, ready for the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization_code: Option<String>,
    pub value_type: String,
    pub interval: Interval,
    pub series: Vec<Series>,
}

impl ChartSeries {
    /// Series by metric path.
    #[allow(dead_code)] // Lookup helper for embedding callers
    pub fn get(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.name == name)
    }
}
