//! Error types for chart evaluation.
//!
//! Only `Config` and `InvalidInterval` abort a whole chart. The other
//! variants are raised per bucket, per metric or per series and are
//! recovered by the caller after logging.

use thiserror::Error;

/// Errors raised while turning an aggregation tree into chart series.
#[derive(Debug, Error)]
pub enum ChartError {
    /// Chart configuration is unusable (e.g. no interval anywhere).
    #[error("configuration error: {0}")]
    Config(String),

    /// Granularity name is not one of day, week, month, year.
    #[error("invalid interval: {0:?}")]
    InvalidInterval(String),

    /// A computed-field action could not be resolved or evaluated.
    #[error("computed field {action}: {reason}")]
    ComputedField { action: String, reason: String },

    /// A single metric path could not be turned into a series.
    #[error("metric {metric:?}: {reason}")]
    MetricBuild { metric: String, reason: String },

    /// An interval key could not be decomposed for chronological ordering.
    #[error("cannot order interval key {0:?}")]
    SortKeyFormat(String),
}

impl ChartError {
    pub(crate) fn computed(action: &str, reason: impl Into<String>) -> Self {
        ChartError::ComputedField {
            action: action.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn metric(metric: &str, reason: impl Into<String>) -> Self {
        ChartError::MetricBuild {
            metric: metric.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ChartResult<T> = std::result::Result<T, ChartError>;
