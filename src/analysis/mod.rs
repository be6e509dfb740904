//! Chart evaluation.
//!
//! [`ChartEngine::evaluate`] runs the whole pipeline for one chart: build a
//! series per metric path, fill gaps so all series share one key set, sort
//! chronologically and optionally turn values into running totals.

pub mod aggregator;
pub mod timeline;

pub use aggregator::{BuiltSeries, SeriesBuilder};

use crate::computed::{ActionRegistry, ComputedFieldPipeline};
use crate::error::{ChartError, ChartResult};
use crate::interval::IntervalKeyResolver;
use crate::models::{ChartConfig, ChartSeries, Interval, RequestContext};
use serde_json::Value;
use tracing::{debug, warn};

/// Member holding the aggregations in a full search response.
pub const AGGREGATIONS: &str = "aggregations";

/// The aggregation tree of a search response, or the document itself when
/// it has no `aggregations` member.
pub fn aggregation_root(document: &Value) -> &Value {
    document.get(AGGREGATIONS).unwrap_or(document)
}

/// Evaluates chart definitions against aggregation trees.
///
/// Holds no per-chart state; one engine can serve many evaluations,
/// including concurrent ones.
#[derive(Clone, Default)]
pub struct ChartEngine {
    registry: ActionRegistry,
    resolver: IntervalKeyResolver,
    default_interval: Option<String>,
}

impl ChartEngine {
    pub fn new(registry: ActionRegistry, resolver: IntervalKeyResolver) -> Self {
        Self {
            registry,
            resolver,
            default_interval: None,
        }
    }

    /// Interval used when neither the request nor the chart names one.
    pub fn with_default_interval(mut self, interval: Option<String>) -> Self {
        self.default_interval = interval;
        self
    }

    /// Pick the interval: request first, then chart, then engine default.
    pub fn resolve_interval(&self, chart: &ChartConfig, request: &RequestContext) -> ChartResult<Interval> {
        let chosen = request
            .requested_interval()
            .or_else(|| non_blank(chart.interval.as_deref()))
            .or_else(|| non_blank(self.default_interval.as_deref()))
            .ok_or_else(|| ChartError::Config("interval must be set by the request or the chart".to_string()))?;

        chosen.parse()
    }

    /// Evaluate one chart.
    pub fn evaluate(
        &self,
        request: &RequestContext,
        chart: &ChartConfig,
        aggregations: &Value,
    ) -> ChartResult<ChartSeries> {
        let interval = self.resolve_interval(chart, request)?;
        let value_type = chart.value_type();
        debug!(
            "Evaluating chart {:?}: {} metrics, interval {}, value type {}",
            chart.name.as_deref().unwrap_or("-"),
            chart.aggs_path.len(),
            interval,
            value_type
        );
        if !request.filters.is_empty() {
            debug!("Request filters: {}", serde_json::Value::Object(request.filters.clone()));
        }

        let pipeline = chart
            .computed_fields()
            .filter(|fields| !fields.is_empty())
            .map(|fields| ComputedFieldPipeline::resolve(&self.registry, fields, request, &value_type));

        let mut builder = SeriesBuilder::new(self.resolver, interval);
        if let Some(ref pipeline) = pipeline {
            builder = builder.with_pipeline(pipeline);
        }

        let BuiltSeries { mut series, keys } = builder.build(aggregations, &chart.aggs_path);

        for s in &mut series {
            timeline::fill_gaps(s, &keys);
            if let Err(e) = timeline::sort_chronologically(s) {
                warn!("Series {:?} left in first-seen order: {}", s.name, e);
            }
            if chart.is_cumulative {
                timeline::accumulate(s);
            }
        }

        Ok(ChartSeries {
            name: chart.name.clone(),
            chart_type: chart.chart_type.clone(),
            visualization_code: request.visualization_code.clone(),
            value_type: chart.value_type.clone(),
            interval,
            series,
        })
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Zone;
    use crate::models::{ComputedFieldDescriptor, Point};
    use serde_json::json;

    const NOV_12_2018: i64 = 1541980800000;
    const APR_22_2019: i64 = 1555891200000;
    const APR_29_2019: i64 = 1556496000000;
    const MAY_01_2019: i64 = 1556668800000;
    const AUG_05_2019: i64 = 1564963200000;
    const NOV_18_2019: i64 = 1574035200000;

    fn engine() -> ChartEngine {
        ChartEngine::new(ActionRegistry::builtin(), IntervalKeyResolver::new(Zone::Utc))
    }

    fn chart(paths: &[&str], interval: Option<&str>) -> ChartConfig {
        ChartConfig {
            aggs_path: paths.iter().map(|p| p.to_string()).collect(),
            interval: interval.map(String::from),
            value_type: "number".to_string(),
            ..Default::default()
        }
    }

    /// Three indices answering the same two metrics.
    fn multi_index_response() -> Value {
        json!({ "aggregations": {
            "ptindex-v1": {
                "Closed Application": { "buckets": [
                    { "key": NOV_12_2018, "doc_count": 1,
                      "Applications Closed": { "buckets": { "closed": { "doc_count": 0, "Count": { "value": 0 } } } } }
                ]},
                "Total Application": { "buckets": [
                    { "key_as_string": "2018-11-12T00:00:00.000Z", "key": NOV_12_2018, "doc_count": 1, "Count": { "value": 1 } }
                ]}
            },
            "tlindex-v1": {
                "Total Application": { "buckets": [
                    { "key": APR_22_2019, "doc_count": 1, "Count": { "value": 1 } },
                    { "key": APR_29_2019, "doc_count": 0, "Count": { "value": 0 } }
                ]}
            },
            "pgrindex-v1": {
                "Closed Application": { "buckets": [
                    { "key": AUG_05_2019, "doc_count": 438,
                      "Applications Closed": { "buckets": { "closed": { "doc_count": 5, "Count": { "value": 5 } } } } }
                ]},
                "Total Application": { "buckets": [
                    { "key": AUG_05_2019, "doc_count": 438, "Count": { "value": 438 } },
                    { "key": NOV_18_2019, "doc_count": 3, "Count": { "value": 3 } }
                ]}
            }
        }})
    }

    #[test]
    fn test_month_chart_end_to_end() {
        let doc = multi_index_response();
        let result = engine()
            .evaluate(
                &RequestContext::default(),
                &chart(&["Total Application", "Closed Application"], Some("month")),
                aggregation_root(&doc),
            )
            .unwrap();

        assert_eq!(result.interval, Interval::Month);
        assert_eq!(result.series.len(), 2);

        let total = result.get("Total Application").unwrap();
        assert_eq!(
            total.keys(),
            vec!["Nov-2018", "Apr-2019", "Aug-2019", "Nov-2019"]
        );
        assert_eq!(total.value_at("Apr-2019"), Some(1.0));
        assert_eq!(total.value_at("Aug-2019"), Some(438.0));
        assert_eq!(total.total, 443.0);

        // gap filled and aligned with the other series
        let closed = result.get("Closed Application").unwrap();
        assert_eq!(closed.keys(), total.keys());
        assert_eq!(closed.value_at("Nov-2018"), Some(0.0));
        assert_eq!(closed.value_at("Aug-2019"), Some(5.0));
        assert_eq!(closed.value_at("Nov-2019"), Some(0.0));
        assert_eq!(closed.total, 5.0);
    }

    #[test]
    fn test_cumulative_chart() {
        let aggs = json!({ "M": { "buckets": [
            { "key": MAY_01_2019, "doc_count": 1 },
            { "key": APR_29_2019, "doc_count": 6 }
        ]}});
        let mut config = chart(&["M"], Some("month"));
        config.is_cumulative = true;

        let result = engine()
            .evaluate(&RequestContext::default(), &config, &aggs)
            .unwrap();

        assert_eq!(
            result.series[0].points,
            vec![Point::new("Apr-2019", 6.0), Point::new("May-2019", 7.0)]
        );
        assert_eq!(result.series[0].total, 7.0);
    }

    #[test]
    fn test_request_interval_overrides_chart() {
        let aggs = json!({ "M": { "buckets": [{ "key": APR_29_2019, "doc_count": 1 }] } });
        let request = RequestContext {
            interval: Some("year".to_string()),
            visualization_code: Some("totalApplications".to_string()),
            ..Default::default()
        };

        let result = engine()
            .evaluate(&request, &chart(&["M"], Some("day")), &aggs)
            .unwrap();

        assert_eq!(result.interval, Interval::Year);
        assert_eq!(result.series[0].keys(), vec!["2019"]);
        assert_eq!(result.visualization_code.as_deref(), Some("totalApplications"));
    }

    #[test]
    fn test_missing_interval_is_config_error() {
        let err = engine()
            .evaluate(&RequestContext::default(), &chart(&["M"], Some(" ")), &json!({}))
            .unwrap_err();
        assert!(matches!(err, ChartError::Config(_)));

        let fallback = engine().with_default_interval(Some("month".to_string()));
        assert!(fallback
            .evaluate(&RequestContext::default(), &chart(&["M"], None), &json!({}))
            .is_ok());
    }

    #[test]
    fn test_invalid_interval_is_fatal() {
        let err = engine()
            .evaluate(&RequestContext::default(), &chart(&["M"], Some("hour")), &json!({}))
            .unwrap_err();
        assert!(matches!(err, ChartError::InvalidInterval(ref s) if s == "hour"));
    }

    #[test]
    fn test_unsortable_series_kept_others_sorted() {
        let aggs = json!({
            "Raw": { "buckets": [{ "key": "not-a-time", "doc_count": 1 }] },
            "Ok": { "buckets": [
                { "key": MAY_01_2019, "doc_count": 1 },
                { "key": APR_29_2019, "doc_count": 1 }
            ]}
        });

        let result = engine()
            .evaluate(&RequestContext::default(), &chart(&["Raw", "Ok"], Some("month")), &aggs)
            .unwrap();

        // "Ok" is filled with the raw key too, which makes it unsortable
        let ok = result.get("Ok").unwrap();
        assert_eq!(ok.keys(), vec!["May-2019", "Apr-2019", "not-a-time"]);
        assert_eq!(ok.value_at("not-a-time"), Some(0.0));
        let raw = result.get("Raw").unwrap();
        assert_eq!(raw.keys(), vec!["not-a-time", "May-2019", "Apr-2019"]);
    }

    #[test]
    fn test_days_chart_with_computed_fields() {
        let aggs = json!({ "Avg Resolution": { "buckets": [
            { "key": APR_29_2019, "closedAt": { "value": 4.0 * 86_400_000.0 }, "openedAt": { "value": 86_400_000.0 } },
            { "key": MAY_01_2019, "closedAt": { "value": 2.0 * 86_400_000.0 }, "openedAt": { "value": 0.0 } }
        ]}});
        let mut config = chart(&["Avg Resolution"], Some("month"));
        config.value_type = "days".to_string();
        config.computed_fields = Some(vec![ComputedFieldDescriptor {
            action_name: "DifferenceComputedField".to_string(),
            fields: ["closedAt", "openedAt"].iter().map(|s| s.to_string()).collect(),
            new_field: "resolution".to_string(),
            parameters: None,
        }]);

        let result = engine()
            .evaluate(&RequestContext::default(), &config, &aggs)
            .unwrap();

        assert_eq!(result.value_type, "days");
        assert_eq!(
            result.series[0].points,
            vec![Point::new("Apr-2019", 3.0), Point::new("May-2019", 2.0)]
        );
    }

    #[test]
    fn test_empty_computed_fields_use_bucket_values() {
        let aggs = json!({ "M": { "buckets": [{ "key": APR_29_2019, "doc_count": 4 }] } });
        let mut config = chart(&["M"], Some("year"));
        config.computed_fields = Some(Vec::new());

        let result = engine()
            .evaluate(&RequestContext::default(), &config, &aggs)
            .unwrap();
        assert_eq!(result.series[0].points, vec![Point::new("2019", 4.0)]);
    }

    #[test]
    fn test_aggregation_root() {
        let wrapped = json!({ "took": 3, "aggregations": { "M": 1 } });
        assert_eq!(aggregation_root(&wrapped), &json!({ "M": 1 }));
        let bare = json!({ "M": 1 });
        assert_eq!(aggregation_root(&bare), &bare);
    }
}
