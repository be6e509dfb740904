//! Series building: bucket arrays to per-interval sums.
//!
//! Each metric path is looked up by name anywhere in the aggregation tree.
//! Several indices may answer the same metric (one subtree per data
//! source); their buckets are merged by interval key and summed.

use crate::computed::ComputedFieldPipeline;
use crate::error::{ChartError, ChartResult};
use crate::interval::IntervalKeyResolver;
use crate::models::{Interval, Point, Series};
use crate::tree;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use tracing::{debug, error};

pub const BUCKETS: &str = "buckets";
pub const KEY: &str = "key";
pub const VALUE: &str = "value";
pub const DOC_COUNT: &str = "doc_count";

/// Series of every buildable metric plus the union of their keys.
#[derive(Debug, Default)]
pub struct BuiltSeries {
    pub series: Vec<Series>,
    /// Keys in first-seen order across metrics, in metric-path order.
    pub keys: IndexSet<String>,
}

/// Builds one series per metric path from an aggregation tree.
pub struct SeriesBuilder<'a> {
    resolver: IntervalKeyResolver,
    interval: Interval,
    pipeline: Option<&'a ComputedFieldPipeline>,
}

impl<'a> SeriesBuilder<'a> {
    pub fn new(resolver: IntervalKeyResolver, interval: Interval) -> Self {
        Self {
            resolver,
            interval,
            pipeline: None,
        }
    }

    /// Derive bucket values through computed fields instead of `value`.
    pub fn with_pipeline(mut self, pipeline: &'a ComputedFieldPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Build every metric path; metrics that fail are logged and dropped.
    pub fn build(&self, aggregations: &Value, metric_paths: &[String]) -> BuiltSeries {
        let mut built = BuiltSeries::default();

        for metric in metric_paths {
            match self.build_metric(aggregations, metric) {
                Ok(series) => {
                    built
                        .keys
                        .extend(series.points.iter().map(|p| p.key.clone()));
                    built.series.push(series);
                }
                Err(e) => error!("Dropping metric {:?}: {}", metric, e),
            }
        }

        built
    }

    /// Build the series of a single metric path.
    ///
    /// The total is the plain sum of every bucket contribution, so a bucket
    /// reported by two sources counts twice, as it does in the per-key sum.
    pub fn build_metric(&self, aggregations: &Value, metric: &str) -> ChartResult<Series> {
        let mut sums: IndexMap<String, f64> = IndexMap::new();
        let mut total = 0.0;

        let sources = tree::find_values(aggregations, metric);
        if sources.is_empty() {
            debug!("Metric {:?} not present in aggregations", metric);
        }

        for source in sources {
            let Some(buckets) = tree::find_value(source, BUCKETS) else {
                continue;
            };
            let buckets = buckets
                .as_array()
                .ok_or_else(|| ChartError::metric(metric, "buckets is not an array"))?;

            for bucket in buckets {
                let raw_key = tree::find_value(bucket, KEY)
                    .and_then(tree::as_text)
                    .ok_or_else(|| ChartError::metric(metric, "bucket has no key"))?;
                let key = self.resolver.resolve(&raw_key, self.interval);
                let value = self.bucket_value(metric, bucket);

                *sums.entry(key).or_insert(0.0) += value;
                total += value;
            }
        }

        debug!("Metric {:?}: {} keys, total {}", metric, sums.len(), total);

        Ok(Series {
            name: metric.to_string(),
            total,
            points: sums
                .into_iter()
                .map(|(key, value)| Point::new(key, value))
                .collect(),
        })
    }

    fn bucket_value(&self, metric: &str, bucket: &Value) -> f64 {
        match self.pipeline {
            Some(pipeline) => pipeline.evaluate(bucket).unwrap_or_else(|e| {
                error!("Computed field failed for metric {:?}: {}", metric, e);
                0.0
            }),
            None => direct_value(bucket),
        }
    }
}

/// A bucket's own value: the first `value` in it, else `doc_count`, else 0.
pub fn direct_value(bucket: &Value) -> f64 {
    tree::find_value(bucket, VALUE)
        .or_else(|| tree::find_value(bucket, DOC_COUNT))
        .map(tree::as_number)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computed::ActionRegistry;
    use crate::interval::Zone;
    use crate::models::{ComputedFieldDescriptor, RequestContext, ValueType};
    use serde_json::json;

    // 2019-04-22, 2019-04-29, 2019-05-01 (UTC midnight)
    const APR_22: i64 = 1555891200000;
    const APR_29: i64 = 1556496000000;
    const MAY_01: i64 = 1556668800000;

    fn builder<'a>(interval: Interval) -> SeriesBuilder<'a> {
        SeriesBuilder::new(IntervalKeyResolver::new(Zone::Utc), interval)
    }

    fn paths(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_month_example() {
        let aggs = json!({
            "Total Application": { "buckets": [
                { "key": APR_29, "value": 6 },
                { "key": MAY_01, "value": 1 }
            ]}
        });

        let series = builder(Interval::Month)
            .build_metric(&aggs, "Total Application")
            .unwrap();

        assert_eq!(
            series.points,
            vec![Point::new("Apr-2019", 6.0), Point::new("May-2019", 1.0)]
        );
        assert_eq!(series.total, 7.0);
    }

    #[test]
    fn test_merges_sources_by_key() {
        let aggs = json!({
            "ptindex-v1": { "Total Application": { "buckets": [
                { "key": APR_29, "doc_count": 1, "Count": { "value": 2 } }
            ]}},
            "tlindex-v1": { "Total Application": { "buckets": [
                { "key": APR_22, "doc_count": 1, "Count": { "value": 1 } },
                { "key": APR_29.to_string(), "doc_count": 3, "Count": { "value": 3 } }
            ]}}
        });

        let series = builder(Interval::Day)
            .build_metric(&aggs, "Total Application")
            .unwrap();

        assert_eq!(series.value_at("29-Apr-2019"), Some(5.0));
        assert_eq!(series.value_at("22-Apr-2019"), Some(1.0));
        assert_eq!(series.keys(), vec!["29-Apr-2019", "22-Apr-2019"]);
        assert_eq!(series.total, 6.0);
    }

    #[test]
    fn test_doc_count_fallback() {
        let aggs = json!({ "M": { "buckets": [{ "key": APR_29, "doc_count": 4 }] } });
        let series = builder(Interval::Year).build_metric(&aggs, "M").unwrap();
        assert_eq!(series.points, vec![Point::new("2019", 4.0)]);
    }

    #[test]
    fn test_missing_metric_yields_empty_series() {
        let series = builder(Interval::Day)
            .build_metric(&json!({ "Other": {} }), "M")
            .unwrap();
        assert!(series.points.is_empty());
        assert_eq!(series.total, 0.0);
    }

    #[test]
    fn test_unparseable_key_kept_raw() {
        let aggs = json!({ "M": { "buckets": [{ "key": "closed", "doc_count": 2 }] } });
        let series = builder(Interval::Day).build_metric(&aggs, "M").unwrap();
        assert_eq!(series.points, vec![Point::new("closed", 2.0)]);
    }

    #[test]
    fn test_bad_metric_is_dropped_others_kept() {
        let aggs = json!({
            "Bad": { "buckets": { "closed": { "doc_count": 1 } } },
            "NoKey": { "buckets": [{ "doc_count": 1 }] },
            "Good": { "buckets": [{ "key": APR_29, "doc_count": 1 }] }
        });

        let built = builder(Interval::Month).build(&aggs, &paths(&["Bad", "NoKey", "Good"]));

        assert_eq!(built.series.len(), 1);
        assert_eq!(built.series[0].name, "Good");
        assert_eq!(built.keys.iter().collect::<Vec<_>>(), vec!["Apr-2019"]);
    }

    #[test]
    fn test_global_keys_first_seen_across_metrics() {
        let aggs = json!({
            "A": { "buckets": [{ "key": MAY_01, "doc_count": 1 }] },
            "B": { "buckets": [
                { "key": APR_29, "doc_count": 1 },
                { "key": MAY_01, "doc_count": 1 }
            ]}
        });

        let built = builder(Interval::Month).build(&aggs, &paths(&["A", "B"]));

        assert_eq!(
            built.keys.iter().collect::<Vec<_>>(),
            vec!["May-2019", "Apr-2019"]
        );
        assert_eq!(built.series[0].name, "A");
        assert_eq!(built.series[1].name, "B");
    }

    #[test]
    fn test_computed_field_values() {
        let aggs = json!({ "Resolution Time": { "buckets": [
            { "key": APR_29, "closedAt": { "value": 172_800_000 }, "createdAt": { "value": 0 } },
            { "key": MAY_01, "createdAt": { "value": 0 } }
        ]}});
        let descriptors = vec![ComputedFieldDescriptor {
            action_name: "DifferenceComputedField".to_string(),
            fields: ["closedAt", "createdAt"].iter().map(|s| s.to_string()).collect(),
            new_field: "elapsed".to_string(),
            parameters: None,
        }];
        let pipeline = ComputedFieldPipeline::resolve(
            &ActionRegistry::builtin(),
            &descriptors,
            &RequestContext::default(),
            &ValueType::Days,
        );

        let series = builder(Interval::Day)
            .with_pipeline(&pipeline)
            .build_metric(&aggs, "Resolution Time")
            .unwrap();

        // second bucket lacks closedAt and contributes zero
        assert_eq!(
            series.points,
            vec![Point::new("29-Apr-2019", 2.0), Point::new("1-May-2019", 0.0)]
        );
        assert_eq!(series.total, 2.0);
    }

    #[test]
    fn test_direct_value() {
        assert_eq!(direct_value(&json!({ "doc_count": 4 })), 4.0);
        assert_eq!(direct_value(&json!({ "doc_count": 4, "Sum": { "value": 2.5 } })), 2.5);
        assert_eq!(direct_value(&json!({ "key": 1 })), 0.0);
    }
}
