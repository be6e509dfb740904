//! Built-in computed-field actions.

use super::{field_value, ComputedField, DerivedFields};
use crate::error::{ChartError, ChartResult};
use crate::models::RequestContext;
use indexmap::IndexSet;
use serde_json::Value;

pub const ADDITIVE: &str = "AdditiveComputedField";
pub const DIFFERENCE: &str = "DifferenceComputedField";
pub const PERCENTAGE: &str = "PercentageComputedField";
pub const AVERAGE: &str = "AverageComputedField";

const MILLIS_PER_DAY: i64 = 86_400_000;

fn inputs(
    action: &'static str,
    bucket: &Value,
    fields: &IndexSet<String>,
    derived: &DerivedFields,
) -> ChartResult<Vec<f64>> {
    if fields.is_empty() {
        return Err(ChartError::computed(action, "no input fields"));
    }
    fields
        .iter()
        .map(|field| field_value(bucket, derived, field).map_err(|reason| ChartError::computed(action, reason)))
        .collect()
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Sum of all input fields.
pub struct Additive;

impl ComputedField for Additive {
    fn name(&self) -> &'static str {
        ADDITIVE
    }

    fn configure(&mut self, _context: &RequestContext, _parameters: Option<&Value>) -> ChartResult<()> {
        Ok(())
    }

    fn apply(&self, bucket: &Value, fields: &IndexSet<String>, derived: &DerivedFields) -> ChartResult<f64> {
        Ok(inputs(ADDITIVE, bucket, fields, derived)?.iter().sum())
    }
}

/// First input minus every following input, e.g. `closedAt - createdAt`.
pub struct Difference;

impl ComputedField for Difference {
    fn name(&self) -> &'static str {
        DIFFERENCE
    }

    fn configure(&mut self, _context: &RequestContext, _parameters: Option<&Value>) -> ChartResult<()> {
        Ok(())
    }

    fn apply(&self, bucket: &Value, fields: &IndexSet<String>, derived: &DerivedFields) -> ChartResult<f64> {
        let values = inputs(DIFFERENCE, bucket, fields, derived)?;
        Ok(values[0] - values[1..].iter().sum::<f64>())
    }
}

/// `first / second * scale`; the scale defaults to 100.
///
/// Parameters may be a bare number, a numeric string or `{"scale": n}`.
pub struct Percentage {
    scale: f64,
}

impl Default for Percentage {
    fn default() -> Self {
        Self { scale: 100.0 }
    }
}

impl ComputedField for Percentage {
    fn name(&self) -> &'static str {
        PERCENTAGE
    }

    fn configure(&mut self, _context: &RequestContext, parameters: Option<&Value>) -> ChartResult<()> {
        let scale = match parameters {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::Object(map)) => match map.get("scale") {
                Some(v) => crate::tree::to_number(v),
                None => return Ok(()),
            },
            Some(other) => crate::tree::to_number(other),
        };

        self.scale = scale.ok_or_else(|| ChartError::computed(PERCENTAGE, "scale must be numeric"))?;
        Ok(())
    }

    fn apply(&self, bucket: &Value, fields: &IndexSet<String>, derived: &DerivedFields) -> ChartResult<f64> {
        let values = inputs(PERCENTAGE, bucket, fields, derived)?;
        if values.len() != 2 {
            return Err(ChartError::computed(
                PERCENTAGE,
                format!("expects 2 fields, got {}", values.len()),
            ));
        }
        Ok(ratio(values[0], values[1]) * self.scale)
    }
}

/// `first / second`, or with a single field its daily average over the
/// request's date range.
#[derive(Default)]
pub struct Average {
    days_in_range: Option<f64>,
}

impl ComputedField for Average {
    fn name(&self) -> &'static str {
        AVERAGE
    }

    fn configure(&mut self, context: &RequestContext, _parameters: Option<&Value>) -> ChartResult<()> {
        self.days_in_range = context.date_range.map(|range| {
            let span = range.end.saturating_sub(range.start).max(0);
            // partial days count as a full day
            let partial = i64::from(span % MILLIS_PER_DAY != 0);
            (span / MILLIS_PER_DAY + partial).max(1) as f64
        });
        Ok(())
    }

    fn apply(&self, bucket: &Value, fields: &IndexSet<String>, derived: &DerivedFields) -> ChartResult<f64> {
        let values = inputs(AVERAGE, bucket, fields, derived)?;
        match values.as_slice() {
            [single] => {
                let days = self
                    .days_in_range
                    .ok_or_else(|| ChartError::computed(AVERAGE, "single field needs a request date range"))?;
                Ok(single / days)
            }
            [numerator, denominator] => Ok(ratio(*numerator, *denominator)),
            _ => Err(ChartError::computed(
                AVERAGE,
                format!("expects 1 or 2 fields, got {}", values.len()),
            )),
        }
    }
}
