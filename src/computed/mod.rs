//! Computed fields: values derived per bucket before summation.
//!
//! A chart may declare a list of computed-field steps. Each step names an
//! action from the [`ActionRegistry`], the bucket fields it reads and the
//! field it produces. Actions are pure: they return the derived value and
//! the pipeline records it in a per-bucket overlay, so a later step can read
//! an earlier step's output without touching the aggregation tree.

pub mod actions;

use crate::error::{ChartError, ChartResult};
use crate::models::{ComputedFieldDescriptor, RequestContext, ValueType};
use crate::tree;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Values already derived for the bucket being evaluated.
pub type DerivedFields = IndexMap<String, f64>;

/// A named transformation deriving one number from bucket fields.
pub trait ComputedField: Send + Sync {
    /// Registry name of the action.
    fn name(&self) -> &'static str;

    /// Prepare the action for one chart evaluation.
    fn configure(&mut self, context: &RequestContext, parameters: Option<&Value>) -> ChartResult<()>;

    /// Derive the value for one bucket.
    fn apply(&self, bucket: &Value, fields: &IndexSet<String>, derived: &DerivedFields) -> ChartResult<f64>;
}

type Constructor = fn() -> Box<dyn ComputedField>;

/// Static mapping from action name to implementation.
#[derive(Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Constructor>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ActionRegistry {
    /// Registry holding no actions.
    pub fn empty() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Registry with every built-in action.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(actions::ADDITIVE, || -> Box<dyn ComputedField> {
            Box::new(actions::Additive)
        });
        registry.register(actions::DIFFERENCE, || -> Box<dyn ComputedField> {
            Box::new(actions::Difference)
        });
        registry.register(actions::PERCENTAGE, || -> Box<dyn ComputedField> {
            Box::new(actions::Percentage::default())
        });
        registry.register(actions::AVERAGE, || -> Box<dyn ComputedField> {
            Box::new(actions::Average::default())
        });
        registry
    }

    /// Add or replace an action.
    pub fn register(&mut self, name: impl Into<String>, constructor: Constructor) {
        self.actions.insert(name.into(), constructor);
    }

    /// Fresh instance of the named action.
    pub fn create(&self, name: &str) -> ChartResult<Box<dyn ComputedField>> {
        self.actions
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| ChartError::computed(name, "no such action"))
    }

    /// Registered action names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

struct Step {
    descriptor: ComputedFieldDescriptor,
    /// Configured action, or the reason it could not be prepared.
    action: Result<Box<dyn ComputedField>, String>,
}

/// The computed-field steps of one chart, resolved and configured once.
pub struct ComputedFieldPipeline {
    steps: Vec<Step>,
    in_days: bool,
}

impl ComputedFieldPipeline {
    /// Resolve every descriptor against the registry.
    ///
    /// Resolution failures are logged here and surface again as errors for
    /// each bucket evaluated, which callers count as zero.
    pub fn resolve(
        registry: &ActionRegistry,
        descriptors: &[ComputedFieldDescriptor],
        context: &RequestContext,
        value_type: &ValueType,
    ) -> Self {
        let steps = descriptors
            .iter()
            .map(|descriptor| {
                let action = registry
                    .create(&descriptor.action_name)
                    .and_then(|mut action| {
                        action.configure(context, descriptor.parameters.as_ref())?;
                        Ok(action)
                    })
                    .map_err(|e| {
                        error!("Computed field {} unavailable: {}", descriptor.new_field, e);
                        e.to_string()
                    });
                if let Ok(ref action) = action {
                    debug!("Computed field {} via {}", descriptor.new_field, action.name());
                }
                Step {
                    descriptor: descriptor.clone(),
                    action,
                }
            })
            .collect();

        Self {
            steps,
            in_days: *value_type == ValueType::Days,
        }
    }

    /// Run every step on `bucket` and return the last step's value.
    ///
    /// For `days` charts the value is taken as milliseconds and reported
    /// as whole days. Other value types keep the value unchanged, fraction
    /// included; nothing is truncated to an integer.
    pub fn evaluate(&self, bucket: &Value) -> ChartResult<f64> {
        let mut derived = DerivedFields::new();
        let mut last = 0.0;

        for step in &self.steps {
            let action = step
                .action
                .as_ref()
                .map_err(|reason| ChartError::computed(&step.descriptor.action_name, reason.clone()))?;
            last = action.apply(bucket, &step.descriptor.fields, &derived)?;
            derived.insert(step.descriptor.new_field.clone(), last);
        }

        Ok(if self.in_days { millis_to_days(last) } else { last })
    }
}

/// Whole days in a millisecond duration, truncated toward zero.
pub fn millis_to_days(millis: f64) -> f64 {
    (millis.trunc() / MILLIS_PER_DAY).trunc()
}

/// Numeric value of an input field for an action.
///
/// Already-derived fields win. Otherwise the field is searched anywhere in
/// the bucket: a scalar is read directly, a sub-aggregation by its `value`
/// or, failing that, its `doc_count`.
pub fn field_value(bucket: &Value, derived: &DerivedFields, field: &str) -> Result<f64, String> {
    if let Some(value) = derived.get(field) {
        return Ok(*value);
    }

    let node = tree::find_value(bucket, field).ok_or_else(|| format!("field {:?} not found", field))?;

    let number = match node {
        Value::Object(map) => map
            .get("value")
            .and_then(tree::to_number)
            .or_else(|| map.get("doc_count").and_then(tree::to_number)),
        other => tree::to_number(other),
    };

    number.ok_or_else(|| format!("field {:?} is not numeric", field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(action: &str, fields: &[&str], new_field: &str) -> ComputedFieldDescriptor {
        ComputedFieldDescriptor {
            action_name: action.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            new_field: new_field.to_string(),
            parameters: None,
        }
    }

    fn resolve(descriptors: &[ComputedFieldDescriptor], value_type: ValueType) -> ComputedFieldPipeline {
        ComputedFieldPipeline::resolve(
            &ActionRegistry::builtin(),
            descriptors,
            &RequestContext::default(),
            &value_type,
        )
    }

    #[test]
    fn test_registry_names() {
        let registry = ActionRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec![
                "AdditiveComputedField",
                "AverageComputedField",
                "DifferenceComputedField",
                "PercentageComputedField",
            ]
        );
        assert!(registry.create("NoSuchAction").is_err());
        assert!(ActionRegistry::empty().names().is_empty());
    }

    #[test]
    fn test_days_conversion() {
        let bucket = json!({
            "key": 1556496000000_i64,
            "closedAt": { "value": 172_800_000 + 1_000 },
            "createdAt": { "value": 1_000 }
        });
        let pipeline = resolve(
            &[descriptor("DifferenceComputedField", &["closedAt", "createdAt"], "elapsed")],
            ValueType::Days,
        );
        assert_eq!(pipeline.evaluate(&bucket).unwrap(), 2.0);
    }

    #[test]
    fn test_non_days_value_used_as_is() {
        let bucket = json!({ "a": { "value": 1.5 }, "b": { "doc_count": 2 } });
        let pipeline = resolve(
            &[descriptor("AdditiveComputedField", &["a", "b"], "sum")],
            ValueType::Amount,
        );
        assert_eq!(pipeline.evaluate(&bucket).unwrap(), 3.5);
    }

    #[test]
    fn test_later_step_reads_earlier_output() {
        let bucket = json!({
            "closed": { "doc_count": 3 },
            "resolved": { "doc_count": 1 },
            "total": { "doc_count": 8 }
        });
        let pipeline = resolve(
            &[
                descriptor("AdditiveComputedField", &["closed", "resolved"], "done"),
                descriptor("PercentageComputedField", &["done", "total"], "donePct"),
            ],
            ValueType::Percentage,
        );
        assert_eq!(pipeline.evaluate(&bucket).unwrap(), 50.0);
        // the tree itself is untouched
        assert!(tree::find_value(&bucket, "done").is_none());
    }

    #[test]
    fn test_unknown_action_is_an_error_per_bucket() {
        let pipeline = resolve(&[descriptor("Nope", &["a"], "x")], ValueType::Number);
        let err = pipeline.evaluate(&json!({ "a": 1 })).unwrap_err();
        assert!(matches!(err, ChartError::ComputedField { ref action, .. } if action == "Nope"));
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let pipeline = resolve(
            &[descriptor("AdditiveComputedField", &["absent"], "x")],
            ValueType::Number,
        );
        assert!(pipeline.evaluate(&json!({ "a": 1 })).is_err());
    }

    #[test]
    fn test_field_value_lookup() {
        let bucket = json!({
            "Count": { "value": 7 },
            "Empty": { "value": null, "doc_count": 2 },
            "raw": "12",
            "label": "abc"
        });
        let mut derived = DerivedFields::new();
        derived.insert("Count".to_string(), 99.0);

        assert_eq!(field_value(&bucket, &derived, "Count"), Ok(99.0));
        assert_eq!(field_value(&bucket, &DerivedFields::new(), "Count"), Ok(7.0));
        assert_eq!(field_value(&bucket, &derived, "Empty"), Ok(2.0));
        assert_eq!(field_value(&bucket, &derived, "raw"), Ok(12.0));
        assert!(field_value(&bucket, &derived, "label").is_err());
        assert!(field_value(&bucket, &derived, "nothing").is_err());
    }

    #[test]
    fn test_millis_to_days_truncates() {
        assert_eq!(millis_to_days(172_800_000.0), 2.0);
        assert_eq!(millis_to_days(172_799_999.0), 1.0);
        assert_eq!(millis_to_days(-90_000_000.0), -1.0);
    }
}
