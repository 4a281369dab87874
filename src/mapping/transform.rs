//! Numeric/string transforms applied to a resolved field value.

use serde_json::Value;

use crate::rules::model::Transform;

/// Apply `transform` to `value`, then apply the percent-rescale heuristic
/// when `target_field` looks like a percentage.
///
/// Returns `None` when the transform cannot be applied (e.g. divide by zero,
/// or a non-numeric value where a numeric transform was requested).
pub fn apply(value: &Value, transform: Option<&Transform>, target_field: &str) -> Option<Value> {
	let mut transformed = match transform {
		// No transform still means "coerce a numeric-looking value", not
		// "pass the raw JSON value through": a field mapped straight from a
		// provider's stringified number must still surface as a number.
		None => numeric(value).and_then(to_value).unwrap_or_else(|| value.clone()),
		Some(transform) => apply_transform(value, transform)?,
	};

	if let Some(number) = transformed.as_f64() {
		if (-1.0..1.0).contains(&number) && target_field.to_ascii_lowercase().contains("percent") {
			transformed = serde_json::Number::from_f64(number * 100.0).map(Value::Number).unwrap_or(transformed);
		}
	}

	Some(transformed)
}

fn apply_transform(value: &Value, transform: &Transform) -> Option<Value> {
	match transform {
		Transform::Multiply { operand } => numeric(value).map(|n| n * operand).and_then(to_value),
		Transform::Divide { operand } => {
			if *operand == 0.0 {
				return None;
			}
			numeric(value).map(|n| n / operand).and_then(to_value)
		},
		Transform::Add { operand } => numeric(value).map(|n| n + operand).and_then(to_value),
		Transform::Subtract { operand } => numeric(value).map(|n| n - operand).and_then(to_value),
		Transform::Format { template } => Some(Value::String(template.replace("{value}", &render(value)))),
	}
}

fn numeric(value: &Value) -> Option<f64> {
	match value {
		Value::Number(number) => number.as_f64(),
		Value::String(text) => text.parse::<f64>().ok(),
		_ => None,
	}
}

fn to_value(number: f64) -> Option<Value> {
	serde_json::Number::from_f64(number).map(Value::Number)
}

fn render(value: &Value) -> String {
	match value {
		Value::String(text) => text.clone(),
		other => other.to_string(),
	}
}
