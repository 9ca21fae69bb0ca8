//! Output-shape descriptors and a JSON-schema subset validator.
//!
//! Supported keywords: `type` (string or list), `properties`, `required`, `items`, `enum`,
//! and `additionalProperties` (`false` or a schema). Unknown keywords are ignored.
//! Violation paths use `$` for the root, `.field` for properties, and `[i]` for array items.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named output schema a component declares for provider output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
	pub name: String,
	pub schema: Value,
}

impl OutputSchema {
	pub fn new(name: impl Into<String>, schema: Value) -> Self {
		Self { name: name.into(), schema }
	}

	/// Schema that accepts any value.
	pub fn any(name: impl Into<String>) -> Self {
		Self::new(name, Value::Object(Map::new()))
	}

	/// Checks `value`, collecting every violation.
	pub fn validate(&self, value: &Value) -> Result<(), Vec<Violation>> {
		let mut violations = Vec::new();
		check(&self.schema, value, "$", &mut violations);
		if violations.is_empty() { Ok(()) } else { Err(violations) }
	}
}

/// One failed constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
	pub path: String,
	pub message: String,
}

impl fmt::Display for Violation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.path, self.message)
	}
}

fn violation(out: &mut Vec<Violation>, path: &str, message: impl Into<String>) {
	out.push(Violation {
		path: path.to_string(),
		message: message.into(),
	});
}

fn type_name(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

fn type_matches(expected: &str, value: &Value) -> bool {
	let actual = type_name(value);
	actual == expected || (expected == "number" && actual == "integer")
}

fn check(schema: &Value, value: &Value, path: &str, out: &mut Vec<Violation>) {
	let Some(schema) = schema.as_object() else {
		// `true` accepts everything, `false` nothing.
		if schema == &Value::Bool(false) {
			violation(out, path, "no value is allowed here");
		}
		return;
	};

	if let Some(expected) = schema.get("type") {
		let allowed: Vec<&str> = match expected {
			Value::String(t) => vec![t.as_str()],
			Value::Array(list) => list.iter().filter_map(Value::as_str).collect(),
			_ => Vec::new(),
		};
		if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(t, value)) {
			violation(out, path, format!("expected {}, found {}", allowed.join(" or "), type_name(value)));
			return;
		}
	}

	if let Some(Value::Array(options)) = schema.get("enum")
		&& !options.contains(value)
	{
		violation(out, path, format!("value {value} is not one of {}", Value::Array(options.clone())));
	}

	match value {
		Value::Object(fields) => check_object(schema, fields, path, out),
		Value::Array(items) => {
			if let Some(item_schema) = schema.get("items") {
				for (i, item) in items.iter().enumerate() {
					check(item_schema, item, &format!("{path}[{i}]"), out);
				}
			}
		}
		_ => {}
	}
}

fn check_object(schema: &Map<String, Value>, fields: &Map<String, Value>, path: &str, out: &mut Vec<Violation>) {
	if let Some(Value::Array(required)) = schema.get("required") {
		for name in required.iter().filter_map(Value::as_str) {
			if !fields.contains_key(name) {
				violation(out, &format!("{path}.{name}"), "required field is missing");
			}
		}
	}

	let properties = schema.get("properties").and_then(Value::as_object);
	let additional = schema.get("additionalProperties");
	for (name, field) in fields {
		let field_path = format!("{path}.{name}");
		match properties.and_then(|p| p.get(name)) {
			Some(prop_schema) => check(prop_schema, field, &field_path, out),
			None => match additional {
				Some(Value::Bool(false)) => violation(out, &field_path, "unexpected field"),
				Some(extra @ Value::Object(_)) => check(extra, field, &field_path, out),
				_ => {}
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	fn feedback_schema() -> OutputSchema {
		OutputSchema::new(
			"feedback",
			json!({
				"type": "object",
				"required": ["grade", "notes"],
				"additionalProperties": false,
				"properties": {
					"grade": {"type": "string", "enum": ["A", "B", "C"]},
					"score": {"type": "number"},
					"notes": {"type": "array", "items": {"type": "string"}}
				}
			}),
		)
	}

	#[test]
	fn test_valid_document_passes() {
		let doc = json!({"grade": "A", "score": 9, "notes": ["clear history", "good rapport"]});
		assert!(feedback_schema().validate(&doc).is_ok());
	}

	/// Every violation is reported with a path, not just the first.
	#[test]
	fn test_collects_all_violations() {
		let doc = json!({"grade": "Z", "notes": ["ok", 3], "extra": true});
		let violations = feedback_schema().validate(&doc).unwrap_err();
		let mut paths: Vec<&str> = violations.iter().map(|v| v.path.as_str()).collect();
		paths.sort_unstable();
		assert_eq!(paths, vec!["$.extra", "$.grade", "$.notes[1]"]);
	}

	#[test]
	fn test_missing_required_field() {
		let violations = feedback_schema().validate(&json!({"grade": "B"})).unwrap_err();
		assert_eq!(violations.len(), 1);
		assert_eq!(violations[0].path, "$.notes");
		assert_eq!(violations[0].message, "required field is missing");
	}

	/// Type mismatches stop descent into that value.
	#[test]
	fn test_type_mismatch_at_root() {
		let violations = feedback_schema().validate(&json!([1, 2])).unwrap_err();
		assert_eq!(violations.len(), 1);
		assert_eq!(violations[0].to_string(), "$: expected object, found array");
	}

	#[test]
	fn test_integer_satisfies_number_but_not_reverse() {
		let number = OutputSchema::new("n", json!({"type": "number"}));
		let integer = OutputSchema::new("i", json!({"type": ["integer", "null"]}));
		assert!(number.validate(&json!(4)).is_ok());
		assert!(integer.validate(&json!(null)).is_ok());
		assert!(integer.validate(&json!(4.5)).is_err());
	}

	#[test]
	fn test_any_schema_accepts_everything() {
		assert!(OutputSchema::any("free").validate(&json!({"x": [1, "two"]})).is_ok());
	}
}
