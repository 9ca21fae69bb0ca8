//! Provider responses and stream chunks.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::request::{ContentPart, CorrelationId, Request, Role};

/// Section name carrying conversational messages.
pub const MESSAGES_SECTION: &str = "messages";

/// One normalized output item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputItem {
	/// Conversational message; always belongs to [`MESSAGES_SECTION`].
	Message { role: Role, content: Vec<ContentPart> },
	/// Structured side-channel data under a named section.
	Structured { section: String, data: Value },
}

impl OutputItem {
	pub fn assistant(text: impl Into<String>) -> Self {
		Self::Message {
			role: Role::Assistant,
			content: vec![ContentPart::text(text)],
		}
	}

	pub fn structured(section: impl Into<String>, data: Value) -> Self {
		Self::Structured {
			section: section.into(),
			data,
		}
	}

	/// Logical section this item belongs to.
	pub fn section(&self) -> &str {
		match self {
			Self::Message { .. } => MESSAGES_SECTION,
			Self::Structured { section, .. } => section,
		}
	}

	/// Concatenated text parts of a message, if any.
	pub fn text(&self) -> Option<String> {
		match self {
			Self::Message { content, .. } => Some(content.iter().filter_map(ContentPart::as_text).collect()),
			Self::Structured { .. } => None,
		}
	}
}

/// Token usage breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
	pub input_tokens: u32,
	pub output_tokens: u32,
	#[serde(default)]
	pub cached_tokens: u32,
}

impl Usage {
	pub fn total(&self) -> u32 {
		self.input_tokens.saturating_add(self.output_tokens)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
	pub id: String,
	pub name: String,
	pub arguments: Value,
}

/// Normalized provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
	pub output: Vec<OutputItem>,
	#[serde(default)]
	pub usage: Usage,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tool_calls: Vec<ToolCall>,
	/// Provider-specific metadata bag.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub provider_meta: BTreeMap<String, Value>,
	pub correlation_id: CorrelationId,
	/// Originating request, when the producer kept it.
	#[serde(skip)]
	pub request: Option<Arc<Request>>,
}

impl Response {
	pub fn new(correlation_id: CorrelationId) -> Self {
		Self {
			output: Vec::new(),
			usage: Usage::default(),
			tool_calls: Vec::new(),
			provider_meta: BTreeMap::new(),
			correlation_id,
			request: None,
		}
	}

	/// Empty response answering `request`, carrying its correlation id and a back-reference.
	pub fn for_request(request: Arc<Request>) -> Self {
		let mut response = Self::new(request.correlation_id);
		response.request = Some(request);
		response
	}

	pub fn with_output(mut self, item: OutputItem) -> Self {
		self.output.push(item);
		self
	}

	pub fn with_usage(mut self, usage: Usage) -> Self {
		self.usage = usage;
		self
	}

	pub fn with_tool_call(mut self, call: ToolCall) -> Self {
		self.tool_calls.push(call);
		self
	}

	pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
		self.provider_meta.insert(key.into(), value);
		self
	}

	/// Concatenated text of every message item.
	pub fn text(&self) -> String {
		self.output.iter().filter_map(OutputItem::text).collect()
	}

	/// Output as one JSON object keyed by section.
	///
	/// Messages become `{"role", "text"}` objects under [`MESSAGES_SECTION`]. A structured
	/// section that appears more than once keeps its last value.
	pub fn normalized_output(&self) -> Value {
		let mut object = Map::new();
		for item in &self.output {
			match item {
				OutputItem::Message { role, .. } => {
					let entry = serde_json::json!({ "role": role, "text": item.text().unwrap_or_default() });
					match object.entry(MESSAGES_SECTION).or_insert_with(|| Value::Array(Vec::new())) {
						Value::Array(list) => list.push(entry),
						other => *other = Value::Array(vec![entry]),
					}
				}
				OutputItem::Structured { section, data } => {
					object.insert(section.clone(), data.clone());
				}
			}
		}
		Value::Object(object)
	}
}

/// Incremental piece of a streamed response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
	pub delta: String,
	pub is_final: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
}

impl StreamChunk {
	pub fn delta(delta: impl Into<String>) -> Self {
		Self {
			delta: delta.into(),
			is_final: false,
			usage: None,
		}
	}

	pub fn final_chunk(usage: Option<Usage>) -> Self {
		Self {
			delta: String::new(),
			is_final: true,
			usage,
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	/// Messages and structured sections fold into one object.
	#[test]
	fn test_normalized_output_groups_sections() {
		let response = Response::new(CorrelationId::new())
			.with_output(OutputItem::assistant("Hello, "))
			.with_output(OutputItem::structured("vitals", json!({"pulse": 72})))
			.with_output(OutputItem::assistant("doctor."));

		assert_eq!(response.text(), "Hello, doctor.");
		assert_eq!(
			response.normalized_output(),
			json!({
				"messages": [
					{"role": "assistant", "text": "Hello, "},
					{"role": "assistant", "text": "doctor."}
				],
				"vitals": {"pulse": 72}
			})
		);
	}

	/// Responses built for a request inherit its correlation id and keep a back-reference.
	#[test]
	fn test_for_request_links_back() {
		let request = Arc::new(Request::new("gpt-test").with_message(Role::User, "hi"));
		let response = Response::for_request(Arc::clone(&request));
		assert_eq!(response.correlation_id, request.correlation_id);
		assert!(response.request.as_ref().is_some_and(|r| Arc::ptr_eq(r, &request)));
	}

	/// Wire shape of output items is tagged by kind.
	#[test]
	fn test_output_item_wire_shape() {
		let item = OutputItem::structured("metadata", json!({"grade": "A"}));
		let value = serde_json::to_value(&item).unwrap();
		assert_eq!(value, json!({"kind": "structured", "section": "metadata", "data": {"grade": "A"}}));
		let back: OutputItem = serde_json::from_value(value).unwrap();
		assert_eq!(back.section(), "metadata");
	}
}
