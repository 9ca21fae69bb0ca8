//! Provider-bound requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::OutputSchema;

/// Opaque token linking a request, its response, and any downstream task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	pub fn as_uuid(&self) -> Uuid {
		self.0
	}
}

impl Default for CorrelationId {
	fn default() -> Self {
		Self::new()
	}
}

impl From<Uuid> for CorrelationId {
	fn from(value: Uuid) -> Self {
		Self(value)
	}
}

impl fmt::Display for CorrelationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	System,
	Developer,
	User,
	Assistant,
	Tool,
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
	Text { text: String },
	ImageUrl { url: String },
	Json { value: serde_json::Value },
}

impl ContentPart {
	pub fn text(text: impl Into<String>) -> Self {
		Self::Text { text: text.into() }
	}

	pub fn as_text(&self) -> Option<&str> {
		match self {
			Self::Text { text } => Some(text),
			_ => None,
		}
	}
}

/// Ordered conversational input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputItem {
	pub role: Role,
	pub content: Vec<ContentPart>,
}

impl InputItem {
	pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
		Self { role, content }
	}

	pub fn text(role: Role, text: impl Into<String>) -> Self {
		Self::new(role, vec![ContentPart::text(text)])
	}
}

/// A callable tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// JSON schema of the tool arguments.
	pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "tool")]
pub enum ToolChoice {
	#[default]
	Auto,
	None,
	Required,
	Named(String),
}

/// Normalized provider request. Immutable once built; use the `with_*` methods to derive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
	pub model: String,
	pub input: Vec<InputItem>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub output_schema: Option<OutputSchema>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tools: Vec<ToolSpec>,
	#[serde(default)]
	pub tool_choice: ToolChoice,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_output_tokens: Option<u32>,
	#[serde(default)]
	pub stream: bool,
	#[serde(default)]
	pub correlation_id: CorrelationId,
}

impl Request {
	pub fn new(model: impl Into<String>) -> Self {
		Self {
			model: model.into(),
			input: Vec::new(),
			output_schema: None,
			tools: Vec::new(),
			tool_choice: ToolChoice::Auto,
			temperature: None,
			max_output_tokens: None,
			stream: false,
			correlation_id: CorrelationId::new(),
		}
	}

	pub fn with_input(mut self, item: InputItem) -> Self {
		self.input.push(item);
		self
	}

	pub fn with_message(self, role: Role, text: impl Into<String>) -> Self {
		self.with_input(InputItem::text(role, text))
	}

	pub fn with_output_schema(mut self, schema: OutputSchema) -> Self {
		self.output_schema = Some(schema);
		self
	}

	pub fn with_tool(mut self, tool: ToolSpec) -> Self {
		self.tools.push(tool);
		self
	}

	pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
		self.tool_choice = choice;
		self
	}

	pub fn with_temperature(mut self, temperature: f32) -> Self {
		self.temperature = Some(temperature);
		self
	}

	pub fn with_max_output_tokens(mut self, max: u32) -> Self {
		self.max_output_tokens = Some(max);
		self
	}

	pub fn with_stream(mut self, stream: bool) -> Self {
		self.stream = stream;
		self
	}

	pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
		self.correlation_id = id;
		self
	}
}
