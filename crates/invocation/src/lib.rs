//! Provider-neutral invocation types.
//!
//! [`Request`] and [`Response`] are the only shapes exchanged across the provider boundary.
//! Every adapter implements [`Provider`] and consumes or produces exactly these types;
//! vendor wire formats never leave the adapter.

pub mod provider;
pub mod request;
pub mod response;
pub mod schema;

pub use provider::{Provider, ProviderError, ProviderStream};
pub use request::{ContentPart, CorrelationId, InputItem, Request, Role, ToolChoice, ToolSpec};
pub use response::{MESSAGES_SECTION, OutputItem, Response, StreamChunk, ToolCall, Usage};
pub use schema::{OutputSchema, Violation};
