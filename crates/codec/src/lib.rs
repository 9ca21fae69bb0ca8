//! Codecs: provider output to persisted domain state.
//!
//! A [`Codec`] is a registry component that declares the shape it expects from a provider,
//! how output sections map to entity kinds, and which pipeline stages it runs. A
//! [`CodecPipeline`] binds a codec to a [`Sink`] and optional [`Emitter`]s and runs
//! validate, restructure, persist and emit in that order.

mod codec;
mod emit;
mod error;
mod pipeline;
mod record;
mod sink;

pub use codec::{Codec, CodecHandle, CodecOptions, SectionMap, Stages, UnknownSection, register_codec};
pub use emit::{BroadcastEmitter, Committed, Emitter};
pub use error::{CodecError, EmitError, PersistError, SinkError, ValidationError};
pub use pipeline::{CodecPipeline, PipelineReport, Restructured};
pub use record::{DomainRecord, EntityKind};
pub use sink::{InMemorySink, Sink, Transaction};
