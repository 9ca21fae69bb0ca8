//! Host configuration for switchboard.
//!
//! Settings are read from a TOML file, then overlaid with `SWITCHBOARD_*` environment
//! variables. All sections and keys are optional:
//!
//! ```toml
//! [registry]
//! collision_policy = "strict"        # or "lenient"
//! strip_tokens = ["generate"]
//! app_label = "TeleMed"
//! discovery = ["telemed::services::*"]
//! freeze = true
//!
//! [registry.namespace_strip_tokens]
//! telemed = ["chat"]
//!
//! [dispatch]
//! default_backend = "immediate"
//! default_mode = "sync"              # "enqueue" | "stream"
//! backend_fallback = false
//! queue_capacity = 1024
//! default_timeout_ms = 30000
//! retain_terminal_ms = 600000
//!
//! [logging]
//! filter = "switchboard_worker=debug,info"
//! ansi = true
//! ```
//!
//! # Environment
//!
//! | Variable | Setting |
//! |---|---|
//! | `SWITCHBOARD_DEFAULT_BACKEND` | `dispatch.default_backend` |
//! | `SWITCHBOARD_DEFAULT_MODE` | `dispatch.default_mode` |
//! | `SWITCHBOARD_BACKEND_FALLBACK` | `dispatch.backend_fallback` |
//! | `SWITCHBOARD_QUEUE_CAPACITY` | `dispatch.queue_capacity` |
//! | `SWITCHBOARD_DEFAULT_TIMEOUT_MS` | `dispatch.default_timeout_ms` |
//! | `SWITCHBOARD_RETAIN_TERMINAL_MS` | `dispatch.retain_terminal_ms` |
//! | `SWITCHBOARD_COLLISION_POLICY` | `registry.collision_policy` |
//! | `SWITCHBOARD_STRIP_TOKENS` | appended to `registry.strip_tokens` (comma list) |
//! | `SWITCHBOARD_DISCOVERY` | replaces `registry.discovery` (comma list) |
//! | `SWITCHBOARD_APP_LABEL` | `registry.app_label` |
//! | `SWITCHBOARD_FREEZE` | `registry.freeze` |
//! | `SWITCHBOARD_LOG` | `logging.filter` |

mod env;
pub mod error;
mod logging;
mod settings;


pub use env::PREFIX as ENV_PREFIX;
pub use error::{ConfigError, Result};
pub use logging::{DEFAULT_FILTER, env_filter, init_tracing};
pub use settings::{DispatchSettings, LoggingSettings, RegistrySettings, Settings};
