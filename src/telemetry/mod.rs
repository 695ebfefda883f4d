//! Structured logging for the library.
//!
//! The library only emits `tracing` events; it never installs a global
//! subscriber on its own behalf. An embedding binary calls [`LoggingBuilder`]
//! (or rolls its own `tracing_subscriber` setup) at startup.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use taskmesh::telemetry::{LoggingBuilder, LogFormat};
//!
//! LoggingBuilder::new()
//!     .with_format(LogFormat::Pretty)
//!     .init()?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, LogLevel, LoggingConfig};
pub use logging::LoggingBuilder;
