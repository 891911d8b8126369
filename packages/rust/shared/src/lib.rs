//! Shared types, error model, and configuration for Darwin.
//!
//! This crate is the foundation depended on by all other Darwin crates.
//! It provides:
//! - [`DarwinError`]: the unified error type and its stable [`ErrorKind`]
//! - Domain types ([`DocumentRequest`] and its sub-records, [`RequestId`])
//! - Output formats ([`OutputFormat`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod format;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConverterConfig, ConverterKind, NamingConfig, PathsConfig, config_dir,
    config_file_path, init_config, init_config_at, load_config, load_config_from,
};
pub use error::{DarwinError, ErrorKind, Result};
pub use format::OutputFormat;
pub use types::{
    Actor, DataExchange, Database, DnsName, DocumentReference, DocumentRequest, ExternalDependency,
    FunctionalBlock, FunctionalSchema, GlossaryItem, NetworkFlow, NfsShare, ObjectStorage,
    OutboundDependency, PhysicalComponent, RequestId, TechnologyChoice, Container, VirtualMachine,
};
