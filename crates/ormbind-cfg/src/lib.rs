//! Deferred mapping resolution for ormbind.
//!
//! This crate provides:
//! - `Mappings`, the fragment repository every binder writes into
//! - Document binding, with out-of-order superclasses parked on the
//!   extends queue
//! - The second-pass queue, drained in a structural wave and a query wave
//! - Property-reference and foreign-key graph resolution
//! - `Configuration`, which runs all of the above in order on `compile()`

pub mod binder;
pub mod config;
pub mod configuration;
pub mod extends;
pub mod foreign_key;
pub mod mappings;
pub mod property_ref;
pub mod second_pass;

pub use binder::{DocumentContext, bind_document, validate_document};
pub use config::MappingConfig;
pub use configuration::{CompileSummary, Configuration, ConfigurationState};
pub use extends::{ExtendsQueueEntry, process_extends_queue};
pub use foreign_key::{resolve_all_foreign_keys, resolve_foreign_keys};
pub use mappings::Mappings;
pub use property_ref::{PropertyReference, resolve_property_references};
pub use second_pass::{CustomOp, SecondPass, Wave, WaveCounts, run_second_passes};
