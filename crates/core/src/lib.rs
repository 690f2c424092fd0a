//! Placeholder resolution engine for Kubernetes manifests
//!
//! Documents carry placeholder markers such as `<password>` or
//! `<path:secret/data/db#password>`. The engine fetches the referenced secret
//! data through a [`SecretCache`](vaultplate_secrets::SecretCache), substitutes
//! every marker and validates the result against the document's kind.
//!
//! The pieces, leaf first:
//! - [`placeholder`]: marker grammar
//! - [`resolver`]: substitution of one scalar against fetched data
//! - [`walker`]: recursive traversal with error aggregation
//! - [`adapter`]: per-kind scope, coercion and schema validation
//! - [`orchestrator`]: per-document and batch driver

pub mod adapter;
pub mod error;
pub mod orchestrator;
pub mod placeholder;
pub mod resolver;
pub mod walker;

pub use adapter::{
    Coercion, ConfigMapAdapter, GenericAdapter, ResourceAdapter, SecretAdapter, adapter_for,
};
pub use error::{DocumentError, PlaceholderFailure, ResolutionCause, ResolutionError, Result};
pub use orchestrator::{
    DEFAULT_CONCURRENCY, DocumentOutcome, IGNORE_ANNOTATION, Orchestrator, OrchestratorConfig,
    PATH_ANNOTATION,
};
pub use placeholder::{Placeholder, SourceRef};
pub use resolver::{Resolved, SecretSources, resolve_scalar};
pub use walker::{FieldPath, SourceDemand};
