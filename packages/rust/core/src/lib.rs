//! Agent creation and knowledge association for Voice Bolt.
//!
//! This crate provides:
//! - [`prompt`]: persona templates for a company's agent
//! - [`probe`]: where a document id may appear in an agent representation
//! - [`strategies`]: the ordered association request ladder
//! - [`reconcile`]: the best-effort link reconciler
//! - [`pipeline`]: the end-to-end `create` workflow

pub mod pipeline;
pub mod probe;
pub mod prompt;
pub mod reconcile;
pub mod strategies;

pub use pipeline::{
    CreateAgentOutcome, PipelineOptions, ProgressReporter, Services, SilentProgress, create_agent,
    link_document,
};
pub use probe::{DocumentLocation, KNOWN_LOCATIONS, find_document};
pub use reconcile::{AssociationOutcome, Reconciler};
pub use strategies::{AssociationRequest, PatchStrategy, PayloadShape, association_ladder};
