//! Core domain logic for EverythingPDF.
//!
//! Inputs flow through [`classify`] → [`admission`] → [`queue`], and a build
//! turns a queue snapshot (plus an optional base document) into one PDF via
//! [`assembler`]. [`session::Session`] ties these together with the plan tier,
//! the build state machine, and optional publishing.

pub mod admission;
pub mod assembler;
pub mod build;
pub mod classify;
pub mod queue;
mod raster;
pub mod session;

pub use admission::{AdmissionReport, admit};
pub use assembler::{AssembleResult, BaseDocument, LoadedInput, assemble, assemble_loaded, page_count};
pub use build::{
    ArtifactSummary, BuildArtifact, BuildFailure, BuildSession, BuildState, BuildToken, Completion,
};
pub use classify::{
    Classification, Payload, QueuedInput, RawInput, RejectReason, RejectedInput, classify,
    classify_batch, media_type_for_path,
};
pub use queue::{Queue, QueueSnapshot};
pub use session::{
    AddOutcome, BuildCompletion, BuildTicket, PublishCompletion, PublishTicket, Session,
};
