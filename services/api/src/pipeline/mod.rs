//! services/api/src/pipeline/mod.rs
//!
//! The exam-generation pipeline and the download path. Everything in here talks to
//! the outside world only through the ports defined in the `core` crate.

pub mod composer;
pub mod downloads;
pub mod events;
pub mod gateway;
pub mod job;
pub mod materials;
pub mod preview;
pub mod submissions;

pub use events::{EventSink, JobEvent};
pub use gateway::{ProviderRegistry, ProviderSettings};
pub use job::{JobContext, JobError, JobStage, ValidatedJob};
