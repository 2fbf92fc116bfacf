//! Domain types for the GitHub connector.
//!
//! This module contains the core data structures:
//! - Profile, Repository, Stats: normalized step outputs
//! - Step: the named units of work
//! - Events: Immutable records of run state changes
//! - Run: Workflow execution state

pub mod events;
pub mod profile;
pub mod repository;
pub mod run;
pub mod stats;
pub mod step;

// Re-export commonly used types
pub use events::{Event, EventType, StepStatus};
pub use profile::{UserProfile, NOT_AVAILABLE, NO_BIO};
pub use repository::{RepositoryCollection, RepositoryRecord};
pub use run::{Run, RunState, WORKFLOW_NAME};
pub use stats::{RawData, SummaryStatistics};
pub use step::StepKind;
