//! Data models for speval-orch
//!
//! - Parent task and component job rows with their shared status state machine
//! - The closed enumeration of component kinds and their wave assignment
//! - Outcome records and job argument schemas

pub mod component_job;
pub mod component_kind;
pub mod job;
pub mod outcome;
pub mod parent_task;
pub mod task_status;

pub use component_job::{ComponentJob, FlaggedWord, TranscriptPayload};
pub use component_kind::{ComponentKind, Wave};
pub use job::{JobArgs, JobHandle};
pub use outcome::{NewOutcome, OutcomeRecord};
pub use parent_task::{DispatchMarker, ParentTask, SubmissionMetadata};
pub use task_status::TaskStatus;
