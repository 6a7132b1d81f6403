//! Pipeline self-repair.
//!
//! The [`RecoverySupervisor`] audits the critical set of automation scripts
//! and workflows, regenerates what is missing or broken, and reports the
//! result as an issue.

mod artifacts;
mod supervisor;

pub use artifacts::{ArtifactKind, PipelineArtifact, critical_set};
pub use supervisor::{RecoveryReport, RecoverySupervisor};
