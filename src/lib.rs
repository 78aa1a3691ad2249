/*!
 * CDR Worker - per-file orchestration for content disarm and reconstruction
 *
 * For one input file and a policy, the worker drives classification,
 * archive short-circuiting, analysis, rebuild and escalation to an external
 * decision authority, and produces:
 * - exactly one outcome message (Unmodified, Replaced or Failed)
 * - an ordered trail of lifecycle events
 * - on Replaced, the artifact at the output location
 *
 * The run is bounded by a deadline; timeouts and unexpected failures
 * converge on a Failed outcome after the output location is cleaned up.
 */

pub mod authority;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod report;
pub mod system;

// Scripted collaborators for tests
pub mod testing;

// Re-export commonly used types
pub use config::{ContentManagementPolicy, WorkerConfig};
pub use core::{
    Collaborators, Disposition, EscalationVerdict, FileCategory, HeaderSet, ProcessingSupervisor,
    WorkItem,
};
pub use error::{Result, WorkerError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
