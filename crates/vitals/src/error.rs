//! Error type for the vitals library.

use thiserror::Error;

/// Errors that can occur while preparing or running a status report.
///
/// Transport failures inside a check never surface here; they are converted
/// into status records at the check boundary. This enum covers configuration
/// errors rejected at startup and the one run-level failure: cancellation.
#[derive(Error, Debug)]
pub enum VitalsError {
    /// A check name on the command line is not in the registry.
    #[error("unknown check '{0}', expected one of: {1}")]
    UnknownCheck(String, String),

    /// No rows to report on (empty node list).
    #[error("node list is empty, nothing to report")]
    NoNodes,

    /// The run was interrupted; outstanding work was abandoned and no
    /// partial table was printed.
    #[error("run cancelled by interrupt")]
    Cancelled,

    /// Invalid configuration rejected at startup.
    #[error("invalid configuration: {0}")]
    Config(String),
}
