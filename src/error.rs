//! Error types for the directory engine.
//!
//! Every variant is a local precondition failure raised *before* the first
//! view write, so a failed command leaves the view untouched. The engine
//! never retries; surfacing a rejected command back to its submitter is the
//! host's job.

use thiserror::Error;

/// Errors produced by command validation and state transitions.
#[derive(Debug, Error, PartialEq)]
pub enum DirectoryError {
    /// Payload failed schema validation (wrong type, missing field,
    /// out-of-range value). The transition never ran.
    #[error("validation failed for '{command}': {reason}")]
    Validation { command: String, reason: String },

    /// Another agent already owns the requested name.
    #[error("agent name '{name}' is already registered")]
    DuplicateName { name: String },

    /// The signer has no agent entry.
    #[error("agent '{agent_id}' is not registered")]
    NotRegistered { agent_id: String },

    /// The signer is not allowed to perform this transition on the target.
    #[error("agent '{agent_id}' is not authorized to act on match '{match_id}'")]
    Unauthorized { agent_id: String, match_id: String },

    /// No match request with this id exists.
    #[error("match request '{match_id}' not found")]
    RequestNotFound { match_id: String },

    /// The request's expiry timestamp has passed.
    #[error("match request '{match_id}' expired at {expires_at}")]
    RequestExpired { match_id: String, expires_at: i64 },

    /// The request is in a terminal or non-pending state.
    #[error("match request '{match_id}' is not pending (status: {status})")]
    RequestNotPending { match_id: String, status: String },

    /// No proposal from this proposer exists on the request.
    #[error("no proposal from '{proposer_id}' on match '{match_id}'")]
    ProposalNotFound {
        match_id: String,
        proposer_id: String,
    },

    /// A match request must name at least one required capability.
    #[error("match request requires at least one capability")]
    EmptyCapabilitySet,

    /// A corrupt or missing entity was found where one must exist. This
    /// indicates index/entity desync and should halt replication for the
    /// replica, since it means non-determinism crept in.
    #[error("view corruption at key '{key}': {detail}")]
    Corrupt { key: String, detail: String },
}

impl DirectoryError {
    /// Shorthand for a validation failure.
    pub fn validation(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            command: command.into(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
