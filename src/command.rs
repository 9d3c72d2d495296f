//! The closed command surface of the engine.
//!
//! The source system dispatched on command-name strings through a runtime
//! handler table. Here the surface is a closed enum: `schema::parse_command`
//! is the only place a wire name is interpreted, and `Engine::apply` gets
//! compile-time exhaustiveness over every transition.

use serde::{Deserialize, Serialize};

use crate::types::{AgentCapability, AgentStatus, Protocol, Visibility};

/// Authenticated context delivered alongside every command.
///
/// `signer_id` is the externally verified identity of the submitter.
/// `timestamp` is the logical time assigned by the replicated log; the
/// engine never reads a wall clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandContext {
    pub signer_id: String,
    pub timestamp: i64,
}

impl CommandContext {
    pub fn new(signer_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            signer_id: signer_id.into(),
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Payload for `register`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPayload {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<AgentCapability>,
    pub protocol: Protocol,
    pub visibility: Visibility,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Payload for `update`. Absent fields keep their previous values;
/// `capabilities` is full-replacement, never a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    #[serde(default)]
    pub status: Option<AgentStatus>,
    #[serde(default)]
    pub capabilities: Option<Vec<AgentCapability>>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Payload for `create_match_request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMatchPayload {
    pub required_capabilities: Vec<String>,
    pub min_score: f64,
    #[serde(default)]
    pub task_description: String,
    /// Milliseconds until the request stops accepting proposals.
    pub ttl: i64,
    #[serde(default)]
    pub preferred_protocols: Vec<Protocol>,
}

/// Payload for `propose_match`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposePayload {
    pub match_id: String,
    pub score: f64,
    pub matched_capabilities: Vec<String>,
}

/// Payload for `accept_match`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptPayload {
    pub match_id: String,
    pub proposer_id: String,
}

/// Payload for `complete_match`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletePayload {
    pub match_id: String,
    pub success: bool,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// Every transition the engine knows how to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload", rename_all = "snake_case")]
pub enum Command {
    Register(RegisterPayload),
    Update(UpdatePayload),
    Unregister,
    CreateMatchRequest(CreateMatchPayload),
    ProposeMatch(ProposePayload),
    AcceptMatch(AcceptPayload),
    CompleteMatch(CompletePayload),
    JoinChannel { channel_id: String },
    LeaveChannel { channel_id: String },
    RecordMessage { channel_id: Option<String> },
}

impl Command {
    /// Wire name of the command, for logging and error context.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::Update(_) => "update",
            Self::Unregister => "unregister",
            Self::CreateMatchRequest(_) => "create_match_request",
            Self::ProposeMatch(_) => "propose_match",
            Self::AcceptMatch(_) => "accept_match",
            Self::CompleteMatch(_) => "complete_match",
            Self::JoinChannel { .. } => "join_channel",
            Self::LeaveChannel { .. } => "leave_channel",
            Self::RecordMessage { .. } => "record_message",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
