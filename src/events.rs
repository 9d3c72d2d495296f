//! Descriptive events emitted for observers.
//!
//! Each successful transition emits at most one event carrying the
//! relevant ids and the changed entity. Events are observational only;
//! replicas derive state from the view, never from events.
//!
//! Events deliberately carry no generated ids and no wall-clock fields:
//! anything nondeterministic here would diverge between replicas. The
//! embedded entities already carry the logical timestamps that matter.

use serde::{Deserialize, Serialize};

use crate::types::{Agent, MatchProposal, MatchRequest};

/// Observer payload for one applied transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryEvent {
    AgentRegistered {
        agent: Agent,
    },
    AgentUpdated {
        agent: Agent,
    },
    AgentUnregistered {
        agent_id: String,
        name: String,
    },
    MatchRequestCreated {
        request: MatchRequest,
    },
    MatchProposed {
        proposal: MatchProposal,
    },
    MatchAccepted {
        request: MatchRequest,
        proposal: MatchProposal,
        /// Channel derived deterministically from the match id.
        channel_id: String,
    },
    MatchCompleted {
        request: MatchRequest,
        /// Counter-party whose reputation received the rating, if any.
        rated_agent: Option<String>,
    },
    ChannelJoined {
        channel_id: String,
        agent_id: String,
        members: Vec<String>,
    },
    ChannelLeft {
        channel_id: String,
        agent_id: String,
        members: Vec<String>,
    },
    MessageRecorded {
        channel_id: Option<String>,
        /// Message counter after the increment.
        messages: u64,
    },
}

impl DirectoryEvent {
    /// Event type discriminator, as it appears on the wire.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AgentRegistered { .. } => "agent_registered",
            Self::AgentUpdated { .. } => "agent_updated",
            Self::AgentUnregistered { .. } => "agent_unregistered",
            Self::MatchRequestCreated { .. } => "match_request_created",
            Self::MatchProposed { .. } => "match_proposed",
            Self::MatchAccepted { .. } => "match_accepted",
            Self::MatchCompleted { .. } => "match_completed",
            Self::ChannelJoined { .. } => "channel_joined",
            Self::ChannelLeft { .. } => "channel_left",
            Self::MessageRecorded { .. } => "message_recorded",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
