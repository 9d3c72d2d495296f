//! Directory entities stored in the view.
//!
//! Everything here is plain serde data. Entities are written wholesale by
//! transitions and never mutated in place across commands, which keeps the
//! reducer a pure function of (view, payload, context).

use serde::{Deserialize, Serialize};

/// Clamp a value into the unit interval.
///
/// Proficiency and proposal scores are clamped on every write, never
/// rejected.
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Wire protocol an agent speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Native directory protocol.
    Native,
    /// Agent-to-Agent protocol endpoint.
    A2a,
    /// Model Context Protocol endpoint.
    Mcp,
    /// Anything else; the endpoint string carries the details.
    Custom,
}

/// Whether an agent is eligible for discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

/// Agent availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
    Busy,
}

/// A named skill with a self-reported proficiency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapability {
    pub name: String,

    /// Proficiency in [0, 1]. Clamped on write.
    pub proficiency: f64,

    #[serde(default)]
    pub certified: bool,

    /// Identity that issued the certification, if any.
    #[serde(default)]
    pub certified_by: Option<String>,

    /// Logical timestamp of certification, if any.
    #[serde(default)]
    pub certified_at: Option<i64>,
}

impl AgentCapability {
    /// Clamp the proficiency into the unit interval.
    pub fn clamp(&mut self) {
        self.proficiency = clamp_unit(self.proficiency);
    }
}

/// One registered participant.
///
/// The id is the signer's identity, assigned externally and stable for
/// the agent's lifetime. The engine never generates agent ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,

    /// Unique across all agents, case-sensitive.
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub capabilities: Vec<AgentCapability>,

    pub protocol: Protocol,

    pub visibility: Visibility,

    pub status: AgentStatus,

    /// Opaque contact string; not validated.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Accepted matches this agent was party to. Monotone.
    pub match_count: u64,

    /// Successful completions this agent was rated for. Monotone.
    pub success_count: u64,

    /// Logical timestamps from the command context.
    pub created_at: i64,
    pub updated_at: i64,
}

impl Agent {
    /// Capability names in declaration order.
    pub fn capability_names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Matchmaking
// ---------------------------------------------------------------------------

/// Request lifecycle: `pending -> accepted -> completed`.
///
/// There is no rejected terminal state for the request itself; individual
/// proposals are rejected independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Completed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Completed => "completed",
        }
    }
}

/// A task-shaped query seeking agents whose capabilities satisfy it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    /// Derived deterministically from requester id and creation timestamp.
    pub id: String,

    pub requester_id: String,

    /// Non-empty; enforced at transition time.
    pub required_capabilities: Vec<String>,

    /// Minimum acceptable proposal score in [0, 1].
    pub min_score: f64,

    #[serde(default)]
    pub task_description: String,

    #[serde(default)]
    pub preferred_protocols: Vec<Protocol>,

    /// Lazy expiry bound: proposals after this instant are rejected.
    pub expires_at: i64,

    pub created_at: i64,

    pub status: MatchStatus,

    /// Proposer the requester accepted, once accepted.
    #[serde(default)]
    pub accepted_with: Option<String>,

    /// Outcome flag set on completion.
    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default)]
    pub feedback: Option<String>,

    #[serde(default)]
    pub completed_at: Option<i64>,
}

/// Proposal lifecycle: `proposed -> accepted | rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Proposed,
    Accepted,
    Rejected,
}

/// An agent's bid to fulfill a match request.
///
/// One per (request, proposer) pair; re-proposing overwrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchProposal {
    pub match_id: String,
    pub proposer_id: String,

    /// Self-reported fit in [0, 1]. Clamped on write.
    pub score: f64,

    pub matched_capabilities: Vec<String>,

    pub proposed_at: i64,

    pub status: ProposalStatus,
}

// ---------------------------------------------------------------------------
// Reputation
// ---------------------------------------------------------------------------

/// One rating applied at match completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub rating: f64,
    /// Identity of the rater.
    pub from: String,
    pub match_id: String,
    pub timestamp: i64,
}

/// Full rating history for one agent.
///
/// The average is recomputed from the complete list on every append. The
/// O(n) cost buys an auditable history and an exactly reproducible mean,
/// which the determinism contract requires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reputation {
    pub total_ratings: u64,
    pub average_rating: f64,
    pub ratings: Vec<RatingRecord>,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Global counters, maintained inside the same transition that changes
/// the underlying collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryStats {
    /// Currently registered agents.
    pub agents: u64,
    /// Channels ever seen (first join increments; leave never decrements).
    pub channels: u64,
    /// Messages recorded.
    pub messages: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(0.5), 0.5);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(1.7), 1.0);
    }

    #[test]
    fn test_capability_clamp() {
        let mut cap = AgentCapability {
            name: "search".into(),
            proficiency: 1.5,
            certified: false,
            certified_by: None,
            certified_at: None,
        };
        cap.clamp();
        assert_eq!(cap.proficiency, 1.0);
    }

    #[test]
    fn test_protocol_wire_form() {
        assert_eq!(serde_json::to_string(&Protocol::A2a).unwrap(), "\"a2a\"");
        assert_eq!(
            serde_json::from_str::<Protocol>("\"native\"").unwrap(),
            Protocol::Native
        );
        assert!(serde_json::from_str::<Protocol>("\"smtp\"").is_err());
    }

    #[test]
    fn test_match_status_wire_form() {
        assert_eq!(
            serde_json::to_string(&MatchStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(MatchStatus::Accepted.as_str(), "accepted");
    }

    #[test]
    fn test_agent_roundtrip_with_defaults() {
        let json = serde_json::json!({
            "id": "a1",
            "name": "scout",
            "capabilities": [{"name": "search", "proficiency": 0.9}],
            "protocol": "native",
            "visibility": "public",
            "status": "online",
            "match_count": 0,
            "success_count": 0,
            "created_at": 100,
            "updated_at": 100
        });
        let agent: Agent = serde_json::from_value(json).unwrap();
        assert_eq!(agent.capability_names(), vec!["search"]);
        assert!(agent.endpoint.is_none());
        assert!(!agent.capabilities[0].certified);
    }
}
