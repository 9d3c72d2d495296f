//! Read surface for dashboards and host tooling.
//!
//! Every function here is a pure read over a consistent snapshot of the
//! view; the host guarantees queries never interleave with a running
//! transition. Listings iterate the ordered view, so two replicas with
//! identical views return identically ordered results.

use serde::Serialize;

use crate::error::DirectoryError;
use crate::types::{Agent, AgentStatus, DirectoryStats, MatchProposal, MatchRequest, MatchStatus, Reputation};
use crate::view::{get_entity, keys, KvView};

/// Stats snapshot handed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsReport {
    pub agents: u64,
    pub channels: u64,
    pub messages: u64,
    /// Timestamp last injected by the host's heartbeat source, if any.
    pub last_heartbeat: Option<i64>,
}

/// Fetch one agent by id.
pub fn get_agent(view: &impl KvView, id: &str) -> Result<Option<Agent>, DirectoryError> {
    get_entity(view, &keys::agent(id))
}

/// List agents in id order, optionally filtered by status.
pub fn get_agents(
    view: &impl KvView,
    status: Option<AgentStatus>,
    limit: Option<usize>,
) -> Result<Vec<Agent>, DirectoryError> {
    let cap = limit.unwrap_or(usize::MAX);
    let mut agents = Vec::new();
    for key in view.keys_with_prefix(keys::AGENT_PREFIX) {
        if agents.len() == cap {
            break;
        }
        let agent = get_entity::<Agent>(view, &key)?.ok_or_else(|| DirectoryError::Corrupt {
            key: key.clone(),
            detail: "agent key listed but value missing".into(),
        })?;
        if let Some(wanted) = status {
            if agent.status != wanted {
                continue;
            }
        }
        agents.push(agent);
    }
    Ok(agents)
}

/// List match requests in id order, optionally filtered.
pub fn get_match_requests(
    view: &impl KvView,
    status: Option<MatchStatus>,
    requester_id: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<MatchRequest>, DirectoryError> {
    let cap = limit.unwrap_or(usize::MAX);
    let mut requests = Vec::new();
    for key in view.keys_with_prefix(keys::MATCH_PREFIX) {
        if requests.len() == cap {
            break;
        }
        let request =
            get_entity::<MatchRequest>(view, &key)?.ok_or_else(|| DirectoryError::Corrupt {
                key: key.clone(),
                detail: "match key listed but value missing".into(),
            })?;
        if let Some(wanted) = status {
            if request.status != wanted {
                continue;
            }
        }
        if let Some(requester) = requester_id {
            if request.requester_id != requester {
                continue;
            }
        }
        requests.push(request);
    }
    Ok(requests)
}

/// All proposals on one match, in proposer-id order.
pub fn get_match_proposals(
    view: &impl KvView,
    match_id: &str,
) -> Result<Vec<MatchProposal>, DirectoryError> {
    let mut proposals = Vec::new();
    for key in view.keys_with_prefix(&keys::proposal_prefix(match_id)) {
        let proposal =
            get_entity::<MatchProposal>(view, &key)?.ok_or_else(|| DirectoryError::Corrupt {
                key: key.clone(),
                detail: "proposal key listed but value missing".into(),
            })?;
        proposals.push(proposal);
    }
    Ok(proposals)
}

/// Current member ids of a channel, sorted. Unknown channels are empty.
pub fn get_channel_members(
    view: &impl KvView,
    channel_id: &str,
) -> Result<Vec<String>, DirectoryError> {
    Ok(get_entity::<Vec<String>>(view, &keys::channel(channel_id))?.unwrap_or_default())
}

/// Rating history for one agent, if any ratings were recorded.
pub fn get_reputation(
    view: &impl KvView,
    agent_id: &str,
) -> Result<Option<Reputation>, DirectoryError> {
    get_entity(view, &keys::reputation(agent_id))
}

/// Global counters plus the host-injected heartbeat.
pub fn get_stats(view: &impl KvView) -> Result<StatsReport, DirectoryError> {
    let stats = get_entity::<DirectoryStats>(view, keys::STATS)?.unwrap_or_default();
    let last_heartbeat = get_entity::<i64>(view, keys::HEARTBEAT)?;
    Ok(StatsReport {
        agents: stats.agents,
        channels: stats.channels,
        messages: stats.messages,
        last_heartbeat,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
