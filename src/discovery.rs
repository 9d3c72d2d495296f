//! Discovery: rank public agents against a capability query.
//!
//! A pure read path. Candidates are seeded from the capability index
//! (one view read per requested name), never from a full agent scan;
//! the scan over candidates only filters and scores.
//!
//! Scoring convention: an empty capability list means "browse everyone"
//! and gives every public agent a score of 1.0. A non-empty list scores
//! each candidate by the sum of its matching proficiencies divided by
//! the number of requested capabilities, and drops candidates that
//! match nothing.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::DirectoryError;
use crate::index;
use crate::types::{Agent, AgentStatus, Visibility};
use crate::view::{get_entity, keys, KvView};

/// Result cap applied when the caller does not pass one.
pub const DEFAULT_DISCOVERY_LIMIT: usize = 50;

/// Parameters for one discovery query.
#[derive(Debug, Clone)]
pub struct DiscoveryQuery {
    /// Requested capability names; empty means "browse everyone".
    pub capabilities: Vec<String>,
    /// Accepted for interface compatibility; does not constrain
    /// candidates. See DESIGN.md.
    pub categories: Vec<String>,
    /// Capabilities below this proficiency do not count toward the score.
    pub min_proficiency: f64,
    /// Restrict to agents in this status.
    pub status: Option<AgentStatus>,
    pub limit: usize,
}

impl Default for DiscoveryQuery {
    fn default() -> Self {
        Self {
            capabilities: Vec::new(),
            categories: Vec::new(),
            min_proficiency: 0.0,
            status: None,
            limit: DEFAULT_DISCOVERY_LIMIT,
        }
    }
}

impl DiscoveryQuery {
    /// Query for the given capability names with defaults elsewhere.
    pub fn for_capabilities<S: Into<String>>(capabilities: Vec<S>) -> Self {
        Self {
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// One ranked discovery hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredAgent {
    pub agent: Agent,
    pub score: f64,
    /// Requested capability names this agent satisfied.
    pub matched_capabilities: Vec<String>,
}

/// Rank public agents against `query`.
///
/// Results are sorted by score descending; equal scores order by
/// ascending agent id (the iteration order of the ordered view), which
/// is the documented deterministic tie-break.
pub fn discover(
    view: &impl KvView,
    query: &DiscoveryQuery,
) -> Result<Vec<ScoredAgent>, DirectoryError> {
    let filtered = !query.capabilities.is_empty();

    // Candidate seeding: index union for a filtered query, every agent
    // otherwise. The BTreeSet keeps candidates sorted and deduplicated.
    let mut candidates: BTreeSet<String> = BTreeSet::new();
    if filtered {
        for name in &query.capabilities {
            for id in index::agents_for(view, name)? {
                candidates.insert(id);
            }
        }
    } else {
        for key in view.keys_with_prefix(keys::AGENT_PREFIX) {
            candidates.insert(key.trim_start_matches(keys::AGENT_PREFIX).to_string());
        }
    }

    let mut hits: Vec<ScoredAgent> = Vec::new();
    for id in candidates {
        // An indexed id without an agent record is index/agent desync,
        // which replicas must treat as fatal, not as an empty result.
        let agent =
            get_entity::<Agent>(view, &keys::agent(&id))?.ok_or_else(|| {
                DirectoryError::Corrupt {
                    key: keys::agent(&id),
                    detail: "agent listed in capability index but not stored".into(),
                }
            })?;

        if agent.visibility != Visibility::Public {
            continue;
        }
        if let Some(status) = query.status {
            if agent.status != status {
                continue;
            }
        }

        let (score, matched) = score_agent(&agent, query, filtered);
        if filtered && matched.is_empty() {
            continue;
        }

        hits.push(ScoredAgent {
            agent,
            score,
            matched_capabilities: matched,
        });
    }

    // Stable sort: ties keep the ascending-id candidate order.
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(query.limit);
    Ok(hits)
}

/// Score one candidate. Returns the score and the matched capability
/// names in the agent's declaration order.
fn score_agent(agent: &Agent, query: &DiscoveryQuery, filtered: bool) -> (f64, Vec<String>) {
    if !filtered {
        return (1.0, Vec::new());
    }

    let mut sum = 0.0;
    let mut matched = Vec::new();
    for cap in &agent.capabilities {
        if query.capabilities.iter().any(|c| c == &cap.name)
            && cap.proficiency >= query.min_proficiency
        {
            sum += cap.proficiency;
            matched.push(cap.name.clone());
        }
    }

    (sum / query.capabilities.len().max(1) as f64, matched)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
