//! The deterministic state-transition engine.
//!
//! One command at a time, strictly ordered by the external replicated
//! log: the engine validates, reads the current entities, computes the
//! full replacement set in memory, writes it back, and optionally emits
//! one descriptive event. Transitions are pure functions of
//! `(view, payload, context)`; nothing here reads a clock, draws
//! randomness, or performs I/O beyond the view.
//!
//! Dispatch is an exhaustive `match` over the closed [`Command`] enum,
//! so adding a transition without wiring it in is a compile error.

mod agents;
mod matches;

use serde_json::Value;

use crate::command::{Command, CommandContext};
use crate::error::DirectoryError;
use crate::events::DirectoryEvent;
use crate::schema;
use crate::types::DirectoryStats;
use crate::view::{get_entity, keys, put_entity, KvView};

pub use matches::channel_for_match;

/// The state-transition engine.
///
/// Stateless by construction: all state lives in the view, so a replica
/// can be rebuilt from an empty view and the command log alone.
#[derive(Debug, Default)]
pub struct Engine;

impl Engine {
    pub fn new() -> Self {
        Self
    }

    /// Apply one pre-validated command.
    ///
    /// Every failure is raised before the first view write; a returned
    /// error guarantees the view is untouched.
    pub fn apply<V: KvView>(
        &self,
        view: &mut V,
        ctx: &CommandContext,
        command: Command,
    ) -> Result<Option<DirectoryEvent>, DirectoryError> {
        log::debug!(
            "applying '{}' from {} at {}",
            command.name(),
            ctx.signer_id,
            ctx.timestamp
        );

        let event = match command {
            Command::Register(payload) => agents::register(view, ctx, payload)?,
            Command::Update(payload) => agents::update(view, ctx, payload)?,
            Command::Unregister => agents::unregister(view, ctx)?,
            Command::CreateMatchRequest(payload) => matches::create_request(view, ctx, payload)?,
            Command::ProposeMatch(payload) => matches::propose(view, ctx, payload)?,
            Command::AcceptMatch(payload) => matches::accept(view, ctx, payload)?,
            Command::CompleteMatch(payload) => matches::complete(view, ctx, payload)?,
            Command::JoinChannel { channel_id } => agents::join_channel(view, ctx, channel_id)?,
            Command::LeaveChannel { channel_id } => {
                agents::leave_channel(view, ctx, channel_id)?
            }
            Command::RecordMessage { channel_id } => agents::record_message(view, channel_id)?,
        };

        Ok(Some(event))
    }

    /// Validate a raw wire command and apply it.
    ///
    /// Convenience path for hosts that hand over `(name, payload)` pairs
    /// straight from the log.
    pub fn apply_raw<V: KvView>(
        &self,
        view: &mut V,
        ctx: &CommandContext,
        name: &str,
        payload: &Value,
    ) -> Result<Option<DirectoryEvent>, DirectoryError> {
        let command = schema::parse_command(name, payload)?;
        self.apply(view, ctx, command)
    }
}

// ---------------------------------------------------------------------------
// Stats plumbing shared by the transition modules
// ---------------------------------------------------------------------------

pub(crate) fn load_stats(view: &impl KvView) -> Result<DirectoryStats, DirectoryError> {
    Ok(get_entity::<DirectoryStats>(view, keys::STATS)?.unwrap_or_default())
}

pub(crate) fn store_stats(view: &mut impl KvView, stats: &DirectoryStats) {
    put_entity(view, keys::STATS, stats);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index;
    use crate::types::Agent;
    use crate::view::MemoryView;
    use serde_json::json;

    fn ctx(signer: &str, ts: i64) -> CommandContext {
        CommandContext::new(signer, ts)
    }

    /// Replay a canned raw command sequence against an empty view.
    fn replay(commands: &[(&str, i64, &str, Value)]) -> MemoryView {
        let engine = Engine::new();
        let mut view = MemoryView::new();
        for (signer, ts, name, payload) in commands {
            // Domain rejections are part of the sequence semantics; a
            // rejected command must simply leave the view unchanged.
            let _ = engine.apply_raw(&mut view, &ctx(signer, *ts), name, payload);
        }
        view
    }

    fn scripted_sequence() -> Vec<(&'static str, i64, &'static str, Value)> {
        vec![
            (
                "a1",
                100,
                "register",
                json!({"name": "crawler", "capabilities": [
                    {"name": "crawl", "proficiency": 0.9},
                    {"name": "extract", "proficiency": 0.7}
                ]}),
            ),
            (
                "a2",
                110,
                "register",
                json!({"name": "ranker", "capabilities": [
                    {"name": "rank", "proficiency": 0.8}
                ]}),
            ),
            (
                "a1",
                120,
                "createMatchRequest",
                json!({"requiredCapabilities": ["rank"], "ttl": 10_000}),
            ),
            ("a2", 130, "joinChannel", json!({"channelId": "ops"})),
            ("a1", 140, "update", json!({"status": "busy"})),
            ("a2", 150, "recordMessage", json!({"channelId": "ops"})),
            // Duplicate name: rejected, must not perturb the view.
            ("a3", 160, "register", json!({"name": "crawler"})),
        ]
    }

    #[test]
    fn test_replay_is_deterministic() {
        let first = replay(&scripted_sequence());
        let second = replay(&scripted_sequence());
        assert_eq!(first.to_canonical_json(), second.to_canonical_json());
    }

    #[test]
    fn test_failed_command_leaves_view_unchanged() {
        let engine = Engine::new();
        let mut view = replay(&scripted_sequence());
        let before = view.to_canonical_json();

        let err = engine
            .apply_raw(
                &mut view,
                &ctx("a3", 200),
                "register",
                &json!({"name": "crawler"}),
            )
            .unwrap_err();
        assert!(matches!(err, DirectoryError::DuplicateName { .. }));
        assert_eq!(view.to_canonical_json(), before);
    }

    /// Index lockstep: `A.id in index[C]` exactly when C is listed by A.
    fn assert_index_consistent(view: &MemoryView) {
        let mut expected: Vec<(String, String)> = Vec::new();
        for key in view.keys_with_prefix(keys::AGENT_PREFIX) {
            let agent: Agent = get_entity(view, &key).unwrap().unwrap();
            for cap in &agent.capabilities {
                expected.push((cap.name.clone(), agent.id.clone()));
            }
        }

        for (cap, id) in &expected {
            let ids = index::agents_for(view, cap).unwrap();
            assert!(
                ids.contains(id),
                "agent {} missing from index entry for '{}'",
                id,
                cap
            );
        }

        for key in view.keys_with_prefix("cap:") {
            let cap = key.trim_start_matches("cap:").to_string();
            for id in index::agents_for(view, &cap).unwrap() {
                assert!(
                    expected.contains(&(cap.clone(), id.clone())),
                    "index entry for '{}' lists {} which does not advertise it",
                    cap,
                    id
                );
            }
        }
    }

    #[test]
    fn test_index_consistency_across_lifecycle() {
        let engine = Engine::new();
        let mut view = MemoryView::new();

        engine
            .apply_raw(
                &mut view,
                &ctx("a1", 100),
                "register",
                &json!({"name": "crawler", "capabilities": [
                    {"name": "crawl", "proficiency": 0.9},
                    {"name": "extract", "proficiency": 0.7}
                ]}),
            )
            .unwrap();
        assert_index_consistent(&view);

        // Full replacement of the capability set.
        engine
            .apply_raw(
                &mut view,
                &ctx("a1", 110),
                "update",
                &json!({"capabilities": [{"name": "rank", "proficiency": 0.6}]}),
            )
            .unwrap();
        assert_index_consistent(&view);
        assert!(index::agents_for(&view, "crawl").unwrap().is_empty());

        engine
            .apply_raw(&mut view, &ctx("a1", 120), "unregister", &json!({}))
            .unwrap();
        assert_index_consistent(&view);
        assert!(index::agents_for(&view, "rank").unwrap().is_empty());
    }

    #[test]
    fn test_apply_raw_rejects_malformed_payload_atomically() {
        let engine = Engine::new();
        let mut view = MemoryView::new();
        let err = engine
            .apply_raw(&mut view, &ctx("a1", 100), "register", &json!({"name": 7}))
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Validation { .. }));
        assert!(view.is_empty());
    }
}
