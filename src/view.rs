//! The key-value view the engine materializes state into.
//!
//! The engine is storage-agnostic: it only needs get/put semantics over
//! string keys plus ordered prefix iteration. The host supplies the real
//! backing store; [`MemoryView`] is the reference implementation used by
//! tests and the replay driver.
//!
//! # Ordering contract
//!
//! `keys_with_prefix` MUST yield keys in ascending lexicographic order.
//! Listing and discovery tie-breaking lean on this ordering, so a backing
//! store with nondeterministic iteration (a plain hash map) would break
//! replica convergence.

use serde_json::Value;
use std::collections::BTreeMap;

/// Abstract ordered key-value view.
///
/// Implementations must be exclusively owned by the engine while a
/// transition executes; concurrent readers are served from snapshots
/// taken strictly between transitions.
pub trait KvView {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write `value` under `key`, replacing any previous value.
    fn put(&mut self, key: &str, value: Value);

    /// Remove the value under `key`. Returns the removed value.
    fn remove(&mut self, key: &str) -> Option<Value>;

    /// All keys starting with `prefix`, in ascending lexicographic order.
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;

    /// Whether `key` is present.
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// In-memory view backed by a `BTreeMap`.
///
/// The BTreeMap gives the ordered iteration the view contract requires
/// for free, and its serialized form is canonical, which is what the
/// determinism tests compare.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemoryView {
    entries: BTreeMap<String, Value>,
}

impl MemoryView {
    /// Create an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the view holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the full view to a canonical JSON string.
    ///
    /// Two replicas that applied the same command sequence must produce
    /// byte-identical output here.
    pub fn to_canonical_json(&self) -> String {
        serde_json::to_string(&self.entries).unwrap_or_else(|_| "{}".to_string())
    }

    /// Iterate over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl KvView for MemoryView {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

// ---------------------------------------------------------------------------
// Typed access
// ---------------------------------------------------------------------------

/// Read and deserialize the entity under `key`.
///
/// A present-but-undecodable value is reported as [`DirectoryError::Corrupt`]:
/// it means a replica wrote something this build cannot read, which is a
/// determinism breach, not a recoverable domain error.
pub fn get_entity<T: serde::de::DeserializeOwned>(
    view: &impl KvView,
    key: &str,
) -> Result<Option<T>, crate::error::DirectoryError> {
    match view.get(key) {
        None => Ok(None),
        Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
            crate::error::DirectoryError::Corrupt {
                key: key.to_string(),
                detail: e.to_string(),
            }
        }),
    }
}

/// Serialize and write an entity under `key`.
pub fn put_entity<T: serde::Serialize>(view: &mut impl KvView, key: &str, entity: &T) {
    // Serialization of our own entity types cannot fail.
    let value = serde_json::to_value(entity).unwrap_or(Value::Null);
    view.put(key, value);
}

// ---------------------------------------------------------------------------
// Key layout
// ---------------------------------------------------------------------------

/// Key builders for the view's namespaces.
///
/// Kept in one place so the layout table in the docs and the code cannot
/// drift apart.
pub mod keys {
    /// `agent:{id}` holds the [`Agent`](crate::types::Agent) record.
    pub fn agent(id: &str) -> String {
        format!("agent:{}", id)
    }

    /// `agent_name:{name}` maps a unique agent name to its owner id.
    pub fn agent_name(name: &str) -> String {
        format!("agent_name:{}", name)
    }

    /// `cap:{capability}` holds the sorted agent-id list for one capability.
    pub fn capability(name: &str) -> String {
        format!("cap:{}", name)
    }

    /// `match:{matchId}` holds the match request.
    pub fn match_request(match_id: &str) -> String {
        format!("match:{}", match_id)
    }

    /// `proposal:{matchId}:{proposerId}` holds one proposal.
    pub fn proposal(match_id: &str, proposer_id: &str) -> String {
        format!("proposal:{}:{}", match_id, proposer_id)
    }

    /// Prefix covering every proposal on one match.
    pub fn proposal_prefix(match_id: &str) -> String {
        format!("proposal:{}:", match_id)
    }

    /// `channel:{channelId}` holds the sorted member-id list.
    pub fn channel(channel_id: &str) -> String {
        format!("channel:{}", channel_id)
    }

    /// `reputation:{agentId}` holds the rating history.
    pub fn reputation(agent_id: &str) -> String {
        format!("reputation:{}", agent_id)
    }

    /// Prefix covering every agent record.
    pub const AGENT_PREFIX: &str = "agent:";
    /// Prefix covering every match request.
    pub const MATCH_PREFIX: &str = "match:";
    /// Incrementally maintained global counters.
    pub const STATS: &str = "stats";
    /// Timestamp injected by the host's heartbeat source.
    pub const HEARTBEAT: &str = "heartbeat";
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_view_put_get() {
        let mut view = MemoryView::new();
        view.put("agent:a1", json!({"name": "scout"}));

        assert!(view.contains("agent:a1"));
        assert_eq!(view.get("agent:a1").unwrap()["name"], "scout");
        assert!(view.get("agent:missing").is_none());
    }

    #[test]
    fn test_memory_view_remove() {
        let mut view = MemoryView::new();
        view.put("k", json!(1));
        assert_eq!(view.remove("k"), Some(json!(1)));
        assert!(view.remove("k").is_none());
        assert!(view.is_empty());
    }

    #[test]
    fn test_keys_with_prefix_ordered() {
        let mut view = MemoryView::new();
        view.put("agent:c", json!(1));
        view.put("agent:a", json!(2));
        view.put("match:m1", json!(3));
        view.put("agent:b", json!(4));

        let keys = view.keys_with_prefix("agent:");
        assert_eq!(keys, vec!["agent:a", "agent:b", "agent:c"]);

        assert_eq!(view.keys_with_prefix("match:"), vec!["match:m1"]);
        assert!(view.keys_with_prefix("channel:").is_empty());
    }

    #[test]
    fn test_prefix_does_not_bleed_into_siblings() {
        let mut view = MemoryView::new();
        view.put("cap:search", json!(["a1"]));
        view.put("capx:other", json!(["a2"]));

        assert_eq!(view.keys_with_prefix("cap:"), vec!["cap:search"]);
    }

    #[test]
    fn test_canonical_json_is_key_ordered() {
        let mut a = MemoryView::new();
        a.put("b", json!(2));
        a.put("a", json!(1));

        let mut b = MemoryView::new();
        b.put("a", json!(1));
        b.put("b", json!(2));

        assert_eq!(a.to_canonical_json(), b.to_canonical_json());
    }

    #[test]
    fn test_key_builders() {
        assert_eq!(keys::agent("a1"), "agent:a1");
        assert_eq!(keys::capability("search"), "cap:search");
        assert_eq!(keys::proposal("m1", "p1"), "proposal:m1:p1");
        assert!(keys::proposal("m1", "p1").starts_with(&keys::proposal_prefix("m1")));
    }
}
