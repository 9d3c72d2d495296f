//! Capability index: capability name to the set of agents advertising it.
//!
//! The index is the discovery hot path. Each capability name resolves to
//! its agent set with a single view read; full scans over agents happen
//! only at candidate-filtering time, never at lookup time.
//!
//! Invariant (lockstep): for every agent A and capability name C,
//! `A.id` is in the entry for C exactly when C appears in A's capability
//! list. Every transition that touches an agent's capabilities maintains
//! both sides before it returns.

use crate::error::DirectoryError;
use crate::view::{get_entity, keys, put_entity, KvView};

/// Agent ids advertising `capability`, sorted ascending.
pub fn agents_for(
    view: &impl KvView,
    capability: &str,
) -> Result<Vec<String>, DirectoryError> {
    Ok(get_entity::<Vec<String>>(view, &keys::capability(capability))?.unwrap_or_default())
}

/// Add one agent under every capability name in `names`.
///
/// Entries stay sorted and deduplicated, so replicas that applied the
/// same commands hold byte-identical index values.
pub fn insert_agent(
    view: &mut impl KvView,
    names: &[&str],
    agent_id: &str,
) -> Result<(), DirectoryError> {
    for name in names {
        let key = keys::capability(name);
        let mut ids = get_entity::<Vec<String>>(view, &key)?.unwrap_or_default();
        if let Err(pos) = ids.binary_search_by(|id| id.as_str().cmp(agent_id)) {
            ids.insert(pos, agent_id.to_string());
            put_entity(view, &key, &ids);
        }
    }
    Ok(())
}

/// Remove one agent from every capability name in `names`.
///
/// An empty entry is deleted outright so the index never accumulates
/// tombstones.
pub fn remove_agent(
    view: &mut impl KvView,
    names: &[&str],
    agent_id: &str,
) -> Result<(), DirectoryError> {
    for name in names {
        let key = keys::capability(name);
        let mut ids = match get_entity::<Vec<String>>(view, &key)? {
            Some(ids) => ids,
            None => {
                log::warn!("capability index entry missing for '{}' while removing {}", name, agent_id);
                continue;
            }
        };
        if let Ok(pos) = ids.binary_search_by(|id| id.as_str().cmp(agent_id)) {
            ids.remove(pos);
            if ids.is_empty() {
                view.remove(&key);
            } else {
                put_entity(view, &key, &ids);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
