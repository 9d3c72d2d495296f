//! Agent lifecycle and channel transitions.
//!
//! register / update / unregister keep the capability index and the
//! name-uniqueness index in lockstep with the agent record inside the
//! same transition. All precondition checks happen before the first
//! write.

use crate::command::{CommandContext, RegisterPayload, UpdatePayload};
use crate::error::DirectoryError;
use crate::events::DirectoryEvent;
use crate::index;
use crate::types::{Agent, AgentStatus};
use crate::view::{get_entity, keys, put_entity, KvView};

use super::{load_stats, store_stats};

/// Create (or re-register) the signer's agent entry.
///
/// Re-registration by the same signer replaces the profile but preserves
/// the monotone counters and `created_at`; the agent counter is only
/// incremented for a genuinely new identity.
pub(super) fn register<V: KvView>(
    view: &mut V,
    ctx: &CommandContext,
    payload: RegisterPayload,
) -> Result<DirectoryEvent, DirectoryError> {
    let name_key = keys::agent_name(&payload.name);
    if let Some(owner) = get_entity::<String>(view, &name_key)? {
        if owner != ctx.signer_id {
            return Err(DirectoryError::DuplicateName { name: payload.name });
        }
    }

    let previous = get_entity::<Agent>(view, &keys::agent(&ctx.signer_id))?;
    let stats = load_stats(view)?;

    // All checks passed; writes start here.
    if let Some(ref old) = previous {
        index::remove_agent(view, &old.capability_names(), &ctx.signer_id)?;
        if old.name != payload.name {
            view.remove(&keys::agent_name(&old.name));
        }
    }

    let mut capabilities = payload.capabilities;
    for cap in &mut capabilities {
        cap.clamp();
    }

    let agent = Agent {
        id: ctx.signer_id.clone(),
        name: payload.name,
        description: payload.description,
        capabilities,
        protocol: payload.protocol,
        visibility: payload.visibility,
        status: AgentStatus::Online,
        endpoint: payload.endpoint,
        match_count: previous.as_ref().map_or(0, |a| a.match_count),
        success_count: previous.as_ref().map_or(0, |a| a.success_count),
        created_at: previous.as_ref().map_or(ctx.timestamp, |a| a.created_at),
        updated_at: ctx.timestamp,
    };

    index::insert_agent(view, &agent.capability_names(), &ctx.signer_id)?;
    put_entity(view, &keys::agent_name(&agent.name), &agent.id);
    put_entity(view, &keys::agent(&ctx.signer_id), &agent);

    if previous.is_none() {
        store_stats(
            view,
            &crate::types::DirectoryStats {
                agents: stats.agents + 1,
                ..stats
            },
        );
    }

    Ok(DirectoryEvent::AgentRegistered { agent })
}

/// Partial profile update; `capabilities` is full replacement.
pub(super) fn update<V: KvView>(
    view: &mut V,
    ctx: &CommandContext,
    payload: UpdatePayload,
) -> Result<DirectoryEvent, DirectoryError> {
    let agent_key = keys::agent(&ctx.signer_id);
    let mut agent = get_entity::<Agent>(view, &agent_key)?.ok_or_else(|| {
        DirectoryError::NotRegistered {
            agent_id: ctx.signer_id.clone(),
        }
    })?;

    if let Some(new_caps) = payload.capabilities {
        // Full replacement: drop the entire previous set from the index,
        // then insert the new one. Merge semantics are deliberately not
        // offered; replacement keeps the index rebuild trivially
        // deterministic.
        index::remove_agent(view, &agent.capability_names(), &ctx.signer_id)?;
        agent.capabilities = new_caps;
        for cap in &mut agent.capabilities {
            cap.clamp();
        }
        index::insert_agent(view, &agent.capability_names(), &ctx.signer_id)?;
    }

    if let Some(status) = payload.status {
        agent.status = status;
    }
    if let Some(visibility) = payload.visibility {
        agent.visibility = visibility;
    }
    if let Some(endpoint) = payload.endpoint {
        agent.endpoint = Some(endpoint);
    }
    agent.updated_at = ctx.timestamp;

    put_entity(view, &agent_key, &agent);
    Ok(DirectoryEvent::AgentUpdated { agent })
}

/// Remove the signer's agent and its index entries.
///
/// Match, channel, and reputation records for the id survive for audit.
pub(super) fn unregister<V: KvView>(
    view: &mut V,
    ctx: &CommandContext,
) -> Result<DirectoryEvent, DirectoryError> {
    let agent_key = keys::agent(&ctx.signer_id);
    let agent = get_entity::<Agent>(view, &agent_key)?.ok_or_else(|| {
        DirectoryError::NotRegistered {
            agent_id: ctx.signer_id.clone(),
        }
    })?;
    let stats = load_stats(view)?;

    index::remove_agent(view, &agent.capability_names(), &ctx.signer_id)?;
    view.remove(&keys::agent_name(&agent.name));
    view.remove(&agent_key);

    store_stats(
        view,
        &crate::types::DirectoryStats {
            agents: stats.agents.saturating_sub(1),
            ..stats
        },
    );

    Ok(DirectoryEvent::AgentUnregistered {
        agent_id: agent.id,
        name: agent.name,
    })
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Add the signer to a channel's member set.
///
/// The first join of an unseen channel increments the channel counter.
/// An emptied channel keeps its (empty) entry so the counter stays
/// monotone across leave/rejoin cycles.
pub(super) fn join_channel<V: KvView>(
    view: &mut V,
    ctx: &CommandContext,
    channel_id: String,
) -> Result<DirectoryEvent, DirectoryError> {
    if !view.contains(&keys::agent(&ctx.signer_id)) {
        return Err(DirectoryError::NotRegistered {
            agent_id: ctx.signer_id.clone(),
        });
    }

    let key = keys::channel(&channel_id);
    let existing = get_entity::<Vec<String>>(view, &key)?;
    let first_join = existing.is_none();
    let mut members = existing.unwrap_or_default();

    if let Err(pos) = members.binary_search(&ctx.signer_id) {
        members.insert(pos, ctx.signer_id.clone());
    }
    put_entity(view, &key, &members);

    if first_join {
        let stats = load_stats(view)?;
        store_stats(
            view,
            &crate::types::DirectoryStats {
                channels: stats.channels + 1,
                ..stats
            },
        );
    }

    Ok(DirectoryEvent::ChannelJoined {
        channel_id,
        agent_id: ctx.signer_id.clone(),
        members,
    })
}

/// Remove the signer from a channel's member set.
///
/// Leaving an unknown channel or one the signer never joined is a no-op
/// rather than an error; the membership set ends up in the same state
/// either way.
pub(super) fn leave_channel<V: KvView>(
    view: &mut V,
    ctx: &CommandContext,
    channel_id: String,
) -> Result<DirectoryEvent, DirectoryError> {
    let key = keys::channel(&channel_id);
    let mut members = get_entity::<Vec<String>>(view, &key)?.unwrap_or_default();

    if let Ok(pos) = members.binary_search(&ctx.signer_id) {
        members.remove(pos);
        put_entity(view, &key, &members);
    }

    Ok(DirectoryEvent::ChannelLeft {
        channel_id,
        agent_id: ctx.signer_id.clone(),
        members,
    })
}

/// Bump the global message counter. No other state changes; the counter
/// exists for dashboard statistics.
pub(super) fn record_message<V: KvView>(
    view: &mut V,
    channel_id: Option<String>,
) -> Result<DirectoryEvent, DirectoryError> {
    let stats = load_stats(view)?;
    let messages = stats.messages + 1;
    store_stats(view, &crate::types::DirectoryStats { messages, ..stats });

    Ok(DirectoryEvent::MessageRecorded {
        channel_id,
        messages,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
