//! Matchmaking transitions: request, proposal, acceptance, completion.
//!
//! Requests move `pending -> accepted -> completed`; proposals move
//! `proposed -> accepted | rejected`. Terminal states admit no further
//! transitions. Expiry is checked lazily at proposal time; an expired
//! request is never swept, it just stops accepting proposals.

use sha2::{Digest, Sha256};

use crate::command::{AcceptPayload, CommandContext, CompletePayload, CreateMatchPayload, ProposePayload};
use crate::error::DirectoryError;
use crate::events::DirectoryEvent;
use crate::reputation;
use crate::types::{
    clamp_unit, Agent, MatchProposal, MatchRequest, MatchStatus, ProposalStatus, RatingRecord,
};
use crate::view::{get_entity, keys, put_entity, KvView};

/// Derive the match id from the requester and creation timestamp.
///
/// Hashing keeps ids uniform and opaque while staying fully
/// deterministic: every replica derives the same id without
/// coordination.
fn derive_match_id(requester_id: &str, timestamp: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(requester_id.as_bytes());
    hasher.update(b":");
    hasher.update(timestamp.to_be_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("match-{}", &digest[..16])
}

/// Channel id for an accepted match, derived from the match id.
pub fn channel_for_match(match_id: &str) -> String {
    format!("match-channel-{}", match_id)
}

/// Open a new match request in `pending` state.
pub(super) fn create_request<V: KvView>(
    view: &mut V,
    ctx: &CommandContext,
    payload: CreateMatchPayload,
) -> Result<DirectoryEvent, DirectoryError> {
    if payload.required_capabilities.is_empty() {
        return Err(DirectoryError::EmptyCapabilitySet);
    }

    let request = MatchRequest {
        id: derive_match_id(&ctx.signer_id, ctx.timestamp),
        requester_id: ctx.signer_id.clone(),
        required_capabilities: payload.required_capabilities,
        min_score: clamp_unit(payload.min_score),
        task_description: payload.task_description,
        preferred_protocols: payload.preferred_protocols,
        expires_at: ctx.timestamp + payload.ttl,
        created_at: ctx.timestamp,
        status: MatchStatus::Pending,
        accepted_with: None,
        success: None,
        feedback: None,
        completed_at: None,
    };

    put_entity(view, &keys::match_request(&request.id), &request);
    Ok(DirectoryEvent::MatchRequestCreated { request })
}

/// Store (or overwrite) the signer's proposal on a pending request.
pub(super) fn propose<V: KvView>(
    view: &mut V,
    ctx: &CommandContext,
    payload: ProposePayload,
) -> Result<DirectoryEvent, DirectoryError> {
    let request = get_entity::<MatchRequest>(view, &keys::match_request(&payload.match_id))?
        .ok_or_else(|| DirectoryError::RequestNotFound {
            match_id: payload.match_id.clone(),
        })?;

    if ctx.timestamp > request.expires_at {
        return Err(DirectoryError::RequestExpired {
            match_id: request.id,
            expires_at: request.expires_at,
        });
    }
    if request.status != MatchStatus::Pending {
        return Err(DirectoryError::RequestNotPending {
            match_id: request.id,
            status: request.status.as_str().to_string(),
        });
    }
    if !view.contains(&keys::agent(&ctx.signer_id)) {
        return Err(DirectoryError::NotRegistered {
            agent_id: ctx.signer_id.clone(),
        });
    }

    let proposal = MatchProposal {
        match_id: request.id,
        proposer_id: ctx.signer_id.clone(),
        score: clamp_unit(payload.score),
        matched_capabilities: payload.matched_capabilities,
        proposed_at: ctx.timestamp,
        status: ProposalStatus::Proposed,
    };

    put_entity(
        view,
        &keys::proposal(&proposal.match_id, &ctx.signer_id),
        &proposal,
    );
    Ok(DirectoryEvent::MatchProposed { proposal })
}

/// Accept one proposal on the signer's own pending request.
///
/// Competing proposals are rejected in the same transition, bringing
/// every proposal on the request to a terminal state.
pub(super) fn accept<V: KvView>(
    view: &mut V,
    ctx: &CommandContext,
    payload: AcceptPayload,
) -> Result<DirectoryEvent, DirectoryError> {
    let request_key = keys::match_request(&payload.match_id);
    let mut request =
        get_entity::<MatchRequest>(view, &request_key)?.ok_or_else(|| {
            DirectoryError::RequestNotFound {
                match_id: payload.match_id.clone(),
            }
        })?;

    if ctx.signer_id != request.requester_id {
        return Err(DirectoryError::Unauthorized {
            agent_id: ctx.signer_id.clone(),
            match_id: request.id,
        });
    }
    if request.status != MatchStatus::Pending {
        return Err(DirectoryError::RequestNotPending {
            match_id: request.id,
            status: request.status.as_str().to_string(),
        });
    }

    let accepted_key = keys::proposal(&request.id, &payload.proposer_id);
    let mut proposal = get_entity::<MatchProposal>(view, &accepted_key)?.ok_or_else(|| {
        DirectoryError::ProposalNotFound {
            match_id: request.id.clone(),
            proposer_id: payload.proposer_id.clone(),
        }
    })?;

    // Checks done; writes start here.
    request.status = MatchStatus::Accepted;
    request.accepted_with = Some(payload.proposer_id.clone());
    put_entity(view, &request_key, &request);

    proposal.status = ProposalStatus::Accepted;
    put_entity(view, &accepted_key, &proposal);

    for key in view.keys_with_prefix(&keys::proposal_prefix(&request.id)) {
        if key == accepted_key {
            continue;
        }
        if let Some(mut other) = get_entity::<MatchProposal>(view, &key)? {
            other.status = ProposalStatus::Rejected;
            put_entity(view, &key, &other);
        }
    }

    bump_match_count(view, &request.requester_id)?;
    bump_match_count(view, &payload.proposer_id)?;

    let channel_id = channel_for_match(&request.id);
    Ok(DirectoryEvent::MatchAccepted {
        request,
        proposal,
        channel_id,
    })
}

/// Close a request with an outcome, optionally rating the counter-party.
pub(super) fn complete<V: KvView>(
    view: &mut V,
    ctx: &CommandContext,
    payload: CompletePayload,
) -> Result<DirectoryEvent, DirectoryError> {
    let request_key = keys::match_request(&payload.match_id);
    let mut request =
        get_entity::<MatchRequest>(view, &request_key)?.ok_or_else(|| {
            DirectoryError::RequestNotFound {
                match_id: payload.match_id.clone(),
            }
        })?;

    if request.status == MatchStatus::Completed {
        return Err(DirectoryError::RequestNotPending {
            match_id: request.id,
            status: request.status.as_str().to_string(),
        });
    }

    // The signer rates the counter-party, never itself. A signer that is
    // neither party leaves no rating.
    let rated = match (payload.rating, &request.accepted_with) {
        (Some(rating), Some(accepted_with)) => {
            if ctx.signer_id == request.requester_id {
                Some((accepted_with.clone(), rating))
            } else if ctx.signer_id == *accepted_with {
                Some((request.requester_id.clone(), rating))
            } else {
                None
            }
        }
        _ => None,
    };

    request.status = MatchStatus::Completed;
    request.success = Some(payload.success);
    request.feedback = payload.feedback;
    request.completed_at = Some(ctx.timestamp);
    put_entity(view, &request_key, &request);

    if let Some((ref rated_id, rating)) = rated {
        reputation::apply_rating(
            view,
            rated_id,
            RatingRecord {
                rating,
                from: ctx.signer_id.clone(),
                match_id: request.id.clone(),
                timestamp: ctx.timestamp,
            },
        )?;

        if payload.success {
            bump_success_count(view, rated_id)?;
        }
    }

    Ok(DirectoryEvent::MatchCompleted {
        request,
        rated_agent: rated.map(|(id, _)| id),
    })
}

// ---------------------------------------------------------------------------
// Counter helpers
// ---------------------------------------------------------------------------

/// Increment an agent's accepted-match counter, if the agent still
/// exists. A party that unregistered since keeps its audit records but
/// has no counter to bump.
fn bump_match_count<V: KvView>(view: &mut V, agent_id: &str) -> Result<(), DirectoryError> {
    let key = keys::agent(agent_id);
    match get_entity::<Agent>(view, &key)? {
        Some(mut agent) => {
            agent.match_count += 1;
            put_entity(view, &key, &agent);
        }
        None => log::warn!("match party '{}' is no longer registered", agent_id),
    }
    Ok(())
}

fn bump_success_count<V: KvView>(view: &mut V, agent_id: &str) -> Result<(), DirectoryError> {
    let key = keys::agent(agent_id);
    match get_entity::<Agent>(view, &key)? {
        Some(mut agent) => {
            agent.success_count += 1;
            put_entity(view, &key, &agent);
        }
        None => log::warn!("rated party '{}' is no longer registered", agent_id),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::schema::parse_command;
    use crate::types::Reputation;
    use crate::view::MemoryView;
    use serde_json::json;

    fn apply(
        view: &mut MemoryView,
        signer: &str,
        ts: i64,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<DirectoryEvent, DirectoryError> {
        let command = parse_command(name, &payload)?;
        Engine::new()
            .apply(view, &CommandContext::new(signer, ts), command)
            .map(|e| e.expect("transition emits an event"))
    }

    /// Requester `r1` and proposer `p1`, both registered; returns the
    /// pending match id.
    fn setup_pending_match(view: &mut MemoryView) -> String {
        apply(view, "r1", 10, "register", json!({"name": "requester"})).unwrap();
        apply(
            view,
            "p1",
            20,
            "register",
            json!({"name": "worker", "capabilities": [{"name": "x", "proficiency": 0.9}]}),
        )
        .unwrap();
        let event = apply(
            view,
            "r1",
            30,
            "createMatchRequest",
            json!({"requiredCapabilities": ["x"], "ttl": 1000}),
        )
        .unwrap();
        match event {
            DirectoryEvent::MatchRequestCreated { request } => request.id,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_match_id_derivation_is_deterministic() {
        assert_eq!(derive_match_id("r1", 30), derive_match_id("r1", 30));
        assert_ne!(derive_match_id("r1", 30), derive_match_id("r1", 31));
        assert_ne!(derive_match_id("r1", 30), derive_match_id("r2", 30));
        assert!(derive_match_id("r1", 30).starts_with("match-"));
    }

    #[test]
    fn test_create_request_rejects_empty_capabilities() {
        let mut view = MemoryView::new();
        let err = apply(
            &mut view,
            "r1",
            10,
            "createMatchRequest",
            json!({"requiredCapabilities": []}),
        )
        .unwrap_err();
        assert_eq!(err, DirectoryError::EmptyCapabilitySet);
        assert!(view.is_empty());
    }

    #[test]
    fn test_create_request_sets_expiry_from_ttl() {
        let mut view = MemoryView::new();
        let event = apply(
            &mut view,
            "r1",
            100,
            "createMatchRequest",
            json!({"requiredCapabilities": ["x"], "ttl": 500}),
        )
        .unwrap();
        match event {
            DirectoryEvent::MatchRequestCreated { request } => {
                assert_eq!(request.expires_at, 600);
                assert_eq!(request.status, MatchStatus::Pending);
                assert_eq!(request.created_at, 100);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_propose_happy_path_and_overwrite() {
        let mut view = MemoryView::new();
        let match_id = setup_pending_match(&mut view);

        apply(
            &mut view,
            "p1",
            40,
            "proposeMatch",
            json!({"matchId": match_id, "score": 0.7, "matchedCapabilities": ["x"]}),
        )
        .unwrap();

        // Re-proposing overwrites the previous bid.
        apply(
            &mut view,
            "p1",
            50,
            "proposeMatch",
            json!({"matchId": match_id, "score": 0.9, "matchedCapabilities": ["x"]}),
        )
        .unwrap();

        let proposal: MatchProposal =
            get_entity(&view, &keys::proposal(&match_id, "p1")).unwrap().unwrap();
        assert_eq!(proposal.score, 0.9);
        assert_eq!(proposal.proposed_at, 50);
        assert_eq!(proposal.status, ProposalStatus::Proposed);
    }

    #[test]
    fn test_propose_clamps_score() {
        let mut view = MemoryView::new();
        let match_id = setup_pending_match(&mut view);

        apply(
            &mut view,
            "p1",
            40,
            "proposeMatch",
            json!({"matchId": match_id, "score": 3.2, "matchedCapabilities": ["x"]}),
        )
        .unwrap();

        let proposal: MatchProposal =
            get_entity(&view, &keys::proposal(&match_id, "p1")).unwrap().unwrap();
        assert_eq!(proposal.score, 1.0);
    }

    #[test]
    fn test_propose_failure_modes() {
        let mut view = MemoryView::new();
        let match_id = setup_pending_match(&mut view);

        let err = apply(
            &mut view,
            "p1",
            40,
            "proposeMatch",
            json!({"matchId": "match-missing", "score": 0.5, "matchedCapabilities": []}),
        )
        .unwrap_err();
        assert!(matches!(err, DirectoryError::RequestNotFound { .. }));

        // Unregistered proposer.
        let err = apply(
            &mut view,
            "ghost",
            40,
            "proposeMatch",
            json!({"matchId": match_id, "score": 0.5, "matchedCapabilities": []}),
        )
        .unwrap_err();
        assert!(matches!(err, DirectoryError::NotRegistered { .. }));
    }

    #[test]
    fn test_propose_after_expiry_rejected_and_writes_nothing() {
        let mut view = MemoryView::new();
        let match_id = setup_pending_match(&mut view);
        let before = view.to_canonical_json();

        // Request was created at ts 30 with ttl 1000.
        let err = apply(
            &mut view,
            "p1",
            2000,
            "proposeMatch",
            json!({"matchId": match_id, "score": 0.5, "matchedCapabilities": ["x"]}),
        )
        .unwrap_err();
        assert!(matches!(err, DirectoryError::RequestExpired { .. }));
        assert_eq!(view.to_canonical_json(), before);
    }

    #[test]
    fn test_proposal_at_exact_expiry_is_accepted() {
        let mut view = MemoryView::new();
        let match_id = setup_pending_match(&mut view);

        // Expiry is `now > expires_at`, so ts == expires_at still lands.
        apply(
            &mut view,
            "p1",
            1030,
            "proposeMatch",
            json!({"matchId": match_id, "score": 0.5, "matchedCapabilities": ["x"]}),
        )
        .unwrap();
    }

    #[test]
    fn test_accept_full_flow() {
        let mut view = MemoryView::new();
        let match_id = setup_pending_match(&mut view);

        apply(
            &mut view,
            "p1",
            40,
            "proposeMatch",
            json!({"matchId": match_id, "score": 0.8, "matchedCapabilities": ["x"]}),
        )
        .unwrap();

        let event = apply(
            &mut view,
            "r1",
            50,
            "acceptMatch",
            json!({"matchId": match_id, "proposerId": "p1"}),
        )
        .unwrap();

        match event {
            DirectoryEvent::MatchAccepted {
                request,
                proposal,
                channel_id,
            } => {
                assert_eq!(request.status, MatchStatus::Accepted);
                assert_eq!(request.accepted_with.as_deref(), Some("p1"));
                assert_eq!(proposal.status, ProposalStatus::Accepted);
                assert_eq!(channel_id, channel_for_match(&match_id));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // Both parties' match counters moved by exactly one.
        let requester: Agent = get_entity(&view, "agent:r1").unwrap().unwrap();
        let proposer: Agent = get_entity(&view, "agent:p1").unwrap().unwrap();
        assert_eq!(requester.match_count, 1);
        assert_eq!(proposer.match_count, 1);
    }

    #[test]
    fn test_accept_rejects_competing_proposals() {
        let mut view = MemoryView::new();
        let match_id = setup_pending_match(&mut view);
        apply(&mut view, "p2", 35, "register", json!({"name": "rival"})).unwrap();

        for proposer in ["p1", "p2"] {
            apply(
                &mut view,
                proposer,
                40,
                "proposeMatch",
                json!({"matchId": match_id, "score": 0.8, "matchedCapabilities": ["x"]}),
            )
            .unwrap();
        }

        apply(
            &mut view,
            "r1",
            50,
            "acceptMatch",
            json!({"matchId": match_id, "proposerId": "p1"}),
        )
        .unwrap();

        let winner: MatchProposal =
            get_entity(&view, &keys::proposal(&match_id, "p1")).unwrap().unwrap();
        let rival: MatchProposal =
            get_entity(&view, &keys::proposal(&match_id, "p2")).unwrap().unwrap();
        assert_eq!(winner.status, ProposalStatus::Accepted);
        assert_eq!(rival.status, ProposalStatus::Rejected);
    }

    #[test]
    fn test_accept_authorization_and_lifecycle_guards() {
        let mut view = MemoryView::new();
        let match_id = setup_pending_match(&mut view);
        apply(
            &mut view,
            "p1",
            40,
            "proposeMatch",
            json!({"matchId": match_id, "score": 0.8, "matchedCapabilities": ["x"]}),
        )
        .unwrap();

        // Only the original requester may accept.
        let err = apply(
            &mut view,
            "p1",
            50,
            "acceptMatch",
            json!({"matchId": match_id, "proposerId": "p1"}),
        )
        .unwrap_err();
        assert!(matches!(err, DirectoryError::Unauthorized { .. }));

        // Missing proposal.
        let err = apply(
            &mut view,
            "r1",
            50,
            "acceptMatch",
            json!({"matchId": match_id, "proposerId": "nobody"}),
        )
        .unwrap_err();
        assert!(matches!(err, DirectoryError::ProposalNotFound { .. }));

        apply(
            &mut view,
            "r1",
            60,
            "acceptMatch",
            json!({"matchId": match_id, "proposerId": "p1"}),
        )
        .unwrap();

        // Second accept hits the lifecycle guard.
        let err = apply(
            &mut view,
            "r1",
            70,
            "acceptMatch",
            json!({"matchId": match_id, "proposerId": "p1"}),
        )
        .unwrap_err();
        assert!(matches!(err, DirectoryError::RequestNotPending { .. }));

        // Proposals against an accepted request are refused too.
        let err = apply(
            &mut view,
            "p1",
            80,
            "proposeMatch",
            json!({"matchId": match_id, "score": 0.9, "matchedCapabilities": ["x"]}),
        )
        .unwrap_err();
        assert!(matches!(err, DirectoryError::RequestNotPending { .. }));
    }

    #[test]
    fn test_complete_rates_counter_party() {
        let mut view = MemoryView::new();
        let match_id = setup_pending_match(&mut view);
        apply(
            &mut view,
            "p1",
            40,
            "proposeMatch",
            json!({"matchId": match_id, "score": 0.8, "matchedCapabilities": ["x"]}),
        )
        .unwrap();
        apply(
            &mut view,
            "r1",
            50,
            "acceptMatch",
            json!({"matchId": match_id, "proposerId": "p1"}),
        )
        .unwrap();

        let event = apply(
            &mut view,
            "r1",
            60,
            "completeMatch",
            json!({"matchId": match_id, "success": true, "rating": 4.0, "feedback": "solid"}),
        )
        .unwrap();

        match event {
            DirectoryEvent::MatchCompleted {
                request,
                rated_agent,
            } => {
                assert_eq!(request.status, MatchStatus::Completed);
                assert_eq!(request.success, Some(true));
                assert_eq!(request.feedback.as_deref(), Some("solid"));
                assert_eq!(request.completed_at, Some(60));
                // Requester rated the proposer, never itself.
                assert_eq!(rated_agent.as_deref(), Some("p1"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let rep: Reputation = get_entity(&view, &keys::reputation("p1")).unwrap().unwrap();
        assert_eq!(rep.total_ratings, 1);
        assert_eq!(rep.average_rating, 4.0);
        assert_eq!(rep.ratings[0].from, "r1");

        let proposer: Agent = get_entity(&view, "agent:p1").unwrap().unwrap();
        assert_eq!(proposer.success_count, 1);
        // Requester's own success counter is untouched.
        let requester: Agent = get_entity(&view, "agent:r1").unwrap().unwrap();
        assert_eq!(requester.success_count, 0);
    }

    #[test]
    fn test_complete_by_proposer_rates_requester() {
        let mut view = MemoryView::new();
        let match_id = setup_pending_match(&mut view);
        apply(
            &mut view,
            "p1",
            40,
            "proposeMatch",
            json!({"matchId": match_id, "score": 0.8, "matchedCapabilities": ["x"]}),
        )
        .unwrap();
        apply(
            &mut view,
            "r1",
            50,
            "acceptMatch",
            json!({"matchId": match_id, "proposerId": "p1"}),
        )
        .unwrap();

        apply(
            &mut view,
            "p1",
            60,
            "completeMatch",
            json!({"matchId": match_id, "success": false, "rating": 2.0}),
        )
        .unwrap();

        let rep: Reputation = get_entity(&view, &keys::reputation("r1")).unwrap().unwrap();
        assert_eq!(rep.average_rating, 2.0);
        // Unsuccessful outcome: no success counter bump.
        let requester: Agent = get_entity(&view, "agent:r1").unwrap().unwrap();
        assert_eq!(requester.success_count, 0);
    }

    #[test]
    fn test_complete_without_acceptance_records_no_rating() {
        let mut view = MemoryView::new();
        let match_id = setup_pending_match(&mut view);

        // A requester may close an unanswered request; the rating has no
        // counter-party to land on.
        let event = apply(
            &mut view,
            "r1",
            60,
            "completeMatch",
            json!({"matchId": match_id, "success": false, "rating": 1.0}),
        )
        .unwrap();
        match event {
            DirectoryEvent::MatchCompleted { rated_agent, .. } => assert!(rated_agent.is_none()),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(get_entity::<Reputation>(&view, &keys::reputation("p1"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_complete_twice_rejected() {
        let mut view = MemoryView::new();
        let match_id = setup_pending_match(&mut view);
        apply(
            &mut view,
            "r1",
            60,
            "completeMatch",
            json!({"matchId": match_id, "success": true}),
        )
        .unwrap();

        let err = apply(
            &mut view,
            "r1",
            70,
            "completeMatch",
            json!({"matchId": match_id, "success": true}),
        )
        .unwrap_err();
        assert!(matches!(err, DirectoryError::RequestNotPending { .. }));
    }

    #[test]
    fn test_complete_unknown_match() {
        let mut view = MemoryView::new();
        let err = apply(
            &mut view,
            "r1",
            60,
            "completeMatch",
            json!({"matchId": "match-none", "success": true}),
        )
        .unwrap_err();
        assert!(matches!(err, DirectoryError::RequestNotFound { .. }));
    }
}
