//! Validation layer: raw wire payloads to typed commands.
//!
//! `parse_command` is the single point where a command name or payload
//! shape is interpreted. Rules are declarative per command: field
//! presence, type, numeric range, string length, enum membership, array
//! element schema. Validation never consults the view; it is a pure
//! function of the payload. On failure the transition must not run.
//!
//! Wire payloads use the network's camelCase field names; snake_case
//! spellings are accepted as well so locally produced logs replay
//! unchanged.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::command::{
    AcceptPayload, Command, CompletePayload, CreateMatchPayload, ProposePayload, RegisterPayload,
    UpdatePayload,
};
use crate::error::DirectoryError;
use crate::types::{AgentCapability, AgentStatus, Protocol, Visibility};

/// Maximum agent name length.
pub const MAX_NAME_LEN: usize = 128;
/// Maximum agent description length.
pub const MAX_DESCRIPTION_LEN: usize = 2048;
/// Maximum task description length.
pub const MAX_TASK_LEN: usize = 4096;
/// Maximum capability name length.
pub const MAX_CAPABILITY_LEN: usize = 128;
/// Maximum channel id length.
pub const MAX_CHANNEL_LEN: usize = 256;
/// Maximum feedback length.
pub const MAX_FEEDBACK_LEN: usize = 4096;
/// Maximum capabilities per agent or per match request.
pub const MAX_CAPABILITIES: usize = 64;
/// TTL applied when a match request does not carry one (one hour).
pub const DEFAULT_TTL_MS: i64 = 3_600_000;

/// Capability names and channel ids: printable identifier, no whitespace.
static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:/-]*$").expect("static pattern"));

/// Parse and validate one wire command.
///
/// Both the network's camelCase names (`createMatchRequest`) and the
/// snake_case spellings are accepted.
pub fn parse_command(name: &str, payload: &Value) -> Result<Command, DirectoryError> {
    match name {
        "register" => parse_register(payload),
        "update" => parse_update(payload),
        "unregister" => Ok(Command::Unregister),
        "createMatchRequest" | "create_match_request" => parse_create_match(payload),
        "proposeMatch" | "propose_match" => parse_propose(payload),
        "acceptMatch" | "accept_match" => parse_accept(payload),
        "completeMatch" | "complete_match" => parse_complete(payload),
        "joinChannel" | "join_channel" => parse_channel(payload, "joinChannel")
            .map(|channel_id| Command::JoinChannel { channel_id }),
        "leaveChannel" | "leave_channel" => parse_channel(payload, "leaveChannel")
            .map(|channel_id| Command::LeaveChannel { channel_id }),
        "recordMessage" | "record_message" => parse_record_message(payload),
        other => Err(DirectoryError::validation(
            other,
            "unknown command".to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Per-command rules
// ---------------------------------------------------------------------------

fn parse_register(payload: &Value) -> Result<Command, DirectoryError> {
    const CMD: &str = "register";
    let obj = as_object(CMD, payload)?;

    let name = require_str(CMD, obj, &["name"])?;
    check_len(CMD, "name", name, MAX_NAME_LEN)?;
    if name.trim().is_empty() {
        return Err(DirectoryError::validation(CMD, "'name' must not be blank"));
    }

    let description = optional_str(CMD, obj, &["description"])?.unwrap_or_default();
    check_len(CMD, "description", &description, MAX_DESCRIPTION_LEN)?;

    let capabilities = parse_capabilities(CMD, obj, &["capabilities"])?.unwrap_or_default();

    let protocol = optional_str(CMD, obj, &["protocol"])?
        .map(|s| parse_protocol(CMD, &s))
        .transpose()?
        .unwrap_or(Protocol::Native);

    let visibility = optional_str(CMD, obj, &["visibility"])?
        .map(|s| parse_visibility(CMD, &s))
        .transpose()?
        .unwrap_or(Visibility::Public);

    // Endpoint is opaque and deliberately not validated.
    let endpoint = optional_str(CMD, obj, &["endpoint"])?;

    Ok(Command::Register(RegisterPayload {
        name: name.to_string(),
        description,
        capabilities,
        protocol,
        visibility,
        endpoint,
    }))
}

fn parse_update(payload: &Value) -> Result<Command, DirectoryError> {
    const CMD: &str = "update";
    let obj = as_object(CMD, payload)?;

    let status = optional_str(CMD, obj, &["status"])?
        .map(|s| parse_status(CMD, &s))
        .transpose()?;

    let capabilities = parse_capabilities(CMD, obj, &["capabilities"])?;

    let visibility = optional_str(CMD, obj, &["visibility"])?
        .map(|s| parse_visibility(CMD, &s))
        .transpose()?;

    let endpoint = optional_str(CMD, obj, &["endpoint"])?;

    Ok(Command::Update(UpdatePayload {
        status,
        capabilities,
        visibility,
        endpoint,
    }))
}

fn parse_create_match(payload: &Value) -> Result<Command, DirectoryError> {
    const CMD: &str = "createMatchRequest";
    let obj = as_object(CMD, payload)?;

    let required_capabilities = require_str_array(
        CMD,
        obj,
        &["requiredCapabilities", "required_capabilities"],
        MAX_CAPABILITY_LEN,
    )?;
    if required_capabilities.len() > MAX_CAPABILITIES {
        return Err(DirectoryError::validation(
            CMD,
            format!("at most {} required capabilities", MAX_CAPABILITIES),
        ));
    }

    let min_score = optional_f64(CMD, obj, &["minScore", "min_score"])?.unwrap_or(0.0);
    check_range(CMD, "minScore", min_score, 0.0, 1.0)?;

    let task_description =
        optional_str(CMD, obj, &["taskDescription", "task_description"])?.unwrap_or_default();
    check_len(CMD, "taskDescription", &task_description, MAX_TASK_LEN)?;

    let ttl = optional_i64(CMD, obj, &["ttl"])?.unwrap_or(DEFAULT_TTL_MS);
    if ttl <= 0 {
        return Err(DirectoryError::validation(CMD, "'ttl' must be positive"));
    }

    let preferred_protocols = match field(obj, &["preferredProtocols", "preferred_protocols"]) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut protocols = Vec::with_capacity(items.len());
            for item in items {
                let s = item.as_str().ok_or_else(|| {
                    DirectoryError::validation(CMD, "'preferredProtocols' elements must be strings")
                })?;
                protocols.push(parse_protocol(CMD, s)?);
            }
            protocols
        }
        Some(_) => {
            return Err(DirectoryError::validation(
                CMD,
                "'preferredProtocols' must be an array",
            ))
        }
    };

    Ok(Command::CreateMatchRequest(CreateMatchPayload {
        required_capabilities,
        min_score,
        task_description,
        ttl,
        preferred_protocols,
    }))
}

fn parse_propose(payload: &Value) -> Result<Command, DirectoryError> {
    const CMD: &str = "proposeMatch";
    let obj = as_object(CMD, payload)?;

    let match_id = require_str(CMD, obj, &["matchId", "match_id"])?.to_string();
    let score = require_f64(CMD, obj, &["score"])?;
    let matched_capabilities = require_str_array(
        CMD,
        obj,
        &["matchedCapabilities", "matched_capabilities"],
        MAX_CAPABILITY_LEN,
    )?;

    Ok(Command::ProposeMatch(ProposePayload {
        match_id,
        score,
        matched_capabilities,
    }))
}

fn parse_accept(payload: &Value) -> Result<Command, DirectoryError> {
    const CMD: &str = "acceptMatch";
    let obj = as_object(CMD, payload)?;

    Ok(Command::AcceptMatch(AcceptPayload {
        match_id: require_str(CMD, obj, &["matchId", "match_id"])?.to_string(),
        proposer_id: require_str(CMD, obj, &["proposerId", "proposer_id"])?.to_string(),
    }))
}

fn parse_complete(payload: &Value) -> Result<Command, DirectoryError> {
    const CMD: &str = "completeMatch";
    let obj = as_object(CMD, payload)?;

    let match_id = require_str(CMD, obj, &["matchId", "match_id"])?.to_string();
    let success = optional_bool(CMD, obj, &["success"])?.unwrap_or(false);

    let rating = optional_f64(CMD, obj, &["rating"])?;
    if let Some(r) = rating {
        check_range(CMD, "rating", r, 0.0, 5.0)?;
    }

    let feedback = optional_str(CMD, obj, &["feedback"])?;
    if let Some(ref f) = feedback {
        check_len(CMD, "feedback", f, MAX_FEEDBACK_LEN)?;
    }

    Ok(Command::CompleteMatch(CompletePayload {
        match_id,
        success,
        rating,
        feedback,
    }))
}

fn parse_channel(payload: &Value, cmd: &str) -> Result<String, DirectoryError> {
    let obj = as_object(cmd, payload)?;
    let channel_id = require_str(cmd, obj, &["channelId", "channel_id"])?;
    check_len(cmd, "channelId", channel_id, MAX_CHANNEL_LEN)?;
    check_ident(cmd, "channelId", channel_id)?;
    Ok(channel_id.to_string())
}

fn parse_record_message(payload: &Value) -> Result<Command, DirectoryError> {
    const CMD: &str = "recordMessage";
    let obj = as_object(CMD, payload)?;
    let channel_id = optional_str(CMD, obj, &["channelId", "channel_id"])?;
    if let Some(ref id) = channel_id {
        check_len(CMD, "channelId", id, MAX_CHANNEL_LEN)?;
    }
    Ok(Command::RecordMessage { channel_id })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn as_object<'a>(
    cmd: &str,
    payload: &'a Value,
) -> Result<&'a Map<String, Value>, DirectoryError> {
    payload
        .as_object()
        .ok_or_else(|| DirectoryError::validation(cmd, "payload must be an object"))
}

/// First present field among the accepted spellings.
fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| obj.get(*n))
}

fn require_str<'a>(
    cmd: &str,
    obj: &'a Map<String, Value>,
    names: &[&str],
) -> Result<&'a str, DirectoryError> {
    match field(obj, names) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(DirectoryError::validation(
            cmd,
            format!("'{}' must be a string", names[0]),
        )),
        None => Err(DirectoryError::validation(
            cmd,
            format!("missing required field '{}'", names[0]),
        )),
    }
}

fn optional_str(
    cmd: &str,
    obj: &Map<String, Value>,
    names: &[&str],
) -> Result<Option<String>, DirectoryError> {
    match field(obj, names) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DirectoryError::validation(
            cmd,
            format!("'{}' must be a string", names[0]),
        )),
    }
}

fn require_f64(
    cmd: &str,
    obj: &Map<String, Value>,
    names: &[&str],
) -> Result<f64, DirectoryError> {
    match field(obj, names) {
        Some(v) => v.as_f64().ok_or_else(|| {
            DirectoryError::validation(cmd, format!("'{}' must be a number", names[0]))
        }),
        None => Err(DirectoryError::validation(
            cmd,
            format!("missing required field '{}'", names[0]),
        )),
    }
}

fn optional_f64(
    cmd: &str,
    obj: &Map<String, Value>,
    names: &[&str],
) -> Result<Option<f64>, DirectoryError> {
    match field(obj, names) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| {
                DirectoryError::validation(cmd, format!("'{}' must be a number", names[0]))
            }),
    }
}

fn optional_i64(
    cmd: &str,
    obj: &Map<String, Value>,
    names: &[&str],
) -> Result<Option<i64>, DirectoryError> {
    match field(obj, names) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| {
                DirectoryError::validation(cmd, format!("'{}' must be an integer", names[0]))
            }),
    }
}

fn optional_bool(
    cmd: &str,
    obj: &Map<String, Value>,
    names: &[&str],
) -> Result<Option<bool>, DirectoryError> {
    match field(obj, names) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(DirectoryError::validation(
            cmd,
            format!("'{}' must be a boolean", names[0]),
        )),
    }
}

/// Required array of identifier strings.
fn require_str_array(
    cmd: &str,
    obj: &Map<String, Value>,
    names: &[&str],
    max_len: usize,
) -> Result<Vec<String>, DirectoryError> {
    let items = match field(obj, names) {
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(DirectoryError::validation(
                cmd,
                format!("'{}' must be an array", names[0]),
            ))
        }
        None => {
            return Err(DirectoryError::validation(
                cmd,
                format!("missing required field '{}'", names[0]),
            ))
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let s = item.as_str().ok_or_else(|| {
            DirectoryError::validation(cmd, format!("'{}' elements must be strings", names[0]))
        })?;
        check_len(cmd, names[0], s, max_len)?;
        check_ident(cmd, names[0], s)?;
        out.push(s.to_string());
    }
    Ok(out)
}

/// Optional array of capability objects with per-element schema.
fn parse_capabilities(
    cmd: &str,
    obj: &Map<String, Value>,
    names: &[&str],
) -> Result<Option<Vec<AgentCapability>>, DirectoryError> {
    let items = match field(obj, names) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(DirectoryError::validation(
                cmd,
                "'capabilities' must be an array",
            ))
        }
    };

    if items.len() > MAX_CAPABILITIES {
        return Err(DirectoryError::validation(
            cmd,
            format!("at most {} capabilities", MAX_CAPABILITIES),
        ));
    }

    let mut caps = Vec::with_capacity(items.len());
    for item in items {
        let entry = item.as_object().ok_or_else(|| {
            DirectoryError::validation(cmd, "'capabilities' elements must be objects")
        })?;

        let name = require_str(cmd, entry, &["name"])?;
        check_len(cmd, "capabilities[].name", name, MAX_CAPABILITY_LEN)?;
        check_ident(cmd, "capabilities[].name", name)?;

        // Out-of-range proficiency is clamped at write time, not rejected.
        let proficiency = require_f64(cmd, entry, &["proficiency"])?;

        let certified = optional_bool(cmd, entry, &["certified"])?.unwrap_or(false);
        let certified_by = optional_str(cmd, entry, &["certifiedBy", "certified_by"])?;
        let certified_at = optional_i64(cmd, entry, &["certifiedAt", "certified_at"])?;

        caps.push(AgentCapability {
            name: name.to_string(),
            proficiency,
            certified,
            certified_by,
            certified_at,
        });
    }
    Ok(Some(caps))
}

// ---------------------------------------------------------------------------
// Range, length, and enum rules
// ---------------------------------------------------------------------------

fn check_len(cmd: &str, label: &str, value: &str, max: usize) -> Result<(), DirectoryError> {
    if value.len() > max {
        return Err(DirectoryError::validation(
            cmd,
            format!("'{}' exceeds {} bytes", label, max),
        ));
    }
    Ok(())
}

fn check_range(
    cmd: &str,
    label: &str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), DirectoryError> {
    if !value.is_finite() || value < min || value > max {
        return Err(DirectoryError::validation(
            cmd,
            format!("'{}' must be within [{}, {}]", label, min, max),
        ));
    }
    Ok(())
}

fn check_ident(cmd: &str, label: &str, value: &str) -> Result<(), DirectoryError> {
    if !IDENT_RE.is_match(value) {
        return Err(DirectoryError::validation(
            cmd,
            format!("'{}' contains invalid characters", label),
        ));
    }
    Ok(())
}

fn parse_protocol(cmd: &str, value: &str) -> Result<Protocol, DirectoryError> {
    match value {
        "native" => Ok(Protocol::Native),
        "a2a" => Ok(Protocol::A2a),
        "mcp" => Ok(Protocol::Mcp),
        "custom" => Ok(Protocol::Custom),
        other => Err(DirectoryError::validation(
            cmd,
            format!("unknown protocol '{}'", other),
        )),
    }
}

fn parse_visibility(cmd: &str, value: &str) -> Result<Visibility, DirectoryError> {
    match value {
        "public" => Ok(Visibility::Public),
        "private" => Ok(Visibility::Private),
        other => Err(DirectoryError::validation(
            cmd,
            format!("unknown visibility '{}'", other),
        )),
    }
}

fn parse_status(cmd: &str, value: &str) -> Result<AgentStatus, DirectoryError> {
    match value {
        "online" => Ok(AgentStatus::Online),
        "offline" => Ok(AgentStatus::Offline),
        "busy" => Ok(AgentStatus::Busy),
        other => Err(DirectoryError::validation(
            cmd,
            format!("unknown status '{}'", other),
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
