//! Command-log replay driver.
//!
//! Reads a JSONL command log (one `{"signer", "timestamp", "command",
//! "payload"}` object per line), applies every command through the
//! validation layer and engine against an in-memory view, prints the
//! emitted events as JSON lines, and finishes with a stats summary.
//!
//! Rejected commands are logged and skipped; on a real replica the log
//! boundary decides whether to drop or flag them, and a rejection never
//! perturbs the view.
//!
//! # Environment Variables
//!
//! - `RUST_LOG` — log filter (default: "info")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin replay -- commands.jsonl
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use agora::view::keys;
use agora::{queries, CommandContext, Engine, KvView, MemoryView};

/// One line of the replayed log.
#[derive(Debug, Deserialize)]
struct LogEntry {
    signer: String,
    timestamp: i64,
    command: String,
    #[serde(default = "empty_payload")]
    payload: Value,
}

fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Replay every line of `reader`. Returns the final view plus the
/// applied/rejected counts.
fn replay_log(reader: impl BufRead) -> Result<(MemoryView, u64, u64)> {
    let engine = Engine::new();
    let mut view = MemoryView::new();
    let mut applied = 0u64;
    let mut rejected = 0u64;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: LogEntry = serde_json::from_str(&line)
            .with_context(|| format!("malformed log entry on line {}", line_no + 1))?;

        let ctx = CommandContext::new(entry.signer, entry.timestamp);
        match engine.apply_raw(&mut view, &ctx, &entry.command, &entry.payload) {
            Ok(Some(event)) => {
                applied += 1;
                println!("{}", serde_json::to_string(&event)?);
            }
            Ok(None) => applied += 1,
            Err(err) => {
                rejected += 1;
                log::warn!("line {}: rejected: {}", line_no + 1, err);
            }
        }
    }

    Ok((view, applied, rejected))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args()
        .nth(1)
        .context("usage: replay <commands.jsonl>")?;
    log::info!("agora replay v{} reading {}", agora::VERSION, path);

    let file = File::open(Path::new(&path)).with_context(|| format!("opening {}", path))?;
    let (mut view, applied, rejected) = replay_log(BufReader::new(file))?;

    // Stand in for the periodic heartbeat source: the host writes the
    // current wall-clock into the view, outside any transition.
    view.put(
        keys::HEARTBEAT,
        Value::from(chrono::Utc::now().timestamp_millis()),
    );

    let stats = queries::get_stats(&view)?;
    log::info!("applied {} commands, rejected {}", applied, rejected);
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LOG: &str = r#"{"signer": "a1", "timestamp": 100, "command": "register", "payload": {"name": "crawler", "capabilities": [{"name": "crawl", "proficiency": 0.9}]}}
{"signer": "a2", "timestamp": 110, "command": "register", "payload": {"name": "ranker"}}
{"signer": "a1", "timestamp": 120, "command": "joinChannel", "payload": {"channelId": "ops"}}
{"signer": "a1", "timestamp": 130, "command": "recordMessage"}
{"signer": "a3", "timestamp": 140, "command": "register", "payload": {"name": "crawler"}}
"#;

    #[test]
    fn test_replay_counts_and_state() {
        let (view, applied, rejected) = replay_log(LOG.as_bytes()).unwrap();
        assert_eq!(applied, 4);
        // Duplicate name on the last line.
        assert_eq!(rejected, 1);

        let stats = queries::get_stats(&view).unwrap();
        assert_eq!(stats.agents, 2);
        assert_eq!(stats.channels, 1);
        assert_eq!(stats.messages, 1);
    }

    #[test]
    fn test_replay_from_file_matches_in_memory() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LOG.as_bytes()).unwrap();

        let from_file =
            replay_log(BufReader::new(File::open(file.path()).unwrap())).unwrap();
        let in_memory = replay_log(LOG.as_bytes()).unwrap();
        assert_eq!(
            from_file.0.to_canonical_json(),
            in_memory.0.to_canonical_json()
        );
    }

    #[test]
    fn test_replay_rejects_malformed_line() {
        let log = "not json\n";
        assert!(replay_log(log.as_bytes()).is_err());
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let log = "\n\n";
        let (view, applied, rejected) = replay_log(log.as_bytes()).unwrap();
        assert!(view.is_empty());
        assert_eq!(applied, 0);
        assert_eq!(rejected, 0);
    }
}
