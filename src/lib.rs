//! # Agora
//!
//! Deterministic state-transition engine for a decentralized directory of
//! autonomous software agents. Agents register capabilities, discover one
//! another, negotiate task hand-offs, and accumulate reputation; every
//! state change is applied as a pure function of (view, command, context)
//! so replicas fed the same ordered command stream converge on an
//! identical view without a central authority.
//!
//! The transport, the replicated log that orders commands, and signature
//! verification live in the host. The engine only reads and writes its
//! key-value view.

pub mod command;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod events;
pub mod index;
pub mod queries;
pub mod reputation;
pub mod schema;
pub mod types;
pub mod view;

pub use command::{Command, CommandContext};
pub use discovery::{discover, DiscoveryQuery, ScoredAgent};
pub use engine::{channel_for_match, Engine};
pub use error::DirectoryError;
pub use events::DirectoryEvent;
pub use schema::parse_command;
pub use types::{
    Agent, AgentCapability, AgentStatus, MatchProposal, MatchRequest, MatchStatus, Protocol,
    Visibility,
};
pub use view::{KvView, MemoryView};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
