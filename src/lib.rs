//! Double-elimination bracket topology and advancement engine.
//!
//! A bracket is materialized from a static routing table keyed by
//! `(source match, outcome)`. Results advance players through that table with
//! every slot write checked by the validator first; the grand final and its
//! optional reset are handled by the completion detector.

pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod seeding;
pub mod service;
pub mod simulate;
pub mod store;
pub mod topology;
pub mod validator;

pub use completion::CompletionPhase;
pub use engine::{OverrideOutcome, Standing, SubmitOutcome, Tournament};
pub use error::{BracketError, BracketResult};
pub use model::{
    BracketVariant, EventId, Match, MatchId, MatchKey, MatchStatus, Player, PlayerId, SeedingPolicy,
    Slot, SlotPosition, TournamentId,
};
pub use service::BracketService;
pub use store::{JsonFileStore, MemoryStore, TournamentSnapshot, TournamentStore};
pub use topology::RoutingTable;
