//! Error taxonomy for bracket creation and advancement.

use crate::model::{MatchId, MatchKey, PlayerId, SlotRef, TournamentId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BracketError {
  /// Bad player count, bad player list, or a routing table that is not a bijection.
  #[error("invalid topology: {0}")]
  InvalidTopology(String),

  /// Attempted write to a slot that is already filled.
  #[error("slot conflict at {slot}: holds {existing}, refused {attempted}")]
  SlotConflict {
    slot: SlotRef,
    existing: String,
    attempted: String,
  },

  /// The same player would sit twice in one match or in two unresolved matches.
  #[error("duplicate player {player} at {slot}")]
  DuplicatePlayer { player: PlayerId, slot: SlotRef },

  /// A different result was already recorded for the match (or the event id was reused).
  #[error("result mismatch for match {match_id}: recorded {recorded}, submitted {submitted}")]
  ResultMismatch {
    match_id: MatchId,
    recorded: String,
    submitted: String,
  },

  #[error("match {0} is not ready")]
  MatchNotReady(MatchId),

  /// Duplicate event id for an already-applied result. Absorbed by `submit_result`.
  #[error("event {0} was already applied")]
  StaleEvent(String),

  #[error("tournament {0} not found")]
  UnknownTournament(TournamentId),

  #[error("match {0} not found")]
  UnknownMatch(String),

  #[error("player {player} is not in match {match_id}")]
  WinnerNotInMatch { match_id: MatchId, player: PlayerId },

  /// Override target is fed by a match that has not been resolved yet.
  #[error("slot {slot} is still fed by unresolved match {feeder}")]
  UnresolvedFeeder { slot: SlotRef, feeder: MatchKey },

  #[error("inconsistent bracket: {0}")]
  InconsistentBracket(String),

  #[error("storage error: {0}")]
  Storage(String),
}

pub type BracketResult<T> = Result<T, BracketError>;
