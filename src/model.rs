use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ── Round numbering ────────────────────────────────────────────────────

/// Loser-bracket rounds are numbered `LOSERS_ROUND_BASE + j` for j = 1, 2, ...
pub const LOSERS_ROUND_BASE: i32 = 100;
pub const GRAND_FINAL_ROUND: i32 = 900;
pub const RESET_ROUND: i32 = 901;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoundTier {
  Winners,
  Losers,
  GrandFinal,
  Reset,
}

pub fn round_tier(round: i32) -> Option<RoundTier> {
  match round {
    GRAND_FINAL_ROUND => Some(RoundTier::GrandFinal),
    RESET_ROUND => Some(RoundTier::Reset),
    r if r > LOSERS_ROUND_BASE && r < GRAND_FINAL_ROUND => Some(RoundTier::Losers),
    r if r >= 1 && r < LOSERS_ROUND_BASE => Some(RoundTier::Winners),
    _ => None,
  }
}

pub fn round_label(round: i32) -> String {
  match round_tier(round) {
    Some(RoundTier::Winners) => format!("W{round}"),
    Some(RoundTier::Losers) => format!("L{}", round - LOSERS_ROUND_BASE),
    Some(RoundTier::GrandFinal) => "GF1".to_string(),
    Some(RoundTier::Reset) => "GF2".to_string(),
    None => format!("R{round}"),
  }
}

// ── Identifiers ────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
  pub fn new(raw: impl Into<String>) -> Self {
    PlayerId(raw.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for PlayerId {
  fn from(raw: &str) -> Self {
    PlayerId(raw.to_string())
  }
}

impl From<String> for PlayerId {
  fn from(raw: String) -> Self {
    PlayerId(raw)
  }
}

impl fmt::Display for PlayerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Opaque idempotency key carried by every result submission.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
  pub fn new(raw: impl Into<String>) -> Self {
    EventId(raw.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for EventId {
  fn from(raw: &str) -> Self {
    EventId(raw.to_string())
  }
}

impl fmt::Display for EventId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TournamentId(Uuid);

impl TournamentId {
  pub fn new() -> Self {
    TournamentId(Uuid::new_v4())
  }
}

impl Default for TournamentId {
  fn default() -> Self {
    TournamentId::new()
  }
}

impl fmt::Display for TournamentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl FromStr for TournamentId {
  type Err = String;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    Uuid::parse_str(raw.trim())
      .map(TournamentId)
      .map_err(|e| format!("invalid tournament id {raw}: {e}"))
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchKey {
  pub round: i32,
  pub match_number: u32,
}

impl MatchKey {
  pub const fn new(round: i32, match_number: u32) -> Self {
    MatchKey { round, match_number }
  }

  pub const fn grand_final() -> Self {
    MatchKey::new(GRAND_FINAL_ROUND, 1)
  }

  pub const fn reset() -> Self {
    MatchKey::new(RESET_ROUND, 1)
  }

  pub fn tier(&self) -> Option<RoundTier> {
    round_tier(self.round)
  }
}

impl fmt::Display for MatchKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} match {}", round_label(self.round), self.match_number)
  }
}

// ── Players and slots ──────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
  pub id: PlayerId,
  #[serde(default)]
  pub seed: Option<u32>,
}

impl Player {
  pub fn new(id: impl Into<PlayerId>) -> Self {
    Player { id: id.into(), seed: None }
  }

  pub fn seeded(id: impl Into<PlayerId>, seed: u32) -> Self {
    Player { id: id.into(), seed: Some(seed) }
  }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "playerId", rename_all = "camelCase")]
pub enum Slot {
  #[default]
  Empty,
  Occupied(PlayerId),
  Bye,
}

impl Slot {
  pub fn is_empty(&self) -> bool {
    matches!(self, Slot::Empty)
  }

  pub fn player(&self) -> Option<&PlayerId> {
    match self {
      Slot::Occupied(id) => Some(id),
      _ => None,
    }
  }
}

impl From<PlayerId> for Slot {
  fn from(id: PlayerId) -> Self {
    Slot::Occupied(id)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotPosition {
  First,
  Second,
}

impl SlotPosition {
  pub fn index(self) -> usize {
    match self {
      SlotPosition::First => 0,
      SlotPosition::Second => 1,
    }
  }

  /// 1-based slot number, as used on the wire.
  pub fn number(self) -> u8 {
    self.index() as u8 + 1
  }

  pub fn from_number(number: u8) -> Option<Self> {
    match number {
      1 => Some(SlotPosition::First),
      2 => Some(SlotPosition::Second),
      _ => None,
    }
  }

  pub fn other(self) -> Self {
    match self {
      SlotPosition::First => SlotPosition::Second,
      SlotPosition::Second => SlotPosition::First,
    }
  }

  /// Slot taken by the feeder with 1-based index `n` when feeders pair up two by two.
  pub fn by_parity(n: u32) -> Self {
    if n % 2 == 1 {
      SlotPosition::First
    } else {
      SlotPosition::Second
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRef {
  pub key: MatchKey,
  pub position: SlotPosition,
}

impl SlotRef {
  pub const fn new(key: MatchKey, position: SlotPosition) -> Self {
    SlotRef { key, position }
  }
}

impl fmt::Display for SlotRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} slot {}", self.key, self.position.number())
  }
}

// ── Matches ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchStatus {
  Pending,
  Ready,
  InProgress,
  Completed,
  Skipped,
}

impl MatchStatus {
  pub fn is_resolved(self) -> bool {
    matches!(self, MatchStatus::Completed | MatchStatus::Skipped)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
  Won,
  Lost,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
  pub id: MatchId,
  pub key: MatchKey,
  pub label: String,
  pub slots: [Slot; 2],
  pub status: MatchStatus,
  pub winner: Option<PlayerId>,
  pub loser: Option<PlayerId>,
}

impl Match {
  pub fn new(id: MatchId, key: MatchKey) -> Self {
    Match {
      id,
      key,
      label: round_label(key.round),
      slots: [Slot::Empty, Slot::Empty],
      status: MatchStatus::Pending,
      winner: None,
      loser: None,
    }
  }

  pub fn slot(&self, position: SlotPosition) -> &Slot {
    &self.slots[position.index()]
  }

  pub fn slots_filled(&self) -> bool {
    self.slots.iter().all(|slot| !slot.is_empty())
  }

  pub fn has_player(&self, player: &PlayerId) -> bool {
    self.slots.iter().any(|slot| slot.player() == Some(player))
  }

  pub fn position_of(&self, player: &PlayerId) -> Option<SlotPosition> {
    if self.slots[0].player() == Some(player) {
      Some(SlotPosition::First)
    } else if self.slots[1].player() == Some(player) {
      Some(SlotPosition::Second)
    } else {
      None
    }
  }

  pub fn record(&self) -> MatchRecord {
    MatchRecord::from(self)
  }
}

// ── Variants and policies ──────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BracketVariant {
  #[default]
  DoubleElimination,
  DoubleEliminationSingleFinal,
  SingleElimination,
}

impl BracketVariant {
  pub fn has_losers_bracket(self) -> bool {
    !matches!(self, BracketVariant::SingleElimination)
  }

  pub fn has_reset(self) -> bool {
    matches!(self, BracketVariant::DoubleElimination)
  }

  /// Losses after which a player is out.
  pub fn elimination_losses(self) -> u32 {
    if self.has_losers_bracket() {
      2
    } else {
      1
    }
  }
}

impl FromStr for BracketVariant {
  type Err = String;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    match raw.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
      "doubleelimination" | "double" | "de" => Ok(BracketVariant::DoubleElimination),
      "doubleeliminationsinglefinal" | "singlefinal" | "denoreset" => {
        Ok(BracketVariant::DoubleEliminationSingleFinal)
      }
      "singleelimination" | "single" | "se" => Ok(BracketVariant::SingleElimination),
      other => Err(format!("unknown bracket variant: {other}")),
    }
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeedingPolicy {
  #[default]
  Ranked,
  Random,
}

impl FromStr for SeedingPolicy {
  type Err = String;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "ranked" => Ok(SeedingPolicy::Ranked),
      "random" => Ok(SeedingPolicy::Random),
      other => Err(format!("unknown seeding policy: {other}")),
    }
  }
}

// ── Persisted shapes ───────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
  pub id: MatchId,
  pub round: i32,
  pub match_number: u32,
  pub slot1: Slot,
  pub slot2: Slot,
  pub status: MatchStatus,
  pub winner_id: Option<PlayerId>,
  pub loser_id: Option<PlayerId>,
}

impl From<&Match> for MatchRecord {
  fn from(m: &Match) -> Self {
    MatchRecord {
      id: m.id,
      round: m.key.round,
      match_number: m.key.match_number,
      slot1: m.slots[0].clone(),
      slot2: m.slots[1].clone(),
      status: m.status,
      winner_id: m.winner.clone(),
      loser_id: m.loser.clone(),
    }
  }
}

impl From<MatchRecord> for Match {
  fn from(record: MatchRecord) -> Self {
    let key = MatchKey::new(record.round, record.match_number);
    Match {
      id: record.id,
      key,
      label: round_label(key.round),
      slots: [record.slot1, record.slot2],
      status: record.status,
      winner: record.winner_id,
      loser: record.loser_id,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentRecord {
  pub id: TournamentId,
  pub size: u32,
  pub variant: BracketVariant,
  pub routing_table_version: u32,
  pub champion_id: Option<PlayerId>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_tiers_follow_reserved_bands() {
    assert_eq!(round_tier(1), Some(RoundTier::Winners));
    assert_eq!(round_tier(6), Some(RoundTier::Winners));
    assert_eq!(round_tier(101), Some(RoundTier::Losers));
    assert_eq!(round_tier(GRAND_FINAL_ROUND), Some(RoundTier::GrandFinal));
    assert_eq!(round_tier(RESET_ROUND), Some(RoundTier::Reset));
    assert_eq!(round_tier(0), None);
    assert_eq!(round_tier(LOSERS_ROUND_BASE), None);
  }

  #[test]
  fn labels_match_bracket_sides() {
    assert_eq!(round_label(2), "W2");
    assert_eq!(round_label(103), "L3");
    assert_eq!(round_label(GRAND_FINAL_ROUND), "GF1");
    assert_eq!(round_label(RESET_ROUND), "GF2");
  }

  #[test]
  fn slot_serializes_with_kind_tag() {
    let slot = Slot::Occupied(PlayerId::from("alice"));
    let json = serde_json::to_value(&slot).unwrap();
    assert_eq!(json, serde_json::json!({ "kind": "occupied", "playerId": "alice" }));
    let empty = serde_json::to_value(Slot::Empty).unwrap();
    assert_eq!(empty, serde_json::json!({ "kind": "empty" }));
  }

  #[test]
  fn match_record_uses_persisted_field_names() {
    let mut m = Match::new(MatchId(7), MatchKey::new(102, 3));
    m.slots[0] = Slot::Occupied("a".into());
    let value = serde_json::to_value(m.record()).unwrap();
    assert_eq!(value["matchNumber"], 3);
    assert_eq!(value["round"], 102);
    assert!(value.get("winnerId").is_some());
    assert_eq!(Match::from(m.record()), m);
  }

  #[test]
  fn variant_parses_common_spellings() {
    assert_eq!("double-elimination".parse::<BracketVariant>().unwrap(), BracketVariant::DoubleElimination);
    assert_eq!("SE".parse::<BracketVariant>().unwrap(), BracketVariant::SingleElimination);
    assert!("swiss".parse::<BracketVariant>().is_err());
  }
}
