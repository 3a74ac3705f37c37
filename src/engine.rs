//! Tournament aggregate: creation, result submission, and admin overrides.
//!
//! Every mutation is staged against an overlay of the committed matches and
//! only folded back once all invariant checks passed, so a rejected write
//! leaves the tournament exactly as it was.

use crate::completion::{self, CompletionPhase, Transition, Verdict};
use crate::error::{BracketError, BracketResult};
use crate::model::{
  BracketVariant, EventId, Match, MatchId, MatchKey, MatchStatus, Outcome, Player, PlayerId,
  RoundTier, SeedingPolicy, Slot, SlotPosition, SlotRef, TournamentId, TournamentRecord,
};
use crate::seeding;
use crate::store::TournamentSnapshot;
use crate::topology::{RoutingTable, ROUTING_TABLE_VERSION};
use crate::validator::{self, describe_slot, MatchView};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
  pub match_id: MatchId,
  pub newly_ready: Vec<MatchId>,
  #[serde(default)]
  pub auto_completed: Vec<MatchId>,
  pub champion: Option<PlayerId>,
  #[serde(default)]
  pub replayed: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideOutcome {
  pub invalidated: Vec<MatchId>,
  pub newly_ready: Vec<MatchId>,
  #[serde(default)]
  pub auto_completed: Vec<MatchId>,
  pub champion: Option<PlayerId>,
}

/// A result that was applied, kept so duplicates can be answered without re-applying.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResult {
  pub event_id: EventId,
  pub match_key: MatchKey,
  pub winner: PlayerId,
  pub outcome: SubmitOutcome,
}

/// An event id that has been consumed. Outlives reopened matches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpentEvent {
  pub event_id: EventId,
  pub match_key: MatchKey,
  pub winner: PlayerId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerState {
  Active,
  Eliminated,
  Champion,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
  pub player: PlayerId,
  pub seed: Option<u32>,
  pub losses: u32,
  pub state: PlayerState,
  pub last_match: Option<MatchKey>,
}

#[derive(Clone, Debug)]
pub struct Tournament {
  id: TournamentId,
  variant: BracketVariant,
  seeding: SeedingPolicy,
  routing: Arc<RoutingTable>,
  players: Vec<Player>,
  matches: BTreeMap<MatchKey, Match>,
  index: HashMap<MatchId, MatchKey>,
  results: BTreeMap<MatchKey, AppliedResult>,
  events: HashMap<EventId, (MatchKey, PlayerId)>,
  phase: CompletionPhase,
  champion: Option<PlayerId>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

// ── Staging ────────────────────────────────────────────────────────────

/// Copy-on-write overlay over the committed matches.
struct Staged<'a> {
  base: &'a BTreeMap<MatchKey, Match>,
  changed: BTreeMap<MatchKey, Match>,
}

impl<'a> Staged<'a> {
  fn new(base: &'a BTreeMap<MatchKey, Match>) -> Self {
    Staged {
      base,
      changed: BTreeMap::new(),
    }
  }

  fn get(&self, key: MatchKey) -> Option<&Match> {
    self.changed.get(&key).or_else(|| self.base.get(&key))
  }

  fn get_mut(&mut self, key: MatchKey) -> BracketResult<&mut Match> {
    if !self.changed.contains_key(&key) {
      let current = self
        .base
        .get(&key)
        .cloned()
        .ok_or_else(|| BracketError::UnknownMatch(key.to_string()))?;
      self.changed.insert(key, current);
    }
    self
      .changed
      .get_mut(&key)
      .ok_or_else(|| BracketError::UnknownMatch(key.to_string()))
  }
}

impl MatchView for Staged<'_> {
  fn get_match(&self, key: MatchKey) -> Option<&Match> {
    self.get(key)
  }

  fn all_matches(&self) -> Box<dyn Iterator<Item = &Match> + '_> {
    Box::new(self.base.keys().filter_map(move |key| self.get(*key)))
  }
}

/// One advancement step: completions, routed writes, and bye resolution.
struct Advance<'a> {
  routing: &'a RoutingTable,
  staged: Staged<'a>,
  phase: CompletionPhase,
  newly_ready: Vec<MatchKey>,
  auto_completed: Vec<MatchKey>,
  resolved: Vec<MatchKey>,
  byes: VecDeque<MatchKey>,
}

impl<'a> Advance<'a> {
  fn new(routing: &'a RoutingTable, base: &'a BTreeMap<MatchKey, Match>, phase: CompletionPhase) -> Self {
    Advance {
      routing,
      staged: Staged::new(base),
      phase,
      newly_ready: Vec::new(),
      auto_completed: Vec::new(),
      resolved: Vec::new(),
      byes: VecDeque::new(),
    }
  }

  fn complete(&mut self, key: MatchKey, winner: PlayerId) -> BracketResult<()> {
    let m = self.staged.get_mut(key)?;
    let position = m.position_of(&winner).ok_or_else(|| BracketError::WinnerNotInMatch {
      match_id: m.id,
      player: winner.clone(),
    })?;
    let loser = m.slot(position.other()).player().cloned();
    m.status = MatchStatus::Completed;
    m.winner = Some(winner.clone());
    m.loser = loser.clone();
    validator::check_match(m)?;
    self.resolved.push(key);

    self.route(key, Outcome::Won, Slot::Occupied(winner))?;
    self.route(key, Outcome::Lost, loser.map(Slot::Occupied).unwrap_or(Slot::Bye))
  }

  fn route(&mut self, source: MatchKey, outcome: Outcome, value: Slot) -> BracketResult<()> {
    let Some(dest) = self.routing.destination(source, outcome) else {
      return Ok(());
    };
    self.write(dest, value)
  }

  fn write(&mut self, slot: SlotRef, value: Slot) -> BracketResult<()> {
    validator::check_slot_write(&self.staged, slot, &value)?;
    debug!("write {} <- {}", slot, describe_slot(&value));
    let m = self.staged.get_mut(slot.key)?;
    m.slots[slot.position.index()] = value;
    self.refresh(slot.key)
  }

  /// Promotes a filled pending match to ready, or queues it for bye resolution.
  fn refresh(&mut self, key: MatchKey) -> BracketResult<()> {
    let reset_locked = key.tier() == Some(RoundTier::Reset) && self.phase != CompletionPhase::ResetPending;
    let m = self.staged.get_mut(key)?;
    if m.status != MatchStatus::Pending || !m.slots_filled() || reset_locked {
      return Ok(());
    }
    validator::check_match(m)?;
    m.status = MatchStatus::Ready;
    let has_bye = m.slots.iter().any(|slot| *slot == Slot::Bye);
    if has_bye {
      self.byes.push_back(key);
    } else {
      self.newly_ready.push(key);
    }
    Ok(())
  }

  fn drain_byes(&mut self) -> BracketResult<()> {
    while let Some(key) = self.byes.pop_front() {
      let (first, second) = match self.staged.get(key) {
        Some(m) => (m.slots[0].player().cloned(), m.slots[1].player().cloned()),
        None => return Err(BracketError::UnknownMatch(key.to_string())),
      };
      match (first, second) {
        (Some(player), None) | (None, Some(player)) => {
          debug!("{key} resolved by bye for {player}");
          self.complete(key, player)?;
        }
        (None, None) => {
          debug!("{key} skipped, both slots are byes");
          self.staged.get_mut(key)?.status = MatchStatus::Skipped;
          self.resolved.push(key);
          self.route(key, Outcome::Won, Slot::Bye)?;
          self.route(key, Outcome::Lost, Slot::Bye)?;
        }
        (Some(_), Some(_)) => continue,
      }
      self.auto_completed.push(key);
    }
    Ok(())
  }

  /// Applies the detector's verdict inside the same staged step.
  fn settle(
    &mut self,
    transition: Option<Transition>,
    players: &[Player],
    variant: BracketVariant,
  ) -> BracketResult<Option<PlayerId>> {
    let Some(transition) = transition else {
      return Ok(None);
    };
    let phase = transition.phase();
    match transition.verdict {
      Verdict::Champion(champion) => {
        if variant.has_reset() {
          let reset = self.staged.get_mut(MatchKey::reset())?;
          if reset.status == MatchStatus::Pending {
            reset.status = MatchStatus::Skipped;
          }
        }
        validator::check_standings(
          players,
          self.staged.all_matches(),
          variant,
          &champion,
          self.routing.final_match(),
        )?;
        self.phase = phase;
        Ok(Some(champion))
      }
      Verdict::ActivateReset { first, second } => {
        self.phase = phase;
        let reset = MatchKey::reset();
        self.write(SlotRef::new(reset, SlotPosition::First), Slot::Occupied(first))?;
        self.write(SlotRef::new(reset, SlotPosition::Second), Slot::Occupied(second))?;
        Ok(None)
      }
    }
  }

  fn ids(&self, keys: &[MatchKey]) -> Vec<MatchId> {
    keys.iter().filter_map(|key| self.staged.get(*key)).map(|m| m.id).collect()
  }
}

/// Result of running a staged step, ready to be folded into a tournament.
struct Step {
  changes: BTreeMap<MatchKey, Match>,
  phase: CompletionPhase,
  champion: Option<PlayerId>,
  newly_ready: Vec<MatchId>,
  auto_completed: Vec<MatchId>,
}

// ── Tournament ─────────────────────────────────────────────────────────

impl Tournament {
  pub fn create(players: &[Player], variant: BracketVariant, policy: SeedingPolicy) -> BracketResult<Self> {
    Self::create_with_rng(players, variant, policy, &mut rand::rng())
  }

  pub fn create_with_rng<R: Rng + ?Sized>(
    players: &[Player],
    variant: BracketVariant,
    policy: SeedingPolicy,
    rng: &mut R,
  ) -> BracketResult<Self> {
    let size = u32::try_from(players.len())
      .map_err(|_| BracketError::InvalidTopology(format!("too many players: {}", players.len())))?;
    let routing = RoutingTable::build(size, variant)?;
    let seeding = seeding::assign_round_one(players, size, policy, rng)?;

    let mut matches = BTreeMap::new();
    let mut index = HashMap::new();
    for (idx, key) in routing.match_keys().into_iter().enumerate() {
      let id = MatchId(idx as u64 + 1);
      matches.insert(key, Match::new(id, key));
      index.insert(id, key);
    }

    for (idx, pair) in seeding.pairings.iter().enumerate() {
      let key = MatchKey::new(1, idx as u32 + 1);
      for (position, player) in [SlotPosition::First, SlotPosition::Second].into_iter().zip(pair) {
        let value = Slot::Occupied(player.clone());
        validator::check_slot_write(&matches, SlotRef::new(key, position), &value)?;
        if let Some(m) = matches.get_mut(&key) {
          m.slots[position.index()] = value;
        }
      }
      if let Some(m) = matches.get_mut(&key) {
        validator::check_match(m)?;
        m.status = MatchStatus::Ready;
      }
    }

    let now = Utc::now();
    let tournament = Tournament {
      id: TournamentId::new(),
      variant,
      seeding: policy,
      routing: Arc::new(routing),
      players: seeding.players,
      matches,
      index,
      results: BTreeMap::new(),
      events: HashMap::new(),
      phase: CompletionPhase::AwaitingFinal,
      champion: None,
      created_at: now,
      updated_at: now,
    };
    info!(
      "created {} bracket {} for {} players ({} matches)",
      variant_name(variant),
      tournament.id,
      size,
      tournament.matches.len()
    );
    Ok(tournament)
  }

  pub fn id(&self) -> TournamentId {
    self.id
  }

  pub fn size(&self) -> u32 {
    self.routing.size()
  }

  pub fn variant(&self) -> BracketVariant {
    self.variant
  }

  pub fn seeding_policy(&self) -> SeedingPolicy {
    self.seeding
  }

  pub fn routing(&self) -> &RoutingTable {
    &self.routing
  }

  pub fn players(&self) -> &[Player] {
    &self.players
  }

  pub fn phase(&self) -> CompletionPhase {
    self.phase
  }

  pub fn champion(&self) -> Option<&PlayerId> {
    self.champion.as_ref()
  }

  pub fn is_finished(&self) -> bool {
    self.phase.is_finished()
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  pub fn updated_at(&self) -> DateTime<Utc> {
    self.updated_at
  }

  pub fn get_match(&self, key: MatchKey) -> Option<&Match> {
    self.matches.get(&key)
  }

  pub fn match_by_id(&self, id: MatchId) -> Option<&Match> {
    self.index.get(&id).and_then(|key| self.matches.get(key))
  }

  /// Matches in creation order.
  pub fn matches(&self) -> impl Iterator<Item = &Match> {
    let mut all: Vec<&Match> = self.matches.values().collect();
    all.sort_by_key(|m| m.id);
    all.into_iter()
  }

  pub fn ready_matches(&self) -> Vec<&Match> {
    self
      .matches()
      .filter(|m| m.status == MatchStatus::Ready)
      .collect()
  }

  pub fn results(&self) -> impl Iterator<Item = &AppliedResult> {
    self.results.values()
  }

  pub fn record(&self) -> TournamentRecord {
    TournamentRecord {
      id: self.id,
      size: self.size(),
      variant: self.variant,
      routing_table_version: ROUTING_TABLE_VERSION,
      champion_id: self.champion.clone(),
    }
  }

  // ── Results ──────────────────────────────────────────────────────────

  /// Applies a result. Duplicates of an already-applied result are absorbed and
  /// answered with the original outcome.
  pub fn submit_result(
    &mut self,
    match_id: MatchId,
    winner: &PlayerId,
    event_id: &EventId,
  ) -> BracketResult<SubmitOutcome> {
    match self.apply_result(match_id, winner, event_id) {
      Err(BracketError::StaleEvent(event)) => {
        debug!("ignoring duplicate result {event} for match {match_id}");
        let mut outcome = self
          .index
          .get(&match_id)
          .and_then(|key| self.results.get(key))
          .map(|applied| applied.outcome.clone())
          .unwrap_or_else(|| SubmitOutcome {
            match_id,
            champion: self.champion.clone(),
            ..SubmitOutcome::default()
          });
        outcome.replayed = true;
        Ok(outcome)
      }
      other => other,
    }
  }

  /// Strict form of [`Tournament::submit_result`]: duplicates surface as `StaleEvent`.
  pub fn apply_result(
    &mut self,
    match_id: MatchId,
    winner: &PlayerId,
    event_id: &EventId,
  ) -> BracketResult<SubmitOutcome> {
    let key = *self
      .index
      .get(&match_id)
      .ok_or_else(|| BracketError::UnknownMatch(match_id.to_string()))?;

    // Spent ids stay spent even after the match they settled was reopened.
    if let Some((seen, recorded)) = self.events.get(event_id) {
      if *seen == key && recorded == winner {
        return Err(BracketError::StaleEvent(event_id.to_string()));
      }
      return Err(BracketError::ResultMismatch {
        match_id,
        recorded: format!("event {event_id} already applied to {seen} won by {recorded}"),
        submitted: format!("{key} won by {winner}"),
      });
    }

    let m = self
      .matches
      .get(&key)
      .ok_or_else(|| BracketError::UnknownMatch(key.to_string()))?;
    match m.status {
      MatchStatus::Completed => {
        if m.winner.as_ref() == Some(winner) {
          return Err(BracketError::StaleEvent(event_id.to_string()));
        }
        return Err(BracketError::ResultMismatch {
          match_id,
          recorded: m
            .winner
            .as_ref()
            .map(|w| w.to_string())
            .unwrap_or_else(|| "no winner".to_string()),
          submitted: winner.to_string(),
        });
      }
      MatchStatus::Pending | MatchStatus::Skipped => return Err(BracketError::MatchNotReady(match_id)),
      MatchStatus::Ready | MatchStatus::InProgress => {}
    }
    if !m.has_player(winner) {
      return Err(BracketError::WinnerNotInMatch {
        match_id,
        player: winner.clone(),
      });
    }

    let routing = Arc::clone(&self.routing);
    let step = {
      let mut advance = Advance::new(&routing, &self.matches, self.phase);
      advance.complete(key, winner.clone())?;
      self.finish_step(advance)?
    };

    let outcome = SubmitOutcome {
      match_id,
      newly_ready: step.newly_ready.clone(),
      auto_completed: step.auto_completed.clone(),
      champion: step.champion.clone(),
      replayed: false,
    };
    self.commit(step);
    self.results.insert(
      key,
      AppliedResult {
        event_id: event_id.clone(),
        match_key: key,
        winner: winner.clone(),
        outcome: outcome.clone(),
      },
    );
    self.events.insert(event_id.clone(), (key, winner.clone()));

    info!("{} {key}: {winner} won (event {event_id})", self.id);
    if let Some(champion) = &outcome.champion {
      info!("{} finished, champion {champion}", self.id);
    }
    Ok(outcome)
  }

  /// Marks a ready match as being played.
  pub fn start_match(&mut self, match_id: MatchId) -> BracketResult<&Match> {
    let key = *self
      .index
      .get(&match_id)
      .ok_or_else(|| BracketError::UnknownMatch(match_id.to_string()))?;
    let m = self
      .matches
      .get_mut(&key)
      .ok_or_else(|| BracketError::UnknownMatch(key.to_string()))?;
    match m.status {
      MatchStatus::Ready => {
        m.status = MatchStatus::InProgress;
        self.updated_at = Utc::now();
        debug!("{key} in progress");
      }
      MatchStatus::InProgress => {}
      _ => return Err(BracketError::MatchNotReady(match_id)),
    }
    Ok(&*m)
  }

  // ── Overrides ────────────────────────────────────────────────────────

  /// Replaces one slot and invalidates every match downstream of it.
  pub fn override_slot(
    &mut self,
    key: MatchKey,
    position: SlotPosition,
    value: Slot,
  ) -> BracketResult<OverrideOutcome> {
    if !self.matches.contains_key(&key) {
      return Err(BracketError::UnknownMatch(key.to_string()));
    }
    let slot = SlotRef::new(key, position);
    if let Some(player) = value.player() {
      if !self.players.iter().any(|p| &p.id == player) {
        return Err(BracketError::InconsistentBracket(format!(
          "{player} is not registered in this tournament"
        )));
      }
    }
    let feeder = if key.tier() == Some(RoundTier::Reset) {
      let reset_active = matches!(
        self.phase,
        CompletionPhase::ResetPending | CompletionPhase::ResetPlayed
      ) || self.champion_from_reset();
      (!reset_active).then(|| self.routing.final_match())
    } else {
      self
        .routing
        .feeder(slot)
        .map(|route| route.source)
        .filter(|source| self.matches.get(source).map(|m| !m.status.is_resolved()).unwrap_or(true))
    };
    if let Some(feeder) = feeder {
      return Err(BracketError::UnresolvedFeeder { slot, feeder });
    }

    let (next, outcome) = self.invalidate_from(key, Some((position, value)))?;
    warn!(
      "{} override at {slot}: {} matches invalidated",
      self.id,
      outcome.invalidated.len()
    );
    *self = next;
    Ok(outcome)
  }

  /// Clears the result of a match and everything that depended on it.
  pub fn reset_match(&mut self, match_id: MatchId) -> BracketResult<OverrideOutcome> {
    let key = *self
      .index
      .get(&match_id)
      .ok_or_else(|| BracketError::UnknownMatch(match_id.to_string()))?;
    let (next, outcome) = self.invalidate_from(key, None)?;
    warn!(
      "{} reopened {key}: {} matches invalidated",
      self.id,
      outcome.invalidated.len()
    );
    *self = next;
    Ok(outcome)
  }

  fn champion_from_reset(&self) -> bool {
    self
      .matches
      .get(&MatchKey::reset())
      .map(|m| m.status == MatchStatus::Completed)
      .unwrap_or(false)
  }

  /// `root` plus every match that can receive a player from it, directly or not.
  pub fn downstream_of(&self, root: MatchKey) -> BTreeSet<MatchKey> {
    let final_key = self.routing.final_match();
    let mut affected = BTreeSet::new();
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
      if !affected.insert(current) {
        continue;
      }
      stack.extend(self.routing.dependents(current));
      if current == final_key && self.variant.has_reset() {
        stack.push(MatchKey::reset());
      }
    }
    affected
  }

  fn invalidate_from(
    &self,
    key: MatchKey,
    replacement: Option<(SlotPosition, Slot)>,
  ) -> BracketResult<(Tournament, OverrideOutcome)> {
    let affected = self.downstream_of(key);
    let final_cleared = affected.contains(&self.routing.final_match());
    let mut next = self.clone();

    for k in &affected {
      let Some(m) = next.matches.get_mut(k) else {
        continue;
      };
      for position in [SlotPosition::First, SlotPosition::Second] {
        let derived = match self.routing.feeder(SlotRef::new(*k, position)) {
          Some(route) => affected.contains(&route.source),
          None => k.tier() == Some(RoundTier::Reset) && final_cleared,
        };
        if derived {
          m.slots[position.index()] = Slot::Empty;
        }
      }
      m.status = MatchStatus::Pending;
      m.winner = None;
      m.loser = None;
      next.results.remove(k);
    }
    if final_cleared {
      next.phase = CompletionPhase::AwaitingFinal;
      next.champion = None;
    } else if affected.contains(&MatchKey::reset()) {
      next.phase = CompletionPhase::ResetPending;
      next.champion = None;
    }

    if let Some((position, value)) = replacement {
      let slot = SlotRef::new(key, position);
      if let Some(m) = next.matches.get_mut(&key) {
        m.slots[position.index()] = Slot::Empty;
      }
      validator::check_placement(&next.matches, slot, &value)?;
      if let Some(m) = next.matches.get_mut(&key) {
        m.slots[position.index()] = value;
      }
    }

    let invalidated: Vec<MatchId> = affected
      .iter()
      .filter_map(|k| next.matches.get(k))
      .map(|m| m.id)
      .collect();

    let routing = Arc::clone(&next.routing);
    let step = {
      let mut advance = Advance::new(&routing, &next.matches, next.phase);
      for k in &affected {
        advance.refresh(*k)?;
      }
      next.finish_step(advance)?
    };
    let outcome = OverrideOutcome {
      invalidated,
      newly_ready: step.newly_ready.clone(),
      auto_completed: step.auto_completed.clone(),
      champion: step.champion.clone(),
    };
    next.commit(step);
    Ok((next, outcome))
  }

  // ── Step plumbing ────────────────────────────────────────────────────

  /// Drains byes, runs completion detection, and turns the overlay into a committable step.
  fn finish_step(&self, mut advance: Advance<'_>) -> BracketResult<Step> {
    advance.drain_byes()?;
    let transition = completion::detect(
      advance.phase,
      self.variant,
      self.routing.final_match(),
      &advance.resolved,
      &advance.staged,
    )?;
    let champion = advance.settle(transition, &self.players, self.variant)?;
    // A reset activated by a bye-resolved final can itself resolve by bye.
    advance.drain_byes()?;
    let late = completion::detect(
      advance.phase,
      self.variant,
      self.routing.final_match(),
      &advance.resolved,
      &advance.staged,
    )?;
    let champion = match champion {
      Some(champion) => Some(champion),
      None => advance.settle(late, &self.players, self.variant)?,
    };

    let newly_ready = advance.ids(&advance.newly_ready);
    let auto_completed = advance.ids(&advance.auto_completed);
    Ok(Step {
      phase: advance.phase,
      champion: champion.or_else(|| self.champion.clone()),
      newly_ready,
      auto_completed,
      changes: advance.staged.changed,
    })
  }

  fn commit(&mut self, step: Step) {
    for (key, m) in step.changes {
      self.matches.insert(key, m);
    }
    self.phase = step.phase;
    self.champion = step.champion;
    self.updated_at = Utc::now();
  }

  // ── Standings ────────────────────────────────────────────────────────

  /// Re-runs the end-of-tournament consistency check against the committed state.
  pub fn verify_standings(&self) -> BracketResult<()> {
    let champion = self
      .champion
      .as_ref()
      .ok_or_else(|| BracketError::InconsistentBracket("no champion yet".to_string()))?;
    validator::check_standings(
      &self.players,
      self.matches.values(),
      self.variant,
      champion,
      self.routing.final_match(),
    )
  }

  pub fn standings(&self) -> Vec<Standing> {
    let threshold = self.variant.elimination_losses();
    let final_key = self.routing.final_match();
    let final_loser = self
      .matches
      .get(&final_key)
      .filter(|m| m.status == MatchStatus::Completed)
      .and_then(|m| m.loser.clone());

    self
      .players
      .iter()
      .map(|player| {
        let mut losses = 0;
        let mut last_match = None;
        for m in self.matches.values() {
          if m.has_player(&player.id) {
            last_match = Some(m.key);
          }
          if m.status == MatchStatus::Completed && m.loser.as_ref() == Some(&player.id) {
            losses += 1;
          }
        }
        let state = if self.champion.as_ref() == Some(&player.id) {
          PlayerState::Champion
        } else if losses >= threshold
          || self.phase.is_finished()
          || (!self.variant.has_reset() && final_loser.as_ref() == Some(&player.id))
        {
          PlayerState::Eliminated
        } else {
          PlayerState::Active
        };
        Standing {
          player: player.id.clone(),
          seed: player.seed,
          losses,
          state,
          last_match,
        }
      })
      .collect()
  }

  // ── Snapshots ────────────────────────────────────────────────────────

  pub fn snapshot(&self) -> TournamentSnapshot {
    TournamentSnapshot {
      tournament: self.record(),
      seeding: self.seeding,
      phase: self.phase,
      players: self.players.clone(),
      matches: self.matches().map(Match::record).collect(),
      results: self.results.values().cloned().collect(),
      events: self.spent_events(),
      created_at: self.created_at,
      updated_at: self.updated_at,
    }
  }

  /// Every consumed event id, ordered for stable snapshots.
  pub fn spent_events(&self) -> Vec<SpentEvent> {
    let mut spent: Vec<SpentEvent> = self
      .events
      .iter()
      .map(|(event_id, (match_key, winner))| SpentEvent {
        event_id: event_id.clone(),
        match_key: *match_key,
        winner: winner.clone(),
      })
      .collect();
    spent.sort_by(|a, b| a.event_id.as_str().cmp(b.event_id.as_str()));
    spent
  }

  /// Rebuilds a tournament from a snapshot, re-deriving the routing table from its parameters.
  pub fn from_snapshot(snapshot: TournamentSnapshot) -> BracketResult<Self> {
    let record = snapshot.tournament;
    if record.routing_table_version != ROUTING_TABLE_VERSION {
      return Err(BracketError::InvalidTopology(format!(
        "snapshot uses routing table version {}, expected {ROUTING_TABLE_VERSION}",
        record.routing_table_version
      )));
    }
    let routing = RoutingTable::build(record.size, record.variant)?;
    if snapshot.players.len() != record.size as usize {
      return Err(BracketError::InconsistentBracket(format!(
        "snapshot lists {} players for a bracket of {}",
        snapshot.players.len(),
        record.size
      )));
    }

    let mut matches = BTreeMap::new();
    let mut index = HashMap::new();
    for match_record in snapshot.matches {
      let m = Match::from(match_record);
      if !routing.contains(m.key) {
        return Err(BracketError::InconsistentBracket(format!(
          "snapshot holds {} outside the bracket",
          m.key
        )));
      }
      validator::check_match(&m)?;
      index.insert(m.id, m.key);
      if matches.insert(m.key, m).is_some() {
        return Err(BracketError::InconsistentBracket("snapshot repeats a match".to_string()));
      }
    }
    if matches.len() != routing.match_count() || index.len() != matches.len() {
      return Err(BracketError::InconsistentBracket(format!(
        "snapshot holds {} matches, bracket needs {}",
        matches.len(),
        routing.match_count()
      )));
    }

    let mut results = BTreeMap::new();
    let mut events = HashMap::new();
    for applied in snapshot.results {
      events.insert(applied.event_id.clone(), (applied.match_key, applied.winner.clone()));
      results.insert(applied.match_key, applied);
    }
    for spent in snapshot.events {
      events.entry(spent.event_id).or_insert((spent.match_key, spent.winner));
    }

    Ok(Tournament {
      id: record.id,
      variant: record.variant,
      seeding: snapshot.seeding,
      routing: Arc::new(routing),
      players: snapshot.players,
      matches,
      index,
      results,
      events,
      phase: snapshot.phase,
      champion: record.champion_id,
      created_at: snapshot.created_at,
      updated_at: snapshot.updated_at,
    })
  }
}

pub fn variant_name(variant: BracketVariant) -> &'static str {
  match variant {
    BracketVariant::DoubleElimination => "double-elimination",
    BracketVariant::DoubleEliminationSingleFinal => "double-elimination (single final)",
    BracketVariant::SingleElimination => "single-elimination",
  }
}
