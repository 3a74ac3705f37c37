//! Invariant checks run before slot writes commit, when a routing table is
//! materialized, and once more when a champion is about to be declared.

use crate::error::{BracketError, BracketResult};
use crate::model::{
  BracketVariant, Match, MatchKey, MatchStatus, Outcome, Player, PlayerId, Slot, SlotPosition,
  SlotRef,
};
use crate::topology::{RoundKind, RoutingTable};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Read access to a set of matches, committed or staged.
pub trait MatchView {
  fn get_match(&self, key: MatchKey) -> Option<&Match>;
  fn all_matches(&self) -> Box<dyn Iterator<Item = &Match> + '_>;
}

impl MatchView for BTreeMap<MatchKey, Match> {
  fn get_match(&self, key: MatchKey) -> Option<&Match> {
    self.get(&key)
  }

  fn all_matches(&self) -> Box<dyn Iterator<Item = &Match> + '_> {
    Box::new(self.values())
  }
}

pub fn describe_slot(slot: &Slot) -> String {
  match slot {
    Slot::Empty => "empty".to_string(),
    Slot::Bye => "bye".to_string(),
    Slot::Occupied(id) => id.to_string(),
  }
}

// ── Per-write checks ───────────────────────────────────────────────────

/// Conditional write: the target must be empty and the value must not duplicate a player.
pub fn check_slot_write<V: MatchView + ?Sized>(view: &V, slot: SlotRef, value: &Slot) -> BracketResult<()> {
  let target = view
    .get_match(slot.key)
    .ok_or_else(|| BracketError::UnknownMatch(slot.key.to_string()))?;
  let current = target.slot(slot.position);
  if !current.is_empty() {
    return Err(BracketError::SlotConflict {
      slot,
      existing: describe_slot(current),
      attempted: describe_slot(value),
    });
  }
  check_placement(view, slot, value)
}

/// Rejects a player that already holds the opposite slot or sits in another unresolved match.
pub fn check_placement<V: MatchView + ?Sized>(view: &V, slot: SlotRef, value: &Slot) -> BracketResult<()> {
  let Some(player) = value.player() else {
    return Ok(());
  };
  let target = view
    .get_match(slot.key)
    .ok_or_else(|| BracketError::UnknownMatch(slot.key.to_string()))?;
  if target.slot(slot.position.other()).player() == Some(player) {
    return Err(BracketError::DuplicatePlayer {
      player: player.clone(),
      slot,
    });
  }
  let live_elsewhere = view
    .all_matches()
    .filter(|m| m.key != slot.key && !m.status.is_resolved())
    .any(|m| m.has_player(player));
  if live_elsewhere {
    return Err(BracketError::DuplicatePlayer {
      player: player.clone(),
      slot,
    });
  }
  Ok(())
}

/// A match never holds the same player twice, and only completes with both slots filled.
pub fn check_match(m: &Match) -> BracketResult<()> {
  if let (Some(a), Some(b)) = (m.slots[0].player(), m.slots[1].player()) {
    if a == b {
      return Err(BracketError::DuplicatePlayer {
        player: a.clone(),
        slot: SlotRef::new(m.key, SlotPosition::Second),
      });
    }
  }
  if m.status == MatchStatus::Completed && !m.slots_filled() {
    return Err(BracketError::InconsistentBracket(format!(
      "{} completed with an empty slot",
      m.key
    )));
  }
  Ok(())
}

// ── Routing checks ─────────────────────────────────────────────────────

/// Winner-bracket round-1 matches that can feed each match.
pub fn round_one_origins(table: &RoutingTable) -> HashMap<MatchKey, BTreeSet<u32>> {
  let mut origins: HashMap<MatchKey, BTreeSet<u32>> = HashMap::new();
  for key in table.match_keys() {
    let mut set = BTreeSet::new();
    if key.round == 1 {
      set.insert(key.match_number);
    } else {
      for position in [SlotPosition::First, SlotPosition::Second] {
        if let Some(route) = table.feeder(SlotRef::new(key, position)) {
          if let Some(source) = origins.get(&route.source) {
            set.extend(source.iter().copied());
          }
        }
      }
    }
    origins.insert(key, set);
  }
  origins
}

/// Anti-rematch rule for loser-bracket drop-ins.
///
/// In every minor round with at least two matches the loser of winner-bracket
/// match `i` of `M` must land in match `M + 1 - i`, and the resident it meets must
/// not come solely from the sub-bracket the dropping loser just played through.
pub fn check_routing(table: &RoutingTable) -> BracketResult<()> {
  let origins = round_one_origins(table);
  for spec in table.rounds() {
    if spec.kind != RoundKind::LosersMinor || spec.matches < 2 {
      continue;
    }
    let Some(wb_round) = spec.drop_in_from else {
      continue;
    };
    let m = spec.matches;
    for i in 1..=m {
      let source = MatchKey::new(wb_round, i);
      let dest = table.destination(source, Outcome::Lost).ok_or_else(|| {
        BracketError::InvalidTopology(format!("loser of {source} has no destination"))
      })?;
      let mirrored = SlotRef::new(MatchKey::new(spec.round, m + 1 - i), SlotPosition::Second);
      if dest != mirrored {
        return Err(BracketError::InvalidTopology(format!(
          "loser of {source} must drop to mirrored {mirrored}, routed to {dest}"
        )));
      }
      let resident = table
        .feeder(SlotRef::new(dest.key, SlotPosition::First))
        .ok_or_else(|| BracketError::InvalidTopology(format!("orphaned resident slot in {}", dest.key)))?;
      let resident_origins = origins.get(&resident.source).cloned().unwrap_or_default();
      let dropping_origins = origins.get(&source).cloned().unwrap_or_default();
      if resident_origins.is_subset(&dropping_origins) {
        return Err(BracketError::InvalidTopology(format!(
          "immediate rematch possible in {}: resident from {} only meets losers of {source}",
          dest.key, resident.source
        )));
      }
    }
  }
  Ok(())
}

// ── End-of-tournament check ────────────────────────────────────────────

/// Every round-1 player must be the champion or eliminated with the variant's loss count.
pub fn check_standings<'a>(
  players: &[Player],
  matches: impl Iterator<Item = &'a Match>,
  variant: BracketVariant,
  champion: &PlayerId,
  final_key: MatchKey,
) -> BracketResult<()> {
  let known: HashSet<&PlayerId> = players.iter().map(|p| &p.id).collect();
  if known.len() != players.len() {
    return Err(BracketError::InconsistentBracket("duplicate player ids".to_string()));
  }
  if !known.contains(champion) {
    return Err(BracketError::InconsistentBracket(format!(
      "champion {champion} is not a registered player"
    )));
  }

  let mut losses: HashMap<&PlayerId, u32> = HashMap::new();
  let mut round_one: HashMap<&PlayerId, u32> = HashMap::new();
  let mut seen: HashSet<&PlayerId> = HashSet::new();
  let mut final_loser: Option<&PlayerId> = None;
  for m in matches {
    for slot in &m.slots {
      if let Some(id) = slot.player() {
        if !known.contains(id) {
          return Err(BracketError::InconsistentBracket(format!(
            "unknown player {id} in {}",
            m.key
          )));
        }
        seen.insert(id);
        if m.key.round == 1 {
          *round_one.entry(id).or_default() += 1;
        }
      }
    }
    if m.status != MatchStatus::Completed {
      continue;
    }
    if let Some(loser) = m.loser.as_ref() {
      *losses.entry(loser).or_default() += 1;
      if m.key == final_key {
        final_loser = Some(loser);
      }
    }
  }

  let threshold = variant.elimination_losses();
  for player in players {
    let id = &player.id;
    // Withdrawn by an override before ever playing.
    if !seen.contains(id) && id != champion {
      continue;
    }
    if round_one.get(id).copied().unwrap_or(0) != 1 {
      return Err(BracketError::InconsistentBracket(format!(
        "{id} does not appear exactly once in round 1"
      )));
    }
    let count = losses.get(id).copied().unwrap_or(0);
    if id == champion {
      if count >= threshold {
        return Err(BracketError::InconsistentBracket(format!(
          "champion {id} has {count} losses"
        )));
      }
      continue;
    }
    let single_final_runner_up = variant == BracketVariant::DoubleEliminationSingleFinal
      && final_loser == Some(id)
      && count == 1;
    if count != threshold && !single_final_runner_up {
      return Err(BracketError::InconsistentBracket(format!(
        "{id} finished with {count} losses, expected {threshold}"
      )));
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::MatchId;
  use crate::topology::{build_layout, build_rules, RouteKey};

  fn occupied(id: &str) -> Slot {
    Slot::Occupied(PlayerId::from(id))
  }

  fn view_with(matches: Vec<Match>) -> BTreeMap<MatchKey, Match> {
    matches.into_iter().map(|m| (m.key, m)).collect()
  }

  #[test]
  fn write_to_filled_slot_is_a_conflict() {
    let mut m = Match::new(MatchId(1), MatchKey::new(2, 1));
    m.slots[0] = occupied("a");
    let view = view_with(vec![m]);
    let slot = SlotRef::new(MatchKey::new(2, 1), SlotPosition::First);
    let err = check_slot_write(&view, slot, &occupied("b")).unwrap_err();
    assert!(matches!(err, BracketError::SlotConflict { existing, .. } if existing == "a"));
  }

  #[test]
  fn same_player_in_both_slots_is_rejected() {
    let mut m = Match::new(MatchId(1), MatchKey::new(2, 1));
    m.slots[0] = occupied("a");
    let view = view_with(vec![m]);
    let slot = SlotRef::new(MatchKey::new(2, 1), SlotPosition::Second);
    let err = check_slot_write(&view, slot, &occupied("a")).unwrap_err();
    assert!(matches!(err, BracketError::DuplicatePlayer { .. }));
  }

  #[test]
  fn player_live_in_another_match_is_rejected() {
    let mut live = Match::new(MatchId(1), MatchKey::new(101, 1));
    live.slots[0] = occupied("a");
    let mut done = Match::new(MatchId(2), MatchKey::new(1, 1));
    done.slots = [occupied("c"), occupied("d")];
    done.status = MatchStatus::Completed;
    let target = Match::new(MatchId(3), MatchKey::new(2, 1));
    let view = view_with(vec![live, done, target]);
    let slot = SlotRef::new(MatchKey::new(2, 1), SlotPosition::First);
    assert!(check_slot_write(&view, slot, &occupied("a")).is_err());
    assert!(check_slot_write(&view, slot, &occupied("c")).is_ok());
    assert!(check_slot_write(&view, slot, &Slot::Bye).is_ok());
  }

  #[test]
  fn naive_sequential_drop_in_is_rejected() {
    let variant = BracketVariant::DoubleElimination;
    let rounds = build_layout(8, variant).unwrap();
    let mut rules = build_rules(&rounds, 8, variant);
    for (route, dest) in rules.iter_mut() {
      if *route == RouteKey::lost(MatchKey::new(2, 1)) || *route == RouteKey::lost(MatchKey::new(2, 2)) {
        *dest = SlotRef::new(MatchKey::new(102, route.source.match_number), SlotPosition::Second);
      }
    }
    let err = RoutingTable::from_rules(8, variant, rounds, rules).unwrap_err();
    assert!(matches!(err, BracketError::InvalidTopology(msg) if msg.contains("mirrored")));
  }

  #[test]
  fn mirroring_group_a_as_well_allows_an_immediate_rematch() {
    let variant = BracketVariant::DoubleElimination;
    let rounds = build_layout(8, variant).unwrap();
    let mut rules = build_rules(&rounds, 8, variant);
    for (route, dest) in rules.iter_mut() {
      if route.outcome == Outcome::Lost && route.source.round == 1 {
        let index = 5 - route.source.match_number;
        *dest = SlotRef::new(MatchKey::new(101, (index + 1) / 2), SlotPosition::by_parity(index));
      }
    }
    let err = RoutingTable::from_rules(8, variant, rounds, rules).unwrap_err();
    assert!(matches!(err, BracketError::InvalidTopology(msg) if msg.contains("rematch")));
  }

  #[test]
  fn origins_cover_whole_bracket_at_the_final() {
    let table = RoutingTable::build(16, BracketVariant::DoubleElimination).unwrap();
    let origins = round_one_origins(&table);
    assert_eq!(origins[&MatchKey::grand_final()].len(), 8);
    assert_eq!(origins[&MatchKey::new(102, 4)], BTreeSet::from([1, 2, 7, 8]));
  }

  #[test]
  fn standings_require_two_losses_for_everyone_but_the_champion() {
    let players = vec![Player::new("a"), Player::new("b")];
    let mut wf = Match::new(MatchId(1), MatchKey::new(1, 1));
    wf.slots = [occupied("a"), occupied("b")];
    wf.status = MatchStatus::Completed;
    wf.winner = Some("a".into());
    wf.loser = Some("b".into());
    let mut gf = Match::new(MatchId(2), MatchKey::grand_final());
    gf.slots = [occupied("a"), occupied("b")];
    gf.status = MatchStatus::Completed;
    gf.winner = Some("a".into());
    gf.loser = Some("b".into());
    let champion = PlayerId::from("a");
    let ok = check_standings(
      &players,
      [&wf, &gf].into_iter(),
      BracketVariant::DoubleElimination,
      &champion,
      MatchKey::grand_final(),
    );
    assert!(ok.is_ok());

    let early = check_standings(
      &players,
      [&wf].into_iter(),
      BracketVariant::DoubleElimination,
      &champion,
      MatchKey::grand_final(),
    );
    assert!(matches!(early, Err(BracketError::InconsistentBracket(_))));
  }
}
