//! Round layout and routing table for a bracket of `N = 2^k` players.
//!
//! The winner bracket has `k` rounds. The loser bracket opens with group A
//! (round-1 losers paired among themselves) and then alternates a minor round,
//! where losers of one winner-bracket round drop in against LB residents, with a
//! major round that pairs the minor-round survivors. The minor round fed by the
//! winner-bracket final is the LB final. Drop-ins use the mirrored index so that
//! players who just met are sent to opposite halves.

use crate::error::{BracketError, BracketResult};
use crate::model::{
  round_label, round_tier, BracketVariant, MatchKey, Outcome, RoundTier, SlotPosition, SlotRef,
  GRAND_FINAL_ROUND, LOSERS_ROUND_BASE, RESET_ROUND,
};
use crate::validator;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Bumped whenever the routing rules for an existing `(N, variant)` change.
pub const ROUTING_TABLE_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RoundKind {
  Winners,
  LosersGroupA,
  LosersMinor,
  LosersMajor,
  LosersFinal,
  GrandFinal,
  Reset,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSpec {
  pub round: i32,
  pub kind: RoundKind,
  pub matches: u32,
  pub label: String,
  /// Winner-bracket round whose losers enter here.
  pub drop_in_from: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteKey {
  pub source: MatchKey,
  pub outcome: Outcome,
}

impl RouteKey {
  pub const fn won(source: MatchKey) -> Self {
    RouteKey { source, outcome: Outcome::Won }
  }

  pub const fn lost(source: MatchKey) -> Self {
    RouteKey { source, outcome: Outcome::Lost }
  }
}

#[derive(Clone, Debug)]
pub struct RoutingTable {
  size: u32,
  variant: BracketVariant,
  rounds: Vec<RoundSpec>,
  rules: BTreeMap<RouteKey, SlotRef>,
  feeders: HashMap<SlotRef, RouteKey>,
}

impl RoutingTable {
  pub fn build(size: u32, variant: BracketVariant) -> BracketResult<Self> {
    let rounds = build_layout(size, variant)?;
    let rules = build_rules(&rounds, size, variant);
    RoutingTable::from_rules(size, variant, rounds, rules)
  }

  /// Materializes `rules` and rejects anything that is not a bijection onto the
  /// non-seeded slots of `rounds`.
  pub(crate) fn from_rules(
    size: u32,
    variant: BracketVariant,
    rounds: Vec<RoundSpec>,
    rules: Vec<(RouteKey, SlotRef)>,
  ) -> BracketResult<Self> {
    let known: HashSet<MatchKey> = rounds
      .iter()
      .flat_map(|spec| (1..=spec.matches).map(move |n| MatchKey::new(spec.round, n)))
      .collect();

    let mut table_rules = BTreeMap::new();
    let mut feeders = HashMap::new();
    for (route, dest) in rules {
      if !known.contains(&route.source) {
        return Err(BracketError::InvalidTopology(format!(
          "route from unknown match {}",
          route.source
        )));
      }
      if !known.contains(&dest.key) {
        return Err(BracketError::InvalidTopology(format!(
          "route from {} targets unknown match {}",
          route.source, dest.key
        )));
      }
      match dest.key.tier() {
        Some(RoundTier::Reset) => {
          return Err(BracketError::InvalidTopology(format!(
            "reset match cannot be a routing destination (from {})",
            route.source
          )));
        }
        Some(RoundTier::Winners) if dest.key.round == 1 => {
          return Err(BracketError::InvalidTopology(format!(
            "seeded slot {dest} cannot be a routing destination"
          )));
        }
        _ => {}
      }
      if table_rules.insert(route, dest).is_some() {
        return Err(BracketError::InvalidTopology(format!(
          "{:?} exit of {} routed twice",
          route.outcome, route.source
        )));
      }
      if let Some(previous) = feeders.insert(dest, route) {
        return Err(BracketError::InvalidTopology(format!(
          "{dest} fed by both {} and {}",
          previous.source, route.source
        )));
      }
    }

    for spec in &rounds {
      if matches!(spec.kind, RoundKind::Reset) || spec.round == 1 {
        continue;
      }
      for n in 1..=spec.matches {
        for position in [SlotPosition::First, SlotPosition::Second] {
          let slot = SlotRef::new(MatchKey::new(spec.round, n), position);
          if !feeders.contains_key(&slot) {
            return Err(BracketError::InvalidTopology(format!("orphaned slot {slot}")));
          }
        }
      }
    }

    let table = RoutingTable {
      size,
      variant,
      rounds,
      rules: table_rules,
      feeders,
    };
    validator::check_routing(&table)?;
    Ok(table)
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn variant(&self) -> BracketVariant {
    self.variant
  }

  pub fn rounds(&self) -> &[RoundSpec] {
    &self.rounds
  }

  pub fn round_spec(&self, round: i32) -> Option<&RoundSpec> {
    self.rounds.iter().find(|spec| spec.round == round)
  }

  pub fn winners_rounds(&self) -> i32 {
    self.size.trailing_zeros() as i32
  }

  pub fn winners_final(&self) -> MatchKey {
    MatchKey::new(self.winners_rounds(), 1)
  }

  /// Match whose result decides the tournament (before any reset).
  pub fn final_match(&self) -> MatchKey {
    if self.variant.has_losers_bracket() {
      MatchKey::grand_final()
    } else {
      self.winners_final()
    }
  }

  pub fn contains(&self, key: MatchKey) -> bool {
    self
      .round_spec(key.round)
      .map(|spec| key.match_number >= 1 && key.match_number <= spec.matches)
      .unwrap_or(false)
  }

  /// All match keys in creation order.
  pub fn match_keys(&self) -> Vec<MatchKey> {
    self
      .rounds
      .iter()
      .flat_map(|spec| (1..=spec.matches).map(move |n| MatchKey::new(spec.round, n)))
      .collect()
  }

  pub fn match_count(&self) -> usize {
    self.rounds.iter().map(|spec| spec.matches as usize).sum()
  }

  pub fn destination(&self, source: MatchKey, outcome: Outcome) -> Option<SlotRef> {
    self.rules.get(&RouteKey { source, outcome }).copied()
  }

  pub fn feeder(&self, slot: SlotRef) -> Option<RouteKey> {
    self.feeders.get(&slot).copied()
  }

  pub fn rules(&self) -> impl Iterator<Item = (&RouteKey, &SlotRef)> {
    self.rules.iter()
  }

  /// Matches that directly receive a player from `source`.
  pub fn dependents(&self, source: MatchKey) -> Vec<MatchKey> {
    [Outcome::Won, Outcome::Lost]
      .into_iter()
      .filter_map(|outcome| self.destination(source, outcome))
      .map(|dest| dest.key)
      .collect()
  }
}

pub(crate) fn build_layout(size: u32, variant: BracketVariant) -> BracketResult<Vec<RoundSpec>> {
  if size < 2 || !size.is_power_of_two() {
    return Err(BracketError::InvalidTopology(format!(
      "player count {size} is not a power of two of at least 2"
    )));
  }
  let k = size.trailing_zeros() as i32;
  let mut rounds = Vec::new();

  for r in 1..=k {
    rounds.push(round_spec(r, RoundKind::Winners, size >> r, None));
  }

  if variant.has_losers_bracket() {
    if k >= 2 {
      rounds.push(round_spec(LOSERS_ROUND_BASE + 1, RoundKind::LosersGroupA, size >> 2, Some(1)));
      for r in 2..=k {
        let minor = LOSERS_ROUND_BASE + 2 * (r - 1);
        let kind = if r == k { RoundKind::LosersFinal } else { RoundKind::LosersMinor };
        rounds.push(round_spec(minor, kind, size >> r, Some(r)));
        if r < k {
          rounds.push(round_spec(minor + 1, RoundKind::LosersMajor, size >> (r + 1), None));
        }
      }
    }
    rounds.push(round_spec(GRAND_FINAL_ROUND, RoundKind::GrandFinal, 1, None));
    if variant.has_reset() {
      rounds.push(round_spec(RESET_ROUND, RoundKind::Reset, 1, None));
    }
  }

  Ok(rounds)
}

fn round_spec(round: i32, kind: RoundKind, matches: u32, drop_in_from: Option<i32>) -> RoundSpec {
  RoundSpec {
    round,
    kind,
    matches,
    label: round_label(round),
    drop_in_from,
  }
}

pub(crate) fn build_rules(
  rounds: &[RoundSpec],
  size: u32,
  variant: BracketVariant,
) -> Vec<(RouteKey, SlotRef)> {
  let k = size.trailing_zeros() as i32;
  let grand_final = MatchKey::grand_final();
  let mut rules = Vec::new();

  for r in 1..=k {
    for j in 1..=(size >> r) {
      let source = MatchKey::new(r, j);
      if r < k {
        let dest = MatchKey::new(r + 1, (j + 1) / 2);
        rules.push((RouteKey::won(source), SlotRef::new(dest, SlotPosition::by_parity(j))));
      } else if variant.has_losers_bracket() {
        rules.push((RouteKey::won(source), SlotRef::new(grand_final, SlotPosition::First)));
      }
      if variant.has_losers_bracket() {
        rules.push((RouteKey::lost(source), winners_loser_destination(size, r, j)));
      }
    }
  }

  for spec in rounds {
    if round_tier(spec.round) != Some(RoundTier::Losers) {
      continue;
    }
    for j in 1..=spec.matches {
      let source = MatchKey::new(spec.round, j);
      let dest = match spec.kind {
        RoundKind::LosersGroupA | RoundKind::LosersMajor => {
          SlotRef::new(MatchKey::new(spec.round + 1, j), SlotPosition::First)
        }
        RoundKind::LosersMinor => SlotRef::new(
          MatchKey::new(spec.round + 1, (j + 1) / 2),
          SlotPosition::by_parity(j),
        ),
        _ => SlotRef::new(grand_final, SlotPosition::Second),
      };
      rules.push((RouteKey::won(source), dest));
    }
  }

  rules
}

/// Where the loser of winner-bracket round `r`, match `j` drops.
fn winners_loser_destination(size: u32, r: i32, j: u32) -> SlotRef {
  let k = size.trailing_zeros() as i32;
  if k == 1 {
    return SlotRef::new(MatchKey::grand_final(), SlotPosition::Second);
  }
  if r == 1 {
    let dest = MatchKey::new(LOSERS_ROUND_BASE + 1, (j + 1) / 2);
    return SlotRef::new(dest, SlotPosition::by_parity(j));
  }
  let m = size >> r;
  let dest = MatchKey::new(LOSERS_ROUND_BASE + 2 * (r - 1), m + 1 - j);
  SlotRef::new(dest, SlotPosition::Second)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table(size: u32) -> RoutingTable {
    RoutingTable::build(size, BracketVariant::DoubleElimination).unwrap()
  }

  #[test]
  fn rejects_non_power_of_two_sizes() {
    for size in [0, 1, 3, 6, 12, 24] {
      let err = RoutingTable::build(size, BracketVariant::DoubleElimination).unwrap_err();
      assert!(matches!(err, BracketError::InvalidTopology(_)), "size {size}");
    }
  }

  #[test]
  fn match_counts_per_variant() {
    let expected = [(2, 3, 2, 1), (4, 7, 6, 3), (8, 15, 14, 7), (16, 31, 30, 15), (32, 63, 62, 31)];
    for (size, double, single_final, single) in expected {
      assert_eq!(table(size).match_count(), double, "double elimination, N={size}");
      let no_reset = RoutingTable::build(size, BracketVariant::DoubleEliminationSingleFinal).unwrap();
      assert_eq!(no_reset.match_count(), single_final, "single final, N={size}");
      let se = RoutingTable::build(size, BracketVariant::SingleElimination).unwrap();
      assert_eq!(se.match_count(), single, "single elimination, N={size}");
    }
  }

  #[test]
  fn sixteen_player_loser_rounds() {
    let t = table(16);
    let losers: Vec<(i32, RoundKind, u32)> = t
      .rounds()
      .iter()
      .filter(|spec| round_tier(spec.round) == Some(RoundTier::Losers))
      .map(|spec| (spec.round, spec.kind, spec.matches))
      .collect();
    assert_eq!(
      losers,
      vec![
        (101, RoundKind::LosersGroupA, 4),
        (102, RoundKind::LosersMinor, 4),
        (103, RoundKind::LosersMajor, 2),
        (104, RoundKind::LosersMinor, 2),
        (105, RoundKind::LosersMajor, 1),
        (106, RoundKind::LosersFinal, 1),
      ]
    );
  }

  #[test]
  fn build_is_deterministic() {
    let a = table(32);
    let b = table(32);
    assert_eq!(a.rounds(), b.rounds());
    assert!(a.rules().eq(b.rules()));
  }

  #[test]
  fn group_a_receives_each_round_one_loser_once() {
    let t = table(16);
    let mut seen = HashSet::new();
    for j in 1..=8 {
      let dest = t.destination(MatchKey::new(1, j), Outcome::Lost).unwrap();
      assert_eq!(dest.key.round, 101);
      assert!(seen.insert(dest), "slot {dest} used twice");
    }
    assert_eq!(seen.len(), 8);
  }

  #[test]
  fn drop_ins_use_mirrored_index() {
    let t = table(16);
    for i in 1..=4 {
      let dest = t.destination(MatchKey::new(2, i), Outcome::Lost).unwrap();
      assert_eq!(dest, SlotRef::new(MatchKey::new(102, 5 - i), SlotPosition::Second));
    }
    for i in 1..=2 {
      let dest = t.destination(MatchKey::new(3, i), Outcome::Lost).unwrap();
      assert_eq!(dest, SlotRef::new(MatchKey::new(104, 3 - i), SlotPosition::Second));
    }
    let wf_loser = t.destination(MatchKey::new(4, 1), Outcome::Lost).unwrap();
    assert_eq!(wf_loser, SlotRef::new(MatchKey::new(106, 1), SlotPosition::Second));
  }

  #[test]
  fn finals_are_fed_by_both_brackets() {
    let t = table(8);
    assert_eq!(
      t.destination(MatchKey::new(3, 1), Outcome::Won),
      Some(SlotRef::new(MatchKey::grand_final(), SlotPosition::First))
    );
    assert_eq!(
      t.destination(MatchKey::new(104, 1), Outcome::Won),
      Some(SlotRef::new(MatchKey::grand_final(), SlotPosition::Second))
    );
    assert_eq!(t.destination(MatchKey::grand_final(), Outcome::Won), None);
    assert!(t.dependents(MatchKey::reset()).is_empty());
  }

  #[test]
  fn two_players_go_straight_to_grand_final() {
    let t = table(2);
    assert_eq!(
      t.destination(MatchKey::new(1, 1), Outcome::Lost),
      Some(SlotRef::new(MatchKey::grand_final(), SlotPosition::Second))
    );
  }

  #[test]
  fn every_routed_slot_has_exactly_one_feeder() {
    for size in [4, 8, 16, 64] {
      let t = table(size);
      let mut fed = HashSet::new();
      for (_, dest) in t.rules() {
        assert!(fed.insert(*dest));
      }
      let expected = t
        .match_keys()
        .into_iter()
        .filter(|key| key.round != 1 && key.tier() != Some(RoundTier::Reset))
        .count()
        * 2;
      assert_eq!(fed.len(), expected, "N={size}");
    }
  }

  #[test]
  fn duplicate_destination_is_rejected() {
    let rounds = build_layout(4, BracketVariant::DoubleElimination).unwrap();
    let mut rules = build_rules(&rounds, 4, BracketVariant::DoubleElimination);
    let stolen = rules
      .iter()
      .find(|(route, _)| *route == RouteKey::lost(MatchKey::new(1, 1)))
      .map(|(_, dest)| *dest)
      .unwrap();
    for (route, dest) in rules.iter_mut() {
      if *route == RouteKey::lost(MatchKey::new(1, 2)) {
        *dest = stolen;
      }
    }
    let err = RoutingTable::from_rules(4, BracketVariant::DoubleElimination, rounds, rules).unwrap_err();
    assert!(matches!(err, BracketError::InvalidTopology(msg) if msg.contains("fed by both")));
  }

  #[test]
  fn single_elimination_has_no_loser_routes() {
    let t = RoutingTable::build(8, BracketVariant::SingleElimination).unwrap();
    assert!(t.rules().all(|(route, _)| route.outcome == Outcome::Won));
    assert_eq!(t.final_match(), MatchKey::new(3, 1));
  }
}
