//! Drives a tournament to completion with seed-weighted random results.

use crate::engine::Tournament;
use crate::error::{BracketError, BracketResult};
use crate::model::{EventId, Match, PlayerId};
use rand::Rng;
use std::collections::HashMap;
use tracing::debug;

/// Picks a winner with odds proportional to `1 / seed`. Unseeded players count as seed 999.
pub fn pick_winner<R: Rng + ?Sized>(
  m: &Match,
  seeds: &HashMap<PlayerId, u32>,
  rng: &mut R,
) -> Option<PlayerId> {
  let a = m.slots[0].player()?;
  let b = m.slots[1].player()?;
  let seed_a = seeds.get(a).copied().unwrap_or(999).max(1);
  let seed_b = seeds.get(b).copied().unwrap_or(999).max(1);
  let weight_a = 1.0 / seed_a as f64;
  let weight_b = 1.0 / seed_b as f64;
  let roll = rng.random::<f64>() * (weight_a + weight_b);
  Some(if roll < weight_a { a.clone() } else { b.clone() })
}

/// Plays every ready match, lowest id first, until nothing is ready.
/// Returns how many results were submitted.
pub fn complete_all<R: Rng + ?Sized>(tournament: &mut Tournament, rng: &mut R) -> BracketResult<usize> {
  let seeds: HashMap<PlayerId, u32> = tournament
    .players()
    .iter()
    .filter_map(|p| p.seed.map(|seed| (p.id.clone(), seed)))
    .collect();
  let limit = tournament.matches().count() * 2 + 1;
  let mut played = 0;
  loop {
    if played > limit {
      return Err(BracketError::InconsistentBracket(
        "simulation exceeded the number of matches in the bracket".to_string(),
      ));
    }
    let Some(next) = tournament.ready_matches().first().map(|m| (*m).clone()) else {
      break;
    };
    let winner = pick_winner(&next, &seeds, rng).ok_or_else(|| {
      BracketError::InconsistentBracket(format!("{} is ready without two players", next.key))
    })?;
    let event = EventId::new(format!("sim-{}-{}", next.id.0, played + 1));
    debug!("sim {}: {winner} wins", next.key);
    tournament.submit_result(next.id, &winner, &event)?;
    played += 1;
  }
  Ok(played)
}
