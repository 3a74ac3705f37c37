use crate::error::{BracketError, BracketResult};
use crate::model::{Player, PlayerId, SeedingPolicy};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

/// Players in draw order and the round-1 pairings they produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Seeding {
  pub players: Vec<Player>,
  pub pairings: Vec<[PlayerId; 2]>,
}

pub fn assign_round_one<R: Rng + ?Sized>(
  players: &[Player],
  size: u32,
  policy: SeedingPolicy,
  rng: &mut R,
) -> BracketResult<Seeding> {
  if players.len() != size as usize {
    return Err(BracketError::InvalidTopology(format!(
      "expected {size} players, got {}",
      players.len()
    )));
  }
  let mut seen = HashSet::new();
  for player in players {
    if !seen.insert(&player.id) {
      return Err(BracketError::InvalidTopology(format!(
        "player {} supplied more than once",
        player.id
      )));
    }
  }

  let seeding = match policy {
    SeedingPolicy::Ranked => ranked(players, size),
    SeedingPolicy::Random => random(players, rng),
  };

  let placed: HashSet<&PlayerId> = seeding.pairings.iter().flatten().collect();
  if placed.len() != size as usize {
    return Err(BracketError::InvalidTopology(
      "round-1 pairings do not cover every player exactly once".to_string(),
    ));
  }
  Ok(seeding)
}

fn ranked(players: &[Player], size: u32) -> Seeding {
  let normalized = normalize_seeds(players);
  let positions = seed_positions(size);
  let pairings = positions
    .chunks(2)
    .map(|pair| {
      [
        normalized[pair[0] as usize - 1].id.clone(),
        normalized[pair[1] as usize - 1].id.clone(),
      ]
    })
    .collect();
  Seeding {
    players: normalized,
    pairings,
  }
}

fn random<R: Rng + ?Sized>(players: &[Player], rng: &mut R) -> Seeding {
  let mut drawn = players.to_vec();
  drawn.shuffle(rng);
  for (idx, player) in drawn.iter_mut().enumerate() {
    player.seed = Some(idx as u32 + 1);
  }
  let pairings = drawn
    .chunks(2)
    .map(|pair| [pair[0].id.clone(), pair[1].id.clone()])
    .collect();
  Seeding {
    players: drawn,
    pairings,
  }
}

/// Keeps valid unique seeds, hands out the lowest free seeds to the rest in input
/// order, then ranks everyone 1..=N by seed.
pub fn normalize_seeds(players: &[Player]) -> Vec<Player> {
  let mut used_seeds = HashSet::new();
  let mut assigned: Vec<(Player, u32)> = Vec::with_capacity(players.len());

  for player in players {
    let seed = player.seed.filter(|s| *s > 0 && !used_seeds.contains(s));
    let final_seed = if let Some(seed) = seed {
      used_seeds.insert(seed);
      seed
    } else {
      0
    };
    assigned.push((player.clone(), final_seed));
  }

  let mut next_seed = 1u32;
  for (_, seed) in assigned.iter_mut() {
    if *seed != 0 {
      continue;
    }
    while used_seeds.contains(&next_seed) {
      next_seed += 1;
    }
    *seed = next_seed;
    used_seeds.insert(next_seed);
    next_seed += 1;
  }

  assigned.sort_by_key(|(_, seed)| *seed);
  assigned
    .into_iter()
    .enumerate()
    .map(|(rank, (player, _))| Player {
      id: player.id,
      seed: Some(rank as u32 + 1),
    })
    .collect()
}

/// Standard bracket order: seed 1 meets seed N, and the top two seeds can only meet in the final.
pub fn seed_positions(size: u32) -> Vec<u32> {
  let mut seeds = vec![1u32];
  while seeds.len() < size as usize {
    let n = seeds.len() as u32;
    let mut next = Vec::with_capacity(seeds.len() * 2);
    for seed in seeds.iter().copied() {
      next.push(seed);
      next.push((n * 2 + 1).saturating_sub(seed));
    }
    seeds = next;
  }
  seeds
}
