//! Durable tournament snapshots.

use crate::completion::CompletionPhase;
use crate::engine::{AppliedResult, SpentEvent};
use crate::error::{BracketError, BracketResult};
use crate::model::{MatchRecord, Player, SeedingPolicy, TournamentId, TournamentRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentSnapshot {
  pub tournament: TournamentRecord,
  pub seeding: SeedingPolicy,
  pub phase: CompletionPhase,
  pub players: Vec<Player>,
  pub matches: Vec<MatchRecord>,
  #[serde(default)]
  pub results: Vec<AppliedResult>,
  #[serde(default)]
  pub events: Vec<SpentEvent>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl TournamentSnapshot {
  pub fn id(&self) -> TournamentId {
    self.tournament.id
  }
}

/// Persistence seam. A save either fully replaces the previous snapshot or leaves it untouched.
pub trait TournamentStore: Send + Sync {
  fn save(&self, snapshot: &TournamentSnapshot) -> BracketResult<()>;
  fn load(&self, id: TournamentId) -> BracketResult<Option<TournamentSnapshot>>;
  fn remove(&self, id: TournamentId) -> BracketResult<()>;
  fn list(&self) -> BracketResult<Vec<TournamentId>>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
  snapshots: Mutex<HashMap<TournamentId, TournamentSnapshot>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl TournamentStore for MemoryStore {
  fn save(&self, snapshot: &TournamentSnapshot) -> BracketResult<()> {
    let mut guard = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
    guard.insert(snapshot.id(), snapshot.clone());
    Ok(())
  }

  fn load(&self, id: TournamentId) -> BracketResult<Option<TournamentSnapshot>> {
    let guard = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
    Ok(guard.get(&id).cloned())
  }

  fn remove(&self, id: TournamentId) -> BracketResult<()> {
    let mut guard = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
    guard.remove(&id);
    Ok(())
  }

  fn list(&self) -> BracketResult<Vec<TournamentId>> {
    let guard = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
    Ok(guard.keys().copied().collect())
  }
}

/// One pretty-printed JSON file per tournament, replaced through a temp file and rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
  dir: PathBuf,
}

impl JsonFileStore {
  pub fn new(dir: impl Into<PathBuf>) -> BracketResult<Self> {
    let dir = dir.into();
    fs::create_dir_all(&dir)
      .map_err(|e| BracketError::Storage(format!("create snapshot dir {}: {e}", dir.display())))?;
    Ok(JsonFileStore { dir })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn path_for(&self, id: TournamentId) -> PathBuf {
    self.dir.join(format!("{id}.json"))
  }
}

impl TournamentStore for JsonFileStore {
  fn save(&self, snapshot: &TournamentSnapshot) -> BracketResult<()> {
    let path = self.path_for(snapshot.id());
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(snapshot)
      .map_err(|e| BracketError::Storage(format!("serialize snapshot: {e}")))?;
    fs::write(&tmp, json)
      .map_err(|e| BracketError::Storage(format!("write snapshot {}: {e}", tmp.display())))?;
    fs::rename(&tmp, &path)
      .map_err(|e| BracketError::Storage(format!("replace snapshot {}: {e}", path.display())))?;
    debug!("saved snapshot {}", path.display());
    Ok(())
  }

  fn load(&self, id: TournamentId) -> BracketResult<Option<TournamentSnapshot>> {
    let path = self.path_for(id);
    if !path.is_file() {
      return Ok(None);
    }
    let raw = fs::read_to_string(&path)
      .map_err(|e| BracketError::Storage(format!("read snapshot {}: {e}", path.display())))?;
    let snapshot = serde_json::from_str(&raw)
      .map_err(|e| BracketError::Storage(format!("parse snapshot {}: {e}", path.display())))?;
    Ok(Some(snapshot))
  }

  fn remove(&self, id: TournamentId) -> BracketResult<()> {
    let path = self.path_for(id);
    if path.exists() {
      fs::remove_file(&path)
        .map_err(|e| BracketError::Storage(format!("remove snapshot {}: {e}", path.display())))?;
    }
    Ok(())
  }

  fn list(&self) -> BracketResult<Vec<TournamentId>> {
    let entries = fs::read_dir(&self.dir)
      .map_err(|e| BracketError::Storage(format!("list snapshots {}: {e}", self.dir.display())))?;
    let mut ids = Vec::new();
    for entry in entries.flatten() {
      let path = entry.path();
      if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
        continue;
      }
      let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
        continue;
      };
      match stem.parse::<TournamentId>() {
        Ok(id) => ids.push(id),
        Err(e) => warn!("skipping {}: {e}", path.display()),
      }
    }
    ids.sort_by_key(|id| id.to_string());
    Ok(ids)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::Tournament;
  use crate::model::{BracketVariant, EventId, MatchKey, PlayerId};
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn sample() -> Tournament {
    let players: Vec<Player> = (1..=8).map(|i| Player::seeded(format!("p{i}"), i)).collect();
    let mut t = Tournament::create_with_rng(
      &players,
      BracketVariant::DoubleElimination,
      SeedingPolicy::Ranked,
      &mut StdRng::seed_from_u64(3),
    )
    .unwrap();
    let id = t.get_match(MatchKey::new(1, 1)).unwrap().id;
    t.submit_result(id, &PlayerId::from("p1"), &EventId::new("e1")).unwrap();
    t
  }

  #[test]
  fn json_store_round_trips_and_lists() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("snapshots")).unwrap();
    let t = sample();
    store.save(&t.snapshot()).unwrap();

    assert_eq!(store.list().unwrap(), vec![t.id()]);
    let loaded = store.load(t.id()).unwrap().unwrap();
    assert_eq!(loaded, t.snapshot());
    assert!(!store.path_for(t.id()).with_extension("json.tmp").exists());

    store.remove(t.id()).unwrap();
    assert!(store.load(t.id()).unwrap().is_none());
  }

  #[test]
  fn corrupt_snapshot_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path()).unwrap();
    let id = TournamentId::new();
    fs::write(store.path_for(id), "{ not json").unwrap();
    assert!(matches!(store.load(id), Err(BracketError::Storage(_))));
  }

  #[test]
  fn memory_store_keeps_latest_snapshot() {
    let store = MemoryStore::new();
    let mut t = sample();
    store.save(&t.snapshot()).unwrap();
    let id = t.get_match(MatchKey::new(1, 2)).unwrap().id;
    t.submit_result(id, &PlayerId::from("p4"), &EventId::new("e2")).unwrap();
    store.save(&t.snapshot()).unwrap();
    let loaded = store.load(t.id()).unwrap().unwrap();
    assert_eq!(loaded.results.len(), 2);
  }
}
