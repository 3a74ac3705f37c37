//! Concurrent result submission against one service.

use bracket_engine::{
    BracketError, BracketService, BracketVariant, EventId, JsonFileStore, MatchStatus, Player,
    PlayerId, SeedingPolicy,
};
use std::sync::Arc;
use std::thread;

fn players(n: u32) -> Vec<Player> {
    (1..=n).map(|i| Player::seeded(format!("p{i}"), i)).collect()
}

#[test]
fn parallel_round_one_results_all_land() {
    let service = Arc::new(BracketService::in_memory());
    let t = service
        .create_bracket(&players(32), BracketVariant::DoubleElimination, SeedingPolicy::Ranked)
        .unwrap();
    let round_one = service
        .ready_matches(t.id)
        .unwrap();
    assert_eq!(round_one.len(), 16);

    let handles: Vec<_> = round_one
        .into_iter()
        .map(|m| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let winner = m.slots[0].player().cloned().unwrap();
                let event = EventId::new(format!("r1-{}", m.id.0));
                // Every result is delivered twice to exercise the idempotent path.
                let first = service.submit_result(t.id, m.id, &winner, &event).unwrap();
                let second = service.submit_result(t.id, m.id, &winner, &event).unwrap();
                assert!(second.replayed);
                assert_eq!(first.newly_ready, second.newly_ready);
                first.newly_ready
            })
        })
        .collect();

    let mut newly_ready = Vec::new();
    for handle in handles {
        newly_ready.extend(handle.join().unwrap());
    }
    newly_ready.sort();
    newly_ready.dedup();
    // 8 winners round 2 matches plus 8 losers group-A matches.
    assert_eq!(newly_ready.len(), 16);

    for n in 1..=16 {
        let m = service.get_match(t.id, 1, n).unwrap();
        assert_eq!(m.status, MatchStatus::Completed);
    }
    for n in 1..=8 {
        assert_eq!(service.get_match(t.id, 2, n).unwrap().status, MatchStatus::Ready);
        assert_eq!(service.get_match(t.id, 101, n).unwrap().status, MatchStatus::Ready);
    }
}

#[test]
fn racing_conflicting_results_keep_exactly_one() {
    let service = Arc::new(BracketService::in_memory());
    let t = service
        .create_bracket(&players(4), BracketVariant::DoubleElimination, SeedingPolicy::Ranked)
        .unwrap();
    let m = service.get_match(t.id, 1, 1).unwrap();
    let contenders: Vec<PlayerId> = m.slots.iter().filter_map(|s| s.player().cloned()).collect();

    let handles: Vec<_> = contenders
        .into_iter()
        .map(|winner| {
            let service = Arc::clone(&service);
            let event = EventId::new(format!("claim-{winner}"));
            thread::spawn(move || service.submit_result(t.id, m.id, &winner, &event))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(BracketError::ResultMismatch { .. })))
        .count();
    assert_eq!((accepted, rejected), (1, 1));

    let settled = service.get_match(t.id, 1, 1).unwrap();
    let winner = settled.winner.clone().unwrap();
    let loser = settled.loser.clone().unwrap();
    assert_eq!(
        service.get_match(t.id, 2, 1).unwrap().slots[0].player(),
        Some(&winner)
    );
    assert_eq!(
        service.get_match(t.id, 101, 1).unwrap().slots[0].player(),
        Some(&loser)
    );
}

#[test]
fn separate_tournaments_progress_independently_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path()).unwrap());
    let service = Arc::new(BracketService::new(store.clone()).with_random_seed(Some(9)));

    let ids: Vec<_> = (0..4)
        .map(|_| {
            service
                .create_bracket(&players(8), BracketVariant::DoubleElimination, SeedingPolicy::Random)
                .unwrap()
                .id
        })
        .collect();

    let handles: Vec<_> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let service = Arc::clone(&service);
            let id = *id;
            thread::spawn(move || service.simulate(id, i as u64).unwrap())
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap() >= 14);
    }

    let reopened = BracketService::new(store);
    for id in ids {
        let record = reopened.record(id).unwrap();
        assert!(record.champion_id.is_some());
    }
}
