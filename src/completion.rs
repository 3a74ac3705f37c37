//! Grand final and reset handling.
//!
//! The detector looks at the matches resolved by one advancement step and
//! decides whether the tournament moved to a new phase: a champion is known,
//! or the bracket reset has to be activated.

use crate::error::{BracketError, BracketResult};
use crate::model::{BracketVariant, MatchKey, MatchStatus, PlayerId};
use crate::validator::MatchView;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletionPhase {
  #[default]
  AwaitingFinal,
  FinalPlayed,
  ResetPending,
  ResetPlayed,
  ChampionDecided,
}

impl CompletionPhase {
  pub fn is_finished(self) -> bool {
    self == CompletionPhase::ChampionDecided
  }

  /// Whether `next` is a legal successor of `self`.
  pub fn can_advance_to(self, next: CompletionPhase) -> bool {
    use CompletionPhase::*;
    matches!(
      (self, next),
      (AwaitingFinal, FinalPlayed)
        | (FinalPlayed, ChampionDecided)
        | (FinalPlayed, ResetPending)
        | (ResetPending, ResetPlayed)
        | (ResetPlayed, ChampionDecided)
    )
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
  Champion(PlayerId),
  /// Reset is played with the grand-final slots in the same order.
  ActivateReset { first: PlayerId, second: PlayerId },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
  pub path: Vec<CompletionPhase>,
  pub verdict: Verdict,
}

impl Transition {
  pub fn phase(&self) -> CompletionPhase {
    self.path.last().copied().unwrap_or_default()
  }
}

/// Losses `player` took in completed matches other than `excluding`.
pub fn prior_losses<V: MatchView + ?Sized>(view: &V, player: &PlayerId, excluding: MatchKey) -> usize {
  view
    .all_matches()
    .filter(|m| m.key != excluding && m.status == MatchStatus::Completed)
    .filter(|m| m.loser.as_ref() == Some(player))
    .count()
}

pub fn detect<V: MatchView + ?Sized>(
  phase: CompletionPhase,
  variant: BracketVariant,
  final_key: MatchKey,
  resolved: &[MatchKey],
  view: &V,
) -> BracketResult<Option<Transition>> {
  if phase == CompletionPhase::AwaitingFinal && resolved.contains(&final_key) {
    let m = view
      .get_match(final_key)
      .ok_or_else(|| BracketError::UnknownMatch(final_key.to_string()))?;
    let winner = m.winner.clone().ok_or_else(|| {
      BracketError::InconsistentBracket(format!("{final_key} resolved without a winner"))
    })?;

    let mut path = vec![CompletionPhase::FinalPlayed];
    if !variant.has_reset() || prior_losses(view, &winner, final_key) == 0 {
      path.push(CompletionPhase::ChampionDecided);
      return Ok(Some(Transition {
        path,
        verdict: Verdict::Champion(winner),
      }));
    }

    let (Some(first), Some(second)) = (m.slots[0].player(), m.slots[1].player()) else {
      return Err(BracketError::InconsistentBracket(format!(
        "{final_key} needs two players before a reset"
      )));
    };
    path.push(CompletionPhase::ResetPending);
    return Ok(Some(Transition {
      path,
      verdict: Verdict::ActivateReset {
        first: first.clone(),
        second: second.clone(),
      },
    }));
  }

  let reset = MatchKey::reset();
  if phase == CompletionPhase::ResetPending && resolved.contains(&reset) {
    let winner = view
      .get_match(reset)
      .and_then(|m| m.winner.clone())
      .ok_or_else(|| BracketError::InconsistentBracket(format!("{reset} resolved without a winner")))?;
    return Ok(Some(Transition {
      path: vec![CompletionPhase::ResetPlayed, CompletionPhase::ChampionDecided],
      verdict: Verdict::Champion(winner),
    }));
  }

  Ok(None)
}
