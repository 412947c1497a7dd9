//! Decision engine: what to claim and which kakera to collect.
//!
//! Pure and synchronous: the caller passes in a budget snapshot and the
//! current time, and gets back the actions to perform. Two pipelines share
//! one batch counter. Each keeps a running best pick over the automated
//! user's own rolls and commits it once every roll of the batch has been
//! seen. The finalizer commits whatever is still held when the batch ends.

pub mod criteria;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::channels::Identity;
use crate::config::{ClaimConfig, KakeraReactConfig, WishPriority};
use crate::mudae::{ClaimableRoll, KakeraRoll, KakeraType, TimerStatus};

/// Rolls at least this many seconds old are never acted on.
pub const STALE_AFTER_SECS: i64 = 30;

/// An outbound action the session must perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Claim(ClaimableRoll),
    KakeraReact(KakeraRoll),
}

/// Result of a finalizer pass: at most one action per pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    pub claim: Option<ClaimableRoll>,
    pub kakera_react: Option<KakeraRoll>,
}

impl Decision {
    pub fn is_empty(&self) -> bool {
        self.claim.is_none() && self.kakera_react.is_none()
    }

    pub fn into_actions(self) -> Vec<Action> {
        self.claim
            .map(Action::Claim)
            .into_iter()
            .chain(self.kakera_react.map(Action::KakeraReact))
            .collect()
    }
}

pub struct DecisionEngine {
    me: Identity,
    claim: ClaimConfig,
    kakera: KakeraReactConfig,
    best_claim: Option<ClaimableRoll>,
    best_kakera: Option<KakeraRoll>,
    rolls_handled: u32,
    /// A claim went out since the last status report.
    claim_spent: bool,
    /// A kakera react went out since the last status report.
    react_spent: bool,
}

impl DecisionEngine {
    pub fn new(me: Identity, claim: ClaimConfig, kakera: KakeraReactConfig) -> Self {
        Self {
            me,
            claim,
            kakera,
            best_claim: None,
            best_kakera: None,
            rolls_handled: 0,
            claim_spent: false,
            react_spent: false,
        }
    }

    pub fn rolls_handled(&self) -> u32 {
        self.rolls_handled
    }

    pub fn best_claim(&self) -> Option<&ClaimableRoll> {
        self.best_claim.as_ref()
    }

    pub fn best_kakera(&self) -> Option<&KakeraRoll> {
        self.best_kakera.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.best_claim.is_some() || self.best_kakera.is_some()
    }

    pub fn claim_spent(&self) -> bool {
        self.claim_spent
    }

    pub fn react_spent(&self) -> bool {
        self.react_spent
    }

    /// A fresh status report starts a new batch. Held picks are kept; the
    /// report carries the current claim and react permissions.
    pub fn begin_batch(&mut self) {
        self.rolls_handled = 0;
        self.claim_spent = false;
        self.react_spent = false;
    }

    /// Every roll the budget allowed has been handled.
    pub fn batch_exhausted(&self, status: &TimerStatus) -> bool {
        status.rolls_available <= self.rolls_handled
    }

    fn count_if_mine(&mut self, owner: Option<&Identity>) -> bool {
        let mine = owner == Some(&self.me);
        if mine {
            self.rolls_handled += 1;
        }
        mine
    }

    // ── Claim pipeline ──────────────────────────────────────────────

    pub fn observe_claimable(
        &mut self,
        roll: ClaimableRoll,
        status: &TimerStatus,
        now: DateTime<Utc>,
    ) -> Option<Action> {
        let mine = self.count_if_mine(roll.owner.as_ref());
        info!(roll = %roll, "Claimable roll");

        if !status.can_claim || self.claim_spent {
            info!("CLAIM SKIPPED: cannot claim yet");
            return None;
        }
        if is_stale(roll.observed_at, now) {
            info!(age_s = age_secs(roll.observed_at, now), "CLAIM SKIPPED: roll too old");
            return None;
        }

        let snipe_met = self.claim.snipe.is_met_by(&roll, &self.me);
        let snipe_excepted = self.claim.snipe.is_excepted(&roll, &self.me);
        debug!(snipe_met, snipe_excepted, "Snipe evaluation");
        if snipe_met && !snipe_excepted {
            info!(character = %roll.character, kakera = roll.kakera_value, "CLAIMING: snipe");
            self.spend_claim();
            return Some(Action::Claim(roll));
        }

        if !mine {
            info!(owner = ?roll.owner.as_ref().map(|o| o.id), "CLAIM SKIPPED: not my roll");
            return None;
        }

        self.update_best_claim(roll);

        if !self.batch_exhausted(status) {
            info!(
                remaining = status.rolls_available - self.rolls_handled,
                "CLAIM DEFERRED: waiting for the rest of the batch"
            );
            return None;
        }

        self.commit_claim(status, now).map(Action::Claim)
    }

    fn wish_dominates(&self, roll: &ClaimableRoll) -> bool {
        if !roll.is_wished() {
            return false;
        }
        match self.claim.wish_priority {
            WishPriority::Always => true,
            WishPriority::UnlessExcepted => {
                !self.claim.early_claim.is_excepted(roll, &self.me)
                    && !self.claim.late_claim.is_excepted(roll, &self.me)
            }
        }
    }

    fn update_best_claim(&mut self, roll: ClaimableRoll) {
        let replace = match &self.best_claim {
            None => true,
            Some(_) if self.wish_dominates(&roll) => true,
            Some(best) => roll.kakera_value >= best.kakera_value && !self.wish_dominates(best),
        };
        if replace {
            info!(
                character = %roll.character,
                kakera = roll.kakera_value,
                wished = roll.is_wished(),
                "BEST ROLL UPDATED"
            );
            self.best_claim = Some(roll);
        } else {
            debug!(character = %roll.character, kakera = roll.kakera_value, "BEST ROLL UNCHANGED");
        }
    }

    fn commit_claim(&mut self, status: &TimerStatus, now: DateTime<Utc>) -> Option<ClaimableRoll> {
        let best = self.best_claim.take()?;

        if !status.can_claim || self.claim_spent {
            info!(character = %best.character, "CLAIM SKIPPED: cannot claim yet");
            return None;
        }
        if is_stale(best.observed_at, now) {
            info!(character = %best.character, "CLAIM SKIPPED: best roll too old");
            return None;
        }

        let early = self.claim.early_claim.accepts(&best, &self.me);
        let late = self.claim.late_claim.accepts(&best, &self.me);
        let reset = status.next_hour_is_reset();
        debug!(early, late, next_hour_is_reset = reset, "Claim evaluation");

        if early || (late && reset) {
            info!(
                character = %best.character,
                kakera = best.kakera_value,
                tier = if early { "early" } else { "late" },
                "CLAIMING: best roll"
            );
            self.spend_claim();
            Some(best)
        } else {
            info!(character = %best.character, kakera = best.kakera_value, "CLAIM REJECTED");
            None
        }
    }

    // ── Kakera pipeline ─────────────────────────────────────────────

    pub fn observe_kakera(
        &mut self,
        roll: KakeraRoll,
        status: &TimerStatus,
        now: DateTime<Utc>,
    ) -> Option<Action> {
        let mine = self.count_if_mine(roll.owner.as_ref());
        info!(roll = %roll, "Kakera roll");

        if is_stale(roll.observed_at, now) {
            info!(age_s = age_secs(roll.observed_at, now), "KAKERA REACT SKIPPED: roll too old");
            return None;
        }
        if !mine {
            info!("KAKERA REACT SKIPPED: not my roll");
            return None;
        }

        if let Some(kind) = self
            .kakera
            .priority_types
            .iter()
            .find(|kind| roll.has(**kind))
        {
            info!(kind = %kind, "KAKERA REACTING: priority crystal");
            self.spend_react();
            return Some(Action::KakeraReact(roll));
        }

        for kind in roll.kinds() {
            if let Some(min) = self.kakera.min_power_by_type.get(&kind) {
                if status.kakera_power < *min {
                    info!(
                        kind = %kind,
                        required = *min,
                        power = status.kakera_power,
                        "KAKERA REACT SKIPPED: not enough power"
                    );
                    return None;
                }
            }
        }

        let replace = self
            .best_kakera
            .as_ref()
            .is_none_or(|best| roll.kakera_value >= best.kakera_value);
        if replace {
            info!(kakera = roll.kakera_value, "BEST KAKERA UPDATED");
            self.best_kakera = Some(roll.clone());
        }

        if let Some(kind) = self.blocked_kind(&roll) {
            info!(kind = %kind, "KAKERA REACT BLOCKED: blocked type");
            return None;
        }

        if !self.batch_exhausted(status) {
            info!(
                remaining = status.rolls_available - self.rolls_handled,
                "KAKERA REACT DEFERRED: waiting for the rest of the batch"
            );
            return None;
        }

        self.commit_kakera(status, now).map(Action::KakeraReact)
    }

    fn blocked_kind(&self, roll: &KakeraRoll) -> Option<KakeraType> {
        roll.kinds().find(|kind| self.kakera.blocked_types.contains(kind))
    }

    fn commit_kakera(&mut self, status: &TimerStatus, now: DateTime<Utc>) -> Option<KakeraRoll> {
        let best = self.best_kakera.take()?;

        if !status.can_kakera_react || self.react_spent {
            info!("KAKERA REACT BLOCKED: cannot react yet");
            return None;
        }
        if is_stale(best.observed_at, now) {
            info!("KAKERA REACT SKIPPED: best roll too old");
            return None;
        }
        if let Some(kind) = self.blocked_kind(&best) {
            info!(kind = %kind, "KAKERA REACT BLOCKED: blocked type");
            return None;
        }

        info!(kakera = best.kakera_value, "KAKERA REACTING: best pick");
        self.spend_react();
        Some(best)
    }

    /// The claim is used up until the next status report; a held pick is dropped.
    fn spend_claim(&mut self) {
        self.claim_spent = true;
        if let Some(dropped) = self.best_claim.take() {
            info!(character = %dropped.character, "BEST ROLL DROPPED: claim spent");
        }
    }

    /// The react is used up until the next status report; a held pick is dropped.
    fn spend_react(&mut self) {
        self.react_spent = true;
        if let Some(dropped) = self.best_kakera.take() {
            info!(kakera = dropped.kakera_value, "BEST KAKERA DROPPED: react spent");
        }
    }

    // ── Finalizer ───────────────────────────────────────────────────

    /// Commit any held pick once the batch is exhausted.
    pub fn finalize(&mut self, status: &TimerStatus, now: DateTime<Utc>) -> Decision {
        if !self.batch_exhausted(status) || !self.has_pending() {
            return Decision::default();
        }
        debug!(rolls_handled = self.rolls_handled, "Finalizing batch");
        Decision {
            claim: self.commit_claim(status, now),
            kakera_react: self.commit_kakera(status, now),
        }
    }
}

fn is_stale(observed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - observed_at >= TimeDelta::seconds(STALE_AFTER_SECS)
}

fn age_secs(observed_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - observed_at).num_milliseconds() as f64 / 1000.0
}
