// src/services/reputation.rs
//! Reputation engine: pure transform of a user for one terminal outcome.
//!
//! - completed: +10 reputation, +1 completed, +1 streak
//! - failed:    -5 reputation (floored at 0), +1 failed, streak reset
//! - level is recomputed from reputation every time

use crate::models::{Outcome, User};

pub const COMPLETION_REWARD: u64 = 10;
pub const FAILURE_PENALTY: u64 = 5;
pub const POINTS_PER_LEVEL: u64 = 50;

/// Level for a reputation score: `reputation / 50 + 1`.
pub fn level_for(reputation: u64) -> u64 {
    reputation / POINTS_PER_LEVEL + 1
}

/// Return `user` with `outcome` applied. Touches only reputation, the outcome
/// counter, streak and level.
pub fn apply_outcome(user: &User, outcome: Outcome) -> User {
    let mut next = user.clone();
    match outcome {
        Outcome::Completed => {
            next.reputation = next.reputation.saturating_add(COMPLETION_REWARD);
            next.completed_promises += 1;
            next.streak += 1;
        }
        Outcome::Failed => {
            next.reputation = next.reputation.saturating_sub(FAILURE_PENALTY);
            next.failed_promises += 1;
            next.streak = 0;
        }
    }
    next.level = level_for(next.reputation);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fresh() -> User {
        User::new("0xabc", Utc::now())
    }

    #[test]
    fn completion_rewards_and_extends_streak() {
        let u = apply_outcome(&fresh(), Outcome::Completed);
        assert_eq!(u.reputation, 10);
        assert_eq!(u.completed_promises, 1);
        assert_eq!(u.streak, 1);
        assert_eq!(u.level, 1);
    }

    #[test]
    fn failure_floors_at_zero_and_resets_streak() {
        let mut u = fresh();
        u.reputation = 3;
        u.streak = 4;
        let u = apply_outcome(&u, Outcome::Failed);
        assert_eq!(u.reputation, 0);
        assert_eq!(u.failed_promises, 1);
        assert_eq!(u.streak, 0);
        assert_eq!(u.level, 1);
    }

    #[test]
    fn level_tracks_reputation_boundaries() {
        let mut u = fresh();
        for _ in 0..5 {
            u = apply_outcome(&u, Outcome::Completed);
        }
        assert_eq!(u.reputation, 50);
        assert_eq!(u.level, 2);
        let u = apply_outcome(&u, Outcome::Failed);
        assert_eq!(u.reputation, 45);
        assert_eq!(u.level, 1);
    }

    #[test]
    fn leaves_other_fields_alone() {
        let before = fresh();
        let after = apply_outcome(&before, Outcome::Completed);
        assert_eq!(after.address, before.address);
        assert_eq!(after.total_promises, before.total_promises);
        assert_eq!(after.failed_promises, before.failed_promises);
        assert_eq!(after.joined_at, before.joined_at);
        assert_eq!(after.last_active, before.last_active);
    }

    #[test]
    fn invariants_hold_over_mixed_sequences() {
        let pattern = [true, false, false, true, true, false, true, true, true, false];
        let mut u = fresh();
        for (i, done) in pattern.iter().cycle().take(200).enumerate() {
            let outcome = if *done { Outcome::Completed } else { Outcome::Failed };
            u = apply_outcome(&u, outcome);
            assert_eq!(u.level, level_for(u.reputation), "step {i}");
        }
        assert_eq!(u.completed_promises + u.failed_promises, 200);
    }
}
