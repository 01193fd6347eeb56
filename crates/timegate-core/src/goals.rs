//! Goal evaluation for gated entities.
//!
//! A gated entity links one or more tracked entities as goals. Earned
//! reward minutes are re-derived from the full day totals on every
//! evaluation; there is no running balance that could drift out of sync
//! with the counters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How linked goals combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnlockMode {
    /// The first satisfied goal (in configured order) unlocks and sets
    /// the earned minutes by itself.
    #[default]
    Any,
    /// Every goal must be satisfied; earned minutes sum over all goals.
    All,
}

/// One linked goal: minimum minutes on a tracked entity, plus the
/// learning-to-reward conversion rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalLink {
    pub tracked_id: String,
    pub minutes_required: u64,
    #[serde(default = "default_ratio")]
    pub ratio_learning_minutes: u32,
    #[serde(default = "default_ratio")]
    pub ratio_reward_minutes: u32,
}

fn default_ratio() -> u32 {
    1
}

/// Time-of-day window in which a gated entity may be used at all,
/// expressed in minutes since midnight. `start == end` means full day;
/// `start > end` wraps overnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedWindow {
    pub start_minute: u32,
    pub end_minute: u32,
}

impl AllowedWindow {
    pub fn contains(&self, minute_of_day: u32) -> bool {
        if self.start_minute == self.end_minute {
            return true;
        }
        if self.start_minute > self.end_minute {
            // Overnight window (e.g. 21:00 - 06:00)
            minute_of_day >= self.start_minute || minute_of_day < self.end_minute
        } else {
            minute_of_day >= self.start_minute && minute_of_day < self.end_minute
        }
    }
}

/// One gated (reward) entity as configured by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatedEntity {
    pub logical_id: String,
    #[serde(default)]
    pub display_name: String,
    /// Opaque handle the actuator understands. Stored and forwarded,
    /// never interpreted.
    pub actuator_handle: String,
    #[serde(default)]
    pub linked_goals: Vec<GoalLink>,
    #[serde(default)]
    pub unlock_mode: UnlockMode,
    /// 1440 means unlimited.
    #[serde(default = "default_daily_limit")]
    pub daily_limit_minutes: u32,
    /// `None` means the full day is allowed.
    #[serde(default)]
    pub allowed_window: Option<AllowedWindow>,
}

fn default_daily_limit() -> u32 {
    1440
}

/// Result of evaluating a gated entity's goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GoalOutcome {
    pub goal_met: bool,
    pub earned_minutes: u64,
}

/// Evaluate a gated entity against today's minutes per tracked entity.
///
/// Entities absent from the map count as zero minutes.
pub fn evaluate(gated: &GatedEntity, today_minutes: &HashMap<String, u64>) -> GoalOutcome {
    let minutes_for = |id: &str| today_minutes.get(id).copied().unwrap_or(0);

    match gated.unlock_mode {
        UnlockMode::Any => {
            for goal in &gated.linked_goals {
                let minutes = minutes_for(&goal.tracked_id);
                if minutes >= goal.minutes_required {
                    return GoalOutcome {
                        goal_met: true,
                        earned_minutes: earned(goal, minutes),
                    };
                }
            }
            GoalOutcome::default()
        }
        UnlockMode::All => {
            if gated.linked_goals.is_empty() {
                return GoalOutcome::default();
            }
            let mut earned_total = 0;
            for goal in &gated.linked_goals {
                let minutes = minutes_for(&goal.tracked_id);
                if minutes < goal.minutes_required {
                    return GoalOutcome::default();
                }
                earned_total += earned(goal, minutes);
            }
            GoalOutcome {
                goal_met: true,
                earned_minutes: earned_total,
            }
        }
    }
}

/// Convert accumulated learning minutes into reward minutes at the
/// goal's rate, flooring to whole minutes.
fn earned(goal: &GoalLink, today_minutes: u64) -> u64 {
    if goal.ratio_learning_minutes == 0 {
        return 0;
    }
    today_minutes * u64::from(goal.ratio_reward_minutes) / u64::from(goal.ratio_learning_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goal(tracked_id: &str, required: u64, learning: u32, reward: u32) -> GoalLink {
        GoalLink {
            tracked_id: tracked_id.into(),
            minutes_required: required,
            ratio_learning_minutes: learning,
            ratio_reward_minutes: reward,
        }
    }

    fn gated(mode: UnlockMode, goals: Vec<GoalLink>) -> GatedEntity {
        GatedEntity {
            logical_id: "games".into(),
            display_name: "Games".into(),
            actuator_handle: "token-games".into(),
            linked_goals: goals,
            unlock_mode: mode,
            daily_limit_minutes: 1440,
            allowed_window: None,
        }
    }

    fn minutes(pairs: &[(&str, u64)]) -> HashMap<String, u64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_any_mode_first_satisfied_goal_wins() {
        let entity = gated(
            UnlockMode::Any,
            vec![goal("math", 10, 1, 1), goal("reading", 20, 2, 1)],
        );
        // Only the second goal is satisfied; it alone sets the earnings.
        let outcome = evaluate(&entity, &minutes(&[("math", 5), ("reading", 20)]));
        assert!(outcome.goal_met);
        assert_eq!(outcome.earned_minutes, 10);
    }

    #[test]
    fn test_any_mode_does_not_sum_across_goals() {
        let entity = gated(
            UnlockMode::Any,
            vec![goal("math", 10, 1, 1), goal("reading", 10, 1, 1)],
        );
        let outcome = evaluate(&entity, &minutes(&[("math", 15), ("reading", 30)]));
        // First satisfied goal in configured order decides: math only.
        assert_eq!(outcome.earned_minutes, 15);
    }

    #[test]
    fn test_any_mode_none_satisfied() {
        let entity = gated(
            UnlockMode::Any,
            vec![goal("math", 10, 1, 1), goal("reading", 20, 1, 1)],
        );
        let outcome = evaluate(&entity, &minutes(&[("math", 5), ("reading", 19)]));
        assert!(!outcome.goal_met);
        assert_eq!(outcome.earned_minutes, 0);
    }

    #[test]
    fn test_all_mode_requires_every_goal() {
        let entity = gated(
            UnlockMode::All,
            vec![goal("math", 10, 1, 1), goal("reading", 20, 1, 1)],
        );
        // Same state that satisfies `any` fails `all`: no partial credit.
        let outcome = evaluate(&entity, &minutes(&[("math", 5), ("reading", 20)]));
        assert!(!outcome.goal_met);
        assert_eq!(outcome.earned_minutes, 0);
    }

    #[test]
    fn test_all_mode_sums_earned_minutes() {
        let entity = gated(
            UnlockMode::All,
            vec![goal("math", 10, 1, 2), goal("reading", 20, 2, 1)],
        );
        let outcome = evaluate(&entity, &minutes(&[("math", 12), ("reading", 21)]));
        assert!(outcome.goal_met);
        // 12 * 2/1 + 21 * 1/2 (floored) = 24 + 10
        assert_eq!(outcome.earned_minutes, 34);
    }

    #[test]
    fn test_ratio_applies_to_full_day_total() {
        let entity = gated(UnlockMode::Any, vec![goal("math", 10, 3, 1)]);
        let outcome = evaluate(&entity, &minutes(&[("math", 25)]));
        assert_eq!(outcome.earned_minutes, 8);
    }

    #[test]
    fn test_no_goals_never_met() {
        assert!(!evaluate(&gated(UnlockMode::Any, vec![]), &minutes(&[])).goal_met);
        assert!(!evaluate(&gated(UnlockMode::All, vec![]), &minutes(&[])).goal_met);
    }

    #[test]
    fn test_unknown_tracked_entity_counts_as_zero() {
        let entity = gated(UnlockMode::Any, vec![goal("math", 1, 1, 1)]);
        assert!(!evaluate(&entity, &minutes(&[])).goal_met);
    }

    #[test]
    fn test_allowed_window_daytime() {
        let window = AllowedWindow {
            start_minute: 9 * 60,
            end_minute: 17 * 60,
        };
        assert!(window.contains(9 * 60));
        assert!(window.contains(12 * 60));
        assert!(!window.contains(17 * 60));
        assert!(!window.contains(3 * 60));
    }

    #[test]
    fn test_allowed_window_overnight() {
        let window = AllowedWindow {
            start_minute: 21 * 60,
            end_minute: 6 * 60,
        };
        assert!(window.contains(23 * 60));
        assert!(window.contains(3 * 60));
        assert!(!window.contains(12 * 60));
    }

    #[test]
    fn test_allowed_window_full_day() {
        let window = AllowedWindow {
            start_minute: 0,
            end_minute: 0,
        };
        assert!(window.contains(0));
        assert!(window.contains(23 * 60 + 59));
    }
}
