//! Pure scoring rules: latency, streaks, power-up multipliers, bonus rounds.

/// Streak length from which the first streak multiplier applies.
const STREAK_TIER_ONE: u32 = 3;
/// Streak length from which the top streak multiplier applies.
const STREAK_TIER_TWO: u32 = 5;

/// Input to one scoring decision.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInput {
    /// Whether the submitted option was correct.
    pub correct: bool,
    /// Elapsed time over time limit, clamped to [0, 1] by the caller.
    pub latency_fraction: f64,
    /// Streak before this answer.
    pub previous_streak: u32,
    /// Active player multiplier (1.0, or 2.0 with double points).
    pub player_multiplier: f64,
    /// Whether the question pays double base points.
    pub is_bonus: bool,
}

/// Output of one scoring decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOutcome {
    /// Points awarded.
    pub points: u64,
    /// Streak after this answer.
    pub streak: u32,
}

/// Base points for a correct answer: 1000 at zero latency, 500 at the limit.
pub fn base_points(latency_fraction: f64) -> u64 {
    let f = latency_fraction.clamp(0.0, 1.0);
    (1000.0 * (1.0 - 0.5 * f)).round() as u64
}

/// Streak multiplier for a given (post-answer) streak length.
pub fn streak_multiplier(streak: u32) -> f64 {
    if streak >= STREAK_TIER_TWO {
        2.0
    } else if streak >= STREAK_TIER_ONE {
        1.5
    } else {
        1.0
    }
}

/// Score a single answer. Incorrect answers award nothing and reset the
/// streak; correct answers extend the streak and multiply the latency base
/// by the player, streak, and bonus multipliers.
pub fn score_answer(input: ScoreInput) -> ScoreOutcome {
    if !input.correct {
        return ScoreOutcome {
            points: 0,
            streak: 0,
        };
    }

    let streak = input.previous_streak + 1;
    let base = base_points(input.latency_fraction) as f64;
    let bonus_multiplier = if input.is_bonus { 2.0 } else { 1.0 };
    let points =
        (base * input.player_multiplier * streak_multiplier(streak) * bonus_multiplier).round()
            as u64;

    ScoreOutcome { points, streak }
}
