use std::num::NonZeroU32;

use spacetimedb::SpacetimeType;

use crate::questions::{ChallengeItem, QuizMode};

// ==================== CONSTANTS ====================

/// Canned multiple-choice questions available to quick mode
pub const QUICK_POOL_SIZE: u32 = 7;

/// Default number of items per mode
pub const DEFAULT_QUICK_COUNT: u32 = 5;
pub const DEFAULT_MEMORY_COUNT: u32 = 10;
pub const DEFAULT_DAILY_COUNT: u32 = 5;
pub const DEFAULT_SPEED_COUNT: u32 = 5;
pub const DEFAULT_LOGIC_COUNT: u32 = 5;

/// Flat XP bonus for finishing the daily challenge
pub const DAILY_BONUS_XP: u32 = 50;

/// XP needed for one level
pub const XP_PER_LEVEL: u32 = 100;

/// High-score history length per profile
pub const HIGH_SCORE_LIMIT: u32 = 5;

/// Feedback shown before the next item (ms)
/// Wrong answers and memory grids linger longer so the solution can be read
pub const CORRECT_FEEDBACK_MS: u32 = 1500;
pub const WRONG_FEEDBACK_MS: u32 = 2000;
pub const MEMORY_FEEDBACK_MS: u32 = 2000;
/// Speed rounds show their tally for a fixed time, hits or not
pub const SPEED_FEEDBACK_MS: u32 = 1500;

/// Session clock resolution
pub const TICK_INTERVAL_SECS: u64 = 1;

/// Engine events older than this are pruned by the cleanup schedule
pub const EVENT_RETENTION_SECS: u64 = 10 * 60;

/// How often the cleanup schedule runs
pub const CLEANUP_INTERVAL_SECS: u64 = 30;

/// Runtime-tunable settings, stored as a single row seeded at init
#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct QuizConfig {
    pub quick_count: u32,
    pub memory_count: u32,
    pub daily_count: u32,
    pub speed_count: u32,
    pub logic_count: u32,

    pub daily_bonus_xp: u32,
    pub high_score_limit: u32,

    pub correct_feedback_ms: u32,
    pub wrong_feedback_ms: u32,
    pub memory_feedback_ms: u32,
    pub speed_feedback_ms: u32,

    /// Offset from UTC (minutes) at which calendar days roll over
    /// 0 = midnight UTC, -480 = midnight PST
    pub day_offset_minutes: i32,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            quick_count: DEFAULT_QUICK_COUNT,
            memory_count: DEFAULT_MEMORY_COUNT,
            daily_count: DEFAULT_DAILY_COUNT,
            speed_count: DEFAULT_SPEED_COUNT,
            logic_count: DEFAULT_LOGIC_COUNT,
            daily_bonus_xp: DAILY_BONUS_XP,
            high_score_limit: HIGH_SCORE_LIMIT,
            correct_feedback_ms: CORRECT_FEEDBACK_MS,
            wrong_feedback_ms: WRONG_FEEDBACK_MS,
            memory_feedback_ms: MEMORY_FEEDBACK_MS,
            speed_feedback_ms: SPEED_FEEDBACK_MS,
            day_offset_minutes: 0,
        }
    }
}

impl QuizConfig {
    /// Items per session for `mode`; a zero setting falls back to one item
    pub fn count_for(&self, mode: QuizMode) -> NonZeroU32 {
        let count = match mode {
            QuizMode::Quick => self.quick_count,
            QuizMode::Memory => self.memory_count,
            QuizMode::Daily => self.daily_count,
            QuizMode::Speed => self.speed_count,
            QuizMode::Logic => self.logic_count,
        };
        NonZeroU32::new(count).unwrap_or(NonZeroU32::MIN)
    }

    /// Pause before the next item after `answered` was scored
    pub fn feedback_delay_ms(&self, answered: &ChallengeItem, was_correct: bool) -> u32 {
        match answered {
            ChallengeItem::MemoryMatrix(_) => self.memory_feedback_ms,
            ChallengeItem::SpeedTarget(_) => self.speed_feedback_ms,
            _ if was_correct => self.correct_feedback_ms,
            _ => self.wrong_feedback_ms,
        }
    }
}
