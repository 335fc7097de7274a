use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use spacetimedb::{SpacetimeType, Timestamp};

use crate::config::{QuizConfig, XP_PER_LEVEL};
use crate::events::{EngineEvent, EventSink};
use crate::profile::{HighScore, UserProfile};
use crate::session::SessionSummary;

#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyChallengeStatus {
    pub available: bool,
    pub completed: bool,
    /// End of the calendar day the status was computed for
    pub expires_at: Option<Timestamp>,
}

impl Default for DailyChallengeStatus {
    fn default() -> Self {
        DailyChallengeStatus { available: true, completed: false, expires_at: None }
    }
}

/// What one finished session did to the profile
#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct ProgressionReport {
    pub xp_gained: u32,
    pub levels_gained: u32,
    pub level: u32,
    pub xp: u32,
    pub accuracy: u32,
    pub streak_incremented: bool,
    /// 1-based position in the high-score list, None if it did not make the cut
    pub high_score_rank: Option<u32>,
    /// Seconds from start to completion
    pub duration_secs: u64,
}

// ==================== CALENDAR ====================

fn day_offset(config: &QuizConfig) -> FixedOffset {
    FixedOffset::east_opt(config.day_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
}

fn to_datetime(ts: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.to_micros_since_unix_epoch()).unwrap_or_default()
}

/// Calendar date of `ts` in the configured day offset
pub fn calendar_day(ts: Timestamp, config: &QuizConfig) -> NaiveDate {
    to_datetime(ts).with_timezone(&day_offset(config)).date_naive()
}

/// Last millisecond of the calendar day containing `ts`
pub fn end_of_day(ts: Timestamp, config: &QuizConfig) -> Timestamp {
    let offset = day_offset(config);
    calendar_day(ts, config)
        .and_hms_milli_opt(23, 59, 59, 999)
        .and_then(|local| local.and_local_timezone(offset).single())
        .map(|end| Timestamp::from_micros_since_unix_epoch(end.timestamp_micros()))
        .unwrap_or(ts)
}

fn days_between(earlier: Timestamp, later: Timestamp, config: &QuizConfig) -> i64 {
    (calendar_day(later, config) - calendar_day(earlier, config)).num_days()
}

// ==================== LEDGER ====================

/// Recompute the daily challenge for the day containing `now`.
///
/// Also breaks the streak when a whole calendar day passed without a daily.
pub fn refresh_daily_status(
    profile: &mut UserProfile,
    status: &mut DailyChallengeStatus,
    now: Timestamp,
    config: &QuizConfig,
) {
    if let Some(last) = profile.last_streak_update {
        let gap = days_between(last, now, config);
        if gap > 1 && profile.streak_days > 0 {
            log::info!(
                "[STREAK] broken player:{} lost_streak:{} days_since_daily:{}",
                profile.name,
                profile.streak_days,
                gap - 1
            );
            profile.streak_days = 0;
        }
    }

    let completed_today = profile
        .last_daily_challenge
        .is_some_and(|last| calendar_day(last, config) == calendar_day(now, config));

    *status = DailyChallengeStatus {
        available: true,
        completed: completed_today,
        expires_at: Some(end_of_day(now, config)),
    };
}

/// Add XP and roll every full hundred into levels; returns levels gained
pub fn apply_xp(profile: &mut UserProfile, gained: u32) -> u32 {
    profile.xp = profile.xp.saturating_add(gained);
    let levels = profile.xp / XP_PER_LEVEL;
    if levels > 0 {
        profile.level += levels;
        profile.xp %= XP_PER_LEVEL;
    }
    levels
}

/// Insert, keep highest first, cap at `limit`; returns the entry's rank if kept
pub fn record_high_score(profile: &mut UserProfile, entry: HighScore, limit: u32) -> Option<u32> {
    profile.high_scores.push(entry.clone());
    // Stable sort: ties keep the older entry ahead
    profile.high_scores.sort_by(|a, b| b.score.cmp(&a.score));
    profile.high_scores.truncate(limit as usize);
    profile
        .high_scores
        .iter()
        .rposition(|h| *h == entry)
        .map(|pos| pos as u32 + 1)
}

/// Apply a completed session to the profile. Called once per completion.
pub fn record_session(
    profile: &mut UserProfile,
    daily: &mut DailyChallengeStatus,
    summary: &SessionSummary,
    now: Timestamp,
    config: &QuizConfig,
    events: &mut impl EventSink,
) -> ProgressionReport {
    let accuracy = summary.accuracy();
    let mut xp_gained = (summary.score as f64 / 10.0).round() as u32;
    let mut streak_incremented = false;

    if summary.is_daily_challenge {
        xp_gained += config.daily_bonus_xp;
        daily.completed = true;
        profile.last_daily_challenge = Some(now);

        let already_today = profile
            .last_streak_update
            .is_some_and(|last| calendar_day(last, config) == calendar_day(now, config));
        if !already_today {
            profile.streak_days += 1;
            profile.last_streak_update = Some(now);
            streak_incremented = true;
            events.emit(EngineEvent::StreakExtended { days: profile.streak_days });

            match profile.streak_days {
                7 => log::info!("[STREAK] player=\"{}\" days=7 milestone=weekly", profile.name),
                30 => log::info!("[STREAK] player=\"{}\" days=30 milestone=monthly", profile.name),
                _ => {}
            }
        }
    }

    let levels_gained = apply_xp(profile, xp_gained);
    if levels_gained > 0 {
        events.emit(EngineEvent::LevelUp { level: profile.level });
        log::info!("[LEVEL] player=\"{}\" level={} (+{})", profile.name, profile.level, levels_gained);
    }

    let high_score_rank = record_high_score(
        profile,
        HighScore {
            mode: summary.mode.title().to_string(),
            score: summary.score,
            accuracy,
            achieved_at: now,
        },
        config.high_score_limit,
    );

    log::info!(
        "[QUIZ] recorded player=\"{}\" mode={} score={} accuracy={}% xp+{} daily={} duration={}s",
        profile.name,
        summary.mode.tag(),
        summary.score,
        accuracy,
        xp_gained,
        summary.is_daily_challenge,
        summary.duration_secs()
    );

    ProgressionReport {
        xp_gained,
        levels_gained,
        level: profile.level,
        xp: profile.xp,
        accuracy,
        streak_incremented,
        high_score_rank,
        duration_secs: summary.duration_secs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::CognitiveProfile;
    use crate::questions::QuizMode;

    const HOUR: i64 = 3600;
    const DAY: i64 = 24 * HOUR;

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_micros_since_unix_epoch(secs * 1_000_000)
    }

    fn profile() -> UserProfile {
        UserProfile::create("Helix", 3, CognitiveProfile::Accelerator).unwrap()
    }

    fn summary(score: u32, daily: bool) -> SessionSummary {
        SessionSummary {
            mode: if daily { QuizMode::Daily } else { QuizMode::Quick },
            score,
            correct_answers: 4,
            total_questions: 5,
            is_daily_challenge: daily,
            started_at: at(0),
            finished_at: at(60),
        }
    }

    #[test]
    fn test_xp_rolls_into_levels() {
        let mut p = profile();
        p.xp = 80;
        assert_eq!(apply_xp(&mut p, 45), 1);
        assert_eq!((p.level, p.xp), (2, 25));

        assert_eq!(apply_xp(&mut p, 375), 4);
        assert_eq!((p.level, p.xp), (6, 0));

        assert_eq!(apply_xp(&mut p, 0), 0);
    }

    #[test]
    fn test_session_xp_and_daily_bonus() {
        let mut p = profile();
        let mut daily = DailyChallengeStatus::default();
        let mut events = Vec::new();
        let config = QuizConfig::default();

        let report = record_session(&mut p, &mut daily, &summary(455, false), at(100), &config, &mut events);
        assert_eq!(report.xp_gained, 46);
        assert_eq!(report.accuracy, 80);
        assert_eq!(report.duration_secs, 60);
        assert!(!daily.completed);
        assert_eq!(p.streak_days, 0);

        let report = record_session(&mut p, &mut daily, &summary(600, true), at(200), &config, &mut events);
        assert_eq!(report.xp_gained, 110);
        assert_eq!((report.level, report.xp), (2, 56));
        assert!(daily.completed);
        assert_eq!(p.last_daily_challenge, Some(at(200)));
        assert!(events.contains(&EngineEvent::LevelUp { level: 2 }));
    }

    #[test]
    fn test_streak_once_per_calendar_day() {
        let mut p = profile();
        let mut daily = DailyChallengeStatus::default();
        let mut events = Vec::new();
        let config = QuizConfig::default();
        let morning = 10 * DAY + 8 * HOUR;

        let first = record_session(&mut p, &mut daily, &summary(300, true), at(morning), &config, &mut events);
        let second = record_session(&mut p, &mut daily, &summary(300, true), at(morning + 10 * HOUR), &config, &mut events);
        assert!(first.streak_incremented);
        assert!(!second.streak_incremented);
        assert_eq!(p.streak_days, 1);

        let next_day = record_session(&mut p, &mut daily, &summary(300, true), at(morning + DAY), &config, &mut events);
        assert!(next_day.streak_incremented);
        assert_eq!(p.streak_days, 2);
    }

    #[test]
    fn test_day_offset_moves_the_boundary() {
        // 03:00 UTC is still the previous day at UTC-8
        let pst = QuizConfig { day_offset_minutes: -480, ..QuizConfig::default() };
        let utc = QuizConfig::default();
        let late = at(10 * DAY - HOUR);
        let early = at(10 * DAY + 3 * HOUR);
        assert_ne!(calendar_day(late, &utc), calendar_day(early, &utc));
        assert_eq!(calendar_day(late, &pst), calendar_day(early, &pst));
    }

    #[test]
    fn test_high_scores_stay_sorted_and_bounded() {
        let mut p = profile();
        for (i, score) in [300, 900, 100, 500, 700, 200, 800].into_iter().enumerate() {
            let entry = HighScore { mode: "Quick Challenge".into(), score, accuracy: 60, achieved_at: at(i as i64) };
            record_high_score(&mut p, entry, 5);
            assert!(p.high_scores.len() <= 5);
            assert!(p.high_scores.windows(2).all(|w| w[0].score >= w[1].score));
        }
        let scores: Vec<_> = p.high_scores.iter().map(|h| h.score).collect();
        assert_eq!(scores, vec![900, 800, 700, 500, 300]);

        let low = HighScore { mode: "Quick Challenge".into(), score: 50, accuracy: 10, achieved_at: at(99) };
        assert_eq!(record_high_score(&mut p, low, 5), None);
        let top = HighScore { mode: "Quick Challenge".into(), score: 1000, accuracy: 100, achieved_at: at(100) };
        assert_eq!(record_high_score(&mut p, top, 5), Some(1));
    }

    #[test]
    fn test_refresh_daily_status() {
        let config = QuizConfig::default();
        let mut p = profile();
        let mut status = DailyChallengeStatus::default();
        let noon = 20 * DAY + 12 * HOUR;

        refresh_daily_status(&mut p, &mut status, at(noon), &config);
        assert!(status.available && !status.completed);
        assert_eq!(status.expires_at, Some(Timestamp::from_micros_since_unix_epoch((21 * DAY) * 1_000_000 - 1_000)));

        p.last_daily_challenge = Some(at(noon - 2 * HOUR));
        refresh_daily_status(&mut p, &mut status, at(noon), &config);
        assert!(status.completed);

        refresh_daily_status(&mut p, &mut status, at(noon + DAY), &config);
        assert!(!status.completed);
    }

    #[test]
    fn test_missed_day_breaks_streak() {
        let config = QuizConfig::default();
        let mut p = profile();
        let mut status = DailyChallengeStatus::default();
        p.streak_days = 4;
        p.last_streak_update = Some(at(5 * DAY + HOUR));

        refresh_daily_status(&mut p, &mut status, at(6 * DAY + HOUR), &config);
        assert_eq!(p.streak_days, 4);

        refresh_daily_status(&mut p, &mut status, at(7 * DAY + HOUR), &config);
        assert_eq!(p.streak_days, 0);
    }
}
