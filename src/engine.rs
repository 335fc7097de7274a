use spacetimedb::Timestamp;

use crate::config::QuizConfig;
use crate::error::QuizError;
use crate::evaluators::ChallengeResponse;
use crate::events::EngineEvent;
use crate::progression::{self, DailyChallengeStatus, ProgressionReport};
use crate::profile::UserProfile;
use crate::questions::{QuizMode, RandomSource};
use crate::session::{Session, SessionState, SubmitOutcome};

/// One player's game: their active session plus the state it feeds.
///
/// Owns everything an operation touches, so a host loads one of these,
/// runs a single operation and stores it back. The progression ledger is
/// only reached from here, when a submit completes the session.
#[derive(Debug, Clone)]
pub struct QuizEngine {
    pub session: Session,
    pub profile: UserProfile,
    pub daily: DailyChallengeStatus,
    pub config: QuizConfig,
    /// Set when the last operation completed the session
    pub last_report: Option<ProgressionReport>,
    events: Vec<EngineEvent>,
}

impl QuizEngine {
    pub fn new(profile: UserProfile, daily: DailyChallengeStatus, config: QuizConfig) -> Self {
        Self::with_session(Session::default(), profile, daily, config)
    }

    pub fn with_session(
        session: Session,
        profile: UserProfile,
        daily: DailyChallengeStatus,
        config: QuizConfig,
    ) -> Self {
        QuizEngine { session, profile, daily, config, last_report: None, events: Vec::new() }
    }

    /// Events recorded since the last drain, oldest first
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn start_quiz<R: RandomSource>(&mut self, mode: QuizMode, rng: &mut R, now: Timestamp) -> Result<(), QuizError> {
        if mode == QuizMode::Daily {
            self.refresh_daily(now);
        }
        self.last_report = None;
        let count = self.config.count_for(mode);
        self.session.start(mode, count, rng, now, &mut self.events)
    }

    pub fn start_daily_challenge<R: RandomSource>(&mut self, rng: &mut R, now: Timestamp) -> Result<(), QuizError> {
        self.start_quiz(QuizMode::Daily, rng, now)
    }

    pub fn refresh_daily(&mut self, now: Timestamp) {
        progression::refresh_daily_status(&mut self.profile, &mut self.daily, now, &self.config);
    }

    pub fn submit_response(&mut self, response: ChallengeResponse, now: Timestamp) -> Result<SubmitOutcome, QuizError> {
        let outcome = self.session.submit_response(response, now, &mut self.events)?;
        self.settle(&outcome, now);
        Ok(outcome)
    }

    pub fn select_cell(&mut self, cell: u16, now: Timestamp) -> Result<Option<SubmitOutcome>, QuizError> {
        let outcome = self.session.select_cell(cell, now, &mut self.events)?;
        if let Some(outcome) = &outcome {
            self.settle(outcome, now);
        }
        Ok(outcome)
    }

    pub fn record_target(&mut self, reaction_ms: Option<u32>, now: Timestamp) -> Result<Option<SubmitOutcome>, QuizError> {
        let outcome = self.session.record_target(reaction_ms, now, &mut self.events)?;
        if let Some(outcome) = &outcome {
            self.settle(outcome, now);
        }
        Ok(outcome)
    }

    pub fn tick(&mut self, delta_secs: u32, now: Timestamp) -> Option<SubmitOutcome> {
        let epoch = self.session.clock.epoch;
        self.tick_epoch(epoch, delta_secs, now)
    }

    pub fn tick_epoch(&mut self, epoch: u64, delta_secs: u32, now: Timestamp) -> Option<SubmitOutcome> {
        let outcome = self.session.tick_epoch(epoch, delta_secs, now, &mut self.events)?;
        self.settle(&outcome, now);
        Some(outcome)
    }

    pub fn pause(&mut self) -> Result<(), QuizError> {
        self.session.pause(&mut self.events)
    }

    pub fn resume(&mut self) -> Result<(), QuizError> {
        self.session.resume(&mut self.events)
    }

    /// Same mode and length with fresh items; a daily re-checks the streak first
    pub fn restart<R: RandomSource>(&mut self, rng: &mut R, now: Timestamp) -> Result<(), QuizError> {
        let restartable = matches!(
            self.session.state,
            SessionState::Active | SessionState::Paused | SessionState::Completed
        );
        if restartable && self.session.mode == QuizMode::Daily {
            self.refresh_daily(now);
        }
        self.last_report = None;
        self.session.restart(rng, now, &mut self.events)
    }

    pub fn quit(&mut self) -> Result<(), QuizError> {
        self.session.quit(&mut self.events)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.session.state, SessionState::Completed | SessionState::Quit)
    }

    fn settle(&mut self, outcome: &SubmitOutcome, now: Timestamp) {
        let Some(summary) = &outcome.summary else {
            return;
        };
        let report = progression::record_session(
            &mut self.profile,
            &mut self.daily,
            summary,
            now,
            &self.config,
            &mut self.events,
        );
        self.last_report = Some(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::CognitiveProfile;
    use crate::questions::tests::SeededRng;
    use crate::questions::ChallengeItem;

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_micros_since_unix_epoch(secs * 1_000_000)
    }

    fn engine() -> QuizEngine {
        let profile = UserProfile::create("Pulse", 1, CognitiveProfile::Visualizer).unwrap();
        QuizEngine::new(profile, DailyChallengeStatus::default(), QuizConfig::default())
    }

    fn correct_answer(item: &ChallengeItem) -> ChallengeResponse {
        match item {
            ChallengeItem::MultipleChoice(mc) => ChallengeResponse::Choice(mc.correct_answer),
            ChallengeItem::MemoryMatrix(m) => ChallengeResponse::Cells(m.pattern.clone()),
            _ => ChallengeResponse::NoAnswer,
        }
    }

    #[test]
    fn test_quit_never_reaches_the_ledger() {
        let mut rng = SeededRng::new(1);
        let mut game = engine();
        game.start_daily_challenge(&mut rng, at(0)).unwrap();
        let first = game.session.current_item().cloned().unwrap();
        game.submit_response(correct_answer(&first), at(5)).unwrap();
        game.quit().unwrap();

        assert!(game.last_report.is_none());
        assert_eq!((game.profile.level, game.profile.xp, game.profile.streak_days), (1, 0, 0));
        assert!(game.profile.high_scores.is_empty());
        assert!(!game.daily.completed);
        assert!(game.is_finished());
    }

    #[test]
    fn test_completion_records_exactly_once() {
        let mut rng = SeededRng::new(2);
        let mut game = engine();
        game.start_daily_challenge(&mut rng, at(0)).unwrap();

        while let Some(item) = game.session.current_item().cloned() {
            game.submit_response(correct_answer(&item), at(30)).unwrap();
        }

        let report = game.last_report.clone().unwrap();
        assert_eq!(report.accuracy, 100);
        assert!(report.streak_incremented);
        assert!(game.daily.completed);
        assert_eq!(game.profile.high_scores.len(), 1);
        assert_eq!(game.profile.high_scores[0].mode, "Daily Challenge");

        // Further ticks and submits are rejected or inert
        assert!(game.tick(1, at(31)).is_none());
        assert!(game.submit_response(ChallengeResponse::Choice(0), at(31)).is_err());
        assert_eq!(game.profile.high_scores.len(), 1);

        let events = game.drain_events();
        assert_eq!(events.iter().filter(|e| matches!(e, EngineEvent::Completed { .. })).count(), 1);
        assert!(game.drain_events().is_empty());
    }

    #[test]
    fn test_expired_session_still_completes() {
        let mut rng = SeededRng::new(3);
        let mut game = engine();
        game.config.quick_count = 2;
        game.start_quiz(QuizMode::Quick, &mut rng, at(0)).unwrap();

        let mut now = 0;
        while !game.is_finished() {
            now += 1;
            game.tick(1, at(now));
        }
        let report = game.last_report.clone().unwrap();
        assert_eq!(report.xp_gained, 0);
        assert_eq!(report.accuracy, 0);
        assert_eq!(game.profile.high_scores[0].score, 0);
    }

    #[test]
    fn test_daily_restart_rechecks_streak() {
        const DAY: i64 = 24 * 3600;
        let mut rng = SeededRng::new(5);
        let mut game = engine();
        game.profile.streak_days = 4;
        game.profile.last_streak_update = Some(at(0));

        // Nothing to restart: the profile is left alone
        assert!(game.restart(&mut rng, at(3 * DAY)).is_err());
        assert_eq!(game.profile.streak_days, 4);

        game.start_quiz(QuizMode::Daily, &mut rng, at(DAY)).unwrap();
        assert_eq!(game.profile.streak_days, 4);

        // Left open over two midnights before restarting
        game.restart(&mut rng, at(3 * DAY)).unwrap();
        assert_eq!(game.session.state, SessionState::Active);
        assert_eq!(game.profile.streak_days, 0);
        assert!(!game.daily.completed);
    }
}
