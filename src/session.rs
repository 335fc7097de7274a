use std::num::NonZeroU32;

use spacetimedb::{SpacetimeType, Timestamp};

use crate::clock::{ClockTick, SessionClock};
use crate::error::QuizError;
use crate::evaluators::{ChallengeResponse, Evaluate, ScoreResult, TargetOutcome};
use crate::events::{EngineEvent, EventSink};
use crate::questions::{generate, ChallengeItem, QuizMode, RandomSource};

#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Active,
    Paused,
    Completed,
    Quit,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::NotStarted => "not started",
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
            SessionState::Quit => "quit",
        }
    }
}

/// One play-through of a mode
#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct Session {
    pub mode: QuizMode,
    pub state: SessionState,
    pub questions: Vec<ChallengeItem>,

    /// Item being answered; equals `questions.len()` once completed
    pub current_index: u32,
    pub score: u32,
    pub correct_answers: u32,
    pub started_at: Timestamp,
    pub is_daily_challenge: bool,
    pub clock: SessionClock,

    /// Memory cells picked so far for the current item
    pub selected_cells: Vec<u16>,
    /// Speed targets resolved so far for the current item
    pub target_outcomes: Vec<TargetOutcome>,

    /// Score of the last answered item, for feedback
    pub last_result: Option<ScoreResult>,
}

/// Final tally handed to the progression ledger
#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub mode: QuizMode,
    pub score: u32,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub is_daily_challenge: bool,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl SessionSummary {
    /// Percentage of items answered correctly, rounded
    pub fn accuracy(&self) -> u32 {
        if self.total_questions == 0 {
            return 0;
        }
        (self.correct_answers as f64 * 100.0 / self.total_questions as f64).round() as u32
    }

    pub fn duration_secs(&self) -> u64 {
        self.finished_at
            .duration_since(self.started_at)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub result: ScoreResult,
    /// Index of the item now on screen, None once completed
    pub next_index: Option<u32>,
    pub summary: Option<SessionSummary>,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            mode: QuizMode::Quick,
            state: SessionState::NotStarted,
            questions: Vec::new(),
            current_index: 0,
            score: 0,
            correct_answers: 0,
            started_at: Timestamp::from_micros_since_unix_epoch(0),
            is_daily_challenge: false,
            clock: SessionClock::default(),
            selected_cells: Vec::new(),
            target_outcomes: Vec::new(),
            last_result: None,
        }
    }
}

impl Session {
    /// Generate items for `mode` and enter `Active(0)`
    pub fn start<R: RandomSource>(
        &mut self,
        mode: QuizMode,
        count: NonZeroU32,
        rng: &mut R,
        now: Timestamp,
        events: &mut impl EventSink,
    ) -> Result<(), QuizError> {
        let questions = generate(mode, count, rng)?;
        self.start_with(mode, questions, now, events);
        Ok(())
    }

    /// Enter `Active(0)` with a prepared item list
    pub fn start_with(
        &mut self,
        mode: QuizMode,
        questions: Vec<ChallengeItem>,
        now: Timestamp,
        events: &mut impl EventSink,
    ) {
        // Keep the epoch moving so timers from the replaced session go stale
        let mut clock = self.clock;
        if let Some(first) = questions.first() {
            clock.start(first.time_limit_secs());
        }

        *self = Session {
            mode,
            state: SessionState::Active,
            questions,
            started_at: now,
            is_daily_challenge: mode == QuizMode::Daily,
            clock,
            ..Session::default()
        };

        events.emit(EngineEvent::Started {
            mode,
            items: self.total_questions(),
            is_daily: self.is_daily_challenge,
        });
        log::info!(
            "[QUIZ] started mode:{} items:{} daily:{}",
            mode.tag(),
            self.total_questions(),
            self.is_daily_challenge
        );
    }

    /// Start over with the same mode and length, discarding progress
    pub fn restart<R: RandomSource>(
        &mut self,
        rng: &mut R,
        now: Timestamp,
        events: &mut impl EventSink,
    ) -> Result<(), QuizError> {
        match self.state {
            SessionState::Active | SessionState::Paused | SessionState::Completed => {}
            other => return Err(QuizError::transition("restart", other.name())),
        }
        let count = NonZeroU32::new(self.total_questions())
            .ok_or_else(|| QuizError::transition("restart", "empty"))?;
        self.start(self.mode, count, rng, now, events)
    }

    pub fn total_questions(&self) -> u32 {
        self.questions.len() as u32
    }

    pub fn current_item(&self) -> Option<&ChallengeItem> {
        match self.state {
            SessionState::Active | SessionState::Paused => self.questions.get(self.current_index as usize),
            _ => None,
        }
    }

    pub fn time_remaining(&self) -> u32 {
        self.clock.time_remaining
    }

    fn require_active(&self, action: &'static str) -> Result<&ChallengeItem, QuizError> {
        if self.state != SessionState::Active {
            return Err(QuizError::transition(action, self.state.name()));
        }
        self.questions
            .get(self.current_index as usize)
            .ok_or_else(|| QuizError::transition(action, "out of items"))
    }

    /// Score the current item and move on
    pub fn submit_response(
        &mut self,
        response: ChallengeResponse,
        now: Timestamp,
        events: &mut impl EventSink,
    ) -> Result<SubmitOutcome, QuizError> {
        let item = self.require_active("submit a response")?;
        let result = item.evaluate(&response, self.clock.time_remaining)?;
        Ok(self.record_result(result, now, events))
    }

    fn record_result(&mut self, result: ScoreResult, now: Timestamp, events: &mut impl EventSink) -> SubmitOutcome {
        let index = self.current_index;
        self.score = self.score.saturating_add(result.points);
        if result.is_correct {
            self.correct_answers += 1;
            events.emit(EngineEvent::Correct { index, points: result.points });
        } else {
            events.emit(EngineEvent::Wrong { index, points: result.points });
        }
        self.last_result = Some(result);
        self.selected_cells.clear();
        self.target_outcomes.clear();

        let (next_index, summary) = self.advance(now, events);
        SubmitOutcome { result, next_index, summary }
    }

    fn advance(&mut self, now: Timestamp, events: &mut impl EventSink) -> (Option<u32>, Option<SessionSummary>) {
        let from = self.current_index;
        self.current_index += 1;

        if let Some(next) = self.questions.get(self.current_index as usize) {
            self.clock.start(next.time_limit_secs());
            events.emit(EngineEvent::Transition { from, to: self.current_index });
            return (Some(self.current_index), None);
        }

        self.clock.stop();
        self.state = SessionState::Completed;
        events.emit(EngineEvent::Completed {
            score: self.score,
            correct: self.correct_answers,
            total: self.total_questions(),
        });
        log::info!(
            "[QUIZ] completed mode:{} score:{} correct:{}/{}",
            self.mode.tag(),
            self.score,
            self.correct_answers,
            self.total_questions()
        );

        (None, Some(self.summary(now)))
    }

    pub fn summary(&self, now: Timestamp) -> SessionSummary {
        SessionSummary {
            mode: self.mode,
            score: self.score,
            correct_answers: self.correct_answers,
            total_questions: self.total_questions(),
            is_daily_challenge: self.is_daily_challenge,
            started_at: self.started_at,
            finished_at: now,
        }
    }

    /// Add one memory cell; the item is scored once the pattern length is reached
    pub fn select_cell(
        &mut self,
        cell: u16,
        now: Timestamp,
        events: &mut impl EventSink,
    ) -> Result<Option<SubmitOutcome>, QuizError> {
        let ChallengeItem::MemoryMatrix(grid) = self.require_active("select a cell")? else {
            return Err(QuizError::InvalidResponse("current item is not a memory grid".to_string()));
        };
        if cell >= grid.cell_count() {
            return Err(QuizError::InvalidResponse(format!("cell {} outside grid", cell)));
        }
        if self.selected_cells.contains(&cell) {
            return Ok(None);
        }

        let pattern_len = grid.pattern.len();
        self.selected_cells.push(cell);
        if self.selected_cells.len() < pattern_len {
            return Ok(None);
        }
        let cells = self.selected_cells.clone();
        self.submit_response(ChallengeResponse::Cells(cells), now, events).map(Some)
    }

    /// Resolve the active speed target; `None` means its deadline passed
    pub fn record_target(
        &mut self,
        reaction_ms: Option<u32>,
        now: Timestamp,
        events: &mut impl EventSink,
    ) -> Result<Option<SubmitOutcome>, QuizError> {
        let ChallengeItem::SpeedTarget(speed) = self.require_active("record a target")? else {
            return Err(QuizError::InvalidResponse("current item is not a speed round".to_string()));
        };
        let outcome = match reaction_ms {
            Some(ms) => speed.classify(ms),
            None => TargetOutcome::Miss,
        };

        let num_targets = speed.num_targets as usize;
        self.target_outcomes.push(outcome);
        if self.target_outcomes.len() < num_targets {
            return Ok(None);
        }
        let outcomes = self.target_outcomes.clone();
        self.submit_response(ChallengeResponse::Targets(outcomes), now, events).map(Some)
    }

    /// Advance the clock by `delta_secs`; expiry answers the item with nothing
    pub fn tick(&mut self, delta_secs: u32, now: Timestamp, events: &mut impl EventSink) -> Option<SubmitOutcome> {
        self.tick_epoch(self.clock.epoch, delta_secs, now, events)
    }

    /// `tick` from a host timer armed under `epoch`; stale timers do nothing
    pub fn tick_epoch(
        &mut self,
        epoch: u64,
        delta_secs: u32,
        now: Timestamp,
        events: &mut impl EventSink,
    ) -> Option<SubmitOutcome> {
        if self.state != SessionState::Active {
            return None;
        }
        let index = self.current_index;
        match self.clock.tick_epoch(epoch, delta_secs) {
            ClockTick::Idle => None,
            ClockTick::Stale => {
                log::debug!("[QUIZ] ignored stale tick epoch:{} current:{}", epoch, self.clock.epoch);
                None
            }
            ClockTick::Running(remaining) => {
                events.emit(EngineEvent::Tick { index, remaining });
                None
            }
            ClockTick::Expired => {
                events.emit(EngineEvent::TimeUp { index });
                let result = self
                    .questions
                    .get(index as usize)
                    .and_then(|item| item.evaluate(&ChallengeResponse::NoAnswer, 0).ok())
                    .unwrap_or_else(ScoreResult::miss);
                Some(self.record_result(result, now, events))
            }
        }
    }

    pub fn pause(&mut self, events: &mut impl EventSink) -> Result<(), QuizError> {
        if self.state != SessionState::Active {
            return Err(QuizError::transition("pause", self.state.name()));
        }
        self.clock.pause();
        self.state = SessionState::Paused;
        events.emit(EngineEvent::Paused { index: self.current_index, remaining: self.clock.time_remaining });
        Ok(())
    }

    pub fn resume(&mut self, events: &mut impl EventSink) -> Result<(), QuizError> {
        if self.state != SessionState::Paused {
            return Err(QuizError::transition("resume", self.state.name()));
        }
        self.clock.resume();
        self.state = SessionState::Active;
        events.emit(EngineEvent::Resumed { index: self.current_index, remaining: self.clock.time_remaining });
        Ok(())
    }

    /// Abandon the session; nothing reaches the ledger
    pub fn quit(&mut self, events: &mut impl EventSink) -> Result<(), QuizError> {
        match self.state {
            SessionState::Active | SessionState::Paused => {}
            other => return Err(QuizError::transition("quit", other.name())),
        }
        self.clock.stop();
        self.state = SessionState::Quit;
        self.selected_cells.clear();
        self.target_outcomes.clear();
        events.emit(EngineEvent::Quit { index: self.current_index });
        log::info!("[QUIZ] quit mode:{} at item:{} score:{}", self.mode.tag(), self.current_index, self.score);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::tests::SeededRng;
    use crate::questions::{LogicCircuitItem, LogicOperator, MemoryMatrixItem, MultipleChoiceItem, SpeedTargetItem};

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_micros_since_unix_epoch(secs * 1_000_000)
    }

    fn mc(correct: u8, limit: u32) -> ChallengeItem {
        ChallengeItem::MultipleChoice(MultipleChoiceItem {
            prompt: "pick".to_string(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer: correct,
            time_limit_secs: limit,
            image_url: None,
        })
    }

    fn memory(pattern: Vec<u16>) -> ChallengeItem {
        ChallengeItem::MemoryMatrix(MemoryMatrixItem {
            grid_size: 4,
            num_cells: pattern.len() as u8,
            time_limit_secs: 30,
            memorize_ms: 3000,
            difficulty: 1,
            pattern,
        })
    }

    fn active(items: Vec<ChallengeItem>) -> (Session, Vec<EngineEvent>) {
        let mut events = Vec::new();
        let mut session = Session::default();
        session.start_with(QuizMode::Quick, items, at(0), &mut events);
        (session, events)
    }

    #[test]
    fn test_index_advances_by_one_until_completed() {
        let (mut session, mut events) = active(vec![mc(0, 10), mc(1, 10), mc(2, 10)]);
        assert_eq!(session.state, SessionState::Active);

        for expected in 1..=3u32 {
            let outcome = session.submit_response(ChallengeResponse::Choice(0), at(5), &mut events).unwrap();
            assert_eq!(session.current_index, expected);
            if expected < 3 {
                assert_eq!(outcome.next_index, Some(expected));
                assert!(outcome.summary.is_none());
                assert_eq!(session.state, SessionState::Active);
            } else {
                assert_eq!(session.state, SessionState::Completed);
                let summary = outcome.summary.unwrap();
                assert_eq!(summary.total_questions, 3);
                assert_eq!(summary.correct_answers, 1);
                assert_eq!(summary.score, 150);
                assert_eq!(summary.accuracy(), 33);
            }
        }

        assert!(matches!(
            session.submit_response(ChallengeResponse::Choice(0), at(6), &mut events),
            Err(QuizError::InvalidStateTransition { .. })
        ));
        assert!(events.iter().any(|e| matches!(e, EngineEvent::Completed { score: 150, .. })));
    }

    #[test]
    fn test_invalid_response_leaves_session_unchanged() {
        let (mut session, mut events) = active(vec![mc(0, 10)]);
        let before = session.clone();
        assert!(session.submit_response(ChallengeResponse::Choice(7), at(1), &mut events).is_err());
        assert_eq!(session, before);
    }

    #[test]
    fn test_circuit_without_operator_is_rejected() {
        let circuit = ChallengeItem::LogicCircuit(LogicCircuitItem {
            input_a: true,
            input_b: true,
            operators: LogicOperator::ALL.to_vec(),
            target_output: true,
            is_xor: false,
            time_limit_secs: 30,
        });
        let (mut session, mut events) = active(vec![circuit]);
        let before = session.clone();
        assert!(matches!(
            session.submit_response(ChallengeResponse::Operator(None), at(1), &mut events),
            Err(QuizError::InvalidResponse(_))
        ));
        assert_eq!(session, before);

        let outcome = session
            .submit_response(ChallengeResponse::Operator(Some(LogicOperator::And)), at(1), &mut events)
            .unwrap();
        assert_eq!(outcome.result.points, 250);
    }

    #[test]
    fn test_pause_resume_preserves_time() {
        let (mut session, mut events) = active(vec![mc(0, 20)]);
        session.tick(1, at(1), &mut events);
        session.tick(1, at(2), &mut events);
        assert_eq!(session.time_remaining(), 18);

        session.pause(&mut events).unwrap();
        assert!(matches!(session.pause(&mut events), Err(QuizError::InvalidStateTransition { .. })));
        for s in 0..4 {
            assert!(session.tick(1, at(3 + s), &mut events).is_none());
        }
        assert_eq!(session.time_remaining(), 18);
        assert!(session.submit_response(ChallengeResponse::Choice(0), at(7), &mut events).is_err());

        session.resume(&mut events).unwrap();
        assert_eq!(session.time_remaining(), 18);
        assert!(session.resume(&mut events).is_err());
    }

    #[test]
    fn test_expiry_scores_zero_and_advances_once() {
        let (mut session, mut events) = active(vec![mc(0, 3), mc(0, 10)]);
        assert!(session.tick(1, at(1), &mut events).is_none());
        assert!(session.tick(1, at(2), &mut events).is_none());
        let outcome = session.tick(1, at(3), &mut events).unwrap();

        assert_eq!(outcome.result, ScoreResult::miss());
        assert_eq!(session.current_index, 1);
        assert_eq!(session.time_remaining(), 10);
        let time_ups = events.iter().filter(|e| matches!(e, EngineEvent::TimeUp { .. })).count();
        assert_eq!(time_ups, 1);
    }

    #[test]
    fn test_stale_epoch_tick_is_ignored() {
        let (mut session, mut events) = active(vec![mc(0, 10), mc(0, 10)]);
        let first_epoch = session.clock.epoch;
        session.submit_response(ChallengeResponse::Choice(0), at(2), &mut events).unwrap();

        assert!(session.tick_epoch(first_epoch, 10, at(3), &mut events).is_none());
        assert_eq!(session.current_index, 1);
        assert_eq!(session.time_remaining(), 10);
    }

    #[test]
    fn test_memory_item_completes_on_pattern_length() {
        let (mut session, mut events) = active(vec![memory(vec![2, 5, 9]), mc(0, 10)]);
        session.clock.time_remaining = 8;

        assert!(session.select_cell(2, at(1), &mut events).unwrap().is_none());
        assert!(session.select_cell(2, at(1), &mut events).unwrap().is_none());
        assert!(session.select_cell(5, at(1), &mut events).unwrap().is_none());
        assert!(session.select_cell(99, at(1), &mut events).is_err());
        assert_eq!(session.selected_cells, vec![2, 5]);

        let outcome = session.select_cell(9, at(2), &mut events).unwrap().unwrap();
        assert_eq!(outcome.result, ScoreResult { points: 140, is_correct: true });
        assert_eq!(session.current_index, 1);
        assert!(session.selected_cells.is_empty());
    }

    #[test]
    fn test_speed_round_collects_targets() {
        let speed = ChallengeItem::SpeedTarget(SpeedTargetItem {
            num_targets: 3,
            time_per_target_ms: 1500,
            time_limit_secs: 10,
        });
        let (mut session, mut events) = active(vec![speed]);
        assert!(session.record_target(Some(200), at(1), &mut events).unwrap().is_none());
        assert!(session.record_target(Some(300), at(1), &mut events).unwrap().is_none());
        let outcome = session.record_target(Some(400), at(2), &mut events).unwrap().unwrap();
        assert_eq!(outcome.result.points, 240);
        assert_eq!(session.state, SessionState::Completed);
    }

    #[test]
    fn test_quit_and_restart() {
        let mut rng = SeededRng::new(9);
        let mut events = Vec::new();
        let mut session = Session::default();
        assert!(session.restart(&mut rng, at(0), &mut events).is_err());

        session.start(QuizMode::Daily, NonZeroU32::new(5).unwrap(), &mut rng, at(0), &mut events).unwrap();
        assert!(session.is_daily_challenge);
        let epoch = session.clock.epoch;
        session.restart(&mut rng, at(10), &mut events).unwrap();
        assert!(session.is_daily_challenge);
        assert_eq!(session.total_questions(), 5);
        assert_eq!(session.started_at, at(10));
        assert!(session.clock.epoch > epoch);

        session.quit(&mut events).unwrap();
        assert_eq!(session.state, SessionState::Quit);
        assert!(!session.clock.running);
        assert!(session.quit(&mut events).is_err());
        assert!(session.current_item().is_none());
    }

    #[test]
    fn test_failed_generation_keeps_previous_session() {
        let mut rng = SeededRng::new(4);
        let (mut session, mut events) = active(vec![mc(0, 10)]);
        let before = session.clone();
        let err = session.start(QuizMode::Quick, NonZeroU32::new(9).unwrap(), &mut rng, at(1), &mut events);
        assert!(matches!(err, Err(QuizError::InsufficientPool { .. })));
        assert_eq!(session, before);
    }
}
