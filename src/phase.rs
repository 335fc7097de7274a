use spacetimedb::SpacetimeType;

use crate::config::QuizConfig;
use crate::questions::ChallengeItem;
use crate::session::{Session, SessionState, SubmitOutcome};

/// What the client is doing with the current item
#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizPhase {
    /// Clock running, input accepted
    Answering,
    /// Showing the last result before the next item
    Feedback,
    /// Memory pattern on screen, clock held
    Memorize,
}

/// Host timer to arm after a phase decision; any previous timer is cancelled first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    None,
    /// 1 s interval tick under the clock epoch
    Tick { epoch: u64 },
    /// One-shot end of a feedback or memorize delay
    Transition { epoch: u64, delay_ms: u64 },
}

/// Put the current item on screen: memory grids show their pattern first
pub fn phase_for_item(session: &Session) -> (QuizPhase, Timer) {
    if session.state != SessionState::Active {
        return (QuizPhase::Answering, Timer::None);
    }
    let epoch = session.clock.epoch;
    match session.current_item() {
        Some(ChallengeItem::MemoryMatrix(grid)) => (
            QuizPhase::Memorize,
            Timer::Transition { epoch, delay_ms: u64::from(grid.memorize_ms) },
        ),
        Some(_) => (QuizPhase::Answering, Timer::Tick { epoch }),
        None => (QuizPhase::Answering, Timer::None),
    }
}

/// Feedback delay after a scored item; a completed session arms nothing
pub fn phase_after_answer(session: &Session, config: &QuizConfig, outcome: &SubmitOutcome) -> (QuizPhase, Timer) {
    if outcome.summary.is_some() || session.state != SessionState::Active {
        return (QuizPhase::Answering, Timer::None);
    }
    let answered = session.questions.get(session.current_index.saturating_sub(1) as usize);
    let delay = match answered {
        Some(item) => config.feedback_delay_ms(item, outcome.result.is_correct),
        None => config.wrong_feedback_ms,
    };
    (
        QuizPhase::Feedback,
        Timer::Transition { epoch: session.clock.epoch, delay_ms: u64::from(delay) },
    )
}

/// Re-arm after resume. An interrupted feedback delay is skipped but the next
/// item still gets its memorize phase.
pub fn phase_on_resume(phase: QuizPhase, session: &Session) -> (QuizPhase, Timer) {
    match phase {
        QuizPhase::Answering if session.state == SessionState::Active => {
            (QuizPhase::Answering, Timer::Tick { epoch: session.clock.epoch })
        }
        QuizPhase::Answering => (QuizPhase::Answering, Timer::None),
        QuizPhase::Feedback | QuizPhase::Memorize => phase_for_item(session),
    }
}

/// A transition timer fired; None when it is stale and must be dropped
pub fn phase_on_transition(phase: QuizPhase, session: &Session, epoch: u64) -> Option<(QuizPhase, Timer)> {
    if session.state != SessionState::Active || session.clock.epoch != epoch {
        return None;
    }
    match phase {
        QuizPhase::Feedback => Some(phase_for_item(session)),
        QuizPhase::Memorize => Some((QuizPhase::Answering, Timer::Tick { epoch })),
        QuizPhase::Answering => None,
    }
}
