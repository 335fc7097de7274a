use serde_json::{json, Value};

use crate::questions::QuizMode;

/// Notifications for audio/haptics and other observers.
///
/// The engine only records them; nothing waits on delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started { mode: QuizMode, items: u32, is_daily: bool },
    Correct { index: u32, points: u32 },
    Wrong { index: u32, points: u32 },
    Tick { index: u32, remaining: u32 },
    TimeUp { index: u32 },
    Transition { from: u32, to: u32 },
    Paused { index: u32, remaining: u32 },
    Resumed { index: u32, remaining: u32 },
    Completed { score: u32, correct: u32, total: u32 },
    Quit { index: u32 },
    LevelUp { level: u32 },
    StreakExtended { days: u32 },
}

pub trait EventSink {
    fn emit(&mut self, event: EngineEvent);
}

impl EventSink for Vec<EngineEvent> {
    fn emit(&mut self, event: EngineEvent) {
        self.push(event);
    }
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::Started { .. } => "started",
            EngineEvent::Correct { .. } => "correct",
            EngineEvent::Wrong { .. } => "wrong",
            EngineEvent::Tick { .. } => "tick",
            EngineEvent::TimeUp { .. } => "time_up",
            EngineEvent::Transition { .. } => "transition",
            EngineEvent::Paused { .. } => "paused",
            EngineEvent::Resumed { .. } => "resumed",
            EngineEvent::Completed { .. } => "completed",
            EngineEvent::Quit { .. } => "quit",
            EngineEvent::LevelUp { .. } => "level_up",
            EngineEvent::StreakExtended { .. } => "streak_extended",
        }
    }

    /// JSON body stored alongside the kind, camelCase for the web client
    pub fn payload(&self) -> Value {
        match self {
            EngineEvent::Started { mode, items, is_daily } => {
                json!({"mode": mode.tag(), "items": items, "isDaily": is_daily})
            }
            EngineEvent::Correct { index, points } | EngineEvent::Wrong { index, points } => {
                json!({"index": index, "points": points})
            }
            EngineEvent::Tick { index, remaining }
            | EngineEvent::Paused { index, remaining }
            | EngineEvent::Resumed { index, remaining } => json!({"index": index, "remaining": remaining}),
            EngineEvent::TimeUp { index } | EngineEvent::Quit { index } => json!({"index": index}),
            EngineEvent::Transition { from, to } => json!({"from": from, "to": to}),
            EngineEvent::Completed { score, correct, total } => {
                json!({"score": score, "correct": correct, "total": total})
            }
            EngineEvent::LevelUp { level } => json!({"level": level}),
            EngineEvent::StreakExtended { days } => json!({"days": days}),
        }
    }
}
