/// Everything the quiz engine can reject.
///
/// Engine operations never mutate state when they return one of these;
/// reducers turn them into the host's `Result<(), String>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuizError {
    #[error("requested {requested} distinct questions but the pool only holds {available}")]
    InsufficientPool { requested: u32, available: u32 },

    #[error("cannot {action} while session is {state}")]
    InvalidStateTransition { action: &'static str, state: &'static str },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("unknown quiz mode: {0}")]
    UnknownMode(String),
}

impl QuizError {
    pub(crate) fn transition(action: &'static str, state: &'static str) -> Self {
        QuizError::InvalidStateTransition { action, state }
    }
}
