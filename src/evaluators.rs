use spacetimedb::SpacetimeType;

use crate::error::QuizError;
use crate::questions::{
    ChallengeItem, LogicCircuitItem, LogicOperator, MemoryMatrixItem, MultipleChoiceItem, SpeedTargetItem,
};

/// Flat points for any correct answer
const BASE_POINTS: f64 = 100.0;
/// Points per second left on the clock
const TIME_BONUS_PER_SEC: u32 = 5;
/// Maximum speed bonus for instant reactions
const SPEED_BONUS_POINTS: f64 = 200.0;
/// Assumed reaction time when no target was hit
const NO_HIT_REACTION_MS: f64 = 1000.0;

/// Result of one speed target
#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOutcome {
    /// Clicked after this many milliseconds
    Hit(u32),
    /// Deadline elapsed
    Miss,
}

/// What the player did with one item
#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeResponse {
    Choice(u8),
    Cells(Vec<u16>),
    Targets(Vec<TargetOutcome>),
    Operator(Option<LogicOperator>),
    /// Synthesized when the clock runs out
    NoAnswer,
}

#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreResult {
    pub points: u32,
    pub is_correct: bool,
}

impl ScoreResult {
    pub fn miss() -> Self {
        ScoreResult { points: 0, is_correct: false }
    }
}

pub trait Evaluate {
    /// Score `response` with `time_remaining` whole seconds left
    fn evaluate(&self, response: &ChallengeResponse, time_remaining: u32) -> Result<ScoreResult, QuizError>;
}

fn mismatch(kind: &str, response: &ChallengeResponse) -> QuizError {
    QuizError::InvalidResponse(format!("{:?} cannot answer a {} item", response, kind))
}

fn timed_points(time_remaining: u32) -> u32 {
    BASE_POINTS as u32 + TIME_BONUS_PER_SEC * time_remaining
}

impl Evaluate for MultipleChoiceItem {
    fn evaluate(&self, response: &ChallengeResponse, time_remaining: u32) -> Result<ScoreResult, QuizError> {
        let selected = match response {
            ChallengeResponse::NoAnswer => return Ok(ScoreResult::miss()),
            ChallengeResponse::Choice(index) => *index,
            other => return Err(mismatch("multiple_choice", other)),
        };
        if selected as usize >= self.options.len() {
            return Err(QuizError::InvalidResponse(format!(
                "option {} out of range (0..{})",
                selected,
                self.options.len()
            )));
        }

        if selected == self.correct_answer {
            Ok(ScoreResult { points: timed_points(time_remaining), is_correct: true })
        } else {
            Ok(ScoreResult::miss())
        }
    }
}

impl MemoryMatrixItem {
    /// Selections in click order, duplicates dropped, capped at pattern length
    pub fn normalize_selection(&self, cells: &[u16]) -> Result<Vec<u16>, QuizError> {
        let mut selection = Vec::with_capacity(self.pattern.len());
        for &cell in cells {
            if cell >= self.cell_count() {
                return Err(QuizError::InvalidResponse(format!(
                    "cell {} outside {}x{} grid",
                    cell, self.grid_size, self.grid_size
                )));
            }
            if selection.len() == self.pattern.len() {
                break;
            }
            if !selection.contains(&cell) {
                selection.push(cell);
            }
        }
        Ok(selection)
    }
}

impl Evaluate for MemoryMatrixItem {
    fn evaluate(&self, response: &ChallengeResponse, time_remaining: u32) -> Result<ScoreResult, QuizError> {
        let cells = match response {
            ChallengeResponse::NoAnswer => return Ok(ScoreResult::miss()),
            ChallengeResponse::Cells(cells) => self.normalize_selection(cells)?,
            other => return Err(mismatch("memory_matrix", other)),
        };

        let correct_cells = cells.iter().filter(|c| self.pattern.contains(c)).count();
        let accuracy = correct_cells as f64 / self.pattern.len() as f64;
        let points = BASE_POINTS * accuracy + (TIME_BONUS_PER_SEC * time_remaining) as f64 * accuracy;

        Ok(ScoreResult {
            points: points.round() as u32,
            is_correct: correct_cells == self.pattern.len(),
        })
    }
}

impl SpeedTargetItem {
    /// Clicks at or past the deadline are misses
    pub fn classify(&self, reaction_ms: u32) -> TargetOutcome {
        if reaction_ms < self.time_per_target_ms {
            TargetOutcome::Hit(reaction_ms)
        } else {
            TargetOutcome::Miss
        }
    }

    fn classify_outcome(&self, outcome: TargetOutcome) -> TargetOutcome {
        match outcome {
            TargetOutcome::Hit(ms) => self.classify(ms),
            TargetOutcome::Miss => TargetOutcome::Miss,
        }
    }
}

impl Evaluate for SpeedTargetItem {
    fn evaluate(&self, response: &ChallengeResponse, _time_remaining: u32) -> Result<ScoreResult, QuizError> {
        let outcomes = match response {
            ChallengeResponse::NoAnswer => return Ok(ScoreResult::miss()),
            ChallengeResponse::Targets(outcomes) => outcomes,
            other => return Err(mismatch("speed_target", other)),
        };
        if outcomes.len() != self.num_targets as usize {
            return Err(QuizError::InvalidResponse(format!(
                "expected {} target outcomes, got {}",
                self.num_targets,
                outcomes.len()
            )));
        }

        let hit_times: Vec<f64> = outcomes
            .iter()
            .filter_map(|outcome| match self.classify_outcome(*outcome) {
                TargetOutcome::Hit(ms) => Some(ms as f64),
                TargetOutcome::Miss => None,
            })
            .collect();

        let accuracy = hit_times.len() as f64 / self.num_targets as f64;
        let avg_reaction_ms = if hit_times.is_empty() {
            NO_HIT_REACTION_MS
        } else {
            hit_times.iter().sum::<f64>() / hit_times.len() as f64
        };
        let speed_factor = (1.0 - avg_reaction_ms / 1000.0).max(0.0);
        let points = BASE_POINTS * accuracy + SPEED_BONUS_POINTS * speed_factor;

        Ok(ScoreResult {
            points: points.round() as u32,
            is_correct: hit_times.len() == self.num_targets as usize,
        })
    }
}

/// Output of a one-gate circuit.
///
/// NOT only looks at the first input. XOR puzzles keep the legacy scoring:
/// OR behaves as XOR and every other gate yields false, so previously
/// recorded scores stay comparable.
pub fn circuit_output(op: LogicOperator, a: bool, b: bool, is_xor: bool) -> bool {
    if is_xor {
        return op == LogicOperator::Or && a != b;
    }
    match op {
        LogicOperator::And => a && b,
        LogicOperator::Or => a || b,
        LogicOperator::Not => !a,
    }
}

impl Evaluate for LogicCircuitItem {
    fn evaluate(&self, response: &ChallengeResponse, time_remaining: u32) -> Result<ScoreResult, QuizError> {
        let op = match response {
            ChallengeResponse::NoAnswer => return Ok(ScoreResult::miss()),
            ChallengeResponse::Operator(Some(op)) => *op,
            ChallengeResponse::Operator(None) => {
                return Err(QuizError::InvalidResponse("no operator selected".to_string()))
            }
            other => return Err(mismatch("logic_circuit", other)),
        };
        if !self.operators.contains(&op) {
            return Err(QuizError::InvalidResponse(format!("operator {} not offered", op.symbol())));
        }

        if circuit_output(op, self.input_a, self.input_b, self.is_xor) == self.target_output {
            Ok(ScoreResult { points: timed_points(time_remaining), is_correct: true })
        } else {
            Ok(ScoreResult::miss())
        }
    }
}

impl Evaluate for ChallengeItem {
    fn evaluate(&self, response: &ChallengeResponse, time_remaining: u32) -> Result<ScoreResult, QuizError> {
        match self {
            ChallengeItem::MultipleChoice(item) => item.evaluate(response, time_remaining),
            ChallengeItem::MemoryMatrix(item) => item.evaluate(response, time_remaining),
            ChallengeItem::SpeedTarget(item) => item.evaluate(response, time_remaining),
            ChallengeItem::LogicCircuit(item) => item.evaluate(response, time_remaining),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> MultipleChoiceItem {
        MultipleChoiceItem {
            prompt: "2 + 2?".to_string(),
            options: vec!["3".into(), "4".into(), "5".into()],
            correct_answer: 1,
            time_limit_secs: 20,
            image_url: None,
        }
    }

    fn grid(pattern: Vec<u16>) -> MemoryMatrixItem {
        MemoryMatrixItem {
            grid_size: 4,
            num_cells: pattern.len() as u8,
            time_limit_secs: 30,
            memorize_ms: 3000,
            difficulty: 1,
            pattern,
        }
    }

    fn targets(n: u8) -> SpeedTargetItem {
        SpeedTargetItem { num_targets: n, time_per_target_ms: 1500, time_limit_secs: 20 }
    }

    fn circuit(a: bool, b: bool, target: bool, is_xor: bool) -> LogicCircuitItem {
        LogicCircuitItem {
            input_a: a,
            input_b: b,
            operators: LogicOperator::ALL.to_vec(),
            target_output: target,
            is_xor,
            time_limit_secs: 30,
        }
    }

    #[test]
    fn test_multiple_choice_scoring() {
        let q = question();
        assert_eq!(
            q.evaluate(&ChallengeResponse::Choice(1), 10).unwrap(),
            ScoreResult { points: 150, is_correct: true }
        );
        assert_eq!(q.evaluate(&ChallengeResponse::Choice(0), 10).unwrap(), ScoreResult::miss());
        assert_eq!(q.evaluate(&ChallengeResponse::NoAnswer, 0).unwrap(), ScoreResult::miss());
        assert!(matches!(
            q.evaluate(&ChallengeResponse::Choice(3), 10),
            Err(QuizError::InvalidResponse(_))
        ));
        assert!(q.evaluate(&ChallengeResponse::Cells(vec![1]), 10).is_err());
    }

    #[test]
    fn test_memory_perfect_recall() {
        let item = grid(vec![2, 5, 9]);
        let result = item.evaluate(&ChallengeResponse::Cells(vec![2, 5, 9]), 8).unwrap();
        assert_eq!(result, ScoreResult { points: 140, is_correct: true });
    }

    #[test]
    fn test_memory_partial_recall() {
        let item = grid(vec![2, 5, 9]);
        // 2 of 3: round(66.67 + 26.67) = 93
        let result = item.evaluate(&ChallengeResponse::Cells(vec![2, 0, 9]), 8).unwrap();
        assert_eq!(result, ScoreResult { points: 93, is_correct: false });
    }

    #[test]
    fn test_memory_selection_ignores_duplicates_and_extras() {
        let item = grid(vec![2, 5, 9]);
        assert_eq!(item.normalize_selection(&[2, 2, 5, 9, 1]).unwrap(), vec![2, 5, 9]);
        assert!(item.normalize_selection(&[16]).is_err());
    }

    #[test]
    fn test_speed_scoring() {
        let item = targets(3);
        let all_hits = ChallengeResponse::Targets(vec![
            TargetOutcome::Hit(200),
            TargetOutcome::Hit(300),
            TargetOutcome::Hit(400),
        ]);
        assert_eq!(item.evaluate(&all_hits, 0).unwrap(), ScoreResult { points: 240, is_correct: true });

        let all_misses = ChallengeResponse::Targets(vec![TargetOutcome::Miss; 3]);
        assert_eq!(item.evaluate(&all_misses, 0).unwrap(), ScoreResult::miss());

        // Late click is a miss: 1 hit at 500ms -> round(33.3 + 100)
        let late = ChallengeResponse::Targets(vec![
            TargetOutcome::Hit(500),
            TargetOutcome::Hit(1500),
            TargetOutcome::Miss,
        ]);
        assert_eq!(item.evaluate(&late, 0).unwrap(), ScoreResult { points: 133, is_correct: false });

        let short = ChallengeResponse::Targets(vec![TargetOutcome::Miss]);
        assert!(item.evaluate(&short, 0).is_err());
    }

    #[test]
    fn test_circuit_gates() {
        assert!(circuit_output(LogicOperator::And, true, true, false));
        assert!(!circuit_output(LogicOperator::And, true, false, false));
        assert!(circuit_output(LogicOperator::Or, false, true, false));
        assert!(circuit_output(LogicOperator::Not, false, true, false));
        assert!(!circuit_output(LogicOperator::Not, true, false, false));

        // XOR puzzles: only OR can ever produce true
        assert!(circuit_output(LogicOperator::Or, true, false, true));
        assert!(!circuit_output(LogicOperator::Or, true, true, true));
        assert!(!circuit_output(LogicOperator::And, true, false, true));
        assert!(!circuit_output(LogicOperator::Not, false, true, true));
    }

    #[test]
    fn test_circuit_scoring() {
        let item = circuit(true, false, true, false);
        assert_eq!(
            item.evaluate(&ChallengeResponse::Operator(Some(LogicOperator::Or)), 12).unwrap(),
            ScoreResult { points: 160, is_correct: true }
        );
        assert_eq!(
            item.evaluate(&ChallengeResponse::Operator(Some(LogicOperator::And)), 12).unwrap(),
            ScoreResult::miss()
        );
        assert!(matches!(
            item.evaluate(&ChallengeResponse::Operator(None), 12),
            Err(QuizError::InvalidResponse(_))
        ));

        let mut limited = circuit(true, true, true, false);
        limited.operators = vec![LogicOperator::And];
        assert!(limited.evaluate(&ChallengeResponse::Operator(Some(LogicOperator::Or)), 5).is_err());
    }
}
