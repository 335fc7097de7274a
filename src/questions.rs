use std::num::NonZeroU32;

use spacetimedb::rand::Rng;
use spacetimedb::SpacetimeType;

use crate::config::QUICK_POOL_SIZE;
use crate::error::QuizError;
use crate::evaluators::circuit_output;

// ==================== MODES ====================

#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizMode {
    Quick,
    Memory,
    Daily,
    Speed,
    Logic,
}

impl QuizMode {
    pub fn parse(tag: &str) -> Result<Self, QuizError> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(QuizMode::Quick),
            "memory" => Ok(QuizMode::Memory),
            "daily" => Ok(QuizMode::Daily),
            "speed" => Ok(QuizMode::Speed),
            "logic" => Ok(QuizMode::Logic),
            other => Err(QuizError::UnknownMode(other.to_string())),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            QuizMode::Quick => "quick",
            QuizMode::Memory => "memory",
            QuizMode::Daily => "daily",
            QuizMode::Speed => "speed",
            QuizMode::Logic => "logic",
        }
    }

    /// Title recorded in high-score history
    pub fn title(&self) -> &'static str {
        match self {
            QuizMode::Quick => "Quick Challenge",
            QuizMode::Memory => "Memory Matrix",
            QuizMode::Daily => "Daily Challenge",
            QuizMode::Speed => "Speed Synapse",
            QuizMode::Logic => "Logic Circuit",
        }
    }
}

// ==================== CHALLENGE ITEMS ====================

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct MultipleChoiceItem {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_answer: u8,
    pub time_limit_secs: u32,
    pub image_url: Option<String>,
}

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct MemoryMatrixItem {
    /// Grid side length (4-6)
    pub grid_size: u8,
    /// Cells to memorize (3-8)
    pub num_cells: u8,
    pub time_limit_secs: u32,
    /// How long the pattern stays visible before recall starts
    pub memorize_ms: u32,
    /// 1-based position in the memory sequence
    pub difficulty: u8,
    /// Cells lit during the memorize phase, row-major in [0, grid_size²)
    pub pattern: Vec<u16>,
}

impl MemoryMatrixItem {
    pub fn cell_count(&self) -> u16 {
        self.grid_size as u16 * self.grid_size as u16
    }
}

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct SpeedTargetItem {
    pub num_targets: u8,
    /// Deadline for each target (ms); slower clicks count as misses
    pub time_per_target_ms: u32,
    pub time_limit_secs: u32,
}

#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOperator {
    And,
    Or,
    Not,
}

impl LogicOperator {
    pub const ALL: [LogicOperator; 3] = [LogicOperator::And, LogicOperator::Or, LogicOperator::Not];

    pub fn parse(tag: &str) -> Result<Self, QuizError> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(LogicOperator::And),
            "OR" => Ok(LogicOperator::Or),
            "NOT" => Ok(LogicOperator::Not),
            other => Err(QuizError::InvalidResponse(format!("unknown operator {other}"))),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            LogicOperator::And => "AND",
            LogicOperator::Or => "OR",
            LogicOperator::Not => "NOT",
        }
    }
}

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct LogicCircuitItem {
    pub input_a: bool,
    pub input_b: bool,
    pub operators: Vec<LogicOperator>,
    pub target_output: bool,
    /// XOR puzzle built from the regular gate set (see `circuit_output`)
    pub is_xor: bool,
    pub time_limit_secs: u32,
}

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub enum ChallengeItem {
    MultipleChoice(MultipleChoiceItem),
    MemoryMatrix(MemoryMatrixItem),
    SpeedTarget(SpeedTargetItem),
    LogicCircuit(LogicCircuitItem),
}

impl ChallengeItem {
    pub fn time_limit_secs(&self) -> u32 {
        match self {
            ChallengeItem::MultipleChoice(item) => item.time_limit_secs,
            ChallengeItem::MemoryMatrix(item) => item.time_limit_secs,
            ChallengeItem::SpeedTarget(item) => item.time_limit_secs,
            ChallengeItem::LogicCircuit(item) => item.time_limit_secs,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChallengeItem::MultipleChoice(_) => "multiple_choice",
            ChallengeItem::MemoryMatrix(_) => "memory_matrix",
            ChallengeItem::SpeedTarget(_) => "speed_target",
            ChallengeItem::LogicCircuit(_) => "logic_circuit",
        }
    }

    /// Structural invariants every generated item must satisfy
    pub fn is_well_formed(&self) -> bool {
        if self.time_limit_secs() == 0 {
            return false;
        }
        match self {
            ChallengeItem::MultipleChoice(item) => {
                (2..=4).contains(&item.options.len())
                    && (item.correct_answer as usize) < item.options.len()
            }
            ChallengeItem::MemoryMatrix(item) => {
                let mut seen = item.pattern.clone();
                seen.sort_unstable();
                seen.dedup();
                (4..=6).contains(&item.grid_size)
                    && (3..=8).contains(&item.num_cells)
                    && item.pattern.len() == item.num_cells as usize
                    && seen.len() == item.pattern.len()
                    && item.pattern.iter().all(|&c| c < item.cell_count())
            }
            ChallengeItem::SpeedTarget(item) => item.num_targets > 0 && item.time_per_target_ms > 0,
            ChallengeItem::LogicCircuit(item) => !item.operators.is_empty(),
        }
    }
}

// ==================== RANDOMNESS ====================

/// Injectable source of uniform integers
///
/// Reducers pass `ctx.rng()`; tests pass a seeded source.
pub trait RandomSource {
    /// Uniform value in `0..bound`. `bound` must be positive.
    fn below(&mut self, bound: u32) -> u32;

    fn coin(&mut self) -> bool {
        self.below(2) == 1
    }
}

impl<R: Rng> RandomSource for R {
    fn below(&mut self, bound: u32) -> u32 {
        self.gen_range(0..bound)
    }
}

/// `k` distinct values from `0..n` in random order (partial Fisher-Yates)
fn sample_distinct<R: RandomSource>(n: u32, k: u32, rng: &mut R) -> Vec<u32> {
    let mut indices: Vec<u32> = (0..n).collect();
    for i in 0..k.min(n) {
        let j = i + rng.below(n - i);
        indices.swap(i as usize, j as usize);
    }
    indices.truncate(k.min(n) as usize);
    indices
}

pub fn shuffle<T, R: RandomSource>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.below(i as u32 + 1) as usize;
        items.swap(i, j);
    }
}

// ==================== QUICK POOL ====================

fn mc(prompt: &str, options: [&str; 4], correct_answer: u8, time_limit_secs: u32) -> MultipleChoiceItem {
    MultipleChoiceItem {
        prompt: prompt.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct_answer,
        time_limit_secs,
        image_url: None,
    }
}

/// The canned trivia pool quick mode draws from
pub fn quick_pool() -> Vec<MultipleChoiceItem> {
    let mut pattern = mc(
        "Which shape would complete the pattern?",
        ["Circle", "Triangle", "Square", "Hexagon"],
        2,
        30,
    );
    pattern.image_url = Some("https://via.placeholder.com/300x200?text=Pattern+Puzzle".to_string());

    vec![
        mc("Which number comes next in the sequence: 2, 4, 8, 16, __?", ["24", "28", "32", "64"], 3, 20),
        mc("If a = 1, b = 2, c = 3... what is the value of 'code'?", ["27", "28", "29", "30"], 1, 25),
        mc("What is the missing element? H, He, Li, __, B", ["F", "Be", "N", "O"], 1, 20),
        pattern,
        mc("If 5 + 3 = 28, 9 + 1 = 810, then 7 + 2 = ?", ["59", "514", "95", "149"], 0, 30),
        mc("Which word is the odd one out?", ["Swift", "Python", "Cobra", "Viper"], 1, 15),
        mc("Complete the analogy: Book is to Reading as Fork is to...", ["Kitchen", "Eating", "Cooking", "Utensil"], 1, 20),
    ]
}

// ==================== GENERATORS ====================

/// Memory grids start at 4x4 with 3 cells and grow every few items
pub const MEMORY_TIME_LIMIT_SECS: u32 = 30;
pub const LOGIC_TIME_LIMIT_SECS: u32 = 30;

fn quick_items<R: RandomSource>(count: u32, rng: &mut R) -> Result<Vec<ChallengeItem>, QuizError> {
    let pool = quick_pool();
    if count > QUICK_POOL_SIZE {
        return Err(QuizError::InsufficientPool { requested: count, available: QUICK_POOL_SIZE });
    }
    Ok(sample_distinct(pool.len() as u32, count, rng)
        .into_iter()
        .map(|i| ChallengeItem::MultipleChoice(pool[i as usize].clone()))
        .collect())
}

pub fn memory_item<R: RandomSource>(i: u32, rng: &mut R) -> MemoryMatrixItem {
    let grid_size = (4 + i / 3).min(6) as u8;
    let num_cells = (3 + i / 2).min(8) as u8;
    let cells = grid_size as u32 * grid_size as u32;
    let pattern = sample_distinct(cells, num_cells as u32, rng)
        .into_iter()
        .map(|c| c as u16)
        .collect();

    MemoryMatrixItem {
        grid_size,
        num_cells,
        time_limit_secs: MEMORY_TIME_LIMIT_SECS,
        memorize_ms: 3000 + i * 200,
        difficulty: (i + 1).min(u8::MAX as u32) as u8,
        pattern,
    }
}

fn memory_items<R: RandomSource>(count: u32, rng: &mut R) -> Vec<ChallengeItem> {
    (0..count).map(|i| ChallengeItem::MemoryMatrix(memory_item(i, rng))).collect()
}

pub fn speed_item(i: u32) -> SpeedTargetItem {
    let num_targets = (5 + i / 2).min(10);
    let time_per_target_ms = 1500u32.saturating_sub(100 * i).max(800);
    let budget_ms = num_targets * time_per_target_ms;

    SpeedTargetItem {
        num_targets: num_targets as u8,
        time_per_target_ms,
        time_limit_secs: budget_ms.div_ceil(1000) + 5,
    }
}

fn logic_item<R: RandomSource>(i: u32, rng: &mut R) -> LogicCircuitItem {
    let input_a = rng.coin();
    let input_b = rng.coin();
    let operators = LogicOperator::ALL.to_vec();

    // Every third puzzle asks for XOR with only AND/OR/NOT available
    let is_xor = i % 3 == 2;
    let target_output = if is_xor {
        input_a != input_b
    } else {
        let op = operators[rng.below(operators.len() as u32) as usize];
        circuit_output(op, input_a, input_b, false)
    };

    LogicCircuitItem {
        input_a,
        input_b,
        operators,
        target_output,
        is_xor,
        time_limit_secs: LOGIC_TIME_LIMIT_SECS,
    }
}

/// Build the ordered item list for one session
pub fn generate<R: RandomSource>(
    mode: QuizMode,
    count: NonZeroU32,
    rng: &mut R,
) -> Result<Vec<ChallengeItem>, QuizError> {
    let count = count.get();
    let items = match mode {
        QuizMode::Quick => quick_items(count, rng)?,
        QuizMode::Memory => memory_items(count, rng),
        QuizMode::Daily => {
            // 3 quick + 2 memory at the default size of 5
            let memory_count = count * 2 / 5;
            let mut items = quick_items(count - memory_count, rng)?;
            items.extend(memory_items(memory_count, rng));
            shuffle(&mut items, rng);
            items
        }
        QuizMode::Speed => (0..count).map(|i| ChallengeItem::SpeedTarget(speed_item(i))).collect(),
        QuizMode::Logic => (0..count).map(|i| ChallengeItem::LogicCircuit(logic_item(i, rng))).collect(),
    };

    debug_assert!(items.iter().all(ChallengeItem::is_well_formed));
    log::debug!("[QUIZ] generated mode:{} items:{}", mode.tag(), items.len());
    Ok(items)
}
