use spacetimedb::{SpacetimeType, Timestamp};

use crate::error::QuizError;
use crate::questions::RandomSource;

/// Longest display name accepted
pub const MAX_NAME_LEN: usize = 24;
/// Avatars are numbered 1..=AVATAR_COUNT
pub const AVATAR_COUNT: u8 = 4;

#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CognitiveProfile {
    Analyzer,
    Visualizer,
    Memorizer,
    Accelerator,
}

impl CognitiveProfile {
    pub fn parse(tag: &str) -> Result<Self, QuizError> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "analyzer" => Ok(CognitiveProfile::Analyzer),
            "visualizer" => Ok(CognitiveProfile::Visualizer),
            "memorizer" => Ok(CognitiveProfile::Memorizer),
            "accelerator" => Ok(CognitiveProfile::Accelerator),
            other => Err(QuizError::InvalidProfile(format!("unknown cognitive profile '{}'", other))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CognitiveProfile::Analyzer => "Analyzer",
            CognitiveProfile::Visualizer => "Visualizer",
            CognitiveProfile::Memorizer => "Memorizer",
            CognitiveProfile::Accelerator => "Accelerator",
        }
    }
}

#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Adaptive,
}

impl Difficulty {
    pub fn parse(tag: &str) -> Result<Self, QuizError> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            "adaptive" => Ok(Difficulty::Adaptive),
            other => Err(QuizError::InvalidProfile(format!("unknown difficulty '{}'", other))),
        }
    }
}

#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSettings {
    pub sound: bool,
    pub music: bool,
    pub difficulty: Difficulty,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        PlayerSettings { sound: true, music: true, difficulty: Difficulty::Adaptive }
    }
}

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct HighScore {
    /// Mode title, e.g. "Memory Matrix"
    pub mode: String,
    pub score: u32,
    /// Percent of items answered correctly
    pub accuracy: u32,
    pub achieved_at: Timestamp,
}

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub name: String,
    pub avatar: u8,
    pub cognitive_profile: CognitiveProfile,

    /// Starts at 1
    pub level: u32,
    /// Always below XP_PER_LEVEL after a session is applied
    pub xp: u32,

    pub streak_days: u32,
    pub last_daily_challenge: Option<Timestamp>,
    /// When the streak last moved; compared by calendar day
    pub last_streak_update: Option<Timestamp>,

    /// Best sessions, highest score first
    pub high_scores: Vec<HighScore>,
    pub settings: PlayerSettings,
}

impl UserProfile {
    pub fn create(name: &str, avatar: u8, cognitive_profile: CognitiveProfile) -> Result<Self, QuizError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(QuizError::InvalidProfile("name is required".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(QuizError::InvalidProfile(format!("name longer than {} characters", MAX_NAME_LEN)));
        }
        if !(1..=AVATAR_COUNT).contains(&avatar) {
            return Err(QuizError::InvalidProfile(format!("avatar must be 1-{}", AVATAR_COUNT)));
        }

        Ok(UserProfile {
            name: name.to_string(),
            avatar,
            cognitive_profile,
            level: 1,
            xp: 0,
            streak_days: 0,
            last_daily_challenge: None,
            last_streak_update: None,
            high_scores: Vec::new(),
            settings: PlayerSettings::default(),
        })
    }

    /// Wipe progression, keep identity and settings
    pub fn reset_progress(&mut self) {
        self.level = 1;
        self.xp = 0;
        self.streak_days = 0;
        self.last_streak_update = None;
        self.high_scores.clear();
    }

    pub fn best_score(&self) -> u32 {
        self.high_scores.iter().map(|h| h.score).max().unwrap_or(0)
    }

    pub fn average_accuracy(&self) -> u32 {
        if self.high_scores.is_empty() {
            return 0;
        }
        let total: u32 = self.high_scores.iter().map(|h| h.accuracy).sum();
        (total as f64 / self.high_scores.len() as f64).round() as u32
    }
}

const NAME_PREFIXES: [&str; 16] = [
    "Neo", "Cyber", "Synth", "Quantum", "Flux", "Echo", "Pulse", "Vector",
    "Nova", "Apex", "Helix", "Orbit", "Zenith", "Nexus", "Cipher", "Cortex",
];

const NAME_SUFFIXES: [&str; 16] = [
    "Mind", "Wave", "Byte", "Core", "Node", "Link", "Path", "Spark",
    "Grid", "Void", "Sync", "Flux", "Tech", "Naut", "Ware", "Net",
];

/// Prefix + suffix, with a 0-99 tag half of the time
pub fn random_name<R: RandomSource>(rng: &mut R) -> String {
    let prefix = NAME_PREFIXES[rng.below(NAME_PREFIXES.len() as u32) as usize];
    let suffix = NAME_SUFFIXES[rng.below(NAME_SUFFIXES.len() as u32) as usize];
    if rng.coin() {
        format!("{}{}{}", prefix, suffix, rng.below(100))
    } else {
        format!("{}{}", prefix, suffix)
    }
}

// ==================== RANKINGS ====================

#[derive(Debug, Clone, PartialEq)]
pub struct RankingEntry {
    pub rank: u32,
    pub name: &'static str,
    pub level: u32,
    pub cognitive_profile: CognitiveProfile,
    pub score: u32,
    pub accuracy: u32,
}

/// Seeded global rankings; there is no ranking server
pub fn global_rankings() -> Vec<RankingEntry> {
    vec![
        RankingEntry { rank: 1, name: "NeuroMaster", level: 42, cognitive_profile: CognitiveProfile::Accelerator, score: 24_850, accuracy: 98 },
        RankingEntry { rank: 2, name: "SynapseQueen", level: 38, cognitive_profile: CognitiveProfile::Visualizer, score: 22_105, accuracy: 95 },
        RankingEntry { rank: 3, name: "CortexKing", level: 35, cognitive_profile: CognitiveProfile::Analyzer, score: 21_890, accuracy: 92 },
    ]
}

/// The player's own line under the global rankings
#[derive(SpacetimeType, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerStanding {
    pub best_score: u32,
    pub average_accuracy: u32,
    pub challenges: u32,
    pub streak_days: u32,
}

pub fn standing(profile: &UserProfile) -> PlayerStanding {
    PlayerStanding {
        best_score: profile.best_score(),
        average_accuracy: profile.average_accuracy(),
        challenges: profile.high_scores.len() as u32,
        streak_days: profile.streak_days,
    }
}
