use std::time::Duration;

use spacetimedb::{reducer, table, Identity, ReducerContext, ScheduleAt, Table, Timestamp};

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluators;
pub mod events;
pub mod phase;
pub mod profile;
pub mod progression;
pub mod questions;
pub mod session;

use config::{QuizConfig, CLEANUP_INTERVAL_SECS, EVENT_RETENTION_SECS, TICK_INTERVAL_SECS};
use engine::QuizEngine;
use evaluators::ChallengeResponse;
use profile::{random_name, CognitiveProfile, Difficulty, PlayerStanding, UserProfile};
use phase::{QuizPhase, Timer};
use progression::{DailyChallengeStatus, ProgressionReport};
use questions::{LogicOperator, QuizMode};
use session::{Session, SessionState, SubmitOutcome};

pub use error::QuizError;

// ==================== TABLES ====================

/// One row per player; progression lives here
#[table(name = player_profile, public)]
#[derive(Clone)]
pub struct PlayerProfile {
    #[primary_key]
    pub identity: Identity,

    pub profile: UserProfile,
    pub daily: DailyChallengeStatus,

    /// Denormalized line for the rankings screen
    pub standing: PlayerStanding,

    pub created_at: Timestamp,
}

/// The player's current (or last) session
#[table(name = active_quiz, public)]
#[derive(Clone)]
pub struct ActiveQuiz {
    #[primary_key]
    pub identity: Identity,

    pub session: Session,
    pub phase: QuizPhase,

    /// Set once the session completes, for the results screen
    pub last_report: Option<ProgressionReport>,

    pub updated_at: Timestamp,
}

/// Discrete engine notifications for audio/haptics
/// Pruned by the cleanup schedule after EVENT_RETENTION_SECS
#[table(name = engine_event, public)]
pub struct EngineEventRow {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub identity: Identity,

    /// snake_case event name, e.g. "time_up"
    pub kind: String,

    /// JSON body
    pub payload: String,

    pub created_at: Timestamp,
}

/// Fixed global rankings, seeded at init
#[table(name = leaderboard_entry, public)]
pub struct LeaderboardEntry {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    /// 1-based
    pub position: u32,
    pub player_name: String,
    pub level: u32,
    pub cognitive_profile: CognitiveProfile,
    pub score: u32,
    pub accuracy: u32,
}

/// Singleton settings row (id 0)
#[table(name = quiz_config)]
pub struct QuizConfigRow {
    #[primary_key]
    pub id: u32,
    pub config: QuizConfig,
}

/// Once-a-second clock for one player's session
#[table(name = quiz_tick_schedule, scheduled(quiz_tick))]
pub struct QuizTickSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub identity: Identity,

    /// Clock epoch this timer was armed under
    pub epoch: u64,

    pub scheduled_at: ScheduleAt,
}

/// One-shot end of a feedback or memorize delay
#[table(name = quiz_transition_schedule, scheduled(quiz_transition))]
pub struct QuizTransitionSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub identity: Identity,

    pub epoch: u64,

    pub scheduled_at: ScheduleAt,
}

/// Schedule table for cleanup tasks
#[table(name = cleanup_schedule, scheduled(cleanup_stale_events))]
pub struct CleanupSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    pub scheduled_at: ScheduleAt,
}

// ==================== HELPER FUNCTIONS ====================

fn load_config(ctx: &ReducerContext) -> QuizConfig {
    ctx.db
        .quiz_config()
        .id()
        .find(&0)
        .map(|row| row.config)
        .unwrap_or_default()
}

fn get_profile(ctx: &ReducerContext) -> Result<PlayerProfile, String> {
    ctx.db
        .player_profile()
        .identity()
        .find(&ctx.sender)
        .ok_or("No profile found".to_string())
}

/// Engine plus the host-only phase, loaded from rows for one reducer call
struct PlayerGame {
    engine: QuizEngine,
    phase: QuizPhase,
    created_at: Timestamp,
}

fn load_game(ctx: &ReducerContext, identity: Identity) -> Result<PlayerGame, String> {
    let row = ctx.db
        .player_profile()
        .identity()
        .find(&identity)
        .ok_or("No profile found".to_string())?;
    let quiz = ctx.db.active_quiz().identity().find(&identity);

    let (session, phase, last_report) = match quiz {
        Some(q) => (q.session, q.phase, q.last_report),
        None => (Session::default(), QuizPhase::Answering, None),
    };
    let mut engine = QuizEngine::with_session(session, row.profile, row.daily, load_config(ctx));
    engine.last_report = last_report;

    Ok(PlayerGame { engine, phase, created_at: row.created_at })
}

fn save_game(ctx: &ReducerContext, identity: Identity, game: &mut PlayerGame) {
    let engine = &mut game.engine;

    ctx.db.player_profile().identity().update(PlayerProfile {
        identity,
        standing: profile::standing(&engine.profile),
        profile: engine.profile.clone(),
        daily: engine.daily,
        created_at: game.created_at,
    });

    let quiz = ActiveQuiz {
        identity,
        session: engine.session.clone(),
        phase: game.phase,
        last_report: engine.last_report.clone(),
        updated_at: ctx.timestamp,
    };
    if ctx.db.active_quiz().identity().find(&identity).is_some() {
        ctx.db.active_quiz().identity().update(quiz);
    } else {
        ctx.db.active_quiz().insert(quiz);
    }

    for event in engine.drain_events() {
        ctx.db.engine_event().insert(EngineEventRow {
            id: 0,
            identity,
            kind: event.kind().to_string(),
            payload: event.payload().to_string(),
            created_at: ctx.timestamp,
        });
    }
}

/// Log and stringify a rejected intent
fn reject(action: &str, identity: Identity, err: impl std::fmt::Display) -> String {
    let msg = err.to_string();
    log::warn!("[QUIZ] {} rejected player:{} reason:{}", action, identity, msg);
    msg
}

// -------------------- Timers --------------------

/// Cancel every timer for a player's session (idempotent)
fn cancel_quiz_schedules(ctx: &ReducerContext, identity: Identity) {
    let ticks: Vec<u64> = ctx.db.quiz_tick_schedule().identity().filter(&identity).map(|s| s.id).collect();
    for id in ticks {
        ctx.db.quiz_tick_schedule().id().delete(&id);
    }
    let transitions: Vec<u64> = ctx.db.quiz_transition_schedule().identity().filter(&identity).map(|s| s.id).collect();
    for id in transitions {
        ctx.db.quiz_transition_schedule().id().delete(&id);
    }
}

fn schedule_tick(ctx: &ReducerContext, identity: Identity, epoch: u64) {
    ctx.db.quiz_tick_schedule().insert(QuizTickSchedule {
        id: 0,
        identity,
        epoch,
        scheduled_at: ScheduleAt::Interval(Duration::from_secs(TICK_INTERVAL_SECS).into()),
    });
}

fn schedule_transition(ctx: &ReducerContext, identity: Identity, epoch: u64, delay_ms: u64) {
    let fire_at = ctx.timestamp + Duration::from_millis(delay_ms);
    ctx.db.quiz_transition_schedule().insert(QuizTransitionSchedule {
        id: 0,
        identity,
        epoch,
        scheduled_at: ScheduleAt::Time(fire_at.into()),
    });
}

/// Replace the player's timers with `timer`
fn arm_timer(ctx: &ReducerContext, identity: Identity, timer: Timer) {
    cancel_quiz_schedules(ctx, identity);
    match timer {
        Timer::None => {}
        Timer::Tick { epoch } => schedule_tick(ctx, identity, epoch),
        Timer::Transition { epoch, delay_ms } => schedule_transition(ctx, identity, epoch, delay_ms),
    }
}

/// After an item is scored: feedback delay, or wrap up a completed session
fn after_answer(ctx: &ReducerContext, identity: Identity, game: &mut PlayerGame, outcome: &SubmitOutcome) {
    let (phase, timer) = phase::phase_after_answer(&game.engine.session, &game.engine.config, outcome);
    arm_timer(ctx, identity, timer);
    game.phase = phase;

    if let (Some(summary), Some(report)) = (&outcome.summary, &game.engine.last_report) {
        log::info!(
            "[QUIZ] finished player:{} mode:{} score:{} accuracy:{}% xp+{} level:{} time:{}s",
            identity,
            summary.mode.tag(),
            summary.score,
            report.accuracy,
            report.xp_gained,
            report.level,
            report.duration_secs
        );
    }
}

/// Put the current item on screen and arm its timer
fn show_current_item(ctx: &ReducerContext, identity: Identity, game: &mut PlayerGame) {
    let (phase, timer) = phase::phase_for_item(&game.engine.session);
    arm_timer(ctx, identity, timer);
    game.phase = phase;
}

/// Shared body of the answer reducers
fn answer_with(
    ctx: &ReducerContext,
    action: &str,
    apply: impl FnOnce(&mut QuizEngine, Timestamp) -> Result<Option<SubmitOutcome>, QuizError>,
) -> Result<(), String> {
    let mut game = load_game(ctx, ctx.sender)?;
    if game.engine.session.state == SessionState::Active && game.phase != QuizPhase::Answering {
        return Err(reject(action, ctx.sender, "item not ready for input"));
    }

    let outcome = apply(&mut game.engine, ctx.timestamp).map_err(|e| reject(action, ctx.sender, e))?;
    if let Some(outcome) = &outcome {
        after_answer(ctx, ctx.sender, &mut game, outcome);
    }
    save_game(ctx, ctx.sender, &mut game);
    Ok(())
}

// ==================== PROFILE REDUCERS ====================

/// Create the caller's profile; a missing name gets a generated one
#[reducer]
pub fn create_profile(
    ctx: &ReducerContext,
    name: Option<String>,
    avatar: u8,
    cognitive_profile: String,
) -> Result<(), String> {
    if ctx.db.player_profile().identity().find(&ctx.sender).is_some() {
        return Err(reject("create_profile", ctx.sender, "profile already exists"));
    }

    let name = match name {
        Some(n) if !n.trim().is_empty() => n,
        _ => {
            let mut rng = ctx.rng();
            random_name(&mut rng)
        }
    };
    let cognitive = CognitiveProfile::parse(&cognitive_profile).map_err(|e| reject("create_profile", ctx.sender, e))?;
    let mut fresh = UserProfile::create(&name, avatar, cognitive).map_err(|e| reject("create_profile", ctx.sender, e))?;

    let mut daily = DailyChallengeStatus::default();
    progression::refresh_daily_status(&mut fresh, &mut daily, ctx.timestamp, &load_config(ctx));

    log::info!(
        "[PROFILE] created player:{} name:{} avatar:{} type:{}",
        ctx.sender,
        fresh.name,
        fresh.avatar,
        fresh.cognitive_profile.label()
    );
    ctx.db.player_profile().insert(PlayerProfile {
        identity: ctx.sender,
        standing: profile::standing(&fresh),
        profile: fresh,
        daily,
        created_at: ctx.timestamp,
    });
    Ok(())
}

#[reducer]
pub fn update_settings(ctx: &ReducerContext, sound: bool, music: bool, difficulty: String) -> Result<(), String> {
    let mut row = get_profile(ctx).map_err(|e| reject("update_settings", ctx.sender, e))?;
    let difficulty = Difficulty::parse(&difficulty).map_err(|e| reject("update_settings", ctx.sender, e))?;

    row.profile.settings.sound = sound;
    row.profile.settings.music = music;
    row.profile.settings.difficulty = difficulty;
    ctx.db.player_profile().identity().update(row);
    Ok(())
}

/// Wipe level, XP, streak and high scores; keeps name and settings
#[reducer]
pub fn reset_progress(ctx: &ReducerContext) -> Result<(), String> {
    let mut row = get_profile(ctx).map_err(|e| reject("reset_progress", ctx.sender, e))?;
    row.profile.reset_progress();
    row.standing = profile::standing(&row.profile);
    log::info!("[PROFILE] progress reset player:{} name:{}", ctx.sender, row.profile.name);
    ctx.db.player_profile().identity().update(row);
    Ok(())
}

/// Recompute today's daily challenge status (and break a lapsed streak)
#[reducer]
pub fn check_daily_challenge(ctx: &ReducerContext) -> Result<(), String> {
    let mut row = get_profile(ctx).map_err(|e| reject("check_daily_challenge", ctx.sender, e))?;
    progression::refresh_daily_status(&mut row.profile, &mut row.daily, ctx.timestamp, &load_config(ctx));
    log::debug!(
        "[DAILY] player:{} completed:{} streak:{}",
        ctx.sender,
        row.daily.completed,
        row.profile.streak_days
    );
    row.standing = profile::standing(&row.profile);
    ctx.db.player_profile().identity().update(row);
    Ok(())
}

// ==================== QUIZ REDUCERS ====================

/// Start a session; mode is quick|memory|daily|speed|logic
#[reducer]
pub fn start_quiz(ctx: &ReducerContext, mode: String) -> Result<(), String> {
    let mode = QuizMode::parse(&mode).map_err(|e| reject("start_quiz", ctx.sender, e))?;
    begin_session(ctx, mode)
}

#[reducer]
pub fn start_daily_challenge(ctx: &ReducerContext) -> Result<(), String> {
    begin_session(ctx, QuizMode::Daily)
}

fn begin_session(ctx: &ReducerContext, mode: QuizMode) -> Result<(), String> {
    let mut game = load_game(ctx, ctx.sender)?;
    let mut rng = ctx.rng();
    game.engine
        .start_quiz(mode, &mut rng, ctx.timestamp)
        .map_err(|e| reject("start_quiz", ctx.sender, e))?;

    show_current_item(ctx, ctx.sender, &mut game);
    save_game(ctx, ctx.sender, &mut game);
    Ok(())
}

/// Answer a multiple-choice item
#[reducer]
pub fn submit_choice(ctx: &ReducerContext, option: u8) -> Result<(), String> {
    answer_with(ctx, "submit_choice", |engine, now| {
        engine.submit_response(ChallengeResponse::Choice(option), now).map(Some)
    })
}

/// Pick one memory cell; the item is scored when the pattern length is reached
#[reducer]
pub fn select_memory_cell(ctx: &ReducerContext, cell: u16) -> Result<(), String> {
    answer_with(ctx, "select_memory_cell", |engine, now| engine.select_cell(cell, now))
}

#[reducer]
pub fn record_target_hit(ctx: &ReducerContext, reaction_ms: u32) -> Result<(), String> {
    answer_with(ctx, "record_target_hit", |engine, now| engine.record_target(Some(reaction_ms), now))
}

/// The active target's deadline passed without a click
#[reducer]
pub fn record_target_miss(ctx: &ReducerContext) -> Result<(), String> {
    answer_with(ctx, "record_target_miss", |engine, now| engine.record_target(None, now))
}

/// Choose the gate for a logic circuit; None is rejected
#[reducer]
pub fn submit_circuit(ctx: &ReducerContext, operator: Option<String>) -> Result<(), String> {
    let operator = operator
        .as_deref()
        .map(LogicOperator::parse)
        .transpose()
        .map_err(|e| reject("submit_circuit", ctx.sender, e))?;
    answer_with(ctx, "submit_circuit", |engine, now| {
        engine.submit_response(ChallengeResponse::Operator(operator), now).map(Some)
    })
}

#[reducer]
pub fn pause_quiz(ctx: &ReducerContext) -> Result<(), String> {
    let mut game = load_game(ctx, ctx.sender)?;
    game.engine.pause().map_err(|e| reject("pause_quiz", ctx.sender, e))?;
    cancel_quiz_schedules(ctx, ctx.sender);
    save_game(ctx, ctx.sender, &mut game);
    Ok(())
}

/// Resume with the remaining time; an interrupted feedback delay is skipped
#[reducer]
pub fn resume_quiz(ctx: &ReducerContext) -> Result<(), String> {
    let mut game = load_game(ctx, ctx.sender)?;
    game.engine.resume().map_err(|e| reject("resume_quiz", ctx.sender, e))?;

    let (phase, timer) = phase::phase_on_resume(game.phase, &game.engine.session);
    arm_timer(ctx, ctx.sender, timer);
    game.phase = phase;
    save_game(ctx, ctx.sender, &mut game);
    Ok(())
}

/// Same mode and length, fresh items
#[reducer]
pub fn restart_quiz(ctx: &ReducerContext) -> Result<(), String> {
    let mut game = load_game(ctx, ctx.sender)?;
    let mut rng = ctx.rng();
    game.engine
        .restart(&mut rng, ctx.timestamp)
        .map_err(|e| reject("restart_quiz", ctx.sender, e))?;

    show_current_item(ctx, ctx.sender, &mut game);
    save_game(ctx, ctx.sender, &mut game);
    Ok(())
}

/// Abandon the session; the profile is untouched
#[reducer]
pub fn quit_quiz(ctx: &ReducerContext) -> Result<(), String> {
    let mut game = load_game(ctx, ctx.sender)?;
    game.engine.quit().map_err(|e| reject("quit_quiz", ctx.sender, e))?;
    cancel_quiz_schedules(ctx, ctx.sender);
    game.phase = QuizPhase::Answering;
    save_game(ctx, ctx.sender, &mut game);
    Ok(())
}

// ==================== SCHEDULED REDUCERS ====================

/// One second of the session clock
#[reducer]
pub fn quiz_tick(ctx: &ReducerContext, schedule: QuizTickSchedule) {
    // Only allow scheduler to call this, not clients
    if ctx.sender != ctx.identity() {
        log::warn!("Client {} attempted to call quiz_tick", ctx.sender);
        return;
    }

    let mut game = match load_game(ctx, schedule.identity) {
        Ok(g) => g,
        Err(e) => {
            log::warn!("[QUIZ] tick for player:{} dropped: {}", schedule.identity, e);
            ctx.db.quiz_tick_schedule().id().delete(&schedule.id);
            return;
        }
    };

    let session = &game.engine.session;
    if session.state != SessionState::Active || session.clock.epoch != schedule.epoch {
        // Timer outlived its item
        ctx.db.quiz_tick_schedule().id().delete(&schedule.id);
        return;
    }

    let delta = TICK_INTERVAL_SECS as u32;
    if let Some(outcome) = game.engine.tick_epoch(schedule.epoch, delta, ctx.timestamp) {
        log::debug!("[QUIZ] time up player:{} item:{}", schedule.identity, game.engine.session.current_index);
        after_answer(ctx, schedule.identity, &mut game, &outcome);
    }
    save_game(ctx, schedule.identity, &mut game);
}

/// End of a feedback or memorize delay
#[reducer]
pub fn quiz_transition(ctx: &ReducerContext, schedule: QuizTransitionSchedule) {
    // Only allow scheduler to call this, not clients
    if ctx.sender != ctx.identity() {
        log::warn!("Client {} attempted to call quiz_transition", ctx.sender);
        return;
    }
    ctx.db.quiz_transition_schedule().id().delete(&schedule.id);

    let mut game = match load_game(ctx, schedule.identity) {
        Ok(g) => g,
        Err(e) => {
            log::warn!("[QUIZ] transition for player:{} dropped: {}", schedule.identity, e);
            return;
        }
    };

    let Some((phase, timer)) = phase::phase_on_transition(game.phase, &game.engine.session, schedule.epoch) else {
        log::debug!(
            "[QUIZ] stale transition player:{} epoch:{} current:{}",
            schedule.identity,
            schedule.epoch,
            game.engine.session.clock.epoch
        );
        return;
    };
    arm_timer(ctx, schedule.identity, timer);
    game.phase = phase;
    save_game(ctx, schedule.identity, &mut game);
}

/// Scheduled cleanup task (runs every 30 seconds).
/// Prunes old engine events and timers whose session is gone.
#[reducer]
pub fn cleanup_stale_events(ctx: &ReducerContext, _schedule: CleanupSchedule) {
    // Only allow scheduler to call this, not clients
    if ctx.sender != ctx.identity() {
        log::warn!("Client {} attempted to call cleanup_stale_events", ctx.sender);
        return;
    }

    let now = ctx.timestamp;
    let expired: Vec<u64> = ctx.db
        .engine_event()
        .iter()
        .filter(|e| {
            now.duration_since(e.created_at)
                .is_some_and(|age| age.as_secs() > EVENT_RETENTION_SECS)
        })
        .map(|e| e.id)
        .collect();
    for id in &expired {
        ctx.db.engine_event().id().delete(id);
    }

    let orphaned: Vec<u64> = ctx.db
        .quiz_tick_schedule()
        .iter()
        .filter(|s| {
            ctx.db
                .active_quiz()
                .identity()
                .find(&s.identity)
                .map_or(true, |q| q.session.state != SessionState::Active || q.session.clock.epoch != s.epoch)
        })
        .map(|s| s.id)
        .collect();
    for id in &orphaned {
        ctx.db.quiz_tick_schedule().id().delete(id);
    }

    if !expired.is_empty() || !orphaned.is_empty() {
        log::info!("[CLEANUP] events:{} timers:{}", expired.len(), orphaned.len());
    }
}

// ==================== LIFECYCLE ====================

/// Pause the running session when its player drops
#[reducer(client_disconnected)]
pub fn on_disconnect(ctx: &ReducerContext) {
    let Ok(mut game) = load_game(ctx, ctx.sender) else {
        return;
    };
    if game.engine.session.state != SessionState::Active {
        return;
    }

    match game.engine.pause() {
        Ok(()) => {
            cancel_quiz_schedules(ctx, ctx.sender);
            log::info!(
                "[DISCONNECT] {} paused mode:{} item:{} remaining:{}s",
                game.engine.profile.name,
                game.engine.session.mode.tag(),
                game.engine.session.current_index,
                game.engine.session.time_remaining()
            );
            save_game(ctx, ctx.sender, &mut game);
        }
        Err(e) => log::warn!("Failed to pause quiz for {}: {}", ctx.sender, e),
    }
}

/// Initialize module - seed config, rankings and the cleanup schedule
#[reducer(init)]
pub fn init(ctx: &ReducerContext) {
    if ctx.db.quiz_config().id().find(&0).is_none() {
        ctx.db.quiz_config().insert(QuizConfigRow { id: 0, config: QuizConfig::default() });
    }

    if ctx.db.leaderboard_entry().iter().count() == 0 {
        for entry in profile::global_rankings() {
            ctx.db.leaderboard_entry().insert(LeaderboardEntry {
                id: 0,
                position: entry.rank,
                player_name: entry.name.to_string(),
                level: entry.level,
                cognitive_profile: entry.cognitive_profile,
                score: entry.score,
                accuracy: entry.accuracy,
            });
        }
    }

    // Check if scheduler already exists to avoid duplicates on hot-reload
    if ctx.db.cleanup_schedule().iter().count() == 0 {
        ctx.db.cleanup_schedule().insert(CleanupSchedule {
            id: 0, // auto_inc will handle this
            scheduled_at: ScheduleAt::Interval(Duration::from_secs(CLEANUP_INTERVAL_SECS).into()),
        });
    }

    log::info!("Neural quiz module initialized successfully");
}
