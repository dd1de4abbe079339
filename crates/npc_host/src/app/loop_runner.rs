use std::cell::Cell;
use std::process::ExitCode;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use npc_engine::{
    compile_agent_defs, resolve_app_paths, AgentDefDatabase, AgentKind, ArrestNotifier,
    ArrestReport, ConfigError, ContentCompileError, Inventory, NpcManager, Player, SimEvent,
    SimEventBus, SimTuning, StartupError, VoxelWorld, PLAYER_MAX_HEALTH,
};
use thiserror::Error;
use tracing::{error, info, warn};

use super::bootstrap::{load_tuning, AppWiring, LoopConfig, TuningLoadError, SLOW_FRAME_ENV_VAR};
use super::input::{InputAction, InputSnapshot};
use super::metrics::MetricsAccumulator;
use super::overlay::OverlayGate;
use super::scenario::{self, Cue, DemoScript, PLAYER_WALK_SPEED};

#[derive(Debug, Error)]
pub(crate) enum HostError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to compile agent definitions: {0}")]
    Content(#[from] ContentCompileError),
    #[error("failed to load tuning: {0}")]
    Tuning(#[from] TuningLoadError),
    #[error("simulation rejected tuning: {0}")]
    Config(#[from] ConfigError),
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    if let Err(err) = run_headless(app.config) {
        error!(error = %err, "startup_failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run_headless(config: LoopConfig) -> Result<(), HostError> {
    let app_paths = resolve_app_paths()?;
    info!(
        root = %app_paths.root.display(),
        base_content_dir = %app_paths.base_content_dir.display(),
        mods_dir = %app_paths.mods_dir.display(),
        "startup"
    );
    let definitions = compile_agent_defs(&app_paths, &config.content_request)?;
    let tuning = load_tuning(config.tuning_path.as_deref())?;

    let mut session = HostSession::new(tuning, definitions)?;
    let arrests = session.wire_arrest_tally();
    let mut script = DemoScript::shelter_run(session.door);

    let frame_target = target_frame_duration(config.target_fps);
    let slow_frame_delay = Duration::from_millis(config.simulated_slow_frame_ms);
    info!(
        frames = config.frames,
        target_fps = config.target_fps,
        metrics_log_interval_ms = config.metrics_log_interval.as_millis() as u64,
        slow_frame_delay_ms = config.simulated_slow_frame_ms,
        slow_frame_env_var = SLOW_FRAME_ENV_VAR,
        tuning_path = ?config.tuning_path,
        "loop_config"
    );

    let mut metrics = MetricsAccumulator::new(config.metrics_log_interval);
    let mut last_frame_instant = Instant::now();
    let mut frames_run = 0u32;

    for _ in 0..config.frames {
        let frame_start = Instant::now();
        // Real elapsed time, unclamped: a long stall is fast-forwarded by
        // the simulation rather than dropped.
        let frame_dt = frame_start.saturating_duration_since(last_frame_instant);
        last_frame_instant = frame_start;

        let mut quit = false;
        for cue in script.due_cues(session.sim_seconds) {
            if cue == Cue::Quit {
                quit = true;
            } else {
                session.apply_cue(cue);
            }
        }
        let input = script.input_for(session.sim_seconds, session.player.position);
        if quit || input.is_down(InputAction::Quit) {
            info!(reason = "script_finished", "shutdown_requested");
            break;
        }

        let event_count = session.step_frame(frame_dt.as_secs_f32(), input);
        frames_run = frames_run.saturating_add(1);
        metrics.record_frame(frame_dt, event_count);

        if let Some(snapshot) = metrics.maybe_snapshot(Instant::now()) {
            let frame_stats = session.npcs.last_frame_stats();
            info!(
                fps = snapshot.fps,
                frame_time_ms = snapshot.frame_time_ms,
                max_frame_time_ms = snapshot.max_frame_time_ms,
                sim_events_per_second = snapshot.sim_events_per_second,
                population = frame_stats.population,
                shelter_checks = frame_stats.shelter_checks,
                overlay_visible = session.overlay.is_visible(),
                player_health = session.player.health,
                "loop_metrics"
            );
        }

        if !slow_frame_delay.is_zero() {
            thread::sleep(slow_frame_delay);
        }
        let sleep_for = compute_cap_sleep(frame_start.elapsed(), frame_target);
        if !sleep_for.is_zero() {
            thread::sleep(sleep_for);
        }
    }

    info!(
        frames = frames_run,
        sim_seconds = session.sim_seconds,
        population = session.npcs.population(),
        arrests = arrests.get(),
        digest = %session.npcs.state_digest(),
        "run_finished"
    );
    Ok(())
}

/// Counts arrests reported by the simulation.
struct ArrestTally {
    count: Rc<Cell<u32>>,
}

impl ArrestNotifier for ArrestTally {
    fn on_arrest(&mut self, report: &ArrestReport) {
        self.count.set(self.count.get().saturating_add(1));
        info!(
            officer = report.officer.0,
            released_x = report.released_at.x,
            released_z = report.released_at.z,
            confiscated_kinds = report.confiscated.len(),
            arrests = self.count.get(),
            "player_arrested"
        );
    }
}

/// Everything one running demo owns. The simulation tick and the player
/// input tick are separate steps; only the latter consults the overlay.
pub(crate) struct HostSession {
    npcs: NpcManager,
    world: VoxelWorld,
    door: (i32, i32, i32),
    player: Player,
    inventory: Inventory,
    events: SimEventBus,
    overlay: OverlayGate,
    sim_seconds: f32,
}

impl HostSession {
    pub(crate) fn new(
        tuning: SimTuning,
        definitions: AgentDefDatabase,
    ) -> Result<Self, ConfigError> {
        let mut npcs = NpcManager::new(tuning, definitions)?;
        let demo = scenario::build_world();
        let (player, inventory) = scenario::starting_player();
        scenario::populate(&mut npcs);
        let mut events = SimEventBus::default();
        npcs.apply_pending(&mut events);
        events.finish_frame();
        Ok(Self {
            npcs,
            world: demo.world,
            door: demo.door,
            player,
            inventory,
            events,
            overlay: OverlayGate::default(),
            sim_seconds: 0.0,
        })
    }

    fn wire_arrest_tally(&mut self) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        self.npcs.set_arrest_notifier(Some(Box::new(ArrestTally {
            count: Rc::clone(&count),
        })));
        count
    }

    pub(crate) fn apply_cue(&mut self, cue: Cue) {
        match cue {
            Cue::OpenDoor => scenario::set_door(&mut self.world, self.door, true),
            Cue::CloseDoor => scenario::set_door(&mut self.world, self.door, false),
            Cue::ShowMenu => {
                self.overlay.show();
            }
            Cue::HideMenu => {
                self.overlay.hide();
            }
            Cue::CallReinforcements => {
                self.npcs
                    .spawn_reinforcements(AgentKind::GangMember, self.player.position);
            }
            Cue::StartDodge | Cue::StopDodge | Cue::Quit => {}
        }
    }

    /// Player input tick. Swallowed entirely while the overlay is up.
    fn apply_player_input(&mut self, dt: f32, input: InputSnapshot) {
        if self.overlay.blocks_player_input() || !self.player.alive {
            return;
        }
        self.player.dodging = input.is_down(InputAction::Dodge);
        if let Some(direction) = input.movement_direction() {
            self.player.position = self
                .player
                .position
                .add(direction.scale(PLAYER_WALK_SPEED * dt));
        }
    }

    /// Runs one frame and returns how many simulation events it produced.
    pub(crate) fn step_frame(&mut self, dt: f32, input: InputSnapshot) -> u32 {
        self.apply_player_input(dt, input);
        self.npcs.advance(
            dt,
            &self.world,
            &mut self.player,
            &mut self.inventory,
            &mut self.events,
        );
        if dt.is_finite() && dt > 0.0 {
            self.sim_seconds += dt;
        }

        let frame_events = self.events.finish_frame();
        for event in &frame_events {
            if let SimEvent::PlayerDowned { agent_id } = event {
                warn!(agent_id = agent_id.0, "player_downed_respawning");
                self.player.health = PLAYER_MAX_HEALTH;
                self.player.alive = true;
            }
        }
        self.events.last_frame_counts().total
    }
}

fn target_frame_duration(target_fps: u32) -> Option<Duration> {
    (target_fps > 0).then(|| Duration::from_secs_f64(1.0 / target_fps as f64))
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}
