use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::math::Vec3;
use super::tuning::SimTuning;

/// Tolerance used when comparing distances produced by sub-stepped movement.
const DISTANCE_EPSILON: f32 = 1.0e-4;
/// Boundary splits shorter than this are folded into the surrounding step.
const MIN_BOUNDARY_STEP: f32 = 1.0e-5;

/// Stable agent handle. Ids are never reused after despawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    Police,
    GangMember,
    Shopkeeper,
    Pedestrian,
    Tourist,
    Dog,
    Pigeon,
    CouncilBuilder,
}

impl AgentKind {
    pub const ALL: [AgentKind; 8] = [
        AgentKind::Police,
        AgentKind::GangMember,
        AgentKind::Shopkeeper,
        AgentKind::Pedestrian,
        AgentKind::Tourist,
        AgentKind::Dog,
        AgentKind::Pigeon,
        AgentKind::CouncilBuilder,
    ];

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Police => "police",
            Self::GangMember => "gang_member",
            Self::Shopkeeper => "shopkeeper",
            Self::Pedestrian => "pedestrian",
            Self::Tourist => "tourist",
            Self::Dog => "dog",
            Self::Pigeon => "pigeon",
            Self::CouncilBuilder => "council_builder",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_token() == token)
    }

    pub fn is_gang(self) -> bool {
        matches!(self, Self::GangMember)
    }

    /// Kinds that escalate toward the player and are gated by shelter.
    pub fn is_hostile_capable(self) -> bool {
        matches!(self, Self::Police | Self::GangMember)
    }

    pub fn is_animal(self) -> bool {
        matches!(self, Self::Dog | Self::Pigeon)
    }

    /// Built-in stats; content definitions may override them per kind.
    pub fn base_stats(self) -> AgentStats {
        match self {
            Self::Police => AgentStats {
                hostile: true,
                max_health: 50.0,
                attack_damage: 5.0,
                attack_cooldown_seconds: 1.5,
                walk_speed: 1.4,
                run_speed: 4.0,
            },
            Self::GangMember => AgentStats {
                hostile: true,
                max_health: 30.0,
                attack_damage: 8.0,
                attack_cooldown_seconds: 1.0,
                walk_speed: 1.3,
                run_speed: 4.2,
            },
            Self::Shopkeeper => AgentStats::passive(25.0, 0.0, 0.0),
            Self::Pedestrian => AgentStats::passive(20.0, 1.2, 3.5),
            Self::Tourist => AgentStats::passive(20.0, 1.0, 3.0),
            Self::Dog => AgentStats::passive(15.0, 2.0, 5.5),
            Self::Pigeon => AgentStats::passive(2.0, 0.8, 6.0),
            Self::CouncilBuilder => AgentStats::passive(40.0, 1.1, 2.5),
        }
    }

    /// State a freshly spawned (or revived) agent of this kind settles into.
    pub fn resting_state(self) -> AgentState {
        match self {
            Self::Police => AgentState::Patrolling,
            Self::Shopkeeper => AgentState::Idle,
            _ => AgentState::Wandering,
        }
    }

    fn stays_put_when_idle(self) -> bool {
        matches!(self, Self::Shopkeeper)
    }
}

/// Immutable per-kind base stats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub hostile: bool,
    pub max_health: f32,
    pub attack_damage: f32,
    pub attack_cooldown_seconds: f32,
    pub walk_speed: f32,
    pub run_speed: f32,
}

impl AgentStats {
    fn passive(max_health: f32, walk_speed: f32, run_speed: f32) -> Self {
        Self {
            hostile: false,
            max_health,
            attack_damage: 0.0,
            attack_cooldown_seconds: 1.0,
            walk_speed,
            run_speed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentState {
    Idle,
    Wandering,
    Patrolling,
    Warning,
    Aggressive,
    Arresting,
    Fleeing,
    Stealing,
    ChasingPlayer,
    Following,
    Demolishing,
    KnockedOut,
    AtPub,
    AtHome,
    Staring,
    Photographing,
    Complaining,
}

impl AgentState {
    /// The only states allowed to damage the player.
    pub fn is_hostile_active(self) -> bool {
        matches!(self, Self::Aggressive | Self::Arresting)
    }

    pub fn is_passive_flavor(self) -> bool {
        matches!(
            self,
            Self::AtPub | Self::AtHome | Self::Staring | Self::Photographing | Self::Complaining
        )
    }

    pub fn is_knocked_out(self) -> bool {
        matches!(self, Self::KnockedOut)
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Wandering => "wandering",
            Self::Patrolling => "patrolling",
            Self::Warning => "warning",
            Self::Aggressive => "aggressive",
            Self::Arresting => "arresting",
            Self::Fleeing => "fleeing",
            Self::Stealing => "stealing",
            Self::ChasingPlayer => "chasing_player",
            Self::Following => "following",
            Self::Demolishing => "demolishing",
            Self::KnockedOut => "knocked_out",
            Self::AtPub => "at_pub",
            Self::AtHome => "at_home",
            Self::Staring => "staring",
            Self::Photographing => "photographing",
            Self::Complaining => "complaining",
        }
    }
}

/// What an agent is currently saying; the text itself lives with the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeechLine {
    Warning,
    Arrest,
    Taunt,
    Complaint,
    Scream,
}

/// All timers are in seconds and accumulate from frame deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AgentTimers {
    /// Total time spent in `Idle` (and while knocked out).
    pub idle: f32,
    /// Free-running animation clock.
    pub animation: f32,
    /// Time since the current state was entered.
    pub state: f32,
    /// Time since the last timer-driven event (transition or patrol turn).
    pub phase: f32,
    /// Remaining time the current speech line stays up.
    pub speech: f32,
    /// Accumulated attack readiness; one strike per full cooldown.
    pub attack_ready: f32,
    /// Arrest progress while holding the player.
    pub arrest: f32,
}

/// Side effects produced while advancing an agent's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerEvent {
    Transition {
        agent_id: AgentId,
        from: AgentState,
        to: AgentState,
    },
    TheftCompleted {
        agent_id: AgentId,
    },
    ArrestCaptured {
        agent_id: AgentId,
    },
}

pub(crate) struct StepContext<'a> {
    pub player_position: Vec3,
    pub tuning: &'a SimTuning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub(crate) id: AgentId,
    pub(crate) kind: AgentKind,
    pub(crate) stats: AgentStats,
    pub(crate) state: AgentState,
    pub(crate) position: Vec3,
    pub(crate) velocity: Vec3,
    pub(crate) heading: Vec3,
    pub(crate) health: f32,
    pub(crate) timers: AgentTimers,
    pub(crate) name: Option<String>,
    pub(crate) speech: Option<SpeechLine>,
    pub(crate) carried_item: Option<super::player::ItemKind>,
    heading_seed: u64,
    wander_cycle: u32,
}

impl Agent {
    pub(crate) fn new(
        id: AgentId,
        kind: AgentKind,
        stats: AgentStats,
        position: Vec3,
        name: Option<String>,
        seed: u64,
    ) -> Self {
        let mut agent = Self {
            id,
            kind,
            stats,
            state: AgentState::Idle,
            position,
            velocity: Vec3::ZERO,
            heading: Vec3::new(1.0, 0.0, 0.0),
            health: stats.max_health,
            timers: AgentTimers {
                attack_ready: stats.attack_cooldown_seconds,
                ..AgentTimers::default()
            },
            name,
            speech: None,
            carried_item: None,
            heading_seed: seed ^ id.0.wrapping_mul(0x9E37_79B9_7F4A_7C15),
            wander_cycle: 0,
        };
        agent.heading = agent.pick_heading();
        agent
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn timers(&self) -> &AgentTimers {
        &self.timers
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }

    pub fn is_incapacitated(&self) -> bool {
        self.state.is_knocked_out()
    }

    pub fn is_hostile_capable(&self) -> bool {
        self.kind.is_hostile_capable()
    }

    /// Whether contact in a hostile-active state can hurt the player.
    pub fn can_attack(&self) -> bool {
        self.stats.hostile && self.stats.attack_damage > 0.0
    }

    pub fn speech(&self) -> Option<SpeechLine> {
        self.speech
    }

    pub fn carried_item(&self) -> Option<super::player::ItemKind> {
        self.carried_item
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            kind: self.kind,
            state: self.state,
            position: self.position,
            health: self.health,
            name: self.name.clone(),
            speech: self.speech,
        }
    }

    /// Switches state, resetting per-state timers. Returns the previous state.
    pub(crate) fn enter_state(&mut self, next: AgentState, tuning: &SimTuning) -> AgentState {
        let previous = self.state;
        if previous == next {
            return previous;
        }
        self.state = next;
        self.timers.state = 0.0;
        self.timers.phase = 0.0;
        self.timers.arrest = 0.0;
        self.velocity = Vec3::ZERO;

        match next {
            AgentState::Wandering | AgentState::Patrolling => {
                self.wander_cycle = self.wander_cycle.wrapping_add(1);
                self.heading = self.pick_heading();
            }
            _ => {}
        }

        let speech = match next {
            AgentState::Warning => Some(SpeechLine::Warning),
            AgentState::Arresting => Some(SpeechLine::Arrest),
            AgentState::Stealing => Some(SpeechLine::Taunt),
            AgentState::Complaining => Some(SpeechLine::Complaint),
            AgentState::Fleeing if !self.kind.is_animal() => Some(SpeechLine::Scream),
            _ => None,
        };
        if let Some(line) = speech {
            self.speech = Some(line);
            self.timers.speech = tuning.speech_seconds;
        }
        previous
    }

    /// Advances timers and movement by `dt`, sub-stepping at every timer
    /// threshold so one long delta crosses the same thresholds as many
    /// short ones. Zero or negative deltas are ignored.
    pub(crate) fn advance_timers(
        &mut self,
        dt: f32,
        ctx: &StepContext<'_>,
        events: &mut Vec<TimerEvent>,
    ) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        self.timers.animation += dt;

        if self.state.is_knocked_out() {
            self.timers.idle += dt;
            self.timers.state += dt;
            self.timers.phase += dt;
            self.tick_speech(dt);
            self.velocity = Vec3::ZERO;
            return;
        }

        let mut remaining = dt;
        while remaining > 0.0 {
            let mut step = remaining;
            let mut fires = false;
            if let Some(until) = self.time_until_timed_event(ctx) {
                if until <= step {
                    step = until;
                    fires = true;
                }
            }
            if let Some(boundary) = self.time_until_contact(ctx) {
                if boundary < step {
                    step = boundary;
                    fires = false;
                }
            }

            if step > 0.0 {
                self.integrate(step, ctx);
                remaining -= step;
            }
            if fires {
                self.fire_timed_event(ctx, events);
            } else if step <= 0.0 {
                break;
            }
        }
    }

    fn tick_speech(&mut self, step: f32) {
        if self.speech.is_none() {
            return;
        }
        self.timers.speech -= step;
        if self.timers.speech <= 0.0 {
            self.timers.speech = 0.0;
            self.speech = None;
        }
    }

    fn time_until_timed_event(&self, ctx: &StepContext<'_>) -> Option<f32> {
        let tuning = ctx.tuning;
        let duration = match self.state {
            AgentState::Idle if self.kind.stays_put_when_idle() => return None,
            AgentState::Idle => tuning.idle_seconds,
            AgentState::Wandering => tuning.wander_seconds,
            AgentState::Patrolling => tuning.patrol_leg_seconds,
            AgentState::Stealing => tuning.steal_seconds,
            AgentState::Fleeing => tuning.flee_seconds,
            AgentState::AtPub | AgentState::AtHome => tuning.venue_stay_seconds,
            AgentState::Photographing => tuning.photograph_seconds,
            AgentState::Staring => tuning.stare_seconds,
            AgentState::Complaining => tuning.complain_seconds,
            AgentState::Demolishing => tuning.demolish_seconds,
            AgentState::Arresting => {
                let holding = self.position.horizontal_distance(ctx.player_position)
                    <= tuning.arrest_radius + DISTANCE_EPSILON;
                if !holding || self.timers.arrest >= tuning.arrest_seconds {
                    return None;
                }
                return Some((tuning.arrest_seconds - self.timers.arrest).max(0.0));
            }
            AgentState::Warning
            | AgentState::Aggressive
            | AgentState::ChasingPlayer
            | AgentState::Following
            | AgentState::KnockedOut => return None,
        };
        Some((duration - self.timers.phase).max(0.0))
    }

    /// Time until a pursuing attacker closes to contact range, so attack
    /// readiness only accrues for the part of a step spent in contact.
    fn time_until_contact(&self, ctx: &StepContext<'_>) -> Option<f32> {
        if self.state != AgentState::Aggressive || self.stats.run_speed <= 0.0 {
            return None;
        }
        let distance = self.position.horizontal_distance(ctx.player_position);
        let contact = ctx.tuning.contact_range;
        if distance <= contact + DISTANCE_EPSILON {
            return None;
        }
        let travel = distance - contact.max(ctx.tuning.pursuit_stop_distance());
        let until = travel / self.stats.run_speed;
        (until > MIN_BOUNDARY_STEP).then_some(until)
    }

    fn integrate(&mut self, step: f32, ctx: &StepContext<'_>) {
        let tuning = ctx.tuning;
        let start_distance = self.position.horizontal_distance(ctx.player_position);
        let engaged = self.state.is_hostile_active()
            && start_distance <= tuning.contact_range + DISTANCE_EPSILON;

        let displacement = self.displacement_for(step, ctx);
        self.position = self.position.add(displacement);
        self.velocity = displacement.scale(1.0 / step);

        self.timers.state += step;
        self.timers.phase += step;
        if self.state == AgentState::Idle {
            self.timers.idle += step;
        }
        self.tick_speech(step);

        let cooldown = self.stats.attack_cooldown_seconds;
        if engaged {
            self.timers.attack_ready += step;
        } else {
            self.timers.attack_ready = (self.timers.attack_ready + step).min(cooldown);
        }

        if self.state == AgentState::Arresting
            && start_distance <= tuning.arrest_radius + DISTANCE_EPSILON
        {
            self.timers.arrest = (self.timers.arrest + step).min(tuning.arrest_seconds);
        }
    }

    fn displacement_for(&self, step: f32, ctx: &StepContext<'_>) -> Vec3 {
        let tuning = ctx.tuning;
        match self.state {
            AgentState::Wandering | AgentState::Patrolling => {
                self.heading.scale(self.stats.walk_speed * step)
            }
            AgentState::Aggressive | AgentState::ChasingPlayer => self.approach(
                ctx.player_position,
                self.stats.run_speed * step,
                tuning.pursuit_stop_distance(),
            ),
            AgentState::Following => self.approach(
                ctx.player_position,
                self.stats.walk_speed * step,
                tuning.follow_distance,
            ),
            AgentState::Fleeing => {
                let away = Vec3::horizontal_direction(ctx.player_position, self.position)
                    .unwrap_or(self.heading);
                away.scale(self.stats.run_speed * step)
            }
            _ => Vec3::ZERO,
        }
    }

    fn approach(&self, target: Vec3, max_travel: f32, stop_distance: f32) -> Vec3 {
        let Some(direction) = Vec3::horizontal_direction(self.position, target) else {
            return Vec3::ZERO;
        };
        let distance = self.position.horizontal_distance(target);
        let travel = max_travel.min((distance - stop_distance).max(0.0));
        direction.scale(travel)
    }

    fn fire_timed_event(&mut self, ctx: &StepContext<'_>, events: &mut Vec<TimerEvent>) {
        let tuning = ctx.tuning;
        let next = match self.state {
            AgentState::Idle => Some(match self.kind {
                AgentKind::Police => AgentState::Patrolling,
                _ => AgentState::Wandering,
            }),
            AgentState::Wandering => Some(AgentState::Idle),
            AgentState::Patrolling if self.kind == AgentKind::Police => {
                self.heading = self.heading.scale(-1.0);
                self.timers.phase = 0.0;
                None
            }
            AgentState::Patrolling => Some(AgentState::Wandering),
            AgentState::Stealing => {
                events.push(TimerEvent::TheftCompleted { agent_id: self.id });
                Some(AgentState::Fleeing)
            }
            AgentState::Fleeing
            | AgentState::AtPub
            | AgentState::AtHome
            | AgentState::Photographing
            | AgentState::Staring => Some(AgentState::Wandering),
            AgentState::Complaining | AgentState::Demolishing => Some(AgentState::Idle),
            AgentState::Arresting => {
                self.timers.arrest = tuning.arrest_seconds;
                events.push(TimerEvent::ArrestCaptured { agent_id: self.id });
                None
            }
            AgentState::Warning
            | AgentState::Aggressive
            | AgentState::ChasingPlayer
            | AgentState::Following
            | AgentState::KnockedOut => None,
        };

        if let Some(next) = next {
            let from = self.enter_state(next, tuning);
            events.push(TimerEvent::Transition {
                agent_id: self.id,
                from,
                to: next,
            });
        }
    }

    fn pick_heading(&self) -> Vec3 {
        let mut rng = SmallRng::seed_from_u64(
            self.heading_seed
                .wrapping_add(u64::from(self.wander_cycle).wrapping_mul(0xBF58_476D_1CE4_E5B9)),
        );
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        Vec3::new(angle.cos(), 0.0, angle.sin())
    }
}

/// Read-only view handed to renderers and quest/territory systems.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub kind: AgentKind,
    pub state: AgentState,
    pub position: Vec3,
    pub health: f32,
    pub name: Option<String>,
    pub speech: Option<SpeechLine>,
}
