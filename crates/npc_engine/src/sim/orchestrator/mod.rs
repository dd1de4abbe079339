//! The tick orchestrator: owns the agent population and the arrest slot and
//! drives every agent once per simulated frame.
//!
//! Frame order is fixed and load-bearing:
//! 1. timers and movement
//! 2. escalation policy, transitions and contact attacks
//! 3. agent/player collision push-apart
//! 4. pending spawns, queued peripheral requests and despawn rules
//! 5. arrest session resolution

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::content::AgentDefDatabase;

use super::agent::{Agent, AgentId, AgentKind, AgentSnapshot, AgentState, StepContext, TimerEvent};
use super::arrest::{apply_arrest_consequences, ArrestNotifier, ArrestSession, ArrestSlot};
use super::escalation::{next_state, EscalationInput};
use super::events::{DespawnReason, EventSink, SimEvent};
use super::math::Vec3;
use super::player::{Inventory, Player};
use super::requests::{SimRequest, SimRequestApplyStats, SimRequestQueue};
use super::shelter::is_sheltered;
use super::tuning::{ConfigError, SimTuning, POPULATION_CAP};
use super::world::WorldQuery;

#[cfg(test)]
mod tests;

const CONTACT_EPSILON: f32 = 1.0e-4;
const COLLISION_EPSILON: f32 = 1.0e-4;
/// Push direction used when agent and player share a position.
const COINCIDENT_PUSH_DIRECTION: Vec3 = Vec3::new(1.0, 0.0, 0.0);
const REINFORCEMENT_COUNT_MIN: usize = 2;
const REINFORCEMENT_COUNT_MAX: usize = 3;

#[derive(Debug, Default)]
struct AgentIdAllocator {
    next: u64,
}

impl AgentIdAllocator {
    fn allocate(&mut self) -> AgentId {
        let id = AgentId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// Per-frame numbers for metrics and debugging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_index: u64,
    pub population: usize,
    pub transitions: u32,
    pub attacks: u32,
    pub collision_pushes: u32,
    pub shelter_checks: u32,
}

pub struct NpcManager {
    tuning: SimTuning,
    definitions: AgentDefDatabase,
    allocator: AgentIdAllocator,
    agents: Vec<Agent>,
    pending_spawns: Vec<Agent>,
    requests: SimRequestQueue,
    arrest: ArrestSlot,
    notifier: Option<Box<dyn ArrestNotifier>>,
    rng: SmallRng,
    frame_index: u64,
    last_frame_stats: FrameStats,
}

impl std::fmt::Debug for NpcManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NpcManager")
            .field("population", &self.population())
            .field("pending_spawns", &self.pending_spawns.len())
            .field("arrest", &self.arrest.active())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl NpcManager {
    pub fn new(tuning: SimTuning, definitions: AgentDefDatabase) -> Result<Self, ConfigError> {
        tuning.validate()?;
        let rng = SmallRng::seed_from_u64(tuning.seed);
        Ok(Self {
            tuning,
            definitions,
            allocator: AgentIdAllocator::default(),
            agents: Vec::new(),
            pending_spawns: Vec::new(),
            requests: SimRequestQueue::default(),
            arrest: ArrestSlot::default(),
            notifier: None,
            rng,
            frame_index: 0,
            last_frame_stats: FrameStats::default(),
        })
    }

    pub fn tuning(&self) -> &SimTuning {
        &self.tuning
    }

    pub fn definitions(&self) -> &AgentDefDatabase {
        &self.definitions
    }

    /// Wires (or unwires) the downstream arrest notification collaborator.
    pub fn set_arrest_notifier(&mut self, notifier: Option<Box<dyn ArrestNotifier>>) {
        self.notifier = notifier;
    }

    /// Advances the whole population by `dt` seconds. Must run every
    /// simulated frame whether or not any UI is showing.
    pub fn advance(
        &mut self,
        dt: f32,
        world: &dyn WorldQuery,
        player: &mut Player,
        inventory: &mut Inventory,
        sink: &mut dyn EventSink,
    ) {
        let dt = if dt.is_finite() && dt > 0.0 {
            dt
        } else {
            if dt != 0.0 {
                warn!(dt, "advance_invalid_delta_treated_as_zero");
            }
            0.0
        };
        self.frame_index = self.frame_index.saturating_add(1);
        let mut stats = FrameStats {
            frame_index: self.frame_index,
            ..FrameStats::default()
        };

        self.advance_timers(dt, world, player, inventory, sink, &mut stats);
        self.evaluate_escalation(world, player, sink, &mut stats);
        self.resolve_collisions(player, &mut stats);
        self.process_spawns_and_requests(player, sink);
        self.process_arrest(player, inventory, sink);

        stats.population = self.population();
        self.last_frame_stats = stats;
    }

    fn advance_timers(
        &mut self,
        dt: f32,
        world: &dyn WorldQuery,
        player: &mut Player,
        inventory: &mut Inventory,
        sink: &mut dyn EventSink,
        stats: &mut FrameStats,
    ) {
        player
            .reputation
            .decay(self.tuning.reputation_decay_per_second * dt);

        let ctx = StepContext {
            player_position: player.position,
            tuning: &self.tuning,
        };
        let mut timer_events = Vec::new();
        for agent in &mut self.agents {
            agent.advance_timers(dt, &ctx, &mut timer_events);
        }

        for event in timer_events {
            match event {
                TimerEvent::Transition { agent_id, from, to } => {
                    stats.transitions = stats.transitions.saturating_add(1);
                    debug!(
                        agent_id = agent_id.0,
                        from = from.as_token(),
                        to = to.as_token(),
                        cause = "timer",
                        "agent_state_changed"
                    );
                    sink.emit(SimEvent::StateChanged { agent_id, from, to });
                }
                TimerEvent::TheftCompleted { agent_id } => {
                    // The thief has already switched to `Fleeing`; a player who
                    // stepped out of reach or into shelter loses nothing.
                    let in_reach = self.agent(agent_id).is_some_and(|agent| {
                        agent.position.horizontal_distance(player.position)
                            <= self.tuning.steal_radius
                    });
                    if !in_reach || is_sheltered(world, player.position) {
                        debug!(agent_id = agent_id.0, in_reach, "theft_abandoned");
                        continue;
                    }
                    let Some(item) = inventory.take_for_theft() else {
                        debug!(agent_id = agent_id.0, "theft_found_nothing");
                        continue;
                    };
                    if let Some(agent) = self.agent_mut(agent_id) {
                        agent.carried_item = Some(item);
                    }
                    info!(agent_id = agent_id.0, item = ?item, "item_stolen");
                    sink.emit(SimEvent::ItemStolen { agent_id, item });
                }
                TimerEvent::ArrestCaptured { agent_id } => {
                    if self.arrest.mark_completed(agent_id) {
                        info!(agent_id = agent_id.0, "arrest_captured");
                    }
                }
            }
        }
    }

    fn evaluate_escalation(
        &mut self,
        world: &dyn WorldQuery,
        player: &mut Player,
        sink: &mut dyn EventSink,
        stats: &mut FrameStats,
    ) {
        let tier = player
            .reputation
            .tier(&self.tuning.reputation_thresholds);
        let mut sheltered_cache: Option<bool> = None;

        for index in 0..self.agents.len() {
            let agent = &self.agents[index];
            if agent.is_incapacitated() {
                continue;
            }
            let distance = agent.position.horizontal_distance(player.position);
            let sheltered = if agent.kind.is_hostile_capable() {
                *sheltered_cache.get_or_insert_with(|| {
                    stats.shelter_checks = stats.shelter_checks.saturating_add(1);
                    is_sheltered(world, player.position)
                })
            } else {
                false
            };
            let input = EscalationInput {
                kind: agent.kind,
                state: agent.state,
                distance,
                reputation_tier: tier,
                sheltered,
                player_dodging: player.dodging,
            };
            let next = next_state(&input, &self.tuning);
            if next != agent.state && self.transition_at(index, next, "escalation", sink) {
                stats.transitions = stats.transitions.saturating_add(1);
            }

            let strikes = self.resolve_contact_attacks(index, player, sink);
            stats.attacks = stats.attacks.saturating_add(strikes);
        }
    }

    /// Fires every attack the agent has banked while in contact. A dodged
    /// attack still consumes its cooldown.
    fn resolve_contact_attacks(
        &mut self,
        index: usize,
        player: &mut Player,
        sink: &mut dyn EventSink,
    ) -> u32 {
        let contact_range = self.tuning.contact_range;
        let agent = &mut self.agents[index];
        if !agent.state.is_hostile_active() || !agent.can_attack() || !player.alive {
            return 0;
        }
        if agent.position.horizontal_distance(player.position) > contact_range + CONTACT_EPSILON {
            return 0;
        }

        let cooldown = agent.stats.attack_cooldown_seconds;
        let damage = agent.stats.attack_damage;
        let mut strikes = 0;
        while player.alive && agent.timers.attack_ready >= cooldown {
            agent.timers.attack_ready -= cooldown;
            strikes += 1;
            if player.dodging {
                debug!(agent_id = agent.id.0, "attack_missed_dodge");
                sink.emit(SimEvent::AttackMissed { agent_id: agent.id });
                continue;
            }
            let downed = player.apply_damage(damage);
            debug!(
                agent_id = agent.id.0,
                damage,
                player_health = player.health,
                "attack_landed"
            );
            sink.emit(SimEvent::AttackLanded {
                agent_id: agent.id,
                damage,
                player_health: player.health,
            });
            if downed {
                warn!(agent_id = agent.id.0, kind = agent.kind.as_token(), "player_downed");
                sink.emit(SimEvent::PlayerDowned { agent_id: agent.id });
            }
        }
        strikes
    }

    fn resolve_collisions(&mut self, player: &mut Player, stats: &mut FrameStats) {
        let min_gap = self.tuning.agent_radius + self.tuning.player_radius;
        for agent in &self.agents {
            if agent.is_incapacitated() {
                continue;
            }
            if (player.position.y - agent.position.y).abs() >= self.tuning.body_height {
                continue;
            }
            let gap = agent.position.horizontal_distance(player.position);
            if gap >= min_gap - COLLISION_EPSILON {
                continue;
            }
            let direction = Vec3::horizontal_direction(agent.position, player.position)
                .unwrap_or(COINCIDENT_PUSH_DIRECTION);
            player.position = player
                .position
                .add(direction.scale(self.tuning.collision_push_step));
            stats.collision_pushes = stats.collision_pushes.saturating_add(1);
        }
    }

    fn process_spawns_and_requests(&mut self, player: &Player, sink: &mut dyn EventSink) {
        let spawned = self.flush_pending_spawns(sink);
        let mut apply_stats = self.apply_requests(sink);
        apply_stats.spawned_agent_ids = spawned;
        self.requests.set_last_apply_stats(apply_stats);

        let despawn_radius = self.tuning.despawn_radius;
        let mut expired = Vec::new();
        for agent in &self.agents {
            if agent.health <= 0.0 {
                expired.push((agent.id, DespawnReason::Died));
            } else if !agent.is_named()
                && agent.position.distance(player.position) > despawn_radius
            {
                expired.push((agent.id, DespawnReason::Distance));
            }
        }
        for (agent_id, reason) in expired {
            self.despawn(agent_id, reason, sink);
        }
    }

    fn flush_pending_spawns(&mut self, sink: &mut dyn EventSink) -> Vec<AgentId> {
        let mut spawned = Vec::with_capacity(self.pending_spawns.len());
        for agent in std::mem::take(&mut self.pending_spawns) {
            if self.agents.len() >= POPULATION_CAP {
                warn!(
                    agent_id = agent.id.0,
                    kind = agent.kind.as_token(),
                    cap = POPULATION_CAP,
                    "spawn_rejected_at_cap"
                );
                continue;
            }
            debug!(
                agent_id = agent.id.0,
                kind = agent.kind.as_token(),
                state = agent.state.as_token(),
                "agent_spawned"
            );
            sink.emit(SimEvent::Spawned {
                agent_id: agent.id,
                kind: agent.kind,
                position: agent.position,
            });
            spawned.push(agent.id);
            self.agents.push(agent);
        }
        spawned
    }

    fn apply_requests(&mut self, sink: &mut dyn EventSink) -> SimRequestApplyStats {
        let mut stats = SimRequestApplyStats::default();
        for request in self.requests.drain() {
            stats.record_request(request.kind());
            match request {
                SimRequest::Despawn { agent_id } => {
                    if !self.despawn(agent_id, DespawnReason::Requested, sink) {
                        stats.record_invalid_target();
                    }
                }
                SimRequest::ForceState { agent_id, state } => {
                    let Some(index) = self.index_of(agent_id) else {
                        stats.record_invalid_target();
                        continue;
                    };
                    let agent = &self.agents[index];
                    let refused = (agent.is_incapacitated() && state != AgentState::KnockedOut)
                        || (state == AgentState::Arresting && agent.kind != AgentKind::Police);
                    if refused {
                        stats.record_refused();
                        continue;
                    }
                    self.transition_at(index, state, "override", sink);
                }
                SimRequest::KnockOut { agent_id } => {
                    let Some(index) = self.index_of(agent_id) else {
                        stats.record_invalid_target();
                        continue;
                    };
                    self.transition_at(index, AgentState::KnockedOut, "knock_out", sink);
                }
                SimRequest::Revive { agent_id } => {
                    let Some(index) = self.index_of(agent_id) else {
                        stats.record_invalid_target();
                        continue;
                    };
                    if !self.agents[index].is_incapacitated() {
                        stats.record_refused();
                        continue;
                    }
                    let fraction = self.tuning.revive_health_fraction;
                    let agent = &mut self.agents[index];
                    agent.health = agent.health.max(agent.stats.max_health * fraction);
                    let resting = agent.kind.resting_state();
                    self.transition_at(index, resting, "revive", sink);
                }
                SimRequest::AlertHostilesNear { center, radius } => {
                    let targets = self
                        .agents
                        .iter()
                        .enumerate()
                        .filter(|(_, agent)| {
                            agent.kind.is_hostile_capable()
                                && !agent.is_incapacitated()
                                && !agent.state.is_hostile_active()
                                && agent.position.distance(center) <= radius
                        })
                        .map(|(index, _)| index)
                        .collect::<Vec<_>>();
                    info!(
                        x = center.x,
                        z = center.z,
                        radius,
                        alerted = targets.len(),
                        "hostiles_alerted"
                    );
                    for index in targets {
                        self.transition_at(index, AgentState::Aggressive, "alert", sink);
                    }
                }
                SimRequest::TriggerFlavor { agent_id, state } => {
                    let Some(index) = self.index_of(agent_id) else {
                        stats.record_invalid_target();
                        continue;
                    };
                    let current = self.agents[index].state;
                    let calm = matches!(current, AgentState::Idle | AgentState::Wandering);
                    if !calm || !is_triggerable(state) {
                        stats.record_refused();
                        continue;
                    }
                    self.transition_at(index, state, "trigger", sink);
                }
                SimRequest::ReleaseFlavor { agent_id } => {
                    let Some(index) = self.index_of(agent_id) else {
                        stats.record_invalid_target();
                        continue;
                    };
                    let agent = &self.agents[index];
                    if !is_triggerable(agent.state) {
                        stats.record_refused();
                        continue;
                    }
                    let resting = agent.kind.resting_state();
                    self.transition_at(index, resting, "release", sink);
                }
                SimRequest::DamageAgent { agent_id, amount } => {
                    let Some(index) = self.index_of(agent_id) else {
                        stats.record_invalid_target();
                        continue;
                    };
                    self.damage_agent_at(index, amount, sink);
                }
            }
        }
        stats
    }

    fn damage_agent_at(&mut self, index: usize, amount: f32, sink: &mut dyn EventSink) {
        let agent = &mut self.agents[index];
        if amount <= 0.0 || !amount.is_finite() {
            return;
        }
        agent.health = (agent.health - amount).max(0.0);
        debug!(
            agent_id = agent.id.0,
            amount,
            health = agent.health,
            "agent_damaged"
        );
        if agent.health <= 0.0 {
            let agent_id = agent.id;
            self.despawn(agent_id, DespawnReason::Died, sink);
            return;
        }
        if agent.is_incapacitated() {
            return;
        }
        let reaction = if agent.kind.is_hostile_capable() {
            AgentState::Aggressive
        } else if agent.kind == AgentKind::Shopkeeper {
            AgentState::Complaining
        } else {
            AgentState::Fleeing
        };
        if agent.state != reaction && agent.state != AgentState::Arresting {
            self.transition_at(index, reaction, "damaged", sink);
        }
    }

    fn process_arrest(&mut self, player: &mut Player, inventory: &mut Inventory, sink: &mut dyn EventSink) {
        if let Some(session) = self.arrest.active() {
            let officer_state = self.agent(session.officer).map(Agent::state);
            let still_able = officer_state.is_some_and(|state| !state.is_knocked_out());
            let still_holding = officer_state == Some(AgentState::Arresting);
            // A captured player is only released by a removed or knocked out
            // officer; dodging or shelter no longer matter at that point.
            if !still_able && self.arrest.discard_for(session.officer) {
                info!(
                    agent_id = session.officer.0,
                    completed = session.completed,
                    reason = "officer_incapacitated",
                    "arrest_cancelled"
                );
                sink.emit(SimEvent::ArrestCancelled {
                    agent_id: session.officer,
                });
            } else if !still_holding && self.arrest.cancel_for(session.officer) {
                info!(agent_id = session.officer.0, reason = "officer_gone", "arrest_cancelled");
                sink.emit(SimEvent::ArrestCancelled {
                    agent_id: session.officer,
                });
            }
        }

        let Some(session) = self.arrest.take_completed() else {
            return;
        };
        let officer = session.officer;
        let report = apply_arrest_consequences(officer, player, inventory, &self.tuning);
        info!(
            agent_id = officer.0,
            confiscated_kinds = report.confiscated.len(),
            reputation_before = report.reputation_before,
            "arrest_completed"
        );

        let other_police = self
            .agents
            .iter()
            .enumerate()
            .filter(|(_, agent)| {
                agent.kind == AgentKind::Police
                    && agent.id != officer
                    && !agent.is_incapacitated()
                    && agent.state != AgentState::Patrolling
            })
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        for index in other_police {
            self.transition_at(index, AgentState::Patrolling, "arrest_completed", sink);
        }
        self.despawn(officer, DespawnReason::Arrest, sink);

        sink.emit(SimEvent::ArrestCompleted {
            agent_id: officer,
            confiscated: report.confiscated.clone(),
        });
        match self.notifier.as_mut() {
            Some(notifier) => notifier.on_arrest(&report),
            None => debug!(agent_id = officer.0, "arrest_notifier_not_wired"),
        }
    }

    /// Single entry point for every state change. Keeps the arrest slot
    /// consistent: entering `Arresting` needs a free slot (otherwise the
    /// agent stays or becomes `Aggressive`) and leaving it cancels the
    /// agent's unfinished session. Returns whether the state changed.
    fn transition_at(
        &mut self,
        index: usize,
        requested: AgentState,
        cause: &'static str,
        sink: &mut dyn EventSink,
    ) -> bool {
        let agent_id = self.agents[index].id;
        let current = self.agents[index].state;
        let mut next = requested;

        if next == AgentState::Arresting && current != AgentState::Arresting {
            if self.arrest.try_begin(agent_id) {
                info!(agent_id = agent_id.0, "arrest_started");
                sink.emit(SimEvent::ArrestStarted { agent_id });
            } else {
                debug!(agent_id = agent_id.0, "arrest_slot_busy");
                next = AgentState::Aggressive;
            }
        }
        if next == current {
            return false;
        }

        let from = self.agents[index].enter_state(next, &self.tuning);
        if from == AgentState::Arresting && self.arrest.cancel_for(agent_id) {
            info!(agent_id = agent_id.0, reason = cause, "arrest_cancelled");
            sink.emit(SimEvent::ArrestCancelled { agent_id });
        }
        debug!(
            agent_id = agent_id.0,
            from = from.as_token(),
            to = next.as_token(),
            cause,
            "agent_state_changed"
        );
        sink.emit(SimEvent::StateChanged {
            agent_id,
            from,
            to: next,
        });
        true
    }

    fn despawn(&mut self, agent_id: AgentId, reason: DespawnReason, sink: &mut dyn EventSink) -> bool {
        let Some(index) = self.index_of(agent_id) else {
            return false;
        };
        let agent = self.agents.remove(index);
        if agent.state == AgentState::Arresting && self.arrest.cancel_for(agent_id) {
            info!(agent_id = agent_id.0, reason = "despawned", "arrest_cancelled");
            sink.emit(SimEvent::ArrestCancelled { agent_id });
        }
        debug!(
            agent_id = agent_id.0,
            kind = agent.kind.as_token(),
            reason = ?reason,
            "agent_despawned"
        );
        sink.emit(SimEvent::Despawned { agent_id, reason });
        true
    }

    // Peripheral operations.

    /// Queues a new agent in its kind's resting state. Returns `None` with
    /// no side effect when the population (live plus pending) is at cap.
    pub fn spawn(&mut self, kind: AgentKind, position: Vec3) -> Option<AgentId> {
        self.spawn_internal(kind, position, None, kind.resting_state())
    }

    /// Like [`spawn`](Self::spawn) but the name must be unique among live
    /// and pending agents. Named agents are never despawned for distance.
    pub fn spawn_named(
        &mut self,
        kind: AgentKind,
        position: Vec3,
        name: impl Into<String>,
    ) -> Option<AgentId> {
        let name = name.into();
        if self.find_named(&name).is_some()
            || self
                .pending_spawns
                .iter()
                .any(|agent| agent.name() == Some(name.as_str()))
        {
            warn!(name = %name, "spawn_rejected_duplicate_name");
            return None;
        }
        self.spawn_internal(kind, position, Some(name), kind.resting_state())
    }

    /// Spawns 2 or 3 hostile agents around `around`, already `Aggressive`.
    /// Returns the ids actually queued, which may be fewer near the cap.
    pub fn spawn_reinforcements(&mut self, kind: AgentKind, around: Vec3) -> Vec<AgentId> {
        if !kind.is_hostile_capable() {
            warn!(kind = kind.as_token(), "reinforcements_rejected_passive_kind");
            return Vec::new();
        }
        if self.population() >= POPULATION_CAP {
            warn!(kind = kind.as_token(), "reinforcements_rejected_at_cap");
            return Vec::new();
        }
        let count = self
            .rng
            .gen_range(REINFORCEMENT_COUNT_MIN..=REINFORCEMENT_COUNT_MAX);
        let min = self.tuning.reinforcement_min_distance;
        let max = self.tuning.reinforcement_max_distance;
        let mut spawned = Vec::with_capacity(count);
        for _ in 0..count {
            let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let radius = if max > min {
                self.rng.gen_range(min..=max)
            } else {
                min
            };
            let position = Vec3::new(
                around.x + angle.cos() * radius,
                around.y,
                around.z + angle.sin() * radius,
            );
            match self.spawn_internal(kind, position, None, AgentState::Aggressive) {
                Some(agent_id) => spawned.push(agent_id),
                None => break,
            }
        }
        info!(
            kind = kind.as_token(),
            requested = count,
            spawned = spawned.len(),
            "reinforcements_spawned"
        );
        spawned
    }

    fn spawn_internal(
        &mut self,
        kind: AgentKind,
        position: Vec3,
        name: Option<String>,
        initial_state: AgentState,
    ) -> Option<AgentId> {
        if self.population() >= POPULATION_CAP {
            warn!(
                kind = kind.as_token(),
                population = self.population(),
                cap = POPULATION_CAP,
                "spawn_rejected_at_cap"
            );
            return None;
        }
        if !position.is_finite() {
            warn!(kind = kind.as_token(), "spawn_rejected_invalid_position");
            return None;
        }
        let agent_id = self.allocator.allocate();
        let stats = self.definitions.stats_for(kind);
        let mut agent = Agent::new(agent_id, kind, stats, position, name, self.tuning.seed);
        agent.enter_state(initial_state, &self.tuning);
        self.pending_spawns.push(agent);
        Some(agent_id)
    }

    /// Flushes pending spawns and queued requests immediately, outside the
    /// frame. Returns the request apply stats.
    pub fn apply_pending(&mut self, sink: &mut dyn EventSink) -> &SimRequestApplyStats {
        let spawned = self.flush_pending_spawns(sink);
        let mut stats = self.apply_requests(sink);
        stats.spawned_agent_ids = spawned;
        self.requests.set_last_apply_stats(stats);
        self.requests.last_apply_stats()
    }

    pub fn request(&mut self, request: SimRequest) {
        self.requests.enqueue(request);
    }

    pub fn request_despawn(&mut self, agent_id: AgentId) {
        self.request(SimRequest::Despawn { agent_id });
    }

    pub fn request_state(&mut self, agent_id: AgentId, state: AgentState) {
        self.request(SimRequest::ForceState { agent_id, state });
    }

    pub fn request_knock_out(&mut self, agent_id: AgentId) {
        self.request(SimRequest::KnockOut { agent_id });
    }

    pub fn request_revive(&mut self, agent_id: AgentId) {
        self.request(SimRequest::Revive { agent_id });
    }

    pub fn alert_hostiles_near(&mut self, center: Vec3, radius: f32) {
        self.request(SimRequest::AlertHostilesNear { center, radius });
    }

    pub fn trigger_flavor(&mut self, agent_id: AgentId, state: AgentState) {
        self.request(SimRequest::TriggerFlavor { agent_id, state });
    }

    pub fn release_flavor(&mut self, agent_id: AgentId) {
        self.request(SimRequest::ReleaseFlavor { agent_id });
    }

    pub fn damage_agent(&mut self, agent_id: AgentId, amount: f32) {
        self.request(SimRequest::DamageAgent { agent_id, amount });
    }

    // Queries.

    pub fn agent(&self, agent_id: AgentId) -> Option<&Agent> {
        self.index_of(agent_id).map(|index| &self.agents[index])
    }

    fn agent_mut(&mut self, agent_id: AgentId) -> Option<&mut Agent> {
        self.index_of(agent_id).map(|index| &mut self.agents[index])
    }

    /// Live agents ordered by id. Ids are allocated monotonically and
    /// spawns are applied in allocation order, so the slice stays sorted.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_of_kind(&self, kind: AgentKind) -> impl Iterator<Item = &Agent> {
        self.agents.iter().filter(move |agent| agent.kind == kind)
    }

    pub fn agents_in_state(&self, state: AgentState) -> impl Iterator<Item = &Agent> {
        self.agents.iter().filter(move |agent| agent.state == state)
    }

    pub fn agents_within(&self, center: Vec3, radius: f32) -> impl Iterator<Item = &Agent> {
        self.agents
            .iter()
            .filter(move |agent| agent.position.distance(center) <= radius)
    }

    pub fn find_named(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|agent| agent.name() == Some(name))
    }

    /// Live plus pending agents; never exceeds [`POPULATION_CAP`].
    pub fn population(&self) -> usize {
        self.agents.len() + self.pending_spawns.len()
    }

    pub fn pending_request_count(&self) -> usize {
        self.requests.len()
    }

    pub fn arrest_session(&self) -> Option<ArrestSession> {
        self.arrest.active()
    }

    pub fn last_request_stats(&self) -> &SimRequestApplyStats {
        self.requests.last_apply_stats()
    }

    pub fn last_frame_stats(&self) -> FrameStats {
        self.last_frame_stats
    }

    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        self.agents.iter().map(Agent::snapshot).collect()
    }

    /// SHA-256 over the serialized snapshot, lowercase hex.
    pub fn state_digest(&self) -> String {
        let mut hasher = Sha256::new();
        match serde_json::to_vec(&self.snapshot()) {
            Ok(bytes) => hasher.update(&bytes),
            Err(error) => warn!(error = %error, "state_digest_serialize_failed"),
        }
        to_hex_lower(&hasher.finalize())
    }

    fn index_of(&self, agent_id: AgentId) -> Option<usize> {
        self.agents
            .binary_search_by_key(&agent_id, |agent| agent.id)
            .ok()
    }
}

/// States peripheral triggers may put a calm agent into.
fn is_triggerable(state: AgentState) -> bool {
    state.is_passive_flavor() || matches!(state, AgentState::Following | AgentState::Demolishing)
}

fn to_hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
