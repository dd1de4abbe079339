use super::agent::{AgentId, AgentKind, AgentState};
use super::math::Vec3;
use super::player::ItemKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DespawnReason {
    Died,
    Arrest,
    Distance,
    Requested,
}

/// Everything observable the simulation does in a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Spawned {
        agent_id: AgentId,
        kind: AgentKind,
        position: Vec3,
    },
    Despawned {
        agent_id: AgentId,
        reason: DespawnReason,
    },
    StateChanged {
        agent_id: AgentId,
        from: AgentState,
        to: AgentState,
    },
    AttackLanded {
        agent_id: AgentId,
        damage: f32,
        player_health: f32,
    },
    AttackMissed {
        agent_id: AgentId,
    },
    ItemStolen {
        agent_id: AgentId,
        item: ItemKind,
    },
    ArrestStarted {
        agent_id: AgentId,
    },
    ArrestCancelled {
        agent_id: AgentId,
    },
    ArrestCompleted {
        agent_id: AgentId,
        confiscated: Vec<(ItemKind, u32)>,
    },
    PlayerDowned {
        agent_id: AgentId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEventKind {
    Spawned,
    Despawned,
    StateChanged,
    AttackLanded,
    AttackMissed,
    ItemStolen,
    ArrestStarted,
    ArrestCancelled,
    ArrestCompleted,
    PlayerDowned,
}

impl SimEvent {
    pub fn kind(&self) -> SimEventKind {
        match self {
            Self::Spawned { .. } => SimEventKind::Spawned,
            Self::Despawned { .. } => SimEventKind::Despawned,
            Self::StateChanged { .. } => SimEventKind::StateChanged,
            Self::AttackLanded { .. } => SimEventKind::AttackLanded,
            Self::AttackMissed { .. } => SimEventKind::AttackMissed,
            Self::ItemStolen { .. } => SimEventKind::ItemStolen,
            Self::ArrestStarted { .. } => SimEventKind::ArrestStarted,
            Self::ArrestCancelled { .. } => SimEventKind::ArrestCancelled,
            Self::ArrestCompleted { .. } => SimEventKind::ArrestCompleted,
            Self::PlayerDowned { .. } => SimEventKind::PlayerDowned,
        }
    }
}

/// Caller-provided receiver for simulation events.
pub trait EventSink {
    fn emit(&mut self, event: SimEvent);
}

impl EventSink for Vec<SimEvent> {
    fn emit(&mut self, event: SimEvent) {
        self.push(event);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimEventCounts {
    pub total: u32,
    pub spawned: u32,
    pub despawned: u32,
    pub state_changed: u32,
    pub attack_landed: u32,
    pub attack_missed: u32,
    pub item_stolen: u32,
    pub arrest_started: u32,
    pub arrest_cancelled: u32,
    pub arrest_completed: u32,
    pub player_downed: u32,
}

impl SimEventCounts {
    fn record(&mut self, kind: SimEventKind) {
        self.total = self.total.saturating_add(1);
        let slot = match kind {
            SimEventKind::Spawned => &mut self.spawned,
            SimEventKind::Despawned => &mut self.despawned,
            SimEventKind::StateChanged => &mut self.state_changed,
            SimEventKind::AttackLanded => &mut self.attack_landed,
            SimEventKind::AttackMissed => &mut self.attack_missed,
            SimEventKind::ItemStolen => &mut self.item_stolen,
            SimEventKind::ArrestStarted => &mut self.arrest_started,
            SimEventKind::ArrestCancelled => &mut self.arrest_cancelled,
            SimEventKind::ArrestCompleted => &mut self.arrest_completed,
            SimEventKind::PlayerDowned => &mut self.player_downed,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Frame-scoped event buffer with counts for the last finished frame.
#[derive(Debug, Default)]
pub struct SimEventBus {
    current_frame_events: Vec<SimEvent>,
    last_frame_counts: SimEventCounts,
}

impl SimEventBus {
    pub fn iter_emitted_so_far(&self) -> impl Iterator<Item = &SimEvent> {
        self.current_frame_events.iter()
    }

    /// Folds the current frame into counts and returns its events.
    pub fn finish_frame(&mut self) -> Vec<SimEvent> {
        let mut counts = SimEventCounts::default();
        for event in &self.current_frame_events {
            counts.record(event.kind());
        }
        self.last_frame_counts = counts;
        std::mem::take(&mut self.current_frame_events)
    }

    pub fn last_frame_counts(&self) -> SimEventCounts {
        self.last_frame_counts
    }
}

impl EventSink for SimEventBus {
    fn emit(&mut self, event: SimEvent) {
        self.current_frame_events.push(event);
    }
}
