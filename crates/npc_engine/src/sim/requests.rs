use super::agent::{AgentId, AgentState};
use super::math::Vec3;

/// Peripheral-system requests. Queued on the orchestrator and applied in the
/// spawn/despawn phase of the next frame (or by an explicit flush).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimRequest {
    Despawn {
        agent_id: AgentId,
    },
    ForceState {
        agent_id: AgentId,
        state: AgentState,
    },
    KnockOut {
        agent_id: AgentId,
    },
    Revive {
        agent_id: AgentId,
    },
    AlertHostilesNear {
        center: Vec3,
        radius: f32,
    },
    TriggerFlavor {
        agent_id: AgentId,
        state: AgentState,
    },
    ReleaseFlavor {
        agent_id: AgentId,
    },
    DamageAgent {
        agent_id: AgentId,
        amount: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimRequestKind {
    Despawn,
    ForceState,
    KnockOut,
    Revive,
    AlertHostilesNear,
    TriggerFlavor,
    ReleaseFlavor,
    DamageAgent,
}

impl SimRequest {
    pub fn kind(self) -> SimRequestKind {
        match self {
            Self::Despawn { .. } => SimRequestKind::Despawn,
            Self::ForceState { .. } => SimRequestKind::ForceState,
            Self::KnockOut { .. } => SimRequestKind::KnockOut,
            Self::Revive { .. } => SimRequestKind::Revive,
            Self::AlertHostilesNear { .. } => SimRequestKind::AlertHostilesNear,
            Self::TriggerFlavor { .. } => SimRequestKind::TriggerFlavor,
            Self::ReleaseFlavor { .. } => SimRequestKind::ReleaseFlavor,
            Self::DamageAgent { .. } => SimRequestKind::DamageAgent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimRequestApplyStats {
    pub total: u32,
    pub despawn: u32,
    pub force_state: u32,
    pub knock_out: u32,
    pub revive: u32,
    pub alert_hostiles_near: u32,
    pub trigger_flavor: u32,
    pub release_flavor: u32,
    pub damage_agent: u32,
    /// Requests naming an agent that no longer exists.
    pub invalid_target_count: u32,
    /// Requests naming a live agent whose current state refuses them.
    pub refused_count: u32,
    pub spawned_agent_ids: Vec<AgentId>,
}

impl SimRequestApplyStats {
    pub(crate) fn record_request(&mut self, kind: SimRequestKind) {
        self.total = self.total.saturating_add(1);
        let slot = match kind {
            SimRequestKind::Despawn => &mut self.despawn,
            SimRequestKind::ForceState => &mut self.force_state,
            SimRequestKind::KnockOut => &mut self.knock_out,
            SimRequestKind::Revive => &mut self.revive,
            SimRequestKind::AlertHostilesNear => &mut self.alert_hostiles_near,
            SimRequestKind::TriggerFlavor => &mut self.trigger_flavor,
            SimRequestKind::ReleaseFlavor => &mut self.release_flavor,
            SimRequestKind::DamageAgent => &mut self.damage_agent,
        };
        *slot = slot.saturating_add(1);
    }

    pub(crate) fn record_invalid_target(&mut self) {
        self.invalid_target_count = self.invalid_target_count.saturating_add(1);
    }

    pub(crate) fn record_refused(&mut self) {
        self.refused_count = self.refused_count.saturating_add(1);
    }
}

#[derive(Debug, Default)]
pub(crate) struct SimRequestQueue {
    requests: Vec<SimRequest>,
    last_apply_stats: SimRequestApplyStats,
}

impl SimRequestQueue {
    pub(crate) fn enqueue(&mut self, request: SimRequest) {
        self.requests.push(request);
    }

    pub(crate) fn drain(&mut self) -> Vec<SimRequest> {
        std::mem::take(&mut self.requests)
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn set_last_apply_stats(&mut self, stats: SimRequestApplyStats) {
        self.last_apply_stats = stats;
    }

    pub(crate) fn last_apply_stats(&self) -> &SimRequestApplyStats {
        &self.last_apply_stats
    }
}
