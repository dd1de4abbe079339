//! Escalation policy: a pure, total mapping from the per-tick escalation
//! context to an agent's next state.
//!
//! Rules are looked up by `(kind, state)` in [`rule_for`]. Combinations with
//! no entry resolve to [`hold`], which keeps the current state.

use super::agent::{AgentKind, AgentState};
use super::player::ReputationTier;
use super::tuning::SimTuning;

/// Ephemeral per-agent, per-tick input to the policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EscalationInput {
    pub kind: AgentKind,
    pub state: AgentState,
    /// Horizontal distance from the agent to the player.
    pub distance: f32,
    pub reputation_tier: ReputationTier,
    /// Always `false` for passive kinds; shelter is only checked for
    /// hostile-capable agents.
    pub sheltered: bool,
    pub player_dodging: bool,
}

type Rule = fn(&EscalationInput, &SimTuning) -> AgentState;

pub fn next_state(input: &EscalationInput, tuning: &SimTuning) -> AgentState {
    let rule = rule_for(input.kind, input.state);
    rule(input, tuning)
}

fn rule_for(kind: AgentKind, state: AgentState) -> Rule {
    use AgentKind::*;
    use AgentState::*;

    match (kind, state) {
        (_, KnockedOut) => hold,
        (Police, Idle | Wandering | Patrolling) => police_on_patrol,
        (Police | GangMember, Warning) => hostile_warning,
        (Police, Aggressive) => police_aggressive,
        (Police, Arresting) => police_arresting,
        (GangMember, Idle | Wandering | Patrolling) => gang_roaming,
        (GangMember, Aggressive) => gang_aggressive,
        (Pedestrian | Tourist, Idle | Wandering) => bystander_roaming,
        (Pigeon, Idle | Wandering) => pigeon_roaming,
        (Dog, Idle | Wandering) => dog_roaming,
        (Dog, ChasingPlayer) => dog_chasing,
        (_, Following) => follower,
        _ => hold,
    }
}

/// Stability default for unmodeled combinations.
fn hold(input: &EscalationInput, _tuning: &SimTuning) -> AgentState {
    input.state
}

/// A notorious player close enough makes a calm hostile agent go straight to
/// `Aggressive`, with no `Warning` step in between.
pub fn notorious_skip(input: &EscalationInput, tuning: &SimTuning) -> Option<AgentState> {
    let calm = matches!(
        input.state,
        AgentState::Idle | AgentState::Wandering | AgentState::Patrolling | AgentState::Warning
    );
    let hostile_kind = matches!(input.kind, AgentKind::Police | AgentKind::GangMember);
    (hostile_kind
        && calm
        && !input.sheltered
        && input.reputation_tier >= tuning.notorious_tier
        && input.distance <= tuning.notorious_skip_radius)
        .then_some(AgentState::Aggressive)
}

/// Gang members already in `Aggressive` are never diverted into theft by
/// proximity. Checked ahead of [`steal_on_proximity`].
pub fn aggressive_no_steal_guard(input: &EscalationInput) -> bool {
    input.kind.is_gang() && input.state == AgentState::Aggressive
}

/// Generic theft rule: a gang member within steal range starts stealing.
pub fn steal_on_proximity(input: &EscalationInput, tuning: &SimTuning) -> Option<AgentState> {
    (input.kind.is_gang() && !input.sheltered && input.distance <= tuning.steal_radius)
        .then_some(AgentState::Stealing)
}

/// What shelter does to a hostile agent: active pursuit collapses back to
/// patrol, anything else is frozen in place.
pub fn shelter_de_escalation(state: AgentState) -> AgentState {
    match state {
        AgentState::Warning | AgentState::Aggressive | AgentState::Arresting => {
            AgentState::Patrolling
        }
        other => other,
    }
}

fn gave_up(input: &EscalationInput, tuning: &SimTuning) -> bool {
    input.distance > tuning.pursuit_give_up_radius
}

fn police_on_patrol(input: &EscalationInput, tuning: &SimTuning) -> AgentState {
    if input.sheltered {
        return input.state;
    }
    if let Some(next) = notorious_skip(input, tuning) {
        return next;
    }
    if input.distance <= tuning.warn_radius {
        return AgentState::Warning;
    }
    input.state
}

fn hostile_warning(input: &EscalationInput, tuning: &SimTuning) -> AgentState {
    if input.sheltered {
        return shelter_de_escalation(input.state);
    }
    if gave_up(input, tuning) {
        return AgentState::Patrolling;
    }
    if let Some(next) = notorious_skip(input, tuning) {
        return next;
    }
    if input.distance <= tuning.aggressive_radius {
        return AgentState::Aggressive;
    }
    input.state
}

fn police_aggressive(input: &EscalationInput, tuning: &SimTuning) -> AgentState {
    if input.sheltered {
        return shelter_de_escalation(input.state);
    }
    if gave_up(input, tuning) {
        return AgentState::Patrolling;
    }
    if !input.player_dodging && input.distance <= tuning.arrest_radius {
        return AgentState::Arresting;
    }
    input.state
}

fn police_arresting(input: &EscalationInput, tuning: &SimTuning) -> AgentState {
    if input.sheltered {
        return shelter_de_escalation(input.state);
    }
    if input.player_dodging || input.distance > tuning.arrest_radius {
        return AgentState::Aggressive;
    }
    input.state
}

fn gang_roaming(input: &EscalationInput, tuning: &SimTuning) -> AgentState {
    if input.sheltered {
        return input.state;
    }
    if let Some(next) = notorious_skip(input, tuning) {
        return next;
    }
    if let Some(next) = steal_on_proximity(input, tuning) {
        return next;
    }
    let noticed = input.state == AgentState::Patrolling
        || input.reputation_tier >= tuning.gang_wander_warn_tier;
    if noticed && input.distance <= tuning.warn_radius {
        return AgentState::Warning;
    }
    input.state
}

fn gang_aggressive(input: &EscalationInput, tuning: &SimTuning) -> AgentState {
    if input.sheltered {
        return shelter_de_escalation(input.state);
    }
    if gave_up(input, tuning) {
        return AgentState::Patrolling;
    }
    if aggressive_no_steal_guard(input) {
        return AgentState::Aggressive;
    }
    steal_on_proximity(input, tuning).unwrap_or(input.state)
}

fn bystander_roaming(input: &EscalationInput, tuning: &SimTuning) -> AgentState {
    if input.reputation_tier >= tuning.notorious_tier && input.distance <= tuning.flee_radius {
        return AgentState::Fleeing;
    }
    input.state
}

fn pigeon_roaming(input: &EscalationInput, tuning: &SimTuning) -> AgentState {
    if input.distance <= tuning.pigeon_scatter_radius {
        return AgentState::Fleeing;
    }
    input.state
}

fn dog_roaming(input: &EscalationInput, tuning: &SimTuning) -> AgentState {
    if input.distance <= tuning.dog_chase_radius {
        return AgentState::ChasingPlayer;
    }
    input.state
}

fn dog_chasing(input: &EscalationInput, tuning: &SimTuning) -> AgentState {
    if input.distance > tuning.dog_give_up_radius {
        return AgentState::Wandering;
    }
    input.state
}

fn follower(input: &EscalationInput, tuning: &SimTuning) -> AgentState {
    if gave_up(input, tuning) {
        return AgentState::Wandering;
    }
    input.state
}
