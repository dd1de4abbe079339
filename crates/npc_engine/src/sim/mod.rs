mod agent;
mod arrest;
mod escalation;
mod events;
mod math;
mod orchestrator;
mod player;
mod requests;
mod shelter;
mod tuning;
mod world;

pub use agent::{
    Agent, AgentId, AgentKind, AgentSnapshot, AgentState, AgentStats, AgentTimers, SpeechLine,
};
pub use arrest::{ArrestNotifier, ArrestReport, ArrestSession};
pub use escalation::{
    aggressive_no_steal_guard, next_state, notorious_skip, shelter_de_escalation,
    steal_on_proximity, EscalationInput,
};
pub use events::{DespawnReason, EventSink, SimEvent, SimEventBus, SimEventCounts, SimEventKind};
pub use math::Vec3;
pub use orchestrator::{FrameStats, NpcManager};
pub use player::{
    Inventory, ItemKind, Player, Reputation, ReputationThresholds, ReputationTier,
    PLAYER_MAX_HEALTH, THEFT_PRIORITY,
};
pub use requests::{SimRequest, SimRequestApplyStats, SimRequestKind};
pub use shelter::{
    is_sheltered, SHELTER_MAX_ROOF_HEIGHT, SHELTER_MAX_WALL_DISTANCE, SHELTER_MIN_WALLS,
};
pub use tuning::{ConfigError, SimTuning, POPULATION_CAP};
pub use world::{BlockKind, VoxelWorld, WorldError, WorldQuery};
