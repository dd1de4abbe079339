//! Scripted demo: a small street with one hut, a mixed population and a
//! player who walks into shelter, opens menus and walks back out.

use npc_engine::{
    AgentKind, Inventory, ItemKind, NpcManager, Player, Reputation, Vec3, VoxelWorld,
};
use tracing::{info, warn};

use super::input::{InputAction, InputSnapshot};

const GROUND_HALF_EXTENT: i32 = 48;
const HUT_ORIGIN: (i32, i32, i32) = (0, 1, 0);
const HUT_WIDTH: i32 = 4;
const HUT_DEPTH: i32 = 4;
const HUT_HEIGHT: i32 = 3;
const WAYPOINT_ARRIVAL: f32 = 0.15;
const AXIS_DEADZONE: f32 = 0.05;
const STARTING_REPUTATION: f32 = 18.0;

pub(crate) const PLAYER_WALK_SPEED: f32 = 4.0;

pub(crate) struct DemoWorld {
    pub world: VoxelWorld,
    pub door: (i32, i32, i32),
}

pub(crate) fn build_world() -> DemoWorld {
    let mut world = VoxelWorld::new();
    world.lay_ground(GROUND_HALF_EXTENT, 0);
    let door = world.build_hut(HUT_ORIGIN, HUT_WIDTH, HUT_DEPTH, HUT_HEIGHT);
    info!(
        blocks = world.block_count(),
        door_x = door.0,
        door_y = door.1,
        door_z = door.2,
        "demo_world_built"
    );
    DemoWorld { world, door }
}

/// Point in the middle of the hut, on its floor.
pub(crate) fn hut_interior() -> Vec3 {
    Vec3::new(
        HUT_ORIGIN.0 as f32 + HUT_WIDTH as f32 / 2.0 + 0.5,
        HUT_ORIGIN.1 as f32,
        HUT_ORIGIN.2 as f32 + HUT_DEPTH as f32 / 2.0 + 0.5,
    )
}

pub(crate) fn starting_player() -> (Player, Inventory) {
    let mut player = Player::new(Vec3::new(-6.5, 1.0, -8.0));
    player.reputation = Reputation::with_points(STARTING_REPUTATION);
    let mut inventory = Inventory::new();
    inventory.add(ItemKind::Cash, 3);
    inventory.add(ItemKind::Food, 2);
    inventory.add(ItemKind::SprayCan, 1);
    (player, inventory)
}

/// Queues the demo population. Returns how many spawns were accepted.
pub(crate) fn populate(npcs: &mut NpcManager) -> usize {
    let unnamed = [
        (AgentKind::Police, Vec3::new(-9.0, 1.0, -14.0)),
        (AgentKind::Police, Vec3::new(12.0, 1.0, -6.0)),
        (AgentKind::GangMember, Vec3::new(-3.0, 1.0, -11.0)),
        (AgentKind::GangMember, Vec3::new(-12.0, 1.0, -4.0)),
        (AgentKind::Pedestrian, Vec3::new(6.0, 1.0, -10.0)),
        (AgentKind::Pedestrian, Vec3::new(-14.0, 1.0, 6.0)),
        (AgentKind::Tourist, Vec3::new(8.0, 1.0, 8.0)),
        (AgentKind::Dog, Vec3::new(-18.0, 1.0, -18.0)),
        (AgentKind::Pigeon, Vec3::new(-5.0, 1.0, -6.0)),
        (AgentKind::Pigeon, Vec3::new(-4.5, 1.0, -6.5)),
        (AgentKind::CouncilBuilder, Vec3::new(16.0, 1.0, 12.0)),
    ];
    let mut accepted = unnamed
        .into_iter()
        .filter_map(|(kind, position)| npcs.spawn(kind, position))
        .count();
    if npcs
        .spawn_named(AgentKind::Shopkeeper, Vec3::new(9.5, 1.0, 2.5), "Mrs. Okafor")
        .is_some()
    {
        accepted += 1;
    }
    info!(accepted, "demo_population_queued");
    accepted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cue {
    OpenDoor,
    CloseDoor,
    ShowMenu,
    HideMenu,
    StartDodge,
    StopDodge,
    CallReinforcements,
    Quit,
}

#[derive(Debug, Clone, Copy)]
struct TimedCue {
    at_seconds: f32,
    cue: Cue,
}

#[derive(Debug, Clone, Copy)]
struct Leg {
    from_seconds: f32,
    target: Vec3,
}

/// Simulation-time driven script of player intent and world cues.
#[derive(Debug, Clone)]
pub(crate) struct DemoScript {
    cues: Vec<TimedCue>,
    next_cue: usize,
    legs: Vec<Leg>,
    dodging: bool,
}

impl DemoScript {
    pub(crate) fn shelter_run(door: (i32, i32, i32)) -> Self {
        let door_x = door.0 as f32 + 0.5;
        let door_z = door.2 as f32 + 0.5;
        let legs = vec![
            Leg {
                from_seconds: 0.0,
                target: Vec3::new(-6.5, 1.0, -8.0),
            },
            Leg {
                from_seconds: 4.0,
                target: Vec3::new(door_x, 1.0, door_z - 2.0),
            },
            Leg {
                from_seconds: 7.0,
                target: hut_interior(),
            },
            // Tries to leave while the menu is up; the gate keeps it inside.
            Leg {
                from_seconds: 11.0,
                target: Vec3::new(door_x, 1.0, door_z - 5.0),
            },
            Leg {
                from_seconds: 22.0,
                target: Vec3::new(-4.0, 1.0, -12.0),
            },
        ];
        let cues = [
            (3.0, Cue::OpenDoor),
            (9.0, Cue::CloseDoor),
            (9.5, Cue::ShowMenu),
            (12.0, Cue::CallReinforcements),
            (14.0, Cue::OpenDoor),
            (14.0, Cue::HideMenu),
            (18.0, Cue::StartDodge),
            (19.0, Cue::StopDodge),
            (20.0, Cue::ShowMenu),
            (21.0, Cue::HideMenu),
            (28.0, Cue::Quit),
        ]
        .into_iter()
        .map(|(at_seconds, cue)| TimedCue { at_seconds, cue })
        .collect();
        Self {
            cues,
            next_cue: 0,
            legs,
            dodging: false,
        }
    }

    /// Cues whose time has come, each returned once.
    pub(crate) fn due_cues(&mut self, elapsed_seconds: f32) -> Vec<Cue> {
        let mut due = Vec::new();
        while let Some(timed) = self.cues.get(self.next_cue) {
            if timed.at_seconds > elapsed_seconds {
                break;
            }
            match timed.cue {
                Cue::StartDodge => self.dodging = true,
                Cue::StopDodge => self.dodging = false,
                _ => {}
            }
            due.push(timed.cue);
            self.next_cue += 1;
        }
        due
    }

    /// Movement keys steering the player toward the active leg's target.
    pub(crate) fn input_for(&self, elapsed_seconds: f32, player_position: Vec3) -> InputSnapshot {
        let mut input = InputSnapshot::default();
        input.set(InputAction::Dodge, self.dodging);
        let Some(leg) = self
            .legs
            .iter()
            .rev()
            .find(|leg| leg.from_seconds <= elapsed_seconds)
        else {
            return input;
        };
        if player_position.horizontal_distance(leg.target) <= WAYPOINT_ARRIVAL {
            return input;
        }
        let dx = leg.target.x - player_position.x;
        let dz = leg.target.z - player_position.z;
        if dx > AXIS_DEADZONE {
            input.set(InputAction::MoveEast, true);
        } else if dx < -AXIS_DEADZONE {
            input.set(InputAction::MoveWest, true);
        }
        if dz > AXIS_DEADZONE {
            input.set(InputAction::MoveNorth, true);
        } else if dz < -AXIS_DEADZONE {
            input.set(InputAction::MoveSouth, true);
        }
        input
    }
}

/// Opens or closes both halves of the hut door.
pub(crate) fn set_door(world: &mut VoxelWorld, door: (i32, i32, i32), open: bool) {
    for y in [door.1, door.1 + 1] {
        if let Err(error) = world.set_door_open(door.0, y, door.2, open) {
            warn!(error = %error, "door_toggle_failed");
        }
    }
    info!(open, "door_toggled");
}
