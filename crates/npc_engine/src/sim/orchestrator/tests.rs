use std::cell::Cell;
use std::rc::Rc;

use super::*;
use crate::sim::arrest::ArrestReport;
use crate::sim::player::{ItemKind, Reputation};
use crate::sim::world::VoxelWorld;

struct Harness {
    npcs: NpcManager,
    world: VoxelWorld,
    player: Player,
    inventory: Inventory,
    events: Vec<SimEvent>,
}

impl Harness {
    fn new(tuning: SimTuning, player_position: Vec3) -> Self {
        let mut world = VoxelWorld::new();
        world.lay_ground(40, 0);
        Self {
            npcs: NpcManager::new(tuning, AgentDefDatabase::builtin()).expect("valid tuning"),
            world,
            player: Player::new(player_position),
            inventory: Inventory::new(),
            events: Vec::new(),
        }
    }

    fn with_defaults(player_position: Vec3) -> Self {
        Self::new(SimTuning::default(), player_position)
    }

    fn spawn_live(&mut self, kind: AgentKind, position: Vec3) -> AgentId {
        let id = self.npcs.spawn(kind, position).expect("below cap");
        self.flush();
        id
    }

    fn flush(&mut self) {
        self.npcs.apply_pending(&mut self.events);
    }

    fn tick(&mut self, dt: f32) {
        self.npcs.advance(
            dt,
            &self.world,
            &mut self.player,
            &mut self.inventory,
            &mut self.events,
        );
    }

    fn state_of(&self, id: AgentId) -> Option<AgentState> {
        self.npcs.agent(id).map(Agent::state)
    }

    fn make_notorious(&mut self) {
        let points = self.npcs.tuning().reputation_thresholds.notorious + 10.0;
        self.player.reputation = Reputation::with_points(points);
    }

    fn count_events(&self, predicate: impl Fn(&SimEvent) -> bool) -> usize {
        self.events.iter().filter(|event| predicate(event)).count()
    }
}

const FRAME: f32 = 0.1;
/// Far enough that nothing reacts to the player, close enough that nothing
/// wanders past the despawn radius.
const FAR_PLAYER: Vec3 = Vec3::new(60.0, 1.0, 0.0);

#[test]
fn knocked_out_agent_never_moves_the_player() {
    let start = Vec3::new(0.0, 1.0, 0.0);
    let mut h = Harness::with_defaults(start);
    let id = h.npcs.spawn(AgentKind::GangMember, start).expect("spawn");
    h.npcs.request_knock_out(id);
    h.flush();
    assert_eq!(h.state_of(id), Some(AgentState::KnockedOut));

    for _ in 0..200 {
        h.tick(FRAME);
        assert_eq!(h.player.position, start);
    }
    assert_eq!(h.state_of(id), Some(AgentState::KnockedOut));
    assert_eq!(h.player.health, crate::sim::player::PLAYER_MAX_HEALTH);
}

#[test]
fn knocked_out_attacker_deals_no_damage() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    let id = h.spawn_live(AgentKind::GangMember, Vec3::new(1.0, 1.0, 0.0));
    h.npcs.request_state(id, AgentState::Aggressive);
    h.npcs.request_knock_out(id);
    h.flush();
    for _ in 0..50 {
        h.tick(FRAME);
    }
    assert_eq!(h.count_events(|e| matches!(e, SimEvent::AttackLanded { .. })), 0);
    assert_eq!(h.player.health, crate::sim::player::PLAYER_MAX_HEALTH);
}

#[test]
fn warning_police_never_damage_the_player() {
    let tuning = SimTuning::default();
    // Between the aggressive and warn radii: close enough to warn, never to attack.
    let distance = (tuning.warn_radius + tuning.aggressive_radius) / 2.0;
    let mut h = Harness::new(tuning, Vec3::new(0.0, 1.0, 0.0));
    let id = h.spawn_live(AgentKind::Police, Vec3::new(distance, 1.0, 0.0));
    h.npcs.request_state(id, AgentState::Warning);
    h.flush();

    for _ in 0..300 {
        h.tick(FRAME);
        assert_eq!(h.state_of(id), Some(AgentState::Warning));
    }
    assert_eq!(h.player.health, crate::sim::player::PLAYER_MAX_HEALTH);
}

#[test]
fn patrolling_police_outside_a_shelter_never_damage_the_player() {
    let mut h = Harness::with_defaults(Vec3::new(2.5, 1.0, 2.5));
    h.world.build_hut((0, 1, 0), 4, 4, 3);
    h.make_notorious();
    let id = h.spawn_live(AgentKind::Police, Vec3::new(-2.0, 1.0, 2.5));

    for _ in 0..100 {
        h.tick(FRAME);
        assert_eq!(h.state_of(id), Some(AgentState::Patrolling));
    }
    assert_eq!(h.player.health, crate::sim::player::PLAYER_MAX_HEALTH);
}

#[test]
fn aggressive_gang_member_in_steal_range_keeps_fighting() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    h.inventory.add(ItemKind::Cash, 5);
    let id = h.spawn_live(AgentKind::GangMember, Vec3::new(1.0, 1.0, 0.0));
    h.npcs.request_state(id, AgentState::Aggressive);
    h.flush();

    for _ in 0..60 {
        h.tick(FRAME);
        assert_eq!(h.state_of(id), Some(AgentState::Aggressive));
        let distance = h
            .npcs
            .agent(id)
            .expect("alive")
            .position()
            .horizontal_distance(h.player.position);
        assert!(distance <= h.npcs.tuning().steal_radius);
    }
    assert_eq!(h.count_events(|e| matches!(e, SimEvent::ItemStolen { .. })), 0);
    assert_eq!(h.inventory.count(ItemKind::Cash), 5);
    assert!(h.count_events(|e| matches!(e, SimEvent::AttackLanded { .. })) > 0);
    assert!(h.player.health < crate::sim::player::PLAYER_MAX_HEALTH);
}

#[test]
fn wandering_gang_member_steals_then_flees() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    h.inventory.add(ItemKind::Cash, 2);
    h.inventory.add(ItemKind::Wood, 1);
    let id = h.spawn_live(AgentKind::GangMember, Vec3::new(0.8, 1.0, 0.0));

    h.tick(FRAME);
    assert_eq!(h.state_of(id), Some(AgentState::Stealing));
    for _ in 0..15 {
        h.tick(FRAME);
    }
    assert_eq!(h.state_of(id), Some(AgentState::Fleeing));
    assert_eq!(
        h.count_events(|e| matches!(
            e,
            SimEvent::ItemStolen {
                item: ItemKind::Cash,
                ..
            }
        )),
        1
    );
    assert_eq!(h.inventory.count(ItemKind::Cash), 1);
    assert_eq!(
        h.npcs.agent(id).and_then(Agent::carried_item),
        Some(ItemKind::Cash)
    );
}

#[test]
fn theft_is_abandoned_once_the_player_is_sheltered() {
    let mut h = Harness::with_defaults(Vec3::new(-4.0, 1.0, -4.0));
    h.world.build_hut((0, 1, 0), 4, 4, 3);
    h.inventory.add(ItemKind::Cash, 5);
    let id = h.spawn_live(AgentKind::GangMember, Vec3::new(-3.2, 1.0, -4.0));

    h.tick(FRAME);
    assert_eq!(h.state_of(id), Some(AgentState::Stealing));

    h.player.position = Vec3::new(2.5, 1.0, 2.5);
    for _ in 0..20 {
        h.tick(FRAME);
    }
    assert_eq!(h.inventory.count(ItemKind::Cash), 5);
    assert_eq!(h.count_events(|e| matches!(e, SimEvent::ItemStolen { .. })), 0);
    assert_eq!(h.npcs.agent(id).and_then(Agent::carried_item), None);
    assert_ne!(h.state_of(id), Some(AgentState::Stealing));
}

#[test]
fn theft_is_abandoned_when_the_player_walks_out_of_reach() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    h.inventory.add(ItemKind::Cash, 2);
    let id = h.spawn_live(AgentKind::GangMember, Vec3::new(0.8, 1.0, 0.0));

    h.tick(FRAME);
    assert_eq!(h.state_of(id), Some(AgentState::Stealing));

    h.player.position = Vec3::new(-4.0, 1.0, 0.0);
    for _ in 0..15 {
        h.tick(FRAME);
    }
    assert_eq!(h.inventory.count(ItemKind::Cash), 2);
    assert_eq!(h.count_events(|e| matches!(e, SimEvent::ItemStolen { .. })), 0);
}

#[test]
fn shelter_sends_arresting_officer_back_to_patrol_and_clears_the_session() {
    let outside = Vec3::new(-5.5, 1.0, -5.5);
    let mut h = Harness::with_defaults(outside);
    h.world.build_hut((0, 1, 0), 4, 4, 3);
    h.make_notorious();
    let id = h.spawn_live(AgentKind::Police, Vec3::new(-5.5, 1.0, -4.5));

    let mut ticks = 0;
    while h.npcs.arrest_session().is_none() {
        h.tick(FRAME);
        ticks += 1;
        assert!(ticks <= 5, "arrest should start quickly");
    }
    assert_eq!(h.state_of(id), Some(AgentState::Arresting));

    h.player.position = Vec3::new(2.5, 1.0, 2.5);
    h.tick(FRAME);
    assert_eq!(h.state_of(id), Some(AgentState::Patrolling));
    assert_eq!(h.npcs.arrest_session(), None);
    assert_eq!(
        h.count_events(|e| matches!(e, SimEvent::ArrestCancelled { agent_id } if *agent_id == id)),
        1
    );

    for _ in 0..20 {
        h.tick(FRAME);
        assert_eq!(h.state_of(id), Some(AgentState::Patrolling));
    }
    assert_eq!(h.count_events(|e| matches!(e, SimEvent::ArrestCompleted { .. })), 0);

    // Stepping back outside near the officer re-escalates.
    let officer = h.npcs.agent(id).expect("officer").position();
    h.player.position = Vec3::new(officer.x, 1.0, officer.z - 2.0);
    let mut escalated = false;
    for _ in 0..3 {
        h.tick(FRAME);
        if h.state_of(id) != Some(AgentState::Patrolling) {
            escalated = true;
            break;
        }
    }
    assert!(escalated);
}

#[test]
fn shelter_de_escalates_aggressive_gang_member() {
    let mut h = Harness::with_defaults(Vec3::new(-6.0, 1.0, -6.0));
    h.world.build_hut((0, 1, 0), 4, 4, 3);
    let id = h.spawn_live(AgentKind::GangMember, Vec3::new(-10.0, 1.0, -6.0));
    h.npcs.request_state(id, AgentState::Aggressive);
    h.flush();

    h.player.position = Vec3::new(1.5, 1.0, 1.5);
    h.tick(FRAME);
    assert_eq!(h.state_of(id), Some(AgentState::Patrolling));
}

#[test]
fn gang_member_warns_again_when_an_unknown_player_leaves_shelter() {
    let mut h = Harness::with_defaults(Vec3::new(-6.0, 1.0, -6.0));
    h.world.build_hut((0, 1, 0), 4, 4, 3);
    let id = h.spawn_live(AgentKind::GangMember, Vec3::new(-10.0, 1.0, -6.0));
    h.npcs.request_state(id, AgentState::Aggressive);
    h.flush();

    h.player.position = Vec3::new(1.5, 1.0, 1.5);
    h.tick(FRAME);
    assert_eq!(h.state_of(id), Some(AgentState::Patrolling));

    // Outside again, inside warn range but beyond the aggressive radius.
    let thug = h.npcs.agent(id).expect("gang member").position();
    h.player.position = Vec3::new(thug.x + 8.0, 1.0, -6.0);
    assert_eq!(
        h.player.reputation.tier(&h.npcs.tuning().reputation_thresholds),
        crate::sim::player::ReputationTier::Nobody
    );
    h.tick(FRAME);
    assert_eq!(h.state_of(id), Some(AgentState::Warning));
}

#[test]
fn opening_the_door_of_a_three_walled_room_ends_shelter() {
    let mut h = Harness::with_defaults(Vec3::new(2.5, 1.0, 1.5));
    let door = h.world.build_hut((0, 1, 0), 4, 4, 3);
    for z in -1..=4 {
        h.world.set_block(4, 1, z, crate::sim::world::BlockKind::Air);
    }
    h.player.position = Vec3::new(door.0 as f32 + 0.5, 1.0, 1.5);
    let id = h.spawn_live(
        AgentKind::Police,
        Vec3::new(door.0 as f32 + 0.5, 1.0, -3.0),
    );

    for _ in 0..5 {
        h.tick(FRAME);
    }
    assert_eq!(h.state_of(id), Some(AgentState::Patrolling));

    h.world
        .set_door_open(door.0, door.1, door.2, true)
        .expect("door");
    h.tick(FRAME);
    assert_eq!(h.state_of(id), Some(AgentState::Warning));
}

fn populate_far_from_player(h: &mut Harness) -> Vec<AgentId> {
    let spots = [
        (AgentKind::Police, Vec3::new(0.0, 1.0, 0.0)),
        (AgentKind::GangMember, Vec3::new(5.0, 1.0, 5.0)),
        (AgentKind::Pedestrian, Vec3::new(-5.0, 1.0, 5.0)),
        (AgentKind::Tourist, Vec3::new(-5.0, 1.0, -5.0)),
        (AgentKind::Shopkeeper, Vec3::new(10.0, 1.0, 0.0)),
        (AgentKind::Dog, Vec3::new(0.0, 1.0, 10.0)),
        (AgentKind::Pigeon, Vec3::new(-10.0, 1.0, 0.0)),
        (AgentKind::CouncilBuilder, Vec3::new(0.0, 1.0, -10.0)),
    ];
    spots
        .into_iter()
        .map(|(kind, position)| h.npcs.spawn(kind, position).expect("spawn"))
        .collect()
}

#[test]
fn many_small_deltas_match_one_large_delta() {
    let mut fine = Harness::with_defaults(FAR_PLAYER);
    let mut coarse = Harness::with_defaults(FAR_PLAYER);
    let ids = populate_far_from_player(&mut fine);
    populate_far_from_player(&mut coarse);
    fine.flush();
    coarse.flush();

    for _ in 0..40 {
        fine.tick(0.25);
    }
    coarse.tick(10.0);

    for id in ids {
        let a = fine.npcs.agent(id).expect("fine agent");
        let b = coarse.npcs.agent(id).expect("coarse agent");
        assert_eq!(a.state(), b.state(), "{:?}", a.kind());
        assert!(
            a.position().distance(b.position()) < 1.0e-3,
            "{:?}: {:?} vs {:?}",
            a.kind(),
            a.position(),
            b.position()
        );
        assert!((a.timers().state - b.timers().state).abs() < 1.0e-3);
        assert!((a.timers().idle - b.timers().idle).abs() < 1.0e-3);
        assert!((a.timers().animation - b.timers().animation).abs() < 1.0e-3);
    }
}

#[test]
fn single_long_pause_fast_forwards_through_several_thresholds() {
    let mut h = Harness::with_defaults(FAR_PLAYER);
    let id = h.spawn_live(AgentKind::Pedestrian, Vec3::ZERO);
    assert_eq!(h.state_of(id), Some(AgentState::Wandering));

    // wander 4s -> idle 3s -> wandering again with 3s into the cycle.
    h.tick(10.0);
    let changes = h.count_events(
        |e| matches!(e, SimEvent::StateChanged { agent_id, .. } if *agent_id == id),
    );
    assert_eq!(changes, 2);
    assert_eq!(h.state_of(id), Some(AgentState::Wandering));
    assert!((h.npcs.agent(id).expect("agent").timers().state - 3.0).abs() < 1.0e-4);
}

#[test]
fn zero_delta_changes_nothing() {
    let mut h = Harness::with_defaults(FAR_PLAYER);
    populate_far_from_player(&mut h);
    h.flush();
    for _ in 0..7 {
        h.tick(FRAME);
    }
    let before = h.npcs.agents().to_vec();
    let reputation_before = h.player.reputation;
    for _ in 0..10 {
        h.tick(0.0);
    }
    assert_eq!(h.npcs.agents(), before.as_slice());
    assert_eq!(h.player.reputation, reputation_before);
}

#[test]
fn population_never_exceeds_cap() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    let mut accepted = 0;
    for i in 0..(POPULATION_CAP * 3) {
        let position = Vec3::new((i % 10) as f32 * 3.0, 1.0, (i / 10) as f32 * 3.0);
        if h.npcs.spawn(AgentKind::Pedestrian, position).is_some() {
            accepted += 1;
        }
        assert!(h.npcs.population() <= POPULATION_CAP);
    }
    assert_eq!(accepted, POPULATION_CAP);
    assert!(h
        .npcs
        .spawn_reinforcements(AgentKind::Police, Vec3::ZERO)
        .is_empty());
    assert!(h.npcs.spawn_named(AgentKind::Police, Vec3::ZERO, "Sgt. Pike").is_none());

    h.flush();
    assert_eq!(h.npcs.agents().len(), POPULATION_CAP);
    for _ in 0..20 {
        h.tick(FRAME);
        assert!(h.npcs.population() <= POPULATION_CAP);
    }
}

#[test]
fn reinforcements_refused_at_cap_leave_placement_untouched() {
    let fill = |h: &mut Harness| {
        for i in 0..POPULATION_CAP {
            let position = Vec3::new((i % 10) as f32 * 3.0, 1.0, (i / 10) as f32 * 3.0);
            h.npcs.spawn(AgentKind::Pedestrian, position).expect("below cap");
        }
        h.flush();
    };
    let mut refused = Harness::with_defaults(FAR_PLAYER);
    let mut control = Harness::with_defaults(FAR_PLAYER);
    fill(&mut refused);
    fill(&mut control);

    assert!(refused
        .npcs
        .spawn_reinforcements(AgentKind::GangMember, Vec3::ZERO)
        .is_empty());

    let mut placements = Vec::new();
    for h in [&mut refused, &mut control] {
        let victim = h.npcs.agents()[0].id();
        h.npcs.request_despawn(victim);
        h.flush();
        let ids = h.npcs.spawn_reinforcements(AgentKind::GangMember, Vec3::ZERO);
        assert_eq!(ids.len(), 1);
        h.flush();
        placements.push((ids[0], h.npcs.agent(ids[0]).map(Agent::position)));
    }
    assert_eq!(placements[0], placements[1]);
}

#[test]
fn despawned_ids_are_not_reused() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    let first = h.spawn_live(AgentKind::Pigeon, Vec3::new(20.0, 1.0, 0.0));
    h.npcs.request_despawn(first);
    h.flush();
    assert!(h.npcs.agent(first).is_none());
    let second = h.spawn_live(AgentKind::Pigeon, Vec3::new(20.0, 1.0, 0.0));
    assert_ne!(first, second);
    assert!(second > first);
}

#[test]
fn notorious_player_skips_warning_entirely() {
    let tuning = SimTuning {
        reputation_decay_per_second: 0.0,
        ..SimTuning::default()
    };
    let threshold = tuning.reputation_thresholds.notorious;
    let mut h = Harness::new(tuning, Vec3::new(0.0, 1.0, 0.0));
    h.player.reputation = Reputation::with_points(threshold);
    let id = h.spawn_live(AgentKind::Police, Vec3::new(1.0, 1.0, 0.0));

    let mut reached_aggressive = false;
    for _ in 0..10 {
        h.tick(1.0 / 60.0);
        let state = h.state_of(id).expect("officer");
        assert_ne!(state, AgentState::Warning);
        if state == AgentState::Aggressive {
            reached_aggressive = true;
        }
    }
    assert!(reached_aggressive);
    assert_eq!(
        h.count_events(|e| matches!(
            e,
            SimEvent::StateChanged {
                to: AgentState::Warning,
                ..
            }
        )),
        0
    );
}

#[test]
fn coincident_agent_pushes_player_a_fixed_step() {
    let start = Vec3::new(3.0, 1.0, 3.0);
    let mut h = Harness::with_defaults(start);
    let id = h.spawn_live(AgentKind::Shopkeeper, start);

    h.tick(1.0 / 60.0);

    let agent = h.npcs.agent(id).expect("shopkeeper").position();
    let gap = agent.horizontal_distance(h.player.position);
    let step = h.npcs.tuning().collision_push_step;
    assert!((gap - step).abs() < 1.0e-5);
    assert!(gap > 0.0);
    assert!(h.player.position.is_finite());
}

#[test]
fn vertical_separation_disables_push() {
    let start = Vec3::new(3.0, 1.0, 3.0);
    let mut h = Harness::with_defaults(start);
    h.spawn_live(AgentKind::Shopkeeper, Vec3::new(3.0, 4.0, 3.0));
    h.tick(FRAME);
    assert_eq!(h.player.position, start);
}

#[derive(Clone, Default)]
struct CountingNotifier {
    calls: Rc<Cell<u32>>,
}

impl ArrestNotifier for CountingNotifier {
    fn on_arrest(&mut self, _report: &ArrestReport) {
        self.calls.set(self.calls.get() + 1);
    }
}

fn run_arrest(h: &mut Harness, officer: AgentId) {
    for _ in 0..300 {
        h.tick(FRAME);
        if h.npcs.agent(officer).is_none() {
            break;
        }
    }
    for _ in 0..50 {
        h.tick(FRAME);
    }
}

#[test]
fn arrest_applies_consequences_exactly_once_without_notifier() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    h.make_notorious();
    h.inventory.add(ItemKind::Crowbar, 1);
    h.inventory.add(ItemKind::SprayCan, 2);
    h.inventory.add(ItemKind::Food, 4);
    let officer = h.spawn_live(AgentKind::Police, Vec3::new(1.0, 1.0, 0.0));

    run_arrest(&mut h, officer);

    assert_eq!(
        h.count_events(|e| matches!(e, SimEvent::ArrestCompleted { .. })),
        1
    );
    assert_eq!(h.player.position, h.npcs.tuning().arrest_safe_location);
    assert_eq!(h.player.reputation.points(), 0.0);
    assert_eq!(h.inventory.count(ItemKind::Crowbar), 0);
    assert_eq!(h.inventory.count(ItemKind::SprayCan), 0);
    assert_eq!(h.inventory.count(ItemKind::Food), 4);
    assert!(h.npcs.agent(officer).is_none());
    assert_eq!(h.npcs.arrest_session(), None);
    assert_eq!(
        h.count_events(|e| matches!(
            e,
            SimEvent::Despawned {
                reason: DespawnReason::Arrest,
                ..
            }
        )),
        1
    );
}

#[test]
fn arrest_notifier_is_called_once() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    let notifier = CountingNotifier::default();
    let calls = Rc::clone(&notifier.calls);
    h.npcs.set_arrest_notifier(Some(Box::new(notifier)));
    h.make_notorious();
    let officer = h.spawn_live(AgentKind::Police, Vec3::new(1.0, 1.0, 0.0));

    run_arrest(&mut h, officer);
    assert_eq!(calls.get(), 1);
}

#[test]
fn only_one_arrest_is_in_flight() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    h.make_notorious();
    let first = h.spawn_live(AgentKind::Police, Vec3::new(1.0, 1.0, 0.0));
    let second = h.spawn_live(AgentKind::Police, Vec3::new(-1.0, 1.0, 0.0));

    let mut completed = false;
    for _ in 0..100 {
        h.tick(FRAME);
        let arresting = h.npcs.agents_in_state(AgentState::Arresting).count();
        assert!(arresting <= 1);
        if h.count_events(|e| matches!(e, SimEvent::ArrestCompleted { .. })) > 0 {
            completed = true;
            break;
        }
    }
    assert!(completed);
    assert_eq!(
        h.count_events(|e| matches!(e, SimEvent::ArrestStarted { .. })),
        1
    );
    let survivor = if h.npcs.agent(first).is_some() {
        first
    } else {
        second
    };
    assert_eq!(h.state_of(survivor), Some(AgentState::Patrolling));
}

fn capture_then_incapacitate_officer(incapacitate: impl Fn(&mut NpcManager, AgentId)) -> Harness {
    let start = Vec3::new(0.0, 1.0, 0.0);
    let mut h = Harness::with_defaults(start);
    h.make_notorious();
    h.inventory.add(ItemKind::Crowbar, 1);
    let officer = h.spawn_live(AgentKind::Police, Vec3::new(1.0, 1.0, 0.0));

    let mut ticks = 0;
    while h.npcs.arrest_session().is_none() {
        h.tick(FRAME);
        ticks += 1;
        assert!(ticks <= 5, "arrest should start quickly");
    }
    for _ in 0..19 {
        h.tick(FRAME);
    }
    assert_eq!(h.count_events(|e| matches!(e, SimEvent::ArrestCompleted { .. })), 0);

    // The arrest timer runs out in this tick, the request lands after it.
    incapacitate(&mut h.npcs, officer);
    h.tick(0.2);
    h
}

fn assert_arrest_dropped(h: &Harness) {
    assert_eq!(h.count_events(|e| matches!(e, SimEvent::ArrestCompleted { .. })), 0);
    assert_eq!(h.count_events(|e| matches!(e, SimEvent::ArrestCancelled { .. })), 1);
    assert_eq!(h.npcs.arrest_session(), None);
    assert_ne!(h.player.position, h.npcs.tuning().arrest_safe_location);
    assert_eq!(h.inventory.count(ItemKind::Crowbar), 1);
    assert!(h.player.reputation.points() > 0.0);
}

#[test]
fn officer_killed_as_capture_completes_releases_the_player() {
    let h = capture_then_incapacitate_officer(|npcs, officer| npcs.damage_agent(officer, 10_000.0));
    assert_eq!(
        h.count_events(|e| matches!(
            e,
            SimEvent::Despawned {
                reason: DespawnReason::Died,
                ..
            }
        )),
        1
    );
    assert_arrest_dropped(&h);
}

#[test]
fn officer_knocked_out_as_capture_completes_releases_the_player() {
    let h = capture_then_incapacitate_officer(|npcs, officer| npcs.request_knock_out(officer));
    assert_arrest_dropped(&h);
}

#[test]
fn dodging_turns_attacks_into_misses() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    h.player.dodging = true;
    let id = h.spawn_live(AgentKind::GangMember, Vec3::new(1.0, 1.0, 0.0));
    h.npcs.request_state(id, AgentState::Aggressive);
    h.flush();

    for _ in 0..30 {
        h.tick(FRAME);
    }
    assert_eq!(h.player.health, crate::sim::player::PLAYER_MAX_HEALTH);
    assert!(h.count_events(|e| matches!(e, SimEvent::AttackMissed { .. })) >= 2);
    assert_eq!(h.count_events(|e| matches!(e, SimEvent::AttackLanded { .. })), 0);
}

#[test]
fn reinforcements_arrive_close_and_already_aggressive() {
    let around = Vec3::new(0.0, 1.0, 0.0);
    let mut h = Harness::with_defaults(around);
    let ids = h.npcs.spawn_reinforcements(AgentKind::GangMember, around);
    assert!((2..=3).contains(&ids.len()));
    h.flush();

    let tuning = h.npcs.tuning().clone();
    for id in &ids {
        let agent = h.npcs.agent(*id).expect("reinforcement");
        assert_eq!(agent.state(), AgentState::Aggressive);
        let distance = agent.position().horizontal_distance(around);
        assert!(distance >= tuning.reinforcement_min_distance - 1.0e-3);
        assert!(distance <= tuning.reinforcement_max_distance + 1.0e-3);
    }
    assert!(h
        .npcs
        .spawn_reinforcements(AgentKind::Tourist, around)
        .is_empty());
}

#[test]
fn damaging_agents_provokes_kind_specific_reactions() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    let thug = h.spawn_live(AgentKind::GangMember, Vec3::new(15.0, 1.0, 0.0));
    let walker = h.spawn_live(AgentKind::Pedestrian, Vec3::new(-15.0, 1.0, 0.0));
    let bird = h.spawn_live(AgentKind::Pigeon, Vec3::new(0.0, 1.0, 15.0));

    h.npcs.damage_agent(thug, 1.0);
    h.npcs.damage_agent(walker, 1.0);
    h.npcs.damage_agent(bird, 100.0);
    h.flush();

    assert_eq!(h.state_of(thug), Some(AgentState::Aggressive));
    assert_eq!(h.state_of(walker), Some(AgentState::Fleeing));
    assert!(h.npcs.agent(bird).is_none());
    assert_eq!(
        h.count_events(|e| matches!(
            e,
            SimEvent::Despawned {
                reason: DespawnReason::Died,
                ..
            }
        )),
        1
    );
}

#[test]
fn knocked_out_agent_only_accepts_revive() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    let id = h.spawn_live(AgentKind::Police, Vec3::new(12.0, 1.0, 0.0));
    h.npcs.request_knock_out(id);
    h.npcs.request_state(id, AgentState::Aggressive);
    h.flush();
    assert_eq!(h.state_of(id), Some(AgentState::KnockedOut));
    assert_eq!(h.npcs.last_request_stats().refused_count, 1);

    h.npcs.request_revive(id);
    h.flush();
    assert_eq!(h.state_of(id), Some(AgentState::Patrolling));
}

#[test]
fn requests_for_unknown_agents_are_counted_not_fatal() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    let ghost = AgentId(999);
    h.npcs.request_despawn(ghost);
    h.npcs.request_knock_out(ghost);
    h.npcs.damage_agent(ghost, 5.0);
    let stats = h.npcs.apply_pending(&mut h.events).clone();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.invalid_target_count, 3);
}

#[test]
fn distant_unnamed_agents_despawn_but_named_ones_stay() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    let far = Vec3::new(h.npcs.tuning().despawn_radius + 10.0, 1.0, 0.0);
    let extra = h.spawn_live(AgentKind::Shopkeeper, far);
    let named = h
        .npcs
        .spawn_named(AgentKind::Shopkeeper, far, "Mrs. Patel")
        .expect("named");
    h.flush();

    h.tick(FRAME);
    assert!(h.npcs.agent(extra).is_none());
    assert!(h.npcs.agent(named).is_some());
    assert_eq!(
        h.npcs.find_named("Mrs. Patel").map(Agent::id),
        Some(named)
    );
    assert!(h
        .npcs
        .spawn_named(AgentKind::Pedestrian, Vec3::ZERO, "Mrs. Patel")
        .is_none());
}

#[test]
fn flavor_triggers_enter_and_leave_passive_states() {
    let mut h = Harness::with_defaults(Vec3::new(50.0, 1.0, 0.0));
    let tourist = h.spawn_live(AgentKind::Tourist, Vec3::ZERO);
    h.npcs.trigger_flavor(tourist, AgentState::Photographing);
    h.flush();
    assert_eq!(h.state_of(tourist), Some(AgentState::Photographing));

    let photo = h.npcs.tuning().photograph_seconds;
    h.tick(photo);
    assert_eq!(h.state_of(tourist), Some(AgentState::Wandering));

    h.npcs.trigger_flavor(tourist, AgentState::AtPub);
    h.flush();
    assert_eq!(h.state_of(tourist), Some(AgentState::AtPub));
    h.npcs.release_flavor(tourist);
    h.flush();
    assert_eq!(h.state_of(tourist), Some(AgentState::Wandering));

    h.npcs.trigger_flavor(tourist, AgentState::Aggressive);
    h.flush();
    assert_eq!(h.state_of(tourist), Some(AgentState::Wandering));
    assert_eq!(h.npcs.last_request_stats().refused_count, 1);
}

#[test]
fn alert_only_escalates_hostiles_in_radius() {
    let mut h = Harness::with_defaults(Vec3::new(60.0, 1.0, 0.0));
    let near = h.spawn_live(AgentKind::Police, Vec3::new(2.0, 1.0, 0.0));
    let far = h.spawn_live(AgentKind::GangMember, Vec3::new(40.0, 1.0, 0.0));
    let walker = h.spawn_live(AgentKind::Pedestrian, Vec3::new(1.0, 1.0, 0.0));

    h.npcs.alert_hostiles_near(Vec3::ZERO, 10.0);
    h.flush();
    assert_eq!(h.state_of(near), Some(AgentState::Aggressive));
    assert_eq!(h.state_of(far), Some(AgentState::Wandering));
    assert_eq!(h.state_of(walker), Some(AgentState::Wandering));
}

#[test]
fn reputation_decays_while_the_simulation_runs() {
    let mut h = Harness::with_defaults(Vec3::new(0.0, 1.0, 0.0));
    h.player.reputation = Reputation::with_points(1.0);
    let rate = h.npcs.tuning().reputation_decay_per_second;
    for _ in 0..10 {
        h.tick(1.0);
    }
    assert!((h.player.reputation.points() - (1.0 - rate * 10.0)).abs() < 1.0e-4);
}

#[test]
fn queries_filter_by_kind_state_and_proximity() {
    let mut h = Harness::with_defaults(Vec3::new(90.0, 1.0, 0.0));
    h.spawn_live(AgentKind::Shopkeeper, Vec3::ZERO);
    h.spawn_live(AgentKind::Shopkeeper, Vec3::new(30.0, 1.0, 0.0));
    h.spawn_live(AgentKind::Police, Vec3::new(1.0, 1.0, 0.0));

    assert_eq!(h.npcs.agents_of_kind(AgentKind::Shopkeeper).count(), 2);
    assert_eq!(h.npcs.agents_in_state(AgentState::Patrolling).count(), 1);
    assert_eq!(h.npcs.agents_within(Vec3::ZERO, 5.0).count(), 2);
    assert_eq!(h.npcs.snapshot().len(), 3);
}

#[test]
fn identical_seeds_produce_identical_digests() {
    let mut a = Harness::with_defaults(FAR_PLAYER);
    let mut b = Harness::with_defaults(FAR_PLAYER);
    for h in [&mut a, &mut b] {
        populate_far_from_player(h);
        h.npcs.spawn_reinforcements(AgentKind::Police, Vec3::new(90.0, 1.0, 0.0));
        h.flush();
    }
    let initial = a.npcs.state_digest();
    assert_eq!(initial, b.npcs.state_digest());
    assert_eq!(initial.len(), 64);
    assert!(initial
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));

    for _ in 0..30 {
        a.tick(FRAME);
        b.tick(FRAME);
    }
    assert_eq!(a.npcs.state_digest(), b.npcs.state_digest());
    assert_ne!(a.npcs.state_digest(), initial);
}

#[test]
fn invalid_tuning_is_rejected_at_construction() {
    let tuning = SimTuning {
        warn_radius: 2.0,
        ..SimTuning::default()
    };
    assert!(NpcManager::new(tuning, AgentDefDatabase::builtin()).is_err());
}
