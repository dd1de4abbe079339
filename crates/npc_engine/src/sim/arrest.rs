use super::agent::AgentId;
use super::math::Vec3;
use super::player::{Inventory, ItemKind, Player};
use super::tuning::SimTuning;

/// The one arrest that may be in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrestSession {
    pub officer: AgentId,
    /// Set once the officer's arrest timer completes; consequences are
    /// applied when a completed session is taken from the slot.
    pub completed: bool,
}

/// Single-flight holder for [`ArrestSession`]. Every clearing operation is
/// idempotent.
#[derive(Debug, Default)]
pub(crate) struct ArrestSlot {
    session: Option<ArrestSession>,
}

impl ArrestSlot {
    pub(crate) fn active(&self) -> Option<ArrestSession> {
        self.session
    }

    /// Starts a session for `officer`. Fails while any session is held.
    pub(crate) fn try_begin(&mut self, officer: AgentId) -> bool {
        if self.session.is_some() {
            return false;
        }
        self.session = Some(ArrestSession {
            officer,
            completed: false,
        });
        true
    }

    pub(crate) fn mark_completed(&mut self, officer: AgentId) -> bool {
        match self.session.as_mut() {
            Some(session) if session.officer == officer && !session.completed => {
                session.completed = true;
                true
            }
            _ => false,
        }
    }

    /// Cancels an unfinished session naming `officer`. Returns whether
    /// anything was cleared.
    pub(crate) fn cancel_for(&mut self, officer: AgentId) -> bool {
        match self.session {
            Some(session) if session.officer == officer && !session.completed => {
                self.session = None;
                true
            }
            _ => false,
        }
    }

    /// Clears any session naming `officer`, completed or not.
    pub(crate) fn discard_for(&mut self, officer: AgentId) -> bool {
        if self.session.is_some_and(|session| session.officer == officer) {
            self.session = None;
            return true;
        }
        false
    }

    pub(crate) fn take_completed(&mut self) -> Option<ArrestSession> {
        match self.session {
            Some(session) if session.completed => self.session.take(),
            _ => None,
        }
    }
}

/// What an arrest did to the player.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrestReport {
    pub officer: AgentId,
    pub arrested_at: Vec3,
    pub released_at: Vec3,
    pub confiscated: Vec<(ItemKind, u32)>,
    pub reputation_before: f32,
}

/// Optional downstream collaborator (quest log, HUD, achievements).
pub trait ArrestNotifier {
    fn on_arrest(&mut self, report: &ArrestReport);
}

pub(crate) fn apply_arrest_consequences(
    officer: AgentId,
    player: &mut Player,
    inventory: &mut Inventory,
    tuning: &SimTuning,
) -> ArrestReport {
    let arrested_at = player.position;
    let reputation_before = player.reputation.points();

    player.position = tuning.arrest_safe_location;
    player.dodging = false;
    let confiscated = inventory.confiscate(&tuning.contraband);
    player.reputation.reset();

    ArrestReport {
        officer,
        arrested_at,
        released_at: player.position,
        confiscated,
        reputation_before,
    }
}
