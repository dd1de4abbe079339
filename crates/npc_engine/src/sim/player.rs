use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::math::Vec3;

pub const PLAYER_MAX_HEALTH: f32 = 100.0;

/// Coarse notoriety band derived from the reputation accumulator.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ReputationTier {
    #[default]
    Nobody,
    Known,
    Notorious,
    Legendary,
}

/// Points needed to reach each tier above `Nobody`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationThresholds {
    pub known: f32,
    pub notorious: f32,
    pub legendary: f32,
}

impl Default for ReputationThresholds {
    fn default() -> Self {
        Self {
            known: 10.0,
            notorious: 30.0,
            legendary: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reputation {
    points: f32,
}

impl Reputation {
    pub fn with_points(points: f32) -> Self {
        Self {
            points: points.max(0.0),
        }
    }

    pub fn points(&self) -> f32 {
        self.points
    }

    pub fn add(&mut self, points: f32) {
        self.points = (self.points + points).max(0.0);
    }

    /// Linear decay, floored at zero.
    pub fn decay(&mut self, amount: f32) {
        if amount > 0.0 {
            self.points = (self.points - amount).max(0.0);
        }
    }

    pub fn reset(&mut self) {
        self.points = 0.0;
    }

    pub fn tier(&self, thresholds: &ReputationThresholds) -> ReputationTier {
        if self.points >= thresholds.legendary {
            ReputationTier::Legendary
        } else if self.points >= thresholds.notorious {
            ReputationTier::Notorious
        } else if self.points >= thresholds.known {
            ReputationTier::Known
        } else {
            ReputationTier::Nobody
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Cash,
    StolenPhone,
    Food,
    Wood,
    Brick,
    Scrap,
    Crowbar,
    BaseballBat,
    SprayCan,
}

/// Order in which thieves pick items out of a pocket.
pub const THEFT_PRIORITY: [ItemKind; 9] = [
    ItemKind::Cash,
    ItemKind::StolenPhone,
    ItemKind::Food,
    ItemKind::SprayCan,
    ItemKind::Crowbar,
    ItemKind::BaseballBat,
    ItemKind::Scrap,
    ItemKind::Wood,
    ItemKind::Brick,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    items: BTreeMap<ItemKind, u32>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: ItemKind, count: u32) {
        if count == 0 {
            return;
        }
        let entry = self.items.entry(item).or_insert(0);
        *entry = entry.saturating_add(count);
    }

    /// Removes up to `count` and returns how many were actually removed.
    pub fn remove(&mut self, item: ItemKind, count: u32) -> u32 {
        let Some(held) = self.items.get_mut(&item) else {
            return 0;
        };
        let removed = (*held).min(count);
        *held -= removed;
        if *held == 0 {
            self.items.remove(&item);
        }
        removed
    }

    pub fn count(&self, item: ItemKind) -> u32 {
        self.items.get(&item).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total(&self) -> u32 {
        self.items.values().fold(0u32, |acc, n| acc.saturating_add(*n))
    }

    /// Takes one unit of the highest-priority item held.
    pub fn take_for_theft(&mut self) -> Option<ItemKind> {
        let item = THEFT_PRIORITY
            .iter()
            .copied()
            .find(|item| self.count(*item) > 0)?;
        self.remove(item, 1);
        Some(item)
    }

    /// Removes every unit of each listed kind; returns what was taken.
    pub fn confiscate(&mut self, kinds: &[ItemKind]) -> Vec<(ItemKind, u32)> {
        let mut taken = Vec::new();
        for kind in kinds {
            let held = self.count(*kind);
            if held > 0 {
                self.remove(*kind, held);
                taken.push((*kind, held));
            }
        }
        taken
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemKind, u32)> + '_ {
        self.items.iter().map(|(kind, count)| (*kind, *count))
    }
}

/// Player state as seen and mutated by the NPC simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub position: Vec3,
    pub health: f32,
    pub alive: bool,
    /// Dodge/invincibility window; attacks resolve as misses while set.
    pub dodging: bool,
    pub reputation: Reputation,
}

impl Player {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            health: PLAYER_MAX_HEALTH,
            alive: true,
            dodging: false,
            reputation: Reputation::default(),
        }
    }

    /// Applies damage and returns `true` when this hit downed the player.
    pub fn apply_damage(&mut self, amount: f32) -> bool {
        if !self.alive || amount <= 0.0 {
            return false;
        }
        self.health = (self.health - amount).max(0.0);
        if self.health <= 0.0 {
            self.alive = false;
            return true;
        }
        false
    }
}
