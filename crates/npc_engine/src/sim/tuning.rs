use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::math::Vec3;
use super::player::{ItemKind, ReputationThresholds, ReputationTier};

/// Maximum number of simultaneously live (or pending) agents.
pub const POPULATION_CAP: usize = 64;

/// Gameplay constants for escalation, timers and collision.
///
/// Only the relative ordering of the escalation radii is load-bearing
/// (`warn_radius > aggressive_radius > notorious_skip_radius`); the
/// absolute values are tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimTuning {
    pub warn_radius: f32,
    pub aggressive_radius: f32,
    pub notorious_skip_radius: f32,
    pub notorious_tier: ReputationTier,
    /// Lowest tier a wandering or idle gang member bothers to warn.
    /// Patrolling gang members warn at any tier.
    pub gang_wander_warn_tier: ReputationTier,
    pub arrest_radius: f32,
    pub contact_range: f32,
    pub steal_radius: f32,
    pub flee_radius: f32,
    pub pigeon_scatter_radius: f32,
    pub dog_chase_radius: f32,
    pub dog_give_up_radius: f32,
    pub pursuit_give_up_radius: f32,
    pub despawn_radius: f32,
    pub follow_distance: f32,

    pub idle_seconds: f32,
    pub wander_seconds: f32,
    pub patrol_leg_seconds: f32,
    pub steal_seconds: f32,
    pub flee_seconds: f32,
    pub venue_stay_seconds: f32,
    pub photograph_seconds: f32,
    pub stare_seconds: f32,
    pub complain_seconds: f32,
    pub demolish_seconds: f32,
    pub arrest_seconds: f32,
    pub speech_seconds: f32,

    pub agent_radius: f32,
    pub player_radius: f32,
    pub body_height: f32,
    pub collision_push_step: f32,

    pub reputation_thresholds: ReputationThresholds,
    pub reputation_decay_per_second: f32,

    pub arrest_safe_location: Vec3,
    pub contraband: Vec<ItemKind>,

    pub reinforcement_min_distance: f32,
    pub reinforcement_max_distance: f32,
    pub revive_health_fraction: f32,
    pub seed: u64,
}

impl Default for SimTuning {
    fn default() -> Self {
        Self {
            warn_radius: 10.0,
            aggressive_radius: 6.0,
            notorious_skip_radius: 3.0,
            notorious_tier: ReputationTier::Notorious,
            gang_wander_warn_tier: ReputationTier::Known,
            arrest_radius: 1.5,
            contact_range: 1.2,
            steal_radius: 1.5,
            flee_radius: 8.0,
            pigeon_scatter_radius: 3.0,
            dog_chase_radius: 7.0,
            dog_give_up_radius: 14.0,
            pursuit_give_up_radius: 20.0,
            despawn_radius: 120.0,
            follow_distance: 2.0,

            idle_seconds: 3.0,
            wander_seconds: 4.0,
            patrol_leg_seconds: 6.0,
            steal_seconds: 1.0,
            flee_seconds: 5.0,
            venue_stay_seconds: 30.0,
            photograph_seconds: 4.0,
            stare_seconds: 3.0,
            complain_seconds: 5.0,
            demolish_seconds: 20.0,
            arrest_seconds: 2.0,
            speech_seconds: 3.0,

            agent_radius: 0.35,
            player_radius: 0.35,
            body_height: 1.8,
            collision_push_step: 0.05,

            reputation_thresholds: ReputationThresholds::default(),
            reputation_decay_per_second: 0.05,

            arrest_safe_location: Vec3::new(0.0, 1.0, -30.0),
            contraband: vec![
                ItemKind::Crowbar,
                ItemKind::BaseballBat,
                ItemKind::SprayCan,
                ItemKind::StolenPhone,
            ],

            reinforcement_min_distance: 6.0,
            reinforcement_max_distance: 10.0,
            revive_health_fraction: 0.5,
            seed: 0x5eed_1e55,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be finite and > 0, got {value}")]
    NotPositive { field: &'static str, value: f32 },
    #[error("{larger} ({larger_value}) must be greater than {smaller} ({smaller_value})")]
    Ordering {
        larger: &'static str,
        larger_value: f32,
        smaller: &'static str,
        smaller_value: f32,
    },
    #[error("revive_health_fraction must be within (0, 1], got {0}")]
    ReviveFraction(f32),
    #[error("reputation thresholds must be ascending: known {known}, notorious {notorious}, legendary {legendary}")]
    ReputationThresholds {
        known: f32,
        notorious: f32,
        legendary: f32,
    },
    #[error("arrest_safe_location must be finite")]
    SafeLocation,
}

impl SimTuning {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positives: [(&'static str, f32); 34] = [
            ("warn_radius", self.warn_radius),
            ("aggressive_radius", self.aggressive_radius),
            ("notorious_skip_radius", self.notorious_skip_radius),
            ("arrest_radius", self.arrest_radius),
            ("contact_range", self.contact_range),
            ("steal_radius", self.steal_radius),
            ("flee_radius", self.flee_radius),
            ("pigeon_scatter_radius", self.pigeon_scatter_radius),
            ("dog_chase_radius", self.dog_chase_radius),
            ("dog_give_up_radius", self.dog_give_up_radius),
            ("pursuit_give_up_radius", self.pursuit_give_up_radius),
            ("despawn_radius", self.despawn_radius),
            ("follow_distance", self.follow_distance),
            ("idle_seconds", self.idle_seconds),
            ("wander_seconds", self.wander_seconds),
            ("patrol_leg_seconds", self.patrol_leg_seconds),
            ("steal_seconds", self.steal_seconds),
            ("flee_seconds", self.flee_seconds),
            ("venue_stay_seconds", self.venue_stay_seconds),
            ("photograph_seconds", self.photograph_seconds),
            ("stare_seconds", self.stare_seconds),
            ("complain_seconds", self.complain_seconds),
            ("demolish_seconds", self.demolish_seconds),
            ("arrest_seconds", self.arrest_seconds),
            ("speech_seconds", self.speech_seconds),
            ("agent_radius", self.agent_radius),
            ("player_radius", self.player_radius),
            ("body_height", self.body_height),
            ("collision_push_step", self.collision_push_step),
            ("reinforcement_min_distance", self.reinforcement_min_distance),
            ("reinforcement_max_distance", self.reinforcement_max_distance),
            ("reputation_thresholds.known", self.reputation_thresholds.known),
            (
                "reputation_thresholds.notorious",
                self.reputation_thresholds.notorious,
            ),
            (
                "reputation_thresholds.legendary",
                self.reputation_thresholds.legendary,
            ),
        ];
        for (field, value) in positives {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NotPositive { field, value });
            }
        }
        if !self.reputation_decay_per_second.is_finite() || self.reputation_decay_per_second < 0.0
        {
            return Err(ConfigError::NotPositive {
                field: "reputation_decay_per_second",
                value: self.reputation_decay_per_second,
            });
        }

        ensure_greater(
            "warn_radius",
            self.warn_radius,
            "aggressive_radius",
            self.aggressive_radius,
        )?;
        ensure_greater(
            "aggressive_radius",
            self.aggressive_radius,
            "notorious_skip_radius",
            self.notorious_skip_radius,
        )?;
        ensure_greater(
            "pursuit_give_up_radius",
            self.pursuit_give_up_radius,
            "warn_radius",
            self.warn_radius,
        )?;
        ensure_greater(
            "dog_give_up_radius",
            self.dog_give_up_radius,
            "dog_chase_radius",
            self.dog_chase_radius,
        )?;
        if self.reinforcement_max_distance < self.reinforcement_min_distance {
            return Err(ConfigError::Ordering {
                larger: "reinforcement_max_distance",
                larger_value: self.reinforcement_max_distance,
                smaller: "reinforcement_min_distance",
                smaller_value: self.reinforcement_min_distance,
            });
        }

        let thresholds = self.reputation_thresholds;
        if !(thresholds.known < thresholds.notorious && thresholds.notorious < thresholds.legendary)
        {
            return Err(ConfigError::ReputationThresholds {
                known: thresholds.known,
                notorious: thresholds.notorious,
                legendary: thresholds.legendary,
            });
        }
        if !(self.revive_health_fraction > 0.0 && self.revive_health_fraction <= 1.0) {
            return Err(ConfigError::ReviveFraction(self.revive_health_fraction));
        }
        if !self.arrest_safe_location.is_finite() {
            return Err(ConfigError::SafeLocation);
        }
        Ok(())
    }

    /// Distance at which pursuers stop closing in.
    pub fn pursuit_stop_distance(&self) -> f32 {
        self.agent_radius + self.player_radius
    }
}

fn ensure_greater(
    larger: &'static str,
    larger_value: f32,
    smaller: &'static str,
    smaller_value: f32,
) -> Result<(), ConfigError> {
    if larger_value > smaller_value {
        Ok(())
    } else {
        Err(ConfigError::Ordering {
            larger,
            larger_value,
            smaller,
            smaller_value,
        })
    }
}
