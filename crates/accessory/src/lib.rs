//! Accessory policy engine.
//!
//! Turns the brushes and fan on or off from the whole robot situation.
//! Five layers apply in order — emergency overrides, task baseline,
//! safety overrides, the active policy, energy management — and the last
//! word wins. The active policy is hot-swappable at runtime.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use types::TaskKind;

/// Operator-selectable behavior profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessoryPolicy {
    /// Maximum cleaning effect
    #[default]
    Performance,
    /// Stretch the battery
    Economy,
    /// Minimize noise
    Quiet,
    /// Conservative around people and obstacles
    Safety,
}

/// Which layer finalized the decision (telemetry/debugging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionLayer {
    Emergency,
    TaskBaseline,
    SafetyOverride,
    Policy,
    Energy,
}

/// Everything the engine weighs for one decision.
#[derive(Debug, Clone)]
pub struct AccessoryInputs {
    pub task: TaskKind,
    /// Current speed (m/s)
    pub speed: f64,
    /// Distance to the nearest detected obstacle (infinity when clear)
    pub nearest_obstacle: f64,
    pub battery_percent: f64,
    pub charge_needed: bool,
    /// Distance to the garden boundary (m)
    pub boundary_distance: f64,
    pub rough_terrain: bool,
    pub speed_limit_active: bool,
    pub manual_override: bool,
}

impl Default for AccessoryInputs {
    fn default() -> Self {
        Self {
            task: TaskKind::Idle,
            speed: 0.0,
            nearest_obstacle: f64::INFINITY,
            battery_percent: 100.0,
            charge_needed: false,
            boundary_distance: f64::INFINITY,
            rough_terrain: false,
            speed_limit_active: false,
            manual_override: false,
        }
    }
}

/// The engine's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryDecision {
    pub main_brush: bool,
    pub side_brushes: bool,
    pub fan: bool,
    /// The layer that last changed the outcome
    pub layer: DecisionLayer,
}

impl AccessoryDecision {
    fn all_off(layer: DecisionLayer) -> Self {
        Self {
            main_brush: false,
            side_brushes: false,
            fan: false,
            layer,
        }
    }
}

pub struct AccessoryEngine {
    config: config::AccessoriesConfig,
    policy: AccessoryPolicy,
    decisions: u64,
}

impl AccessoryEngine {
    pub fn new(config: &config::AccessoriesConfig) -> Self {
        Self {
            config: config.clone(),
            policy: AccessoryPolicy::default(),
            decisions: 0,
        }
    }

    pub fn policy(&self) -> AccessoryPolicy {
        self.policy
    }

    /// Swap the active policy; effective from the next decision.
    pub fn set_policy(&mut self, policy: AccessoryPolicy) {
        if policy != self.policy {
            debug!(?policy, "Accessory policy changed");
            self.policy = policy;
        }
    }

    pub fn decisions_made(&self) -> u64 {
        self.decisions
    }

    pub fn decide(&mut self, inputs: &AccessoryInputs) -> AccessoryDecision {
        self.decisions += 1;

        // Layer 1: emergency overrides
        if self.is_emergency(inputs) {
            warn!("accessory emergency override: everything off");
            return AccessoryDecision::all_off(DecisionLayer::Emergency);
        }

        // Layer 2: task baseline
        let mut decision = self.task_baseline(inputs.task);

        // Layer 3: safety overrides
        decision = self.apply_safety(inputs, decision);

        // Layer 4: active policy
        decision = self.apply_policy(inputs, decision);

        // Layer 5: energy management
        decision = self.apply_energy(inputs, decision);

        decision
    }

    fn is_emergency(&self, inputs: &AccessoryInputs) -> bool {
        inputs.task == TaskKind::Emergency
            || inputs.nearest_obstacle < self.config.emergency_obstacle_distance
            || inputs.battery_percent <= self.config.critical_battery
            || inputs.manual_override
    }

    fn task_baseline(&self, task: TaskKind) -> AccessoryDecision {
        let (main_brush, side_brushes, fan) = match task {
            TaskKind::Mowing => (true, true, true),
            TaskKind::PointToPoint => (true, false, false),
            TaskKind::ChargeSeek | TaskKind::Docked | TaskKind::Idle | TaskKind::Emergency => {
                (false, false, false)
            }
        };
        AccessoryDecision {
            main_brush,
            side_brushes,
            fan,
            layer: DecisionLayer::TaskBaseline,
        }
    }

    fn apply_safety(
        &self,
        inputs: &AccessoryInputs,
        mut decision: AccessoryDecision,
    ) -> AccessoryDecision {
        let before = decision;

        if inputs.nearest_obstacle < self.config.safe_obstacle_distance {
            decision.side_brushes = false;
            if inputs.nearest_obstacle < self.config.main_brush_obstacle_distance {
                decision.main_brush = false;
            }
        }

        if inputs.boundary_distance < self.config.boundary_safety_distance {
            decision.side_brushes = false;
        }

        if inputs.rough_terrain {
            decision.side_brushes = false;
        }

        if inputs.speed > self.config.max_side_brush_speed {
            decision.side_brushes = false;
        }

        if decision != before {
            decision.layer = DecisionLayer::SafetyOverride;
        }
        decision
    }

    fn apply_policy(
        &self,
        inputs: &AccessoryInputs,
        mut decision: AccessoryDecision,
    ) -> AccessoryDecision {
        let before = decision;

        match self.policy {
            AccessoryPolicy::Performance => {
                if inputs.task == TaskKind::Mowing && inputs.speed >= self.config.min_mowing_speed {
                    decision.fan = true;
                }
            }
            AccessoryPolicy::Quiet => {
                decision.fan = false;
            }
            AccessoryPolicy::Safety => {
                if inputs.speed > 0.2 {
                    decision.side_brushes = false;
                }
            }
            AccessoryPolicy::Economy => {}
        }

        // Below effective mowing speed the side brushes do nothing
        if inputs.speed < self.config.min_mowing_speed {
            decision.side_brushes = false;
        }

        if decision != before {
            decision.layer = DecisionLayer::Policy;
        }
        decision
    }

    fn apply_energy(
        &self,
        inputs: &AccessoryInputs,
        mut decision: AccessoryDecision,
    ) -> AccessoryDecision {
        let before = decision;

        if inputs.battery_percent <= self.config.low_battery {
            decision.fan = false;
        }

        if inputs.charge_needed {
            decision.side_brushes = false;
            decision.fan = false;
        }

        if decision != before {
            decision.layer = DecisionLayer::Energy;
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> AccessoryEngine {
        AccessoryEngine::new(&config::AccessoriesConfig::default())
    }

    fn mowing_inputs() -> AccessoryInputs {
        AccessoryInputs {
            task: TaskKind::Mowing,
            speed: 0.3,
            nearest_obstacle: 10.0,
            battery_percent: 80.0,
            boundary_distance: 5.0,
            ..AccessoryInputs::default()
        }
    }

    #[test]
    fn test_ideal_mowing_all_on() {
        let mut engine = engine();
        let decision = engine.decide(&mowing_inputs());
        assert!(decision.main_brush);
        assert!(decision.side_brushes);
        assert!(decision.fan);
    }

    #[test]
    fn test_critical_battery_all_off() {
        let mut engine = engine();
        let mut inputs = mowing_inputs();
        inputs.battery_percent = 15.0;
        let decision = engine.decide(&inputs);
        assert!(!decision.main_brush);
        assert!(!decision.side_brushes);
        assert!(!decision.fan);
        assert_eq!(decision.layer, DecisionLayer::Emergency);
    }

    #[test]
    fn test_close_obstacle_kills_side_brushes() {
        let mut engine = engine();
        let mut inputs = mowing_inputs();
        inputs.nearest_obstacle = 0.3;
        inputs.battery_percent = 70.0;
        let decision = engine.decide(&inputs);
        // 0.3 < 0.35: main brush goes too; side definitely off; fan stays
        assert!(!decision.side_brushes);
        assert!(!decision.main_brush);
        assert!(decision.fan);
    }

    #[test]
    fn test_obstacle_between_thresholds_keeps_main() {
        let mut engine = engine();
        let mut inputs = mowing_inputs();
        inputs.nearest_obstacle = 0.45;
        let decision = engine.decide(&inputs);
        assert!(decision.main_brush);
        assert!(!decision.side_brushes);
    }

    #[test]
    fn test_very_close_obstacle_is_emergency() {
        let mut engine = engine();
        let mut inputs = mowing_inputs();
        inputs.nearest_obstacle = 0.15;
        let decision = engine.decide(&inputs);
        assert_eq!(decision, AccessoryDecision::all_off(DecisionLayer::Emergency));
    }

    #[test]
    fn test_manual_override_all_off() {
        let mut engine = engine();
        let mut inputs = mowing_inputs();
        inputs.manual_override = true;
        let decision = engine.decide(&inputs);
        assert_eq!(decision.layer, DecisionLayer::Emergency);
        assert!(!decision.main_brush);
    }

    #[test]
    fn test_task_baselines() {
        let mut engine = engine();

        let mut inputs = mowing_inputs();
        inputs.task = TaskKind::PointToPoint;
        let d = engine.decide(&inputs);
        assert!(d.main_brush && !d.side_brushes && !d.fan);

        for task in [TaskKind::ChargeSeek, TaskKind::Docked, TaskKind::Idle] {
            inputs.task = task;
            let d = engine.decide(&inputs);
            assert!(!d.main_brush && !d.side_brushes && !d.fan, "{task:?}");
        }
    }

    #[test]
    fn test_boundary_proximity_disables_side_brushes() {
        let mut engine = engine();
        let mut inputs = mowing_inputs();
        inputs.boundary_distance = 0.8;
        let d = engine.decide(&inputs);
        assert!(!d.side_brushes);
        assert!(d.main_brush);
    }

    #[test]
    fn test_rough_terrain_disables_side_brushes() {
        let mut engine = engine();
        let mut inputs = mowing_inputs();
        inputs.rough_terrain = true;
        assert!(!engine.decide(&inputs).side_brushes);
    }

    #[test]
    fn test_overspeed_disables_side_brushes() {
        let mut engine = engine();
        let mut inputs = mowing_inputs();
        inputs.speed = 0.4;
        assert!(!engine.decide(&inputs).side_brushes);
    }

    #[test]
    fn test_side_brush_invariant() {
        // side_brushes on implies speed and obstacle clearance are inside
        // the safe envelope, whatever the input combination
        let mut engine = engine();
        let speeds = [0.0, 0.1, 0.25, 0.3, 0.35, 0.6];
        let obstacles = [0.1, 0.3, 0.45, 0.5, 2.0, f64::INFINITY];
        for &speed in &speeds {
            for &nearest_obstacle in &obstacles {
                let inputs = AccessoryInputs {
                    speed,
                    nearest_obstacle,
                    ..mowing_inputs()
                };
                let d = engine.decide(&inputs);
                if d.side_brushes {
                    assert!(speed <= 0.3, "side on at speed {speed}");
                    assert!(nearest_obstacle >= 0.5, "side on at {nearest_obstacle} m");
                }
            }
        }
    }

    #[test]
    fn test_quiet_policy_disables_fan() {
        let mut engine = engine();
        engine.set_policy(AccessoryPolicy::Quiet);
        let d = engine.decide(&mowing_inputs());
        assert!(!d.fan);
        assert!(d.main_brush);
    }

    #[test]
    fn test_safety_policy_side_brush_speed_cap() {
        let mut engine = engine();
        engine.set_policy(AccessoryPolicy::Safety);
        let mut inputs = mowing_inputs();
        inputs.speed = 0.25;
        assert!(!engine.decide(&inputs).side_brushes);
        inputs.speed = 0.15;
        assert!(engine.decide(&inputs).side_brushes);
    }

    #[test]
    fn test_low_battery_fan_off() {
        let mut engine = engine();
        let mut inputs = mowing_inputs();
        inputs.battery_percent = 35.0;
        let d = engine.decide(&inputs);
        assert!(!d.fan);
        assert!(d.main_brush);
        assert_eq!(d.layer, DecisionLayer::Energy);
    }

    #[test]
    fn test_charge_needed_sheds_load() {
        let mut engine = engine();
        let mut inputs = mowing_inputs();
        inputs.charge_needed = true;
        let d = engine.decide(&inputs);
        assert!(!d.side_brushes);
        assert!(!d.fan);
        assert!(d.main_brush);
    }

    #[test]
    fn test_policy_hot_swap() {
        let mut engine = engine();
        assert!(engine.decide(&mowing_inputs()).fan);
        engine.set_policy(AccessoryPolicy::Quiet);
        assert!(!engine.decide(&mowing_inputs()).fan);
        engine.set_policy(AccessoryPolicy::Performance);
        assert!(engine.decide(&mowing_inputs()).fan);
    }
}
