//! Top-level state machine for the mower.
//!
//! Transitions are a pure function of (state, event); the controller
//! feeds events and acts on the resulting state. A safety trip can
//! preempt any state and remembers where it came from so a cleared
//! emergency resumes the interrupted mission.

use tracing::{info, warn};
use types::RobotState;

/// Events that trigger state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Boot self-tests finished cleanly
    SelfTestsPassed,
    /// Boot self-tests failed
    SelfTestsFailed,
    /// Operator requested a mission
    MissionRequested,
    /// Operator stopped the mission
    MissionStopped,
    /// Battery fell below the low threshold (or return-to-dock requested)
    BatteryLow,
    /// The active route ran out of waypoints
    RouteExhausted,
    /// Coarse navigation brought the dock within AprilTag range
    DockInRange,
    /// Fine approach reported COMPLETED
    DockingCompleted,
    /// Fine approach reported ERROR
    DockingFailed,
    /// Battery reached the full threshold
    BatteryFull,
    /// Safety gate reported an emergency
    SafetyTripped,
    /// Safety conditions cleared and were acknowledged
    SafetyCleared,
    /// Unhandled failure in the control loop
    FaultRaised,
    /// The post-fault grace delay elapsed
    GraceElapsed,
}

pub struct StateMachine {
    state: RobotState,
    /// Where a safety trip interrupted us
    previous: Option<RobotState>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: RobotState::Startup,
            previous: None,
        }
    }

    pub fn state(&self) -> RobotState {
        self.state
    }

    /// The state a cleared emergency would resume into.
    pub fn previous(&self) -> Option<RobotState> {
        self.previous
    }

    /// Process an event and return the new state.
    pub fn transition(&mut self, event: Event) -> RobotState {
        use RobotState::*;

        let old = self.state;

        self.state = match (self.state, event) {
            (Startup, Event::SelfTestsPassed) => Idle,
            (Startup, Event::SelfTestsFailed) => Error,

            (Idle, Event::MissionRequested) => Mowing,
            (Idle, Event::BatteryLow) => ChargeSeek,

            (Mowing, Event::BatteryLow) => ChargeSeek,
            (Mowing, Event::RouteExhausted) => Idle,
            (Mowing, Event::MissionStopped) => Idle,

            (ChargeSeek, Event::DockInRange) => Docking,
            (ChargeSeek, Event::MissionStopped) => Idle,

            (Docking, Event::DockingCompleted) => Charging,
            (Docking, Event::DockingFailed) => ChargeSeek,
            (Docking, Event::MissionStopped) => Idle,

            (Charging, Event::BatteryFull) => Idle,

            // Safety preempts everything and remembers where it struck
            (state, Event::SafetyTripped) if state != Emergency => {
                self.previous = Some(state);
                Emergency
            }
            (Emergency, Event::SafetyCleared) => {
                let resume = match self.previous.take() {
                    Some(prev @ (Mowing | ChargeSeek | Docking | Charging)) => prev,
                    _ => Idle,
                };
                resume
            }

            // Faults land in Error from anywhere and recover to Idle
            (state, Event::FaultRaised) if state != Error => {
                warn!(?state, "fault raised");
                Error
            }
            (Error, Event::GraceElapsed) => Idle,

            // No transition
            (state, _) => state,
        };

        if self.state != old {
            info!(from = ?old, to = ?self.state, ?event, "State transition");
        }

        self.state
    }

    /// The robot may drive in these states.
    pub fn is_driving(&self) -> bool {
        matches!(
            self.state,
            RobotState::Mowing | RobotState::ChargeSeek | RobotState::Docking
        )
    }

    /// Motors must be zero in these states.
    pub fn motors_must_be_zero(&self) -> bool {
        matches!(
            self.state,
            RobotState::Charging | RobotState::Emergency | RobotState::Error
        )
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
