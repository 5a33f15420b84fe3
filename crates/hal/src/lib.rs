//! Hardware abstraction layer for the mower.
//!
//! Every device is a small capability trait with the same lifecycle
//! (`start`, `stop`, `read`, `healthy`); the [`factory`] picks one backend
//! for the whole process from the configured environment. The simulator
//! backend is a first-class implementation driven by [`sim`]; the physical
//! backend (Raspberry Pi I2C/GPIO/PWM + camera) sits behind the
//! `hardware` feature.
//!
//! Failure semantics: reads return a reading struct whose `valid` flag and
//! `error` string carry the failure; a backend that fails to initialize
//! stays `healthy() == false` forever and keeps reporting invalid
//! readings. Surfacing the gap is the caller's job.

mod sim_backend;

#[cfg(all(feature = "hardware", target_os = "linux"))]
mod physical;

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use types::{
    BumperReading, EStopReading, EncoderReading, GpsReading, ImuReading, MotorStatus,
    PowerReading, SensorFrame,
};

pub use sim_backend::simulation_backend;

#[derive(Error, Debug)]
pub enum HalError {
    #[error("I2C error: {0}")]
    I2c(String),
    #[error("GPIO error: {0}")]
    Gpio(String),
    #[error("UART error: {0}")]
    Uart(String),
    #[error("camera error: {0}")]
    Camera(String),
    #[error("hardware backend not compiled in (enable the `hardware` feature)")]
    HardwareUnavailable,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Inertial measurement unit.
pub trait Imu: Send {
    fn start(&mut self) -> bool;
    fn stop(&mut self);
    fn read(&mut self) -> ImuReading;
    fn healthy(&self) -> bool;
}

/// GPS receiver.
pub trait Gps: Send {
    fn start(&mut self) -> bool;
    fn stop(&mut self);
    fn read(&mut self) -> GpsReading;
    fn healthy(&self) -> bool;
}

/// Battery/power monitor.
pub trait Power: Send {
    fn start(&mut self) -> bool;
    fn stop(&mut self);
    fn read(&mut self) -> PowerReading;
    fn healthy(&self) -> bool;
}

/// Contact bumper.
pub trait Bumper: Send {
    fn start(&mut self) -> bool;
    fn stop(&mut self);
    fn read(&mut self) -> BumperReading;
    fn healthy(&self) -> bool;
}

/// Wheel encoders (cumulative signed counts).
pub trait Encoders: Send {
    fn start(&mut self) -> bool;
    fn stop(&mut self);
    fn read(&mut self) -> EncoderReading;
    fn healthy(&self) -> bool;
}

/// Hardware emergency-stop input.
pub trait EmergencyStop: Send {
    fn start(&mut self) -> bool;
    fn stop(&mut self);
    fn read(&mut self) -> EStopReading;
    fn healthy(&self) -> bool;
}

/// Drive motors plus brush/fan actuators.
pub trait Motor: Send {
    fn start(&mut self) -> bool;
    fn stop(&mut self);
    fn healthy(&self) -> bool;
    /// Wheel speeds, each clamped internally to [-1, 1].
    fn set_wheel_speeds(&mut self, left: f64, right: f64);
    fn set_brushes(&mut self, main: bool, left: bool, right: bool);
    fn set_fan(&mut self, on: bool);
    /// Zero everything and latch out further commands until cleared.
    fn emergency_stop(&mut self);
    /// Release the emergency latch.
    fn clear_emergency(&mut self);
    fn status(&self) -> MotorStatus;
}

/// Camera capture.
pub trait Camera: Send {
    fn start(&mut self) -> bool;
    fn stop(&mut self);
    /// Latest frame, or None when capture is not available.
    fn read(&mut self) -> Option<RgbImage>;
    fn healthy(&self) -> bool;
}

/// The full device set for one process.
pub struct Backend {
    pub imu: Box<dyn Imu>,
    pub gps: Box<dyn Gps>,
    pub power: Box<dyn Power>,
    pub bumper: Box<dyn Bumper>,
    pub encoders: Box<dyn Encoders>,
    pub estop: Box<dyn EmergencyStop>,
    pub motor: Box<dyn Motor>,
    pub camera: Box<dyn Camera>,
    /// Present when this is the simulator backend; the controller ticks it
    /// once per loop so sensor reads reflect the commanded motion.
    sim: Option<sim::SimHandle>,
}

impl Backend {
    /// Start every device. Returns false if any device refused to start;
    /// the unhealthy devices keep reporting invalid readings.
    pub fn start_all(&mut self) -> bool {
        let mut ok = true;
        ok &= self.imu.start();
        ok &= self.gps.start();
        ok &= self.power.start();
        ok &= self.bumper.start();
        ok &= self.encoders.start();
        ok &= self.estop.start();
        ok &= self.motor.start();
        // Camera is optional equipment; its health is reported separately
        self.camera.start();
        ok
    }

    pub fn stop_all(&mut self) {
        self.motor.set_wheel_speeds(0.0, 0.0);
        self.motor.set_brushes(false, false, false);
        self.motor.set_fan(false);
        self.imu.stop();
        self.gps.stop();
        self.power.stop();
        self.bumper.stop();
        self.encoders.stop();
        self.estop.stop();
        self.motor.stop();
        self.camera.stop();
    }

    /// Read every sensor into one frame.
    pub fn read_all(&mut self) -> SensorFrame {
        SensorFrame {
            timestamp_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            imu: self.imu.read(),
            gps: self.gps.read(),
            power: self.power.read(),
            bumper: self.bumper.read(),
            encoders: self.encoders.read(),
            estop: self.estop.read(),
        }
    }

    /// Advance the simulation clock; no-op on the physical backend.
    pub fn tick(&self, dt: f64) {
        if let Some(ref handle) = self.sim {
            handle.lock().tick(dt);
        }
    }

    /// Simulation handle, present only on the simulator backend.
    /// Test harness use only; application code goes through the traits.
    pub fn sim_handle(&self) -> Option<&sim::SimHandle> {
        self.sim.as_ref()
    }
}

/// Which backend family to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Simulation,
    Hardware,
}

impl BackendKind {
    /// Resolve the configured `sensors.type` ("auto" probes the host).
    pub fn from_config(sensors_type: &str) -> Self {
        match sensors_type {
            "simulation" => Self::Simulation,
            "hardware" => Self::Hardware,
            _ => Self::detect(),
        }
    }

    /// Probe the host: a Raspberry Pi device tree means real hardware.
    pub fn detect() -> Self {
        let model = std::fs::read_to_string("/proc/device-tree/model").unwrap_or_default();
        if model.contains("Raspberry Pi") {
            Self::Hardware
        } else {
            Self::Simulation
        }
    }
}

/// Build the backend for this process. Selection is deterministic from the
/// environment; backends are never mixed.
pub fn create_backend(config: &config::MowerConfig) -> Result<Backend, HalError> {
    let kind = BackendKind::from_config(&config.sensors.r#type);
    info!(?kind, "Selected HAL backend");
    match kind {
        BackendKind::Simulation => Ok(simulation_backend(config)),
        BackendKind::Hardware => {
            #[cfg(all(feature = "hardware", target_os = "linux"))]
            {
                physical::physical_backend(config)
            }
            #[cfg(not(all(feature = "hardware", target_os = "linux")))]
            {
                Err(HalError::HardwareUnavailable)
            }
        }
    }
}
