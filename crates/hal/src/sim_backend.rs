//! Simulator implementations of the HAL capability traits.
//!
//! All devices share one [`SimHandle`]; motor writes update the simulation
//! and every sensor read is synthesized from it.

use crate::{Backend, Bumper, Camera, EmergencyStop, Encoders, Gps, Imu, Motor, Power};
use image::RgbImage;
use sim::camera::CameraModel;
use sim::{SimHandle, SimParams};
use tracing::info;
use types::{
    BumperReading, EStopReading, EncoderReading, GpsReading, ImuReading, MotorStatus,
    PowerReading,
};

/// Build the full simulator backend from the configuration tree.
pub fn simulation_backend(config: &config::MowerConfig) -> Backend {
    let params = SimParams {
        wheel_radius: config.navigation.wheel_diameter / 2.0,
        wheel_base: config.navigation.wheel_base,
        pulses_per_rev: config.navigation.encoder_pulses_per_rev,
        max_wheel_speed: config.navigation.max_linear_speed * 1.2,
        origin_lat: config.sensors.sim.origin_latitude,
        origin_lon: config.sensors.sim.origin_longitude,
        initial_battery_percent: config.sensors.sim.initial_battery_percent,
        bumper_schedule_enabled: config.sensors.sim.bumper_schedule_enabled,
        bumper_interval: config.sensors.sim.bumper_interval,
        camera: CameraModel {
            width: config.sensors.camera.width,
            height: config.sensors.camera.height,
            focal_px: config.sensors.camera.focal_length_px,
            height_m: config.sensors.camera.height_m,
        },
    };
    let handle = SimHandle::new(params);
    info!("Simulation backend created");

    Backend {
        imu: Box::new(SimImu {
            handle: handle.clone(),
            running: false,
        }),
        gps: Box::new(SimGps {
            handle: handle.clone(),
            running: false,
        }),
        power: Box::new(SimPower {
            handle: handle.clone(),
            running: false,
        }),
        bumper: Box::new(SimBumper {
            handle: handle.clone(),
            running: false,
        }),
        encoders: Box::new(SimEncoders {
            handle: handle.clone(),
            running: false,
        }),
        estop: Box::new(SimEStop {
            handle: handle.clone(),
            running: false,
        }),
        motor: Box::new(SimMotor {
            handle: handle.clone(),
            running: false,
        }),
        camera: Box::new(SimCamera {
            handle: handle.clone(),
            running: false,
        }),
        sim: Some(handle),
    }
}

macro_rules! sim_device {
    ($name:ident) => {
        struct $name {
            handle: SimHandle,
            running: bool,
        }
    };
}

sim_device!(SimImu);
sim_device!(SimGps);
sim_device!(SimPower);
sim_device!(SimBumper);
sim_device!(SimEncoders);
sim_device!(SimEStop);
sim_device!(SimMotor);
sim_device!(SimCamera);

impl Imu for SimImu {
    fn start(&mut self) -> bool {
        self.running = true;
        true
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn read(&mut self) -> ImuReading {
        if !self.running {
            return ImuReading {
                valid: false,
                error: Some("imu not started".into()),
                ..ImuReading::default()
            };
        }
        self.handle.lock().imu_reading()
    }

    fn healthy(&self) -> bool {
        self.running
    }
}

impl Gps for SimGps {
    fn start(&mut self) -> bool {
        self.running = true;
        true
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn read(&mut self) -> GpsReading {
        if !self.running {
            return GpsReading {
                valid: false,
                error: Some("gps not started".into()),
                ..GpsReading::default()
            };
        }
        self.handle.lock().gps_reading()
    }

    fn healthy(&self) -> bool {
        self.running
    }
}

impl Power for SimPower {
    fn start(&mut self) -> bool {
        self.running = true;
        true
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn read(&mut self) -> PowerReading {
        if !self.running {
            return PowerReading {
                valid: false,
                error: Some("power monitor not started".into()),
                ..PowerReading::default()
            };
        }
        self.handle.lock().power_reading()
    }

    fn healthy(&self) -> bool {
        self.running
    }
}

impl Bumper for SimBumper {
    fn start(&mut self) -> bool {
        self.running = true;
        true
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn read(&mut self) -> BumperReading {
        if !self.running {
            return BumperReading {
                valid: false,
                error: Some("bumper not started".into()),
                ..BumperReading::default()
            };
        }
        self.handle.lock().bumper_reading()
    }

    fn healthy(&self) -> bool {
        self.running
    }
}

impl Encoders for SimEncoders {
    fn start(&mut self) -> bool {
        self.running = true;
        true
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn read(&mut self) -> EncoderReading {
        if !self.running {
            return EncoderReading {
                valid: false,
                error: Some("encoders not started".into()),
                ..EncoderReading::default()
            };
        }
        self.handle.lock().encoder_reading()
    }

    fn healthy(&self) -> bool {
        self.running
    }
}

impl EmergencyStop for SimEStop {
    fn start(&mut self) -> bool {
        self.running = true;
        true
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn read(&mut self) -> EStopReading {
        if !self.running {
            return EStopReading {
                valid: false,
                error: Some("e-stop input not started".into()),
                ..EStopReading::default()
            };
        }
        self.handle.lock().estop_reading()
    }

    fn healthy(&self) -> bool {
        self.running
    }
}

impl Motor for SimMotor {
    fn start(&mut self) -> bool {
        self.running = true;
        true
    }

    fn stop(&mut self) {
        self.handle.lock().set_wheel_speeds(0.0, 0.0);
        self.running = false;
    }

    fn healthy(&self) -> bool {
        self.running
    }

    fn set_wheel_speeds(&mut self, left: f64, right: f64) {
        self.handle.lock().set_wheel_speeds(left, right);
    }

    fn set_brushes(&mut self, main: bool, left: bool, right: bool) {
        self.handle.lock().set_brushes(main, left, right);
    }

    fn set_fan(&mut self, on: bool) {
        self.handle.lock().set_fan(on);
    }

    fn emergency_stop(&mut self) {
        self.handle.lock().emergency_stop();
    }

    fn clear_emergency(&mut self) {
        self.handle.lock().clear_emergency();
    }

    fn status(&self) -> MotorStatus {
        self.handle.lock().motor_status()
    }
}

impl Camera for SimCamera {
    fn start(&mut self) -> bool {
        self.running = true;
        true
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn read(&mut self) -> Option<RgbImage> {
        if !self.running {
            return None;
        }
        Some(self.handle.lock().camera_frame())
    }

    fn healthy(&self) -> bool {
        self.running
    }
}
