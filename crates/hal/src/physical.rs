//! Physical backend: Raspberry Pi I2C/GPIO/PWM devices.
//!
//! - IMU: MPU6050 over I2C
//! - Power: INA219 over I2C
//! - GPS: NMEA receiver on the primary UART
//! - Encoders: quadrature inputs on GPIO interrupts (atomic counters only)
//! - Bumper / e-stop: GPIO inputs with latched interrupt flags
//! - Motors: dual H-bridge, software PWM + direction pins
//! - Camera: first V4L2 device via nokhwa
//!
//! Devices that fail to initialize stay unhealthy and report invalid
//! readings; they never take the process down.

use crate::{Backend, Bumper, Camera, EmergencyStop, Encoders, Gps, HalError, Imu, Motor, Power};
use image::RgbImage;
use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use rppal::i2c::I2c;
use rppal::uart::{Parity, Uart};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use types::{
    BumperReading, EStopReading, EncoderReading, GpsCoord, GpsReading, ImuReading, MotorStatus,
    PowerReading,
};

const MPU6050_ADDR: u16 = 0x68;
const MPU6050_PWR_MGMT_1: u8 = 0x6B;
const MPU6050_ACCEL_XOUT_H: u8 = 0x3B;
const INA219_ADDR: u16 = 0x40;
const INA219_REG_SHUNT: u8 = 0x01;
const INA219_REG_BUS: u8 = 0x02;
const INA219_SHUNT_OHMS: f64 = 0.1;

/// Voltage-to-percent map for the 3S pack (10.0 V empty, 12.6 V full).
fn voltage_to_percent(voltage: f64) -> f64 {
    ((voltage - 10.0) / 2.6 * 100.0).clamp(0.0, 100.0)
}

/// Build the physical backend from the configuration tree.
pub fn physical_backend(config: &config::MowerConfig) -> Result<Backend, HalError> {
    info!("Creating physical backend");

    Ok(Backend {
        imu: Box::new(Mpu6050::new()),
        gps: Box::new(NmeaGps::new()),
        power: Box::new(Ina219::new()),
        bumper: Box::new(GpioBumper::new(config.sensors.bumper_pin)),
        encoders: Box::new(QuadratureEncoders::new(
            config.sensors.encoders.left_a,
            config.sensors.encoders.left_b,
            config.sensors.encoders.right_a,
            config.sensors.encoders.right_b,
        )),
        estop: Box::new(GpioEStop::new(config.safety.emergency_stop_pin)),
        motor: Box::new(HBridgeMotor::new(&config.motors)),
        camera: Box::new(V4l2Camera::new(&config.sensors.camera)),
        sim: None,
    })
}

// --- IMU ----------------------------------------------------------------

struct Mpu6050 {
    i2c: Option<I2c>,
    healthy: bool,
}

impl Mpu6050 {
    fn new() -> Self {
        Self {
            i2c: None,
            healthy: false,
        }
    }

    fn read_raw(&mut self) -> Result<[f64; 6], HalError> {
        let i2c = self
            .i2c
            .as_mut()
            .ok_or_else(|| HalError::I2c("not started".into()))?;
        let mut buf = [0u8; 14];
        i2c.block_read(MPU6050_ACCEL_XOUT_H, &mut buf)
            .map_err(|e| HalError::I2c(e.to_string()))?;

        let word = |i: usize| i16::from_be_bytes([buf[i], buf[i + 1]]) as f64;
        // Accel at +-2g (16384 LSB/g), gyro at +-250 deg/s (131 LSB/deg/s)
        Ok([
            word(0) / 16384.0 * 9.81,
            word(2) / 16384.0 * 9.81,
            word(4) / 16384.0 * 9.81,
            (word(8) / 131.0).to_radians(),
            (word(10) / 131.0).to_radians(),
            (word(12) / 131.0).to_radians(),
        ])
    }
}

impl Imu for Mpu6050 {
    fn start(&mut self) -> bool {
        let result = I2c::new().and_then(|mut i2c| {
            i2c.set_slave_address(MPU6050_ADDR)?;
            // Wake from sleep
            i2c.smbus_write_byte(MPU6050_PWR_MGMT_1, 0x00)?;
            Ok(i2c)
        });
        match result {
            Ok(i2c) => {
                self.i2c = Some(i2c);
                self.healthy = true;
                true
            }
            Err(e) => {
                warn!(?e, "MPU6050 init failed");
                self.healthy = false;
                false
            }
        }
    }

    fn stop(&mut self) {
        self.i2c = None;
        self.healthy = false;
    }

    fn read(&mut self) -> ImuReading {
        if !self.healthy {
            return ImuReading {
                valid: false,
                error: Some("imu unhealthy".into()),
                ..ImuReading::default()
            };
        }
        match self.read_raw() {
            Ok([ax, ay, az, gx, gy, gz]) => {
                let roll = ay.atan2(az);
                let pitch = (-ax).atan2((ay * ay + az * az).sqrt());
                ImuReading {
                    roll,
                    pitch,
                    yaw: 0.0, // no magnetometer; yaw comes from fusion
                    accel: [ax, ay, az],
                    gyro: [gx, gy, gz],
                    valid: true,
                    error: None,
                }
            }
            Err(e) => ImuReading {
                valid: false,
                error: Some(e.to_string()),
                ..ImuReading::default()
            },
        }
    }

    fn healthy(&self) -> bool {
        self.healthy
    }
}

// --- Power --------------------------------------------------------------

struct Ina219 {
    i2c: Option<I2c>,
    healthy: bool,
}

impl Ina219 {
    fn new() -> Self {
        Self {
            i2c: None,
            healthy: false,
        }
    }
}

impl Power for Ina219 {
    fn start(&mut self) -> bool {
        let result = I2c::new().and_then(|mut i2c| {
            i2c.set_slave_address(INA219_ADDR)?;
            Ok(i2c)
        });
        match result {
            Ok(i2c) => {
                self.i2c = Some(i2c);
                self.healthy = true;
                true
            }
            Err(e) => {
                warn!(?e, "INA219 init failed");
                self.healthy = false;
                false
            }
        }
    }

    fn stop(&mut self) {
        self.i2c = None;
        self.healthy = false;
    }

    fn read(&mut self) -> PowerReading {
        let Some(i2c) = self.i2c.as_mut() else {
            return PowerReading {
                valid: false,
                error: Some("power monitor unhealthy".into()),
                ..PowerReading::default()
            };
        };

        // INA219 registers are big-endian; SMBus words arrive little-endian
        let bus = i2c.smbus_read_word(INA219_REG_BUS).map(u16::swap_bytes);
        let shunt = i2c.smbus_read_word(INA219_REG_SHUNT).map(u16::swap_bytes);
        match (bus, shunt) {
            (Ok(bus_raw), Ok(shunt_raw)) => {
                // Bus: bits 3..15, 4 mV LSB. Shunt: signed, 10 uV LSB.
                let voltage = ((bus_raw >> 3) as f64) * 0.004;
                let current = (shunt_raw as i16 as f64) * 10e-6 / INA219_SHUNT_OHMS;
                PowerReading {
                    voltage,
                    current,
                    battery_percent: voltage_to_percent(voltage),
                    valid: true,
                    error: None,
                }
            }
            (Err(e), _) | (_, Err(e)) => PowerReading {
                valid: false,
                error: Some(e.to_string()),
                ..PowerReading::default()
            },
        }
    }

    fn healthy(&self) -> bool {
        self.healthy
    }
}

// --- GPS ----------------------------------------------------------------

struct NmeaGps {
    uart: Option<Uart>,
    line_buf: String,
    last: GpsReading,
    healthy: bool,
}

impl NmeaGps {
    fn new() -> Self {
        Self {
            uart: None,
            line_buf: String::new(),
            last: GpsReading::default(),
            healthy: false,
        }
    }

    /// Parse a ddmm.mmmm coordinate field.
    fn parse_coord(field: &str, hemisphere: &str, degree_digits: usize) -> Option<f64> {
        if field.len() < degree_digits + 1 {
            return None;
        }
        let degrees: f64 = field.get(..degree_digits)?.parse().ok()?;
        let minutes: f64 = field.get(degree_digits..)?.parse().ok()?;
        let mut value = degrees + minutes / 60.0;
        if hemisphere == "S" || hemisphere == "W" {
            value = -value;
        }
        Some(value)
    }

    fn parse_gga(&self, line: &str) -> Option<GpsReading> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 10 || !fields[0].ends_with("GGA") {
            return None;
        }
        let quality: u8 = fields[6].parse().unwrap_or(0);
        if quality == 0 {
            return Some(GpsReading {
                coord: None,
                satellites: fields[7].parse().unwrap_or(0),
                valid: false,
                error: Some("no fix".into()),
            });
        }
        let lat = Self::parse_coord(fields[2], fields[3], 2)?;
        let lon = Self::parse_coord(fields[4], fields[5], 3)?;
        let alt = fields[9].parse().unwrap_or(0.0);
        let hdop: f32 = fields[8].parse().unwrap_or(99.0);
        Some(GpsReading {
            coord: Some(GpsCoord {
                lat,
                lon,
                alt,
                // Rough horizontal accuracy from HDOP
                accuracy: hdop * 2.5,
            }),
            satellites: fields[7].parse().unwrap_or(0),
            valid: true,
            error: None,
        })
    }
}

impl Gps for NmeaGps {
    fn start(&mut self) -> bool {
        let result = Uart::new(9600, Parity::None, 8, 1).and_then(|mut uart| {
            // Never block longer than a fraction of a tick
            uart.set_read_mode(0, Duration::from_millis(20))?;
            Ok(uart)
        });
        match result {
            Ok(uart) => {
                self.uart = Some(uart);
                self.healthy = true;
                true
            }
            Err(e) => {
                warn!(?e, "GPS UART init failed");
                self.healthy = false;
                false
            }
        }
    }

    fn stop(&mut self) {
        self.uart = None;
        self.healthy = false;
    }

    fn read(&mut self) -> GpsReading {
        let Some(uart) = self.uart.as_mut() else {
            return GpsReading {
                valid: false,
                error: Some("gps unhealthy".into()),
                ..GpsReading::default()
            };
        };

        let mut buf = [0u8; 512];
        if let Ok(n) = uart.read(&mut buf) {
            self.line_buf.push_str(&String::from_utf8_lossy(&buf[..n]));
        }

        // Consume complete lines, keep the trailing partial
        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            if let Some(reading) = self.parse_gga(line.trim()) {
                self.last = reading;
            }
        }
        if self.line_buf.len() > 4096 {
            self.line_buf.clear();
        }

        self.last.clone()
    }

    fn healthy(&self) -> bool {
        self.healthy
    }
}

// --- Encoders -----------------------------------------------------------

/// Quadrature decoding in GPIO interrupt callbacks.
///
/// The ISRs only touch atomics; the tick loop reads the counters.
struct QuadratureEncoders {
    pins: (u8, u8, u8, u8),
    left_count: Arc<AtomicI64>,
    right_count: Arc<AtomicI64>,
    left_b_high: Arc<AtomicBool>,
    right_b_high: Arc<AtomicBool>,
    _inputs: Vec<InputPin>,
    healthy: bool,
}

impl QuadratureEncoders {
    fn new(left_a: u8, left_b: u8, right_a: u8, right_b: u8) -> Self {
        Self {
            pins: (left_a, left_b, right_a, right_b),
            left_count: Arc::new(AtomicI64::new(0)),
            right_count: Arc::new(AtomicI64::new(0)),
            left_b_high: Arc::new(AtomicBool::new(false)),
            right_b_high: Arc::new(AtomicBool::new(false)),
            _inputs: Vec::new(),
            healthy: false,
        }
    }

    fn setup_channel(
        gpio: &Gpio,
        pin_a: u8,
        pin_b: u8,
        count: Arc<AtomicI64>,
        b_high: Arc<AtomicBool>,
    ) -> Result<(InputPin, InputPin), rppal::gpio::Error> {
        let mut input_a = gpio.get(pin_a)?.into_input_pullup();
        let mut input_b = gpio.get(pin_b)?.into_input_pullup();

        b_high.store(input_b.read() == Level::High, Ordering::Relaxed);

        let b_for_b = b_high.clone();
        input_b.set_async_interrupt(Trigger::Both, None, move |event| {
            b_for_b.store(event.trigger == Trigger::RisingEdge, Ordering::Relaxed);
        })?;

        let b_for_a = b_high;
        input_a.set_async_interrupt(Trigger::RisingEdge, None, move |_| {
            // A rising with B low = forward, B high = reverse
            if b_for_a.load(Ordering::Relaxed) {
                count.fetch_sub(1, Ordering::Relaxed);
            } else {
                count.fetch_add(1, Ordering::Relaxed);
            }
        })?;

        Ok((input_a, input_b))
    }
}

impl Encoders for QuadratureEncoders {
    fn start(&mut self) -> bool {
        let result = Gpio::new().and_then(|gpio| {
            let (la, lb) = Self::setup_channel(
                &gpio,
                self.pins.0,
                self.pins.1,
                self.left_count.clone(),
                self.left_b_high.clone(),
            )?;
            let (ra, rb) = Self::setup_channel(
                &gpio,
                self.pins.2,
                self.pins.3,
                self.right_count.clone(),
                self.right_b_high.clone(),
            )?;
            Ok(vec![la, lb, ra, rb])
        });
        match result {
            Ok(inputs) => {
                self._inputs = inputs;
                self.healthy = true;
                true
            }
            Err(e) => {
                warn!(?e, "Encoder GPIO init failed");
                self.healthy = false;
                false
            }
        }
    }

    fn stop(&mut self) {
        self._inputs.clear();
        self.healthy = false;
    }

    fn read(&mut self) -> EncoderReading {
        if !self.healthy {
            return EncoderReading {
                valid: false,
                error: Some("encoders unhealthy".into()),
                ..EncoderReading::default()
            };
        }
        EncoderReading {
            left_pulses: self.left_count.load(Ordering::Relaxed),
            right_pulses: self.right_count.load(Ordering::Relaxed),
            valid: true,
            error: None,
        }
    }

    fn healthy(&self) -> bool {
        self.healthy
    }
}

// --- Bumper / E-stop ----------------------------------------------------

struct GpioBumper {
    pin: u8,
    latched: Arc<AtomicBool>,
    input: Option<InputPin>,
    healthy: bool,
}

impl GpioBumper {
    fn new(pin: u8) -> Self {
        Self {
            pin,
            latched: Arc::new(AtomicBool::new(false)),
            input: None,
            healthy: false,
        }
    }
}

impl Bumper for GpioBumper {
    fn start(&mut self) -> bool {
        let latched = self.latched.clone();
        let result = Gpio::new().and_then(|gpio| {
            let mut input = gpio.get(self.pin)?.into_input_pullup();
            input.set_async_interrupt(Trigger::FallingEdge, None, move |_| {
                latched.store(true, Ordering::Relaxed);
            })?;
            Ok(input)
        });
        match result {
            Ok(input) => {
                self.input = Some(input);
                self.healthy = true;
                true
            }
            Err(e) => {
                warn!(?e, "Bumper GPIO init failed");
                self.healthy = false;
                false
            }
        }
    }

    fn stop(&mut self) {
        self.input = None;
        self.healthy = false;
    }

    fn read(&mut self) -> BumperReading {
        let Some(input) = self.input.as_ref() else {
            return BumperReading {
                valid: false,
                error: Some("bumper unhealthy".into()),
                ..BumperReading::default()
            };
        };
        // Pressed if currently low or an edge latched since the last read
        let pressed = input.is_low() || self.latched.swap(false, Ordering::Relaxed);
        BumperReading {
            pressed,
            valid: true,
            error: None,
        }
    }

    fn healthy(&self) -> bool {
        self.healthy
    }
}

struct GpioEStop {
    pin: u8,
    latched: Arc<AtomicBool>,
    input: Option<InputPin>,
    healthy: bool,
}

impl GpioEStop {
    fn new(pin: u8) -> Self {
        Self {
            pin,
            latched: Arc::new(AtomicBool::new(false)),
            input: None,
            healthy: false,
        }
    }
}

impl EmergencyStop for GpioEStop {
    fn start(&mut self) -> bool {
        let latched = self.latched.clone();
        let result = Gpio::new().and_then(|gpio| {
            let mut input = gpio.get(self.pin)?.into_input_pullup();
            input.set_async_interrupt(Trigger::FallingEdge, None, move |_| {
                latched.store(true, Ordering::Relaxed);
            })?;
            Ok(input)
        });
        match result {
            Ok(input) => {
                self.input = Some(input);
                self.healthy = true;
                true
            }
            Err(e) => {
                warn!(?e, "E-stop GPIO init failed");
                self.healthy = false;
                false
            }
        }
    }

    fn stop(&mut self) {
        self.input = None;
        self.healthy = false;
    }

    fn read(&mut self) -> EStopReading {
        let Some(input) = self.input.as_ref() else {
            return EStopReading {
                valid: false,
                error: Some("e-stop input unhealthy".into()),
                ..EStopReading::default()
            };
        };
        let pressed = input.is_low() || self.latched.swap(false, Ordering::Relaxed);
        EStopReading {
            pressed,
            valid: true,
            error: None,
        }
    }

    fn healthy(&self) -> bool {
        self.healthy
    }
}

// --- Motors -------------------------------------------------------------

const PWM_FREQUENCY_HZ: f64 = 1000.0;

struct WheelChannel {
    pwm: OutputPin,
    forward: OutputPin,
    backward: OutputPin,
}

impl WheelChannel {
    fn set_speed(&mut self, speed: f64) {
        let speed = speed.clamp(-1.0, 1.0);
        if speed >= 0.0 {
            self.forward.set_high();
            self.backward.set_low();
        } else {
            self.forward.set_low();
            self.backward.set_high();
        }
        let _ = self.pwm.set_pwm_frequency(PWM_FREQUENCY_HZ, speed.abs());
    }

    fn stop(&mut self) {
        let _ = self.pwm.clear_pwm();
        self.pwm.set_low();
        self.forward.set_low();
        self.backward.set_low();
    }
}

struct HBridgeMotor {
    pins: config::MotorsConfig,
    left: Option<WheelChannel>,
    right: Option<WheelChannel>,
    main_brush: Option<OutputPin>,
    side_left: Option<OutputPin>,
    side_right: Option<OutputPin>,
    fan: Option<OutputPin>,
    status: MotorStatus,
    emergency_latched: bool,
    healthy: bool,
}

impl HBridgeMotor {
    fn new(pins: &config::MotorsConfig) -> Self {
        Self {
            pins: pins.clone(),
            left: None,
            right: None,
            main_brush: None,
            side_left: None,
            side_right: None,
            fan: None,
            status: MotorStatus::default(),
            emergency_latched: false,
            healthy: false,
        }
    }

    fn wheel_channel(
        gpio: &Gpio,
        pins: &config::WheelPins,
    ) -> Result<WheelChannel, rppal::gpio::Error> {
        Ok(WheelChannel {
            pwm: gpio.get(pins.pwm_pin)?.into_output_low(),
            forward: gpio.get(pins.forward_pin)?.into_output_low(),
            backward: gpio.get(pins.backward_pin)?.into_output_low(),
        })
    }
}

impl Motor for HBridgeMotor {
    fn start(&mut self) -> bool {
        let result = Gpio::new().and_then(|gpio| {
            let left = Self::wheel_channel(&gpio, &self.pins.left)?;
            let right = Self::wheel_channel(&gpio, &self.pins.right)?;
            let main_brush = gpio.get(self.pins.main_brush_pin)?.into_output_low();
            let side_left = gpio.get(self.pins.side_brush_left_pin)?.into_output_low();
            let side_right = gpio.get(self.pins.side_brush_right_pin)?.into_output_low();
            let fan = gpio.get(self.pins.fan_pin)?.into_output_low();
            Ok((left, right, main_brush, side_left, side_right, fan))
        });
        match result {
            Ok((left, right, main_brush, side_left, side_right, fan)) => {
                self.left = Some(left);
                self.right = Some(right);
                self.main_brush = Some(main_brush);
                self.side_left = Some(side_left);
                self.side_right = Some(side_right);
                self.fan = Some(fan);
                self.status.active = true;
                self.healthy = true;
                true
            }
            Err(e) => {
                warn!(?e, "Motor GPIO init failed");
                self.healthy = false;
                false
            }
        }
    }

    fn stop(&mut self) {
        if let Some(ch) = self.left.as_mut() {
            ch.stop();
        }
        if let Some(ch) = self.right.as_mut() {
            ch.stop();
        }
        for pin in [
            self.main_brush.as_mut(),
            self.side_left.as_mut(),
            self.side_right.as_mut(),
            self.fan.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            pin.set_low();
        }
        self.status = MotorStatus::default();
        self.healthy = false;
    }

    fn healthy(&self) -> bool {
        self.healthy
    }

    fn set_wheel_speeds(&mut self, left: f64, right: f64) {
        if self.emergency_latched {
            return;
        }
        let left = left.clamp(-1.0, 1.0);
        let right = right.clamp(-1.0, 1.0);
        if let Some(ch) = self.left.as_mut() {
            ch.set_speed(left);
        }
        if let Some(ch) = self.right.as_mut() {
            ch.set_speed(right);
        }
        self.status.left_speed = left;
        self.status.right_speed = right;
    }

    fn set_brushes(&mut self, main: bool, left: bool, right: bool) {
        if self.emergency_latched {
            return;
        }
        if let Some(pin) = self.main_brush.as_mut() {
            if main {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
        if let Some(pin) = self.side_left.as_mut() {
            if left {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
        if let Some(pin) = self.side_right.as_mut() {
            if right {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
        self.status.main_brush = main;
        self.status.side_brush_left = left;
        self.status.side_brush_right = right;
    }

    fn set_fan(&mut self, on: bool) {
        if self.emergency_latched {
            return;
        }
        if let Some(pin) = self.fan.as_mut() {
            if on {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
        self.status.fan = on;
    }

    fn emergency_stop(&mut self) {
        warn!("motor emergency stop");
        if let Some(ch) = self.left.as_mut() {
            ch.stop();
        }
        if let Some(ch) = self.right.as_mut() {
            ch.stop();
        }
        for pin in [
            self.main_brush.as_mut(),
            self.side_left.as_mut(),
            self.side_right.as_mut(),
            self.fan.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            pin.set_low();
        }
        self.status = MotorStatus::default();
        self.emergency_latched = true;
    }

    fn clear_emergency(&mut self) {
        self.emergency_latched = false;
        self.status.active = self.healthy;
    }

    fn status(&self) -> MotorStatus {
        self.status
    }
}

// --- Camera -------------------------------------------------------------

struct V4l2Camera {
    config: config::CameraConfig,
    camera: Option<nokhwa::Camera>,
    healthy: bool,
}

impl V4l2Camera {
    fn new(config: &config::CameraConfig) -> Self {
        Self {
            config: config.clone(),
            camera: None,
            healthy: false,
        }
    }
}

impl Camera for V4l2Camera {
    fn start(&mut self) -> bool {
        use nokhwa::pixel_format::RgbFormat;
        use nokhwa::utils::{
            CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
            Resolution,
        };

        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(self.config.width, self.config.height),
                FrameFormat::MJPEG,
                self.config.fps,
            ),
        ));
        let result = nokhwa::Camera::new(CameraIndex::Index(0), format).and_then(|mut cam| {
            cam.open_stream()?;
            Ok(cam)
        });
        match result {
            Ok(cam) => {
                self.camera = Some(cam);
                self.healthy = true;
                true
            }
            Err(e) => {
                warn!(?e, "Camera init failed");
                self.healthy = false;
                false
            }
        }
    }

    fn stop(&mut self) {
        if let Some(mut cam) = self.camera.take() {
            let _ = cam.stop_stream();
        }
        self.healthy = false;
    }

    fn read(&mut self) -> Option<RgbImage> {
        use nokhwa::pixel_format::RgbFormat;

        let cam = self.camera.as_mut()?;
        match cam.frame().and_then(|f| f.decode_image::<RgbFormat>()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(?e, "Camera frame failed");
                None
            }
        }
    }

    fn healthy(&self) -> bool {
        self.healthy
    }
}
