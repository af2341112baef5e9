// ABOUTME: Streaming sample decoder for the IG1 IMU family with its dual
// ABOUTME: gyro groups and 17-bit output-data bitset.

use std::sync::Arc;

use crate::datatypes::{DeviceFunction, EventKind, ImuSample};
use crate::error::{SensorError, SensorResult};

use super::{OutputConfig, SampleDecoder, SampleReader};

/// Output-data bit assignments of the IG1 firmware.
mod bits {
    pub const RAW_ACC: u32 = 0;
    pub const ACC: u32 = 1;
    pub const RAW_GYRO0: u32 = 2;
    pub const RAW_GYRO1: u32 = 3;
    pub const BIAS_GYRO0: u32 = 4;
    pub const BIAS_GYRO1: u32 = 5;
    pub const ALIGN_GYRO0: u32 = 6;
    pub const ALIGN_GYRO1: u32 = 7;
    pub const RAW_MAG: u32 = 8;
    pub const MAG: u32 = 9;
    pub const ANGULAR_VEL: u32 = 10;
    pub const QUAT: u32 = 11;
    pub const EULER: u32 = 12;
    pub const LINEAR_ACC: u32 = 13;
    pub const PRESSURE: u32 = 14;
    pub const ALTITUDE: u32 = 15;
    pub const TEMPERATURE: u32 = 16;
}

/// 16-bit fixed-point multipliers, one per field family.
mod scale {
    pub const ACC: f32 = 1000.0;
    pub const GYRO: f32 = 10.0;
    pub const MAG: f32 = 100.0;
    pub const ANGULAR_VEL: f32 = 100.0;
    pub const QUAT: f32 = 10000.0;
    pub const EULER: f32 = 100.0;
    pub const LINEAR_ACC: f32 = 1000.0;
    pub const PRESSURE: f32 = 100.0;
    pub const ALTITUDE: f32 = 10.0;
    pub const TEMPERATURE: f32 = 100.0;
}

/// Seconds per frame-counter tick.
const FRAME_TICK: f64 = 0.002;

pub use bits::*;

/// Decoder for IG1 sample payloads.
///
/// Some IG1 variants ship with only one physical gyro; the firmware then
/// omits that group's fields even when its bits are set, and the flags here
/// mirror that.
pub struct Ig1Decoder {
    config: Arc<OutputConfig>,
    has_first_gyro: bool,
    has_second_gyro: bool,
}

impl Ig1Decoder {
    pub fn new(config: Arc<OutputConfig>, has_first_gyro: bool, has_second_gyro: bool) -> Self {
        Ig1Decoder {
            config,
            has_first_gyro,
            has_second_gyro,
        }
    }

    fn parse(&self, payload: &[u8]) -> SensorResult<ImuSample> {
        let config = &self.config;
        let mut reader = SampleReader::new(payload, config.is_low_precision());

        let mut sample = ImuSample {
            frame_count: reader.read_u32()?,
            ..Default::default()
        };
        sample.timestamp = f64::from(sample.frame_count) * FRAME_TICK;

        if config.bit(bits::RAW_ACC) {
            sample.acc_raw = reader.vec3(scale::ACC)?;
        }
        if config.bit(bits::ACC) {
            sample.acc = reader.vec3(scale::ACC)?;
        }
        if self.has_first_gyro && config.bit(bits::RAW_GYRO0) {
            sample.gyro1_raw = reader.vec3(scale::GYRO)?;
        }
        if self.has_second_gyro && config.bit(bits::RAW_GYRO1) {
            sample.gyro2_raw = reader.vec3(scale::GYRO)?;
        }
        if self.has_first_gyro && config.bit(bits::BIAS_GYRO0) {
            sample.gyro1_bias_calib = reader.vec3(scale::GYRO)?;
        }
        if self.has_second_gyro && config.bit(bits::BIAS_GYRO1) {
            sample.gyro2_bias_calib = reader.vec3(scale::GYRO)?;
        }
        if self.has_first_gyro && config.bit(bits::ALIGN_GYRO0) {
            sample.gyro1 = reader.vec3(scale::GYRO)?;
        }
        if self.has_second_gyro && config.bit(bits::ALIGN_GYRO1) {
            sample.gyro2 = reader.vec3(scale::GYRO)?;
        }
        if config.bit(bits::RAW_MAG) {
            sample.mag_raw = reader.vec3(scale::MAG)?;
        }
        if config.bit(bits::MAG) {
            sample.mag = reader.vec3(scale::MAG)?;
        }
        if config.bit(bits::ANGULAR_VEL) {
            sample.angular_vel = reader.vec3(scale::ANGULAR_VEL)?;
        }
        if config.bit(bits::QUAT) {
            sample.quat = reader.quat(scale::QUAT)?;
        }
        if config.bit(bits::EULER) {
            sample.euler = reader.vec3(scale::EULER)?;
        }
        if config.bit(bits::LINEAR_ACC) {
            sample.lin_acc = reader.vec3(scale::LINEAR_ACC)?;
        }
        if config.bit(bits::PRESSURE) {
            sample.pressure = reader.scalar(scale::PRESSURE)?;
        }
        if config.bit(bits::ALTITUDE) {
            sample.altitude = reader.scalar(scale::ALTITUDE)?;
        }
        if config.bit(bits::TEMPERATURE) {
            sample.temperature = reader.scalar(scale::TEMPERATURE)?;
        }

        Ok(sample)
    }
}

impl SampleDecoder for Ig1Decoder {
    fn handles(&self, function: u16) -> bool {
        function == u16::from(DeviceFunction::GetSensorData)
    }

    fn decode(&self, function: u16, payload: &[u8]) -> SensorResult<EventKind> {
        if !self.handles(function) {
            return Err(SensorError::UnsupportedFunction(function));
        }
        Ok(EventKind::ImuData(Box::new(self.parse(payload)?)))
    }
}
