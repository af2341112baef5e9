// ABOUTME: Streaming sample decoder for the original single-gyro IMU
// ABOUTME: firmware family (protocol v0).

use std::sync::Arc;

use crate::datatypes::{DeviceFunction, EventKind, ImuSample};
use crate::error::{SensorError, SensorResult};

use super::{OutputConfig, SampleDecoder, SampleReader};

/// Output-data bit assignments of the v0 firmware.
mod bits {
    pub const RAW_ACC: u32 = 0;
    pub const ACC: u32 = 1;
    pub const RAW_GYRO: u32 = 2;
    pub const GYRO: u32 = 3;
    pub const RAW_MAG: u32 = 4;
    pub const MAG: u32 = 5;
    pub const ANGULAR_VEL: u32 = 6;
    pub const QUAT: u32 = 7;
    pub const EULER: u32 = 8;
    pub const LINEAR_ACC: u32 = 9;
    pub const PRESSURE: u32 = 10;
    pub const ALTITUDE: u32 = 11;
    pub const TEMPERATURE: u32 = 12;
    pub const HEAVE: u32 = 13;
}

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
    pub const HEAVE: f32 = 1000.0;
}

const FRAME_TICK: f64 = 0.002;

pub use bits::*;

/// Decoder for v0 sample payloads. The single gyro group lands in the first
/// gyro slots of [`ImuSample`].
pub struct V0Decoder {
    config: Arc<OutputConfig>,
}

impl V0Decoder {
    pub fn new(config: Arc<OutputConfig>) -> Self {
        V0Decoder { config }
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
        if config.bit(bits::RAW_GYRO) {
            sample.gyro1_raw = reader.vec3(scale::GYRO)?;
        }
        if config.bit(bits::GYRO) {
            sample.gyro1 = reader.vec3(scale::GYRO)?;
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
        if config.bit(bits::HEAVE) {
            sample.heave = reader.scalar(scale::HEAVE)?;
        }

        Ok(sample)
    }
}

impl SampleDecoder for V0Decoder {
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
