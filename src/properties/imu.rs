// ABOUTME: Property provider for IMU components: streaming switch, output
// ABOUTME: bitset flags, precision mode, ranges, alignments and commands.

use std::sync::Arc;

use crate::components::{OutputConfig, imu_ig1, imu_v0};
use crate::datatypes::{
    DeviceFunction, Matrix3x3, PropertyKey, PropertyType, SENSOR_CORE_ADDRESS,
};
use crate::error::{SensorError, SensorResult};
use crate::sync::SyncedCommunicator;

use super::{ArrayBuf, ArraySlice, PropertyInterface, PropertyNotifier, StreamControl};

/// Which firmware family's output bit layout applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuFamily {
    V0,
    Ig1,
}

/// Range steps shared by the family's accelerometers (g).
const ACC_SUPPORTED_RANGES: [i32; 4] = [2, 4, 8, 16];
/// Gyro range steps (deg/s).
const GYR_SUPPORTED_RANGES: [i32; 5] = [125, 250, 500, 1000, 2000];
/// Magnetometer range steps (gauss).
const MAG_SUPPORTED_RANGES: [i32; 3] = [4, 8, 16];

pub struct ImuProperties {
    synced: Arc<SyncedCommunicator>,
    stream: Arc<StreamControl>,
    config: Arc<OutputConfig>,
    notifier: Arc<PropertyNotifier>,
    family: ImuFamily,
}

impl ImuProperties {
    pub fn new(
        synced: Arc<SyncedCommunicator>,
        stream: Arc<StreamControl>,
        config: Arc<OutputConfig>,
        notifier: Arc<PropertyNotifier>,
        family: ImuFamily,
    ) -> Self {
        ImuProperties {
            synced,
            stream,
            config,
            notifier,
            family,
        }
    }

    /// Output-data bit for a flag key, per firmware family. For the IG1's
    /// dual gyro the flag drives the first gyro's group; the aligned output
    /// additionally differs from the raw one.
    fn output_bit(&self, key: PropertyKey) -> Option<u32> {
        match self.family {
            ImuFamily::Ig1 => match key {
                PropertyKey::OutputRawAcc => Some(imu_ig1::RAW_ACC),
                PropertyKey::OutputAcc => Some(imu_ig1::ACC),
                PropertyKey::OutputRawGyr => Some(imu_ig1::RAW_GYRO0),
                PropertyKey::OutputGyr => Some(imu_ig1::ALIGN_GYRO0),
                PropertyKey::OutputRawMag => Some(imu_ig1::RAW_MAG),
                PropertyKey::OutputMag => Some(imu_ig1::MAG),
                PropertyKey::OutputAngularVel => Some(imu_ig1::ANGULAR_VEL),
                PropertyKey::OutputQuat => Some(imu_ig1::QUAT),
                PropertyKey::OutputEuler => Some(imu_ig1::EULER),
                PropertyKey::OutputLinearAcc => Some(imu_ig1::LINEAR_ACC),
                PropertyKey::OutputPressure => Some(imu_ig1::PRESSURE),
                PropertyKey::OutputAltitude => Some(imu_ig1::ALTITUDE),
                PropertyKey::OutputTemperature => Some(imu_ig1::TEMPERATURE),
                _ => None,
            },
            ImuFamily::V0 => match key {
                PropertyKey::OutputRawAcc => Some(imu_v0::RAW_ACC),
                PropertyKey::OutputAcc => Some(imu_v0::ACC),
                PropertyKey::OutputRawGyr => Some(imu_v0::RAW_GYRO),
                PropertyKey::OutputGyr => Some(imu_v0::GYRO),
                PropertyKey::OutputRawMag => Some(imu_v0::RAW_MAG),
                PropertyKey::OutputMag => Some(imu_v0::MAG),
                PropertyKey::OutputAngularVel => Some(imu_v0::ANGULAR_VEL),
                PropertyKey::OutputQuat => Some(imu_v0::QUAT),
                PropertyKey::OutputEuler => Some(imu_v0::EULER),
                PropertyKey::OutputLinearAcc => Some(imu_v0::LINEAR_ACC),
                PropertyKey::OutputPressure => Some(imu_v0::PRESSURE),
                PropertyKey::OutputAltitude => Some(imu_v0::ALTITUDE),
                PropertyKey::OutputTemperature => Some(imu_v0::TEMPERATURE),
                _ => None,
            },
        }
    }

    fn int_functions(key: PropertyKey) -> Option<(DeviceFunction, DeviceFunction)> {
        match key {
            PropertyKey::AccRange => Some((DeviceFunction::GetAccRange, DeviceFunction::SetAccRange)),
            PropertyKey::GyrRange => Some((DeviceFunction::GetGyrRange, DeviceFunction::SetGyrRange)),
            PropertyKey::MagRange => Some((DeviceFunction::GetMagRange, DeviceFunction::SetMagRange)),
            PropertyKey::FilterMode => {
                Some((DeviceFunction::GetFilterMode, DeviceFunction::SetFilterMode))
            }
            _ => None,
        }
    }

    fn matrix_functions(key: PropertyKey) -> Option<(DeviceFunction, DeviceFunction)> {
        match key {
            PropertyKey::AccAlignment => Some((
                DeviceFunction::GetAccAlignment,
                DeviceFunction::SetAccAlignment,
            )),
            PropertyKey::GyrAlignment => Some((
                DeviceFunction::GetGyrAlignment,
                DeviceFunction::SetGyrAlignment,
            )),
            PropertyKey::MagAlignment => Some((
                DeviceFunction::GetMagAlignment,
                DeviceFunction::SetMagAlignment,
            )),
            _ => None,
        }
    }

    fn bias_functions(key: PropertyKey) -> Option<(DeviceFunction, DeviceFunction)> {
        match key {
            PropertyKey::AccBias => Some((DeviceFunction::GetAccBias, DeviceFunction::SetAccBias)),
            PropertyKey::GyrBias => Some((DeviceFunction::GetGyrBias, DeviceFunction::SetGyrBias)),
            _ => None,
        }
    }

    fn supported_ranges(key: PropertyKey) -> Option<&'static [i32]> {
        match key {
            PropertyKey::AccSupportedRanges => Some(&ACC_SUPPORTED_RANGES),
            PropertyKey::GyrSupportedRanges => Some(&GYR_SUPPORTED_RANGES),
            PropertyKey::MagSupportedRanges => Some(&MAG_SUPPORTED_RANGES),
            _ => None,
        }
    }

    fn request_ack(&self, function: DeviceFunction, payload: &[u8]) -> SensorResult<()> {
        self.stream.pause_for(|| {
            self.synced
                .send_and_wait_for_ack(SENSOR_CORE_ADDRESS, u16::from(function), payload)
        })
    }

    fn request_result<T: crate::sync::FromReplyPayload>(
        &self,
        function: DeviceFunction,
    ) -> SensorResult<T> {
        self.stream.pause_for(|| {
            self.synced.send_and_wait_for_result(
                SENSOR_CORE_ADDRESS,
                u16::from(function),
                u16::from(function),
                &[],
            )
        })
    }
}

impl PropertyInterface for ImuProperties {
    fn execute(&self, key: PropertyKey) -> SensorResult<()> {
        match key {
            // The sample arrives as an ordinary streaming frame.
            PropertyKey::PollSensorData => self.synced.publish(
                SENSOR_CORE_ADDRESS,
                u16::from(DeviceFunction::GetSensorData),
                &[],
            ),
            PropertyKey::CalibrateGyro => {
                self.request_ack(DeviceFunction::StartGyroCalibration, &[])
            }
            PropertyKey::ResetOrientationOffset => {
                self.request_ack(DeviceFunction::ResetOrientationOffset, &[])
            }
            _ => Err(SensorError::UnknownCommand),
        }
    }

    fn get_bool(&self, key: PropertyKey) -> SensorResult<bool> {
        if self.is_executable(key) {
            return Err(SensorError::WrongDataType);
        }
        if key == PropertyKey::StreamData {
            return Ok(self.stream.is_streaming());
        }
        if key == PropertyKey::OutputLowPrecision {
            return Ok(self.config.is_low_precision());
        }
        match self.output_bit(key) {
            Some(bit) => Ok(self.config.bit(bit)),
            None => Err(SensorError::UnknownProperty),
        }
    }

    fn set_bool(&self, key: PropertyKey, value: bool) -> SensorResult<()> {
        if key == PropertyKey::StreamData {
            self.stream.set_streaming(value)?;
            self.notifier.notify(key);
            return Ok(());
        }
        if key == PropertyKey::OutputLowPrecision {
            self.request_ack(DeviceFunction::SetDataMode, &u32::from(value).to_le_bytes())?;
            self.config.set_low_precision(value);
            self.notifier.notify(key);
            return Ok(());
        }

        let Some(bit) = self.output_bit(key) else {
            return Err(SensorError::UnknownProperty);
        };
        let mut bits = self.config.bits();
        if value {
            bits |= 1 << bit;
        } else {
            bits &= !(1 << bit);
        }
        self.request_ack(DeviceFunction::SetTransmitData, &bits.to_le_bytes())?;
        self.config.set_bits(bits);
        self.notifier.notify(key);
        Ok(())
    }

    fn get_i32(&self, key: PropertyKey) -> SensorResult<i32> {
        if self.is_executable(key) {
            return Err(SensorError::WrongDataType);
        }
        let (getter, _) = Self::int_functions(key).ok_or(SensorError::UnknownProperty)?;
        let raw: u32 = self.request_result(getter)?;
        Ok(raw as i32)
    }

    fn set_i32(&self, key: PropertyKey, value: i32) -> SensorResult<()> {
        let (_, setter) = Self::int_functions(key).ok_or(SensorError::UnknownProperty)?;
        self.request_ack(setter, &(value as u32).to_le_bytes())?;
        self.notifier.notify(key);
        Ok(())
    }

    fn get_matrix33(&self, key: PropertyKey) -> SensorResult<Matrix3x3> {
        if self.is_executable(key) {
            return Err(SensorError::WrongDataType);
        }
        let (getter, _) = Self::matrix_functions(key).ok_or(SensorError::UnknownProperty)?;
        self.request_result(getter)
    }

    fn set_matrix33(&self, key: PropertyKey, value: &Matrix3x3) -> SensorResult<()> {
        let (_, setter) = Self::matrix_functions(key).ok_or(SensorError::UnknownProperty)?;
        let mut payload = Vec::with_capacity(36);
        for entry in value.data {
            payload.extend_from_slice(&entry.to_le_bytes());
        }
        self.request_ack(setter, &payload)?;
        self.notifier.notify(key);
        Ok(())
    }

    fn get_array(&self, key: PropertyKey, buf: ArrayBuf<'_>) -> SensorResult<usize> {
        if let Some(ranges) = Self::supported_ranges(key) {
            let ArrayBuf::Int32(out) = buf else {
                return Err(SensorError::WrongDataType);
            };
            if out.len() < ranges.len() {
                return Err(SensorError::BufferTooSmall {
                    required: ranges.len(),
                });
            }
            out[..ranges.len()].copy_from_slice(ranges);
            return Ok(ranges.len());
        }

        let (getter, _) = Self::bias_functions(key).ok_or(SensorError::UnknownProperty)?;
        let ArrayBuf::Float(out) = buf else {
            return Err(SensorError::WrongDataType);
        };
        self.stream.pause_for(|| {
            self.synced.send_and_wait_for_array(
                SENSOR_CORE_ADDRESS,
                u16::from(getter),
                u16::from(getter),
                &[],
                out,
            )
        })
    }

    fn set_array(&self, key: PropertyKey, values: ArraySlice<'_>) -> SensorResult<()> {
        let (_, setter) = Self::bias_functions(key).ok_or(SensorError::UnknownProperty)?;
        if values.type_of() != PropertyType::FloatArray {
            return Err(SensorError::WrongDataType);
        }
        self.request_ack(setter, &values.to_wire())?;
        self.notifier.notify(key);
        Ok(())
    }

    fn is_array(&self, key: PropertyKey) -> bool {
        Self::supported_ranges(key).is_some() || Self::bias_functions(key).is_some()
    }

    fn is_constant(&self, key: PropertyKey) -> bool {
        Self::supported_ranges(key).is_some()
    }

    fn is_executable(&self, key: PropertyKey) -> bool {
        matches!(
            key,
            PropertyKey::PollSensorData
                | PropertyKey::CalibrateGyro
                | PropertyKey::ResetOrientationOffset
        )
    }

    fn type_of(&self, key: PropertyKey) -> PropertyType {
        if key == PropertyKey::StreamData
            || key == PropertyKey::OutputLowPrecision
            || self.output_bit(key).is_some()
        {
            return PropertyType::Bool;
        }
        if Self::int_functions(key).is_some() {
            return PropertyType::Int32;
        }
        if Self::matrix_functions(key).is_some() {
            return PropertyType::Matrix3x3;
        }
        if Self::supported_ranges(key).is_some() {
            return PropertyType::Int32Array;
        }
        if Self::bias_functions(key).is_some() {
            return PropertyType::FloatArray;
        }
        PropertyType::Invalid
    }
}
