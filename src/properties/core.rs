// ABOUTME: Property provider for the sensor core: identification strings,
// ABOUTME: battery state, baud rate, data mode, timestamps and sampling rate.

use std::sync::Arc;

use crate::components::OutputConfig;
use crate::datatypes::{
    DeviceFunction, PropertyKey, PropertyType, SENSOR_CORE_ADDRESS,
};
use crate::error::{SensorError, SensorResult};
use crate::sync::SyncedCommunicator;

use super::{ArrayBuf, ArraySlice, PropertyInterface, PropertyNotifier, StreamControl};

/// Sampling rates every firmware build of this family accepts.
const SUPPORTED_SAMPLING_RATES: [i32; 7] = [5, 10, 25, 50, 100, 200, 400];

pub struct CoreProperties {
    synced: Arc<SyncedCommunicator>,
    stream: Arc<StreamControl>,
    output: Arc<OutputConfig>,
    notifier: Arc<PropertyNotifier>,
}

impl CoreProperties {
    pub fn new(
        synced: Arc<SyncedCommunicator>,
        stream: Arc<StreamControl>,
        output: Arc<OutputConfig>,
        notifier: Arc<PropertyNotifier>,
    ) -> Self {
        CoreProperties {
            synced,
            stream,
            output,
            notifier,
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

    fn string_function(key: PropertyKey) -> Option<DeviceFunction> {
        match key {
            PropertyKey::DeviceName => Some(DeviceFunction::GetDeviceName),
            PropertyKey::FirmwareInfo => Some(DeviceFunction::GetFirmwareInfo),
            PropertyKey::SerialNumber => Some(DeviceFunction::GetSerialNumber),
            _ => None,
        }
    }
}

impl PropertyInterface for CoreProperties {
    fn execute(&self, key: PropertyKey) -> SensorResult<()> {
        let function = match key {
            PropertyKey::StoreSettingsInFlash => DeviceFunction::WriteRegisters,
            PropertyKey::RestoreFactorySettings => DeviceFunction::RestoreFactorySettings,
            _ => return Err(SensorError::UnknownCommand),
        };
        self.request_ack(function, &[])
    }

    fn get_bool(&self, key: PropertyKey) -> SensorResult<bool> {
        if self.is_executable(key) {
            return Err(SensorError::WrongDataType);
        }
        match key {
            PropertyKey::BatteryCharging => {
                self.request_result::<bool>(DeviceFunction::GetBatteryCharging)
            }
            _ => Err(SensorError::UnknownProperty),
        }
    }

    fn get_f32(&self, key: PropertyKey) -> SensorResult<f32> {
        if self.is_executable(key) {
            return Err(SensorError::WrongDataType);
        }
        match key {
            PropertyKey::BatteryLevel => self.request_result(DeviceFunction::GetBatteryLevel),
            PropertyKey::BatteryVoltage => self.request_result(DeviceFunction::GetBatteryVoltage),
            _ => Err(SensorError::UnknownProperty),
        }
    }

    fn get_i32(&self, key: PropertyKey) -> SensorResult<i32> {
        if self.is_executable(key) {
            return Err(SensorError::WrongDataType);
        }
        match key {
            // The transport answers locally; no wire round-trip.
            PropertyKey::BaudRate => {
                self.synced.communicator().baud_rate().map(|rate| rate as i32)
            }
            PropertyKey::TimeOffset => {
                let raw: u32 = self.request_result(DeviceFunction::GetPing)?;
                Ok(raw as i32)
            }
            PropertyKey::SamplingRate => {
                let raw: u32 = self.request_result(DeviceFunction::GetStreamFreq)?;
                Ok(raw as i32)
            }
            PropertyKey::DataMode => Ok(i32::from(self.output.is_low_precision())),
            _ => Err(SensorError::UnknownProperty),
        }
    }

    fn set_i32(&self, key: PropertyKey, value: i32) -> SensorResult<()> {
        match key {
            PropertyKey::BaudRate => {
                self.synced.communicator().set_baud_rate(value as u32)?;
            }
            PropertyKey::TimeOffset => {
                self.request_ack(DeviceFunction::SetTimestamp, &(value as u32).to_le_bytes())?;
            }
            PropertyKey::SamplingRate => {
                self.request_ack(DeviceFunction::SetStreamFreq, &(value as u32).to_le_bytes())?;
            }
            PropertyKey::DataMode => {
                self.request_ack(DeviceFunction::SetDataMode, &(value as u32).to_le_bytes())?;
                self.output.set_low_precision(value != 0);
            }
            _ => return Err(SensorError::UnknownProperty),
        }
        self.notifier.notify(key);
        Ok(())
    }

    fn get_string(&self, key: PropertyKey) -> SensorResult<String> {
        match Self::string_function(key) {
            Some(function) => self.request_result(function),
            None => Err(SensorError::UnknownProperty),
        }
    }

    fn get_array(&self, key: PropertyKey, buf: ArrayBuf<'_>) -> SensorResult<usize> {
        match (key, buf) {
            (PropertyKey::FirmwareVersion, ArrayBuf::Int32(out)) => {
                let function = DeviceFunction::GetFirmwareVersion;
                self.stream.pause_for(|| {
                    let count = self.synced.send_and_wait_for_array(
                        SENSOR_CORE_ADDRESS,
                        u16::from(function),
                        u16::from(function),
                        &[],
                        out,
                    )?;
                    // The device reports major last.
                    out[..count].reverse();
                    Ok(count)
                })
            }
            (PropertyKey::SupportedBaudRates, ArrayBuf::Int32(out)) => {
                let rates = self.synced.communicator().supported_baud_rates()?;
                if out.len() < rates.len() {
                    return Err(SensorError::BufferTooSmall {
                        required: rates.len(),
                    });
                }
                for (slot, rate) in out.iter_mut().zip(rates.iter()) {
                    *slot = *rate as i32;
                }
                Ok(rates.len())
            }
            (PropertyKey::SupportedSamplingRates, ArrayBuf::Int32(out)) => {
                if out.len() < SUPPORTED_SAMPLING_RATES.len() {
                    return Err(SensorError::BufferTooSmall {
                        required: SUPPORTED_SAMPLING_RATES.len(),
                    });
                }
                out[..SUPPORTED_SAMPLING_RATES.len()].copy_from_slice(&SUPPORTED_SAMPLING_RATES);
                Ok(SUPPORTED_SAMPLING_RATES.len())
            }
            (key, ArrayBuf::Bytes(out)) if Self::string_function(key).is_some() => {
                let value = self.get_string(key)?;
                let bytes = value.as_bytes();
                if out.len() < bytes.len() {
                    return Err(SensorError::BufferTooSmall {
                        required: bytes.len(),
                    });
                }
                out[..bytes.len()].copy_from_slice(bytes);
                Ok(bytes.len())
            }
            (key, buf)
                if self.is_array(key) && self.type_of(key) != buf.type_of() =>
            {
                Err(SensorError::WrongDataType)
            }
            _ => Err(SensorError::UnknownProperty),
        }
    }

    fn set_array(&self, _key: PropertyKey, _values: ArraySlice<'_>) -> SensorResult<()> {
        Err(SensorError::UnknownProperty)
    }

    fn is_array(&self, key: PropertyKey) -> bool {
        matches!(
            key,
            PropertyKey::DeviceName
                | PropertyKey::FirmwareInfo
                | PropertyKey::SerialNumber
                | PropertyKey::FirmwareVersion
                | PropertyKey::SupportedBaudRates
                | PropertyKey::SupportedSamplingRates
        )
    }

    fn is_constant(&self, key: PropertyKey) -> bool {
        matches!(
            key,
            PropertyKey::DeviceName
                | PropertyKey::FirmwareInfo
                | PropertyKey::FirmwareVersion
                | PropertyKey::SerialNumber
                | PropertyKey::BatteryCharging
                | PropertyKey::BatteryLevel
                | PropertyKey::BatteryVoltage
                | PropertyKey::SupportedBaudRates
                | PropertyKey::SupportedSamplingRates
        )
    }

    fn is_executable(&self, key: PropertyKey) -> bool {
        matches!(
            key,
            PropertyKey::StoreSettingsInFlash | PropertyKey::RestoreFactorySettings
        )
    }

    fn type_of(&self, key: PropertyKey) -> PropertyType {
        match key {
            PropertyKey::DeviceName
            | PropertyKey::FirmwareInfo
            | PropertyKey::SerialNumber => PropertyType::String,
            PropertyKey::FirmwareVersion
            | PropertyKey::SupportedBaudRates
            | PropertyKey::SupportedSamplingRates => PropertyType::Int32Array,
            PropertyKey::BatteryCharging => PropertyType::Bool,
            PropertyKey::BatteryLevel | PropertyKey::BatteryVoltage => PropertyType::Float,
            PropertyKey::BaudRate
            | PropertyKey::DataMode
            | PropertyKey::TimeOffset
            | PropertyKey::SamplingRate => PropertyType::Int32,
            _ => PropertyType::Invalid,
        }
    }
}
