// ABOUTME: Device function codes shared by the v0 and IG1-era firmware
// ABOUTME: families; every code fits the legacy 8-bit function field.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Frames addressed to 0 target the sensor core; non-zero addresses select
/// component buses (CAN endpoints).
pub const SENSOR_CORE_ADDRESS: u8 = 0;

/// Function codes of the LP command set.
///
/// Replies reuse the request's function code; `Ack`/`Nack` acknowledge
/// setters and commands that carry no reply payload. Values stay within the
/// 8-bit range so the same command set works on the legacy wire variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum DeviceFunction {
    Ack = 0,
    Nack = 1,

    UpdateFirmware = 2,
    UpdateIap = 3,

    GetConfig = 4,
    GetStatus = 5,

    /// Command mode halts streaming for configuration round-trips.
    GotoCommandMode = 6,
    GotoStreamMode = 7,

    /// Streaming sample payload; also the reply to a manual data poll.
    GetSensorData = 9,

    /// Output-data bitset selecting the fields of the sample payload.
    SetTransmitData = 10,
    SetStreamFreq = 11,
    GetStreamFreq = 12,

    GetBatteryLevel = 13,
    GetBatteryVoltage = 14,
    GetBatteryCharging = 15,

    GetSerialNumber = 16,
    GetDeviceName = 17,
    GetFirmwareInfo = 18,
    GetFirmwareVersion = 19,

    /// 0: 32-bit float samples, 1: 16-bit fixed-point samples.
    SetDataMode = 20,
    SetTimestamp = 21,
    GetPing = 22,

    WriteRegisters = 23,
    RestoreFactorySettings = 24,

    SetAccRange = 25,
    GetAccRange = 26,
    SetGyrRange = 27,
    GetGyrRange = 28,
    SetMagRange = 29,
    GetMagRange = 30,

    SetAccAlignment = 31,
    GetAccAlignment = 32,
    SetGyrAlignment = 33,
    GetGyrAlignment = 34,
    SetMagAlignment = 35,
    GetMagAlignment = 36,

    SetAccBias = 37,
    GetAccBias = 38,
    SetGyrBias = 39,
    GetGyrBias = 40,

    SetFilterMode = 41,
    GetFilterMode = 42,

    StartGyroCalibration = 43,
    ResetOrientationOffset = 44,

    /// GNSS PVT streaming payload (IG1 family with the GNSS capability bit).
    GetGnssData = 62,
    /// Persists downloaded satellite state so the receiver warm-starts.
    SaveGnssState = 63,
}

impl DeviceFunction {
    /// Whether a frame with this function is sensor-initiated streaming data
    /// rather than the reply to a request.
    pub fn is_streaming(self) -> bool {
        matches!(self, DeviceFunction::GetSensorData | DeviceFunction::GetGnssData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_fit_legacy_function_field() {
        for code in [
            DeviceFunction::Ack,
            DeviceFunction::Nack,
            DeviceFunction::GetSensorData,
            DeviceFunction::GetGnssData,
            DeviceFunction::SaveGnssState,
        ] {
            assert!(u16::from(code) <= u16::from(u8::MAX));
        }
    }

    #[test]
    fn streaming_classification() {
        assert!(DeviceFunction::GetSensorData.is_streaming());
        assert!(DeviceFunction::GetGnssData.is_streaming());
        assert!(!DeviceFunction::GetConfig.is_streaming());
    }
}
