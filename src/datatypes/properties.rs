// ABOUTME: Numeric property keyspace exposed to host applications, plus the
// ABOUTME: data-type tags the property providers answer queries with.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Property keys across all component families.
///
/// The keyspace is partitioned: core sensor properties start at 1000, IMU
/// properties at 10000, GNSS properties at 20000. A key's numeric value is
/// stable API; host applications address properties by number through the
/// C-level bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum PropertyKey {
    Invalid = 0,

    // Core sensor properties.
    DeviceName = 1000,
    FirmwareInfo = 1001,
    FirmwareVersion = 1002,
    SerialNumber = 1003,
    BatteryCharging = 1004,
    BatteryLevel = 1005,
    BatteryVoltage = 1006,
    BaudRate = 1007,
    SupportedBaudRates = 1008,
    /// 0: 32-bit float samples, 1: 16-bit fixed-point samples.
    DataMode = 1009,
    TimeOffset = 1010,
    SamplingRate = 1011,
    SupportedSamplingRates = 1012,
    /// Executable: persist current settings in flash.
    StoreSettingsInFlash = 1013,
    /// Executable: restore factory settings.
    RestoreFactorySettings = 1014,

    // IMU properties.
    StreamData = 10000,
    FilterMode = 10001,
    AccRange = 10002,
    AccSupportedRanges = 10003,
    GyrRange = 10004,
    GyrSupportedRanges = 10005,
    MagRange = 10006,
    MagSupportedRanges = 10007,
    AccAlignment = 10008,
    GyrAlignment = 10009,
    MagAlignment = 10010,
    AccBias = 10011,
    GyrBias = 10012,
    OutputLowPrecision = 10013,
    OutputRawAcc = 10014,
    OutputAcc = 10015,
    OutputRawGyr = 10016,
    OutputGyr = 10017,
    OutputRawMag = 10018,
    OutputMag = 10019,
    OutputAngularVel = 10020,
    OutputQuat = 10021,
    OutputEuler = 10022,
    OutputLinearAcc = 10023,
    OutputPressure = 10024,
    OutputAltitude = 10025,
    OutputTemperature = 10026,
    /// Executable: request one sample while not streaming.
    PollSensorData = 10027,
    /// Executable: start gyro bias calibration.
    CalibrateGyro = 10028,
    /// Executable: zero the orientation offset.
    ResetOrientationOffset = 10029,

    // GNSS properties.
    /// Executable: store downloaded satellite state for warm starts.
    StoreNavigationState = 20000,
}

/// Data type tag for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum PropertyType {
    Invalid = 0,
    Bool = 1,
    Float = 2,
    Int32 = 3,
    UInt64 = 4,
    String = 5,
    Matrix3x3 = 6,
    ByteArray = 7,
    Int32Array = 8,
    FloatArray = 9,
}
