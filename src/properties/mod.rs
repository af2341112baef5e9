//! Property registry: typed accessors per component, the streaming-pause
//! discipline around configuration round-trips, and in-process change
//! notification.
//!
//! Every config-class call (non-streaming property access or command
//! execution) must run with streaming paused: while a sensor streams, its
//! replies would interleave with data frames and the firmware ignores most
//! configuration writes. [`StreamControl::pause_for`] snapshots the cached
//! streaming flag, disables streaming if needed, runs the call, and restores
//! the previous state best-effort.

mod core;
mod gnss;
mod imu;

pub use self::core::CoreProperties;
pub use self::gnss::GnssProperties;
pub use self::imu::{ImuFamily, ImuProperties};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::datatypes::{
    DeviceFunction, Matrix3x3, PropertyKey, PropertyType, SENSOR_CORE_ADDRESS,
};
use crate::error::{SensorError, SensorResult};
use crate::sync::SyncedCommunicator;

/// Borrowed destination for array getters.
pub enum ArrayBuf<'a> {
    Bytes(&'a mut [u8]),
    Int32(&'a mut [i32]),
    Float(&'a mut [f32]),
}

impl ArrayBuf<'_> {
    pub fn type_of(&self) -> PropertyType {
        match self {
            ArrayBuf::Bytes(_) => PropertyType::ByteArray,
            ArrayBuf::Int32(_) => PropertyType::Int32Array,
            ArrayBuf::Float(_) => PropertyType::FloatArray,
        }
    }
}

/// Borrowed source for array setters.
pub enum ArraySlice<'a> {
    Bytes(&'a [u8]),
    Int32(&'a [i32]),
    Float(&'a [f32]),
}

impl ArraySlice<'_> {
    pub fn type_of(&self) -> PropertyType {
        match self {
            ArraySlice::Bytes(_) => PropertyType::ByteArray,
            ArraySlice::Int32(_) => PropertyType::Int32Array,
            ArraySlice::Float(_) => PropertyType::FloatArray,
        }
    }

    pub fn to_wire(&self) -> Vec<u8> {
        match self {
            ArraySlice::Bytes(values) => values.to_vec(),
            ArraySlice::Int32(values) => values
                .iter()
                .flat_map(|value| value.to_le_bytes())
                .collect(),
            ArraySlice::Float(values) => values
                .iter()
                .flat_map(|value| value.to_le_bytes())
                .collect(),
        }
    }
}

/// Typed property access for one component (or the sensor core).
///
/// Unsupported combinations fail with `UnknownProperty`; a getter invoked on
/// an executable key fails with `WrongDataType` - commands carry no value
/// but stay in the registry alongside ordinary properties.
pub trait PropertyInterface: Send + Sync {
    fn execute(&self, _key: PropertyKey) -> SensorResult<()> {
        Err(SensorError::UnknownCommand)
    }

    fn get_bool(&self, _key: PropertyKey) -> SensorResult<bool> {
        Err(SensorError::UnknownProperty)
    }

    fn set_bool(&self, _key: PropertyKey, _value: bool) -> SensorResult<()> {
        Err(SensorError::UnknownProperty)
    }

    fn get_i32(&self, _key: PropertyKey) -> SensorResult<i32> {
        Err(SensorError::UnknownProperty)
    }

    fn set_i32(&self, _key: PropertyKey, _value: i32) -> SensorResult<()> {
        Err(SensorError::UnknownProperty)
    }

    fn get_u64(&self, _key: PropertyKey) -> SensorResult<u64> {
        Err(SensorError::UnknownProperty)
    }

    fn set_u64(&self, _key: PropertyKey, _value: u64) -> SensorResult<()> {
        Err(SensorError::UnknownProperty)
    }

    fn get_f32(&self, _key: PropertyKey) -> SensorResult<f32> {
        Err(SensorError::UnknownProperty)
    }

    fn set_f32(&self, _key: PropertyKey, _value: f32) -> SensorResult<()> {
        Err(SensorError::UnknownProperty)
    }

    fn get_matrix33(&self, _key: PropertyKey) -> SensorResult<Matrix3x3> {
        Err(SensorError::UnknownProperty)
    }

    fn set_matrix33(&self, _key: PropertyKey, _value: &Matrix3x3) -> SensorResult<()> {
        Err(SensorError::UnknownProperty)
    }

    fn get_string(&self, _key: PropertyKey) -> SensorResult<String> {
        Err(SensorError::UnknownProperty)
    }

    fn set_string(&self, _key: PropertyKey, _value: &str) -> SensorResult<()> {
        Err(SensorError::UnknownProperty)
    }

    fn get_array(&self, _key: PropertyKey, _buf: ArrayBuf<'_>) -> SensorResult<usize> {
        Err(SensorError::UnknownProperty)
    }

    fn set_array(&self, _key: PropertyKey, _values: ArraySlice<'_>) -> SensorResult<()> {
        Err(SensorError::UnknownProperty)
    }

    fn is_array(&self, key: PropertyKey) -> bool;

    /// Constant properties cannot be set.
    fn is_constant(&self, key: PropertyKey) -> bool;

    fn is_executable(&self, key: PropertyKey) -> bool;

    fn type_of(&self, key: PropertyKey) -> PropertyType;
}

/// Synchronous in-process fan-out of property changes. Observers run on the
/// turn-holder's thread right after the setter's acknowledgement.
#[derive(Default)]
pub struct PropertyNotifier {
    observers: Mutex<Vec<Box<dyn Fn(PropertyKey) + Send + Sync>>>,
}

impl PropertyNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, observer: impl Fn(PropertyKey) + Send + Sync + 'static) {
        self.observers.lock().unwrap().push(Box::new(observer));
    }

    pub fn notify(&self, key: PropertyKey) {
        for observer in self.observers.lock().unwrap().iter() {
            observer(key);
        }
    }
}

/// Owns the cached `stream_data` flag and the command/stream mode switch.
///
/// The cache is updated on every observed success of the mode switch;
/// readers accept eventual consistency.
pub struct StreamControl {
    synced: Arc<SyncedCommunicator>,
    streaming: AtomicBool,
}

impl StreamControl {
    /// Sensors boot into streaming mode.
    pub fn new(synced: Arc<SyncedCommunicator>) -> Self {
        StreamControl {
            synced,
            streaming: AtomicBool::new(true),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Switch between stream and command mode, waiting for the ack.
    pub fn set_streaming(&self, enabled: bool) -> SensorResult<()> {
        let function = if enabled {
            DeviceFunction::GotoStreamMode
        } else {
            DeviceFunction::GotoCommandMode
        };
        self.synced
            .send_and_wait_for_ack(SENSOR_CORE_ADDRESS, u16::from(function), &[])?;
        self.streaming.store(enabled, Ordering::Release);
        Ok(())
    }

    /// Run a config-class call with streaming paused. If the sensor was
    /// streaming beforehand, streaming is re-enabled afterwards regardless
    /// of the call's outcome; a failed restore is logged, never surfaced.
    pub fn pause_for<T>(&self, call: impl FnOnce() -> SensorResult<T>) -> SensorResult<T> {
        let was_streaming = self.is_streaming();
        if was_streaming {
            self.set_streaming(false)?;
        }

        let result = call();

        if was_streaming {
            if let Err(err) = self.set_streaming(true) {
                warn!(%err, "failed to restore streaming after configuration access");
                // The flag still reflects the pre-call intent; the next
                // successful mode switch reconciles it.
                self.streaming.store(true, Ordering::Release);
            }
        }

        result
    }
}
