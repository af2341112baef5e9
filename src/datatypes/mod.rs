//! Protocol constants and plain data carried through the library: device
//! function codes, the property keyspace, sensor samples and client events.

mod events;
mod functions;
mod properties;

pub use events::{
    ComponentHandle, Event, EventKind, GnssSample, ImuSample, Matrix3x3, SensorDesc, SensorHandle,
};
pub use functions::{DeviceFunction, SENSOR_CORE_ADDRESS};
pub use properties::{PropertyKey, PropertyType};
