//! Client library for IMU/GNSS motion sensors speaking the LP length-framed
//! binary protocol over pluggable byte transports (USB-serial, native
//! serial, Bluetooth, CAN).
//!
//! The library is organized in layers:
//!
//! * [`codec`] - LP frame encoding and the streaming parser.
//! * [`transport`] - byte-level send plus a push-based receive callback;
//!   concrete drivers register as [`transport::TransportFamily`] instances.
//! * [`connection`] - glues codec to transport and applies the resync
//!   policy.
//! * [`sync`] - the half-duplex request/reply coordinator: one outstanding
//!   request per sensor, typed replies, acks, nacks and timeouts.
//! * [`manager`] / [`sensor`] / [`client`] - session lifecycle: discovery,
//!   connection negotiation, component construction and the per-client
//!   event queue.
//!
//! # Example
//!
//! ```rust,no_run
//! use lpmotion::{EventKind, SensorClient};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SensorClient::new();
//!     let sensor = client.obtain_sensor_by_name("SiUsb", "/dev/ttyUSB0", 0)?;
//!
//!     loop {
//!         match client.wait_for_next_event() {
//!             Some(event) => {
//!                 if let EventKind::ImuData(sample) = event.kind {
//!                     println!("acc: {:?} @ {:.3}s", sample.acc, sample.timestamp);
//!                 }
//!             }
//!             None => break,
//!         }
//!     }
//!
//!     client.release_sensor(sensor)?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod components;
pub mod connection;
pub mod datatypes;
pub mod error;
pub mod manager;
pub mod negotiation;
pub mod properties;
pub mod sensor;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod tests;

pub use client::SensorClient;
pub use components::ComponentKind;
pub use datatypes::{
    ComponentHandle, Event, EventKind, GnssSample, ImuSample, Matrix3x3, PropertyKey,
    PropertyType, SensorDesc, SensorHandle,
};
pub use error::{AsyncStatus, SensorError, SensorResult};
pub use manager::SensorManager;
pub use properties::{ArrayBuf, ArraySlice, PropertyInterface};
