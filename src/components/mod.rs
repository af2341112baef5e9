//! Sensor components: logical sub-devices (IMU, GNSS) addressed by their
//! ordinal within the sensor. A component pairs a property provider with a
//! pure decoder from streaming payload bytes to a typed event.

pub mod gnss;
pub mod imu_ig1;
pub mod imu_v0;

pub use gnss::GnssDecoder;
pub use imu_ig1::Ig1Decoder;
pub use imu_v0::V0Decoder;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::datatypes::EventKind;
use crate::error::{SensorError, SensorResult};
use crate::properties::PropertyInterface;

/// Which decoder/property family a component belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    ImuV0,
    ImuIg1,
    Gnss,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::ImuV0 => "imu_v0",
            ComponentKind::ImuIg1 => "imu_ig1",
            ComponentKind::Gnss => "gnss",
        }
    }
}

/// Decoder state shared between an IMU component and its property provider.
///
/// The property setters refresh this cache on every acknowledged write, so
/// the decoder always splits the sample payload with the bitset the
/// firmware is actually using.
#[derive(Debug)]
pub struct OutputConfig {
    bits: AtomicU32,
    low_precision: AtomicBool,
    /// The firmware can emit angles in degrees or radians; the decoder
    /// applies no conversion either way, it only affects the 16-bit
    /// multipliers chosen by some firmware builds.
    degrees: AtomicBool,
}

impl OutputConfig {
    pub fn new(bits: u32) -> Self {
        OutputConfig {
            bits: AtomicU32::new(bits),
            low_precision: AtomicBool::new(false),
            degrees: AtomicBool::new(true),
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }

    pub fn set_bits(&self, bits: u32) {
        self.bits.store(bits, Ordering::Release);
    }

    pub fn bit(&self, index: u32) -> bool {
        self.bits() & (1 << index) != 0
    }

    pub fn set_bit(&self, index: u32, value: bool) {
        let mask = 1u32 << index;
        if value {
            self.bits.fetch_or(mask, Ordering::AcqRel);
        } else {
            self.bits.fetch_and(!mask, Ordering::AcqRel);
        }
    }

    pub fn is_low_precision(&self) -> bool {
        self.low_precision.load(Ordering::Acquire)
    }

    pub fn set_low_precision(&self, value: bool) {
        self.low_precision.store(value, Ordering::Release);
    }

    pub fn outputs_degrees(&self) -> bool {
        self.degrees.load(Ordering::Acquire)
    }

    pub fn set_outputs_degrees(&self, value: bool) {
        self.degrees.store(value, Ordering::Release);
    }
}

/// Pure function from a streaming payload to a typed event.
pub trait SampleDecoder: Send + Sync {
    /// Whether this decoder consumes frames with the given function code.
    fn handles(&self, function: u16) -> bool;

    fn decode(&self, function: u16, payload: &[u8]) -> SensorResult<EventKind>;
}

/// One logical sub-device of a sensor.
pub struct Component {
    kind: ComponentKind,
    properties: Arc<dyn PropertyInterface>,
    decoder: Arc<dyn SampleDecoder>,
}

impl Component {
    pub fn new(
        kind: ComponentKind,
        properties: Arc<dyn PropertyInterface>,
        decoder: Arc<dyn SampleDecoder>,
    ) -> Self {
        Component {
            kind,
            properties,
            decoder,
        }
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn properties(&self) -> &Arc<dyn PropertyInterface> {
        &self.properties
    }

    pub fn handles(&self, function: u16) -> bool {
        self.decoder.handles(function)
    }

    pub fn decode(&self, function: u16, payload: &[u8]) -> SensorResult<EventKind> {
        self.decoder.decode(function, payload)
    }
}

/// Cursor over a sample payload that reads either 32-bit floats or 16-bit
/// fixed-point values scaled by a per-field multiplier, depending on the
/// sensor's data mode.
pub(crate) struct SampleReader<'a> {
    buf: &'a [u8],
    low_precision: bool,
}

impl<'a> SampleReader<'a> {
    pub fn new(buf: &'a [u8], low_precision: bool) -> Self {
        SampleReader { buf, low_precision }
    }

    pub fn read_u32(&mut self) -> SensorResult<u32> {
        let (head, rest) = self
            .buf
            .split_at_checked(4)
            .ok_or(SensorError::MessageCorrupt)?;
        self.buf = rest;
        Ok(u32::from_le_bytes([head[0], head[1], head[2], head[3]]))
    }

    pub fn read_i32(&mut self) -> SensorResult<i32> {
        self.read_u32().map(|value| value as i32)
    }

    pub fn read_u16(&mut self) -> SensorResult<u16> {
        let (head, rest) = self
            .buf
            .split_at_checked(2)
            .ok_or(SensorError::MessageCorrupt)?;
        self.buf = rest;
        Ok(u16::from_le_bytes([head[0], head[1]]))
    }

    pub fn read_u8(&mut self) -> SensorResult<u8> {
        let (head, rest) = self
            .buf
            .split_at_checked(1)
            .ok_or(SensorError::MessageCorrupt)?;
        self.buf = rest;
        Ok(head[0])
    }

    /// One field value: IEEE-754 float32 in full precision, or an i16
    /// divided by `multiplier` in low-precision mode.
    pub fn scalar(&mut self, multiplier: f32) -> SensorResult<f32> {
        if self.low_precision {
            let raw = self.read_u16()? as i16;
            Ok(f32::from(raw) / multiplier)
        } else {
            self.read_u32().map(f32::from_bits)
        }
    }

    pub fn vec3(&mut self, multiplier: f32) -> SensorResult<[f32; 3]> {
        Ok([
            self.scalar(multiplier)?,
            self.scalar(multiplier)?,
            self.scalar(multiplier)?,
        ])
    }

    pub fn quat(&mut self, multiplier: f32) -> SensorResult<[f32; 4]> {
        Ok([
            self.scalar(multiplier)?,
            self.scalar(multiplier)?,
            self.scalar(multiplier)?,
            self.scalar(multiplier)?,
        ])
    }
}
