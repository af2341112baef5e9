// ABOUTME: Sample records decoded from streaming payloads, discovery
// ABOUTME: descriptors and the event union delivered to client queues.

use super::properties::PropertyKey;

/// Token identifying an open sensor. Allocated monotonically by the session
/// manager; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorHandle(pub u64);

/// A component's externally visible handle: its 1-based ordinal within the
/// owning sensor's component list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentHandle(pub usize);

/// Row-major 3x3 float matrix (alignment and soft-iron calibration).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Matrix3x3 {
    pub data: [f32; 9],
}

impl Matrix3x3 {
    pub fn identity() -> Self {
        Matrix3x3 {
            data: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Identifying tuple returned by discovery and accepted by `obtain`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SensorDesc {
    /// Human-readable device name.
    pub name: String,
    pub serial_number: String,
    /// Transport-specific identifier (port path, MAC address, CAN id).
    pub identifier: String,
    /// Key of the transport family that produced this descriptor.
    pub io_type: String,
    /// 0 means "use the transport family's default".
    pub baud_rate: u32,
    /// Opaque value owned by the transport family.
    pub handle: u64,
}

impl SensorDesc {
    /// Two descriptors refer to the same physical device when IO type and
    /// identifier agree; name, baud rate and handle are advisory.
    pub fn same_device(&self, other: &SensorDesc) -> bool {
        self.io_type == other.io_type && self.identifier == other.identifier
    }
}

/// One decoded inertial sample.
///
/// Which fields are populated depends on the sensor's output-data bitset;
/// unrequested fields stay zero. The second gyro group only exists on the
/// IG1 family.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImuSample {
    /// Index of the data frame as counted by the firmware.
    pub frame_count: u32,
    /// Sampling time in seconds (frame count times the 2 ms tick).
    pub timestamp: f64,

    pub acc_raw: [f32; 3],
    pub acc: [f32; 3],

    pub gyro1_raw: [f32; 3],
    pub gyro2_raw: [f32; 3],
    pub gyro1_bias_calib: [f32; 3],
    pub gyro2_bias_calib: [f32; 3],
    pub gyro1: [f32; 3],
    pub gyro2: [f32; 3],

    pub mag_raw: [f32; 3],
    pub mag: [f32; 3],

    pub angular_vel: [f32; 3],
    /// Orientation quaternion (w, x, y, z).
    pub quat: [f32; 4],
    pub euler: [f32; 3],
    pub lin_acc: [f32; 3],

    pub pressure: f32,
    pub altitude: f32,
    pub temperature: f32,
    /// Heave motion estimate (marine firmware builds).
    pub heave: f32,
}

/// One decoded GNSS position-velocity-time record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GnssSample {
    /// GPS time of week in milliseconds.
    pub itow_ms: u32,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Sub-millisecond fraction of the time of week in nanoseconds; can be
    /// negative after the receiver rounds iTOW up.
    pub nanosecond_correction: i32,
    /// 0: no fix, 2: 2D, 3: 3D, 4: GNSS+dead-reckoning.
    pub fix_type: u8,
    /// 0: none, 1: RTK float, 2: RTK fixed.
    pub carrier_phase_solution: u8,
    pub num_satellites: u8,
    pub longitude_deg: f64,
    pub latitude_deg: f64,
    pub height_m: f64,
    pub horizontal_accuracy_m: f64,
    pub vertical_accuracy_m: f64,
    pub ground_speed_mps: f64,
    pub speed_accuracy_mps: f64,
    pub heading_deg: f64,
    pub heading_accuracy_deg: f64,
}

/// What happened; see [`Event`] for the addressing envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    ImuData(Box<ImuSample>),
    GnssData(Box<GnssSample>),
    SensorFound(SensorDesc),
    ListingProgress { progress: f32, complete: bool },
    PropertyChanged(PropertyKey),
}

/// An event delivered to a client's queue. Data events carry the component
/// they were decoded by; discovery events carry neither sensor nor component.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub sensor: Option<SensorHandle>,
    pub component: Option<ComponentHandle>,
    pub kind: EventKind,
}

impl Event {
    pub fn discovery(kind: EventKind) -> Self {
        Event {
            sensor: None,
            component: None,
            kind,
        }
    }

    pub fn for_component(
        sensor: SensorHandle,
        component: ComponentHandle,
        kind: EventKind,
    ) -> Self {
        Event {
            sensor: Some(sensor),
            component: Some(component),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_identity_ignores_advisory_fields() {
        let a = SensorDesc {
            name: "LPMS-IG1".into(),
            identifier: "/dev/ttyUSB0".into(),
            io_type: "SiUsb".into(),
            baud_rate: 921600,
            ..Default::default()
        };
        let mut b = a.clone();
        b.name = "renamed".into();
        b.baud_rate = 0;
        b.handle = 17;
        assert!(a.same_device(&b));

        b.identifier = "/dev/ttyUSB1".into();
        assert!(!a.same_device(&b));
    }
}
