//! End-to-end scenarios over a scripted in-memory transport: negotiation,
//! component construction, streaming, the pause-around-config discipline,
//! discovery fan-out and teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::Duration;

use crate::client::SensorClient;
use crate::codec::{self, FrameFormat, FrameParser};
use crate::components::{ComponentKind, imu_ig1, imu_v0};
use crate::datatypes::{
    DeviceFunction, Event, EventKind, PropertyKey, SENSOR_CORE_ADDRESS, SensorDesc,
};
use crate::error::{AsyncStatus, SensorError, SensorResult};
use crate::manager::SensorManager;
use crate::transport::{ByteSink, Transport, TransportFamily};

/// Scripted device behavior plus a log of every function it was sent.
struct MockDevice {
    identifier: String,
    name: String,
    protocol_version: u32,
    capabilities: u32,
    output_bits: u32,
    /// Never answer; negotiation against this device must fail.
    mute: bool,
    /// Functions answered with a Nack instead of an Ack.
    nacked: Vec<u16>,
    wire_log: Mutex<Vec<u16>>,
    /// Byte sink captured at open time, for injecting streaming frames.
    sink: Mutex<Option<Arc<dyn ByteSink>>>,
}

impl MockDevice {
    fn ig1(identifier: &str) -> Arc<Self> {
        Arc::new(MockDevice {
            identifier: identifier.to_owned(),
            name: "LPMS-IG1".to_owned(),
            protocol_version: 1,
            capabilities: 1, // GNSS present
            output_bits: (1 << imu_ig1::ACC) | (1 << imu_ig1::QUAT) | (1 << imu_ig1::TEMPERATURE),
            mute: false,
            nacked: Vec::new(),
            wire_log: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
        })
    }

    /// A first-generation unit: v0 framing, single gyro, no GNSS.
    fn legacy_b2(identifier: &str) -> Arc<Self> {
        Arc::new(MockDevice {
            identifier: identifier.to_owned(),
            name: "LPMS-B2".to_owned(),
            protocol_version: 0,
            capabilities: 0,
            output_bits: (1 << imu_v0::ACC) | (1 << imu_v0::QUAT),
            mute: false,
            nacked: Vec::new(),
            wire_log: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
        })
    }

    fn wire_format(&self) -> FrameFormat {
        if self.protocol_version >= 1 {
            FrameFormat::Lp
        } else {
            FrameFormat::LegacyV0
        }
    }

    fn functions_sent(&self) -> Vec<u16> {
        self.wire_log.lock().unwrap().clone()
    }

    fn clear_log(&self) {
        self.wire_log.lock().unwrap().clear();
    }

    /// Push a sensor-initiated frame through the open connection.
    fn stream(&self, function: DeviceFunction, payload: &[u8]) {
        let sink = self.sink.lock().unwrap().clone().expect("device not open");
        let frame = codec::make_frame(
            self.wire_format(),
            SENSOR_CORE_ADDRESS,
            u16::from(function),
            payload,
        )
        .unwrap();
        sink.on_bytes(&frame);
    }

    fn info_payload(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&self.protocol_version.to_le_bytes());
        payload.extend_from_slice(&self.capabilities.to_le_bytes());
        payload.extend_from_slice(self.name.as_bytes());
        payload.push(0);
        payload
    }

    fn reply_for(&self, function: u16) -> Option<(u16, Vec<u8>)> {
        if self.nacked.contains(&function) {
            return Some((u16::from(DeviceFunction::Nack), Vec::new()));
        }
        let function = DeviceFunction::try_from(function).ok()?;
        let reply = match function {
            DeviceFunction::GetFirmwareInfo => (function, self.info_payload()),
            DeviceFunction::GetConfig => (function, self.output_bits.to_le_bytes().to_vec()),
            DeviceFunction::GetStreamFreq => (function, 100u32.to_le_bytes().to_vec()),
            DeviceFunction::GetBatteryLevel => (function, 3.9f32.to_le_bytes().to_vec()),
            DeviceFunction::GetDeviceName => {
                let mut payload = self.name.as_bytes().to_vec();
                payload.push(0);
                (function, payload)
            }
            DeviceFunction::GetFirmwareVersion => {
                // Major last, as the firmware reports it.
                let mut payload = Vec::new();
                for value in [3u32, 7, 2] {
                    payload.extend_from_slice(&value.to_le_bytes());
                }
                (function, payload)
            }
            DeviceFunction::GetAccRange => (function, 8u32.to_le_bytes().to_vec()),
            DeviceFunction::GetAccAlignment => {
                let mut payload = Vec::new();
                for value in [1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0] {
                    payload.extend_from_slice(&value.to_le_bytes());
                }
                (function, payload)
            }
            DeviceFunction::GetAccBias => {
                let mut payload = Vec::new();
                for value in [0.01f32, -0.02, 0.03] {
                    payload.extend_from_slice(&value.to_le_bytes());
                }
                (function, payload)
            }
            // Everything else is a setter or command.
            _ => (DeviceFunction::Ack, Vec::new()),
        };
        Some((u16::from(reply.0), reply.1))
    }
}

struct MockTransport {
    device: Arc<MockDevice>,
    sink: Arc<dyn ByteSink>,
    requests: Mutex<FrameParser>,
    closed: AtomicBool,
    baud: Mutex<u32>,
}

impl MockTransport {
    fn handle_request(&self, function: u16) {
        self.device.wire_log.lock().unwrap().push(function);
        if self.device.mute {
            return;
        }
        if let Some((reply_function, payload)) = self.device.reply_for(function) {
            let frame = codec::make_frame(
                self.device.wire_format(),
                SENSOR_CORE_ADDRESS,
                reply_function,
                &payload,
            )
            .unwrap();
            self.sink.on_bytes(&frame);
        }
    }
}

impl Transport for MockTransport {
    fn send(&self, data: &[u8]) -> SensorResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SensorError::SendFailed);
        }
        // The mock sensor listens in its own generation's framing; requests
        // in the other variant fail its checksum and go unanswered, just
        // like real hardware.
        let mut parser = self.requests.lock().unwrap();
        let mut data = data;
        while !data.is_empty() {
            if parser.parse(&mut data).is_err() {
                parser.reset();
                data = &data[1..];
                continue;
            }
            if parser.finished() {
                let frame = parser.take_frame();
                self.handle_request(frame.function);
            }
        }
        Ok(())
    }

    fn set_baud_rate(&self, rate: u32) -> SensorResult<()> {
        *self.baud.lock().unwrap() = rate;
        Ok(())
    }

    fn baud_rate(&self) -> SensorResult<u32> {
        Ok(*self.baud.lock().unwrap())
    }

    fn supported_baud_rates(&self) -> SensorResult<Vec<u32>> {
        Ok(vec![921_600])
    }

    fn io_type(&self) -> &str {
        "mock"
    }

    fn identifier(&self) -> String {
        self.device.identifier.clone()
    }

    fn matches(&self, desc: &SensorDesc) -> bool {
        desc.io_type == "mock" && desc.identifier == self.device.identifier
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

struct MockFamily {
    io_type: String,
    devices: Vec<Arc<MockDevice>>,
}

impl MockFamily {
    fn new(io_type: &str, devices: Vec<Arc<MockDevice>>) -> Arc<Self> {
        Arc::new(MockFamily {
            io_type: io_type.to_owned(),
            devices,
        })
    }
}

impl TransportFamily for MockFamily {
    fn io_type(&self) -> &str {
        &self.io_type
    }

    fn default_baud_rate(&self) -> u32 {
        921_600
    }

    fn list_devices(&self, devices: &mut Vec<SensorDesc>) -> SensorResult<()> {
        for device in &self.devices {
            devices.push(SensorDesc {
                name: device.name.clone(),
                identifier: device.identifier.clone(),
                io_type: self.io_type.clone(),
                baud_rate: 921_600,
                ..Default::default()
            });
        }
        Ok(())
    }

    fn open(
        &self,
        desc: &SensorDesc,
        sink: Arc<dyn ByteSink>,
    ) -> SensorResult<Box<dyn Transport>> {
        let device = self
            .devices
            .iter()
            .find(|device| device.identifier == desc.identifier)
            .ok_or_else(|| SensorError::UnknownDeviceId(desc.identifier.clone()))?;
        *device.sink.lock().unwrap() = Some(Arc::clone(&sink));
        Ok(Box::new(MockTransport {
            device: Arc::clone(device),
            sink,
            requests: Mutex::new(FrameParser::new(device.wire_format())),
            closed: AtomicBool::new(false),
            baud: Mutex::new(desc.baud_rate),
        }))
    }
}

/// Route wire-level traces to the captured test output once per process.
fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

fn client_with_device(device: Arc<MockDevice>) -> (SensorClient, Arc<SensorManager>) {
    init_test_logging();
    let manager = SensorManager::new();
    manager
        .register_transport(MockFamily::new("mock", vec![device]))
        .unwrap();
    (SensorClient::with_manager(Arc::clone(&manager)), manager)
}

fn wait_events(client: &SensorClient, count: usize) -> Vec<Event> {
    (0..count)
        .map(|_| client.wait_for_next_event().expect("client terminated early"))
        .collect()
}

#[test]
fn obtain_builds_components_and_dedups() {
    let device = MockDevice::ig1("dev0");
    let (client, _manager) = client_with_device(Arc::clone(&device));

    let handle = client.obtain_sensor_by_name("mock", "dev0", 0).unwrap();
    let sensor = client.sensor(handle).unwrap();
    assert_eq!(sensor.io_type().unwrap(), "mock");
    assert_eq!(sensor.device_name(), "LPMS-IG1");

    let components = client.components(handle).unwrap();
    assert_eq!(components.len(), 2);
    assert_eq!(
        sensor.component_kind(components[0]).unwrap(),
        ComponentKind::ImuIg1
    );
    assert_eq!(
        sensor.component_kind(components[1]).unwrap(),
        ComponentKind::Gnss
    );

    let imu = client.any_component_of(handle, ComponentKind::ImuIg1).unwrap();
    assert!(imu.is_some());
    let gnss = client.any_component_of(handle, ComponentKind::Gnss).unwrap();
    assert!(gnss.is_some());
    assert!(
        client
            .any_component_of(handle, ComponentKind::ImuV0)
            .unwrap()
            .is_none()
    );

    // Obtaining the same device again returns the existing sensor.
    let again = client.obtain_sensor_by_name("mock", "dev0", 0).unwrap();
    assert_eq!(handle, again);

    // Negotiation probed the version before anything else.
    assert_eq!(
        device.functions_sent()[0],
        u16::from(DeviceFunction::GetFirmwareInfo)
    );
}

#[test]
fn unknown_io_type_is_rejected() {
    let (client, _manager) = client_with_device(MockDevice::ig1("dev0"));
    let result = client.obtain_sensor_by_name("bluetooth", "00:11:22", 0);
    assert!(matches!(result, Err(SensorError::UnsupportedIoType(_))));
}

#[test]
fn sampling_rate_set_pauses_and_restores_streaming() {
    let device = MockDevice::ig1("dev0");
    let (client, _manager) = client_with_device(Arc::clone(&device));
    let handle = client.obtain_sensor_by_name("mock", "dev0", 0).unwrap();
    let imu = client
        .any_component_of(handle, ComponentKind::ImuIg1)
        .unwrap()
        .unwrap();

    let imu_props = client.component_properties(handle, imu).unwrap();
    assert!(imu_props.get_bool(PropertyKey::StreamData).unwrap());

    device.clear_log();
    client
        .properties(handle)
        .unwrap()
        .set_i32(PropertyKey::SamplingRate, 50)
        .unwrap();

    assert_eq!(
        device.functions_sent(),
        vec![
            u16::from(DeviceFunction::GotoCommandMode),
            u16::from(DeviceFunction::SetStreamFreq),
            u16::from(DeviceFunction::GotoStreamMode),
        ]
    );
    assert!(imu_props.get_bool(PropertyKey::StreamData).unwrap());

    // The setter's success fans out as a property-changed event.
    let event = client.wait_for_next_event().unwrap();
    assert_eq!(event.sensor, Some(handle));
    assert_eq!(
        event.kind,
        EventKind::PropertyChanged(PropertyKey::SamplingRate)
    );
}

#[test]
fn discovery_reports_progress_then_devices() {
    init_test_logging();
    let manager = SensorManager::new();
    manager
        .register_transport(MockFamily::new("alpha", vec![MockDevice::ig1("A")]))
        .unwrap();
    manager
        .register_transport(MockFamily::new("beta", vec![MockDevice::ig1("B")]))
        .unwrap();
    let client = SensorClient::with_manager(Arc::clone(&manager));

    client.list_sensors_async();
    let events = wait_events(&client, 5);

    assert_eq!(
        events[0].kind,
        EventKind::ListingProgress {
            progress: 0.25,
            complete: false
        }
    );
    assert_eq!(
        events[1].kind,
        EventKind::ListingProgress {
            progress: 0.75,
            complete: false
        }
    );
    let EventKind::SensorFound(ref first) = events[2].kind else {
        panic!("expected a sensor-found event");
    };
    assert_eq!((first.io_type.as_str(), first.identifier.as_str()), ("alpha", "A"));
    let EventKind::SensorFound(ref second) = events[3].kind else {
        panic!("expected a sensor-found event");
    };
    assert_eq!((second.io_type.as_str(), second.identifier.as_str()), ("beta", "B"));
    assert_eq!(
        events[4].kind,
        EventKind::ListingProgress {
            progress: 1.0,
            complete: true
        }
    );
}

#[test]
fn streaming_sample_reaches_the_client_queue() {
    let device = MockDevice::ig1("dev0");
    let (client, _manager) = client_with_device(Arc::clone(&device));
    let handle = client.obtain_sensor_by_name("mock", "dev0", 0).unwrap();
    let imu = client
        .any_component_of(handle, ComponentKind::ImuIg1)
        .unwrap()
        .unwrap();

    // Bitset from GetConfig during init: acc, quaternion, temperature.
    let mut payload = Vec::new();
    payload.extend_from_slice(&250u32.to_le_bytes());
    for value in [0.0f32, 0.0, 9.81] {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    for value in [1.0f32, 0.0, 0.0, 0.0] {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    payload.extend_from_slice(&42.5f32.to_le_bytes());
    device.stream(DeviceFunction::GetSensorData, &payload);

    let event = client.wait_for_next_event().unwrap();
    assert_eq!(event.sensor, Some(handle));
    assert_eq!(event.component, Some(imu));
    let EventKind::ImuData(sample) = event.kind else {
        panic!("expected an IMU sample");
    };
    assert_eq!(sample.frame_count, 250);
    assert!((sample.timestamp - 0.5).abs() < 1e-9);
    assert_eq!(sample.acc, [0.0, 0.0, 9.81]);
    assert_eq!(sample.quat, [1.0, 0.0, 0.0, 0.0]);
    assert_eq!(sample.temperature, 42.5);
}

#[test]
fn gnss_sample_reaches_the_client_queue() {
    let device = MockDevice::ig1("dev0");
    let (client, _manager) = client_with_device(Arc::clone(&device));
    let handle = client.obtain_sensor_by_name("mock", "dev0", 0).unwrap();
    let gnss = client
        .any_component_of(handle, ComponentKind::Gnss)
        .unwrap()
        .unwrap();

    let mut payload = Vec::new();
    payload.extend_from_slice(&100u32.to_le_bytes()); // iTOW
    payload.extend_from_slice(&2024u16.to_le_bytes());
    payload.extend_from_slice(&[1, 2, 3, 4, 5]); // date and time
    payload.extend_from_slice(&0i32.to_le_bytes()); // nano correction
    payload.extend_from_slice(&[3, 1, 9]); // fix, RTK float, sats
    payload.extend_from_slice(&0i32.to_le_bytes()); // lon
    payload.extend_from_slice(&0i32.to_le_bytes()); // lat
    payload.extend_from_slice(&1000i32.to_le_bytes()); // height 1 m
    payload.extend_from_slice(&500u32.to_le_bytes()); // hAcc
    payload.extend_from_slice(&500u32.to_le_bytes()); // vAcc
    payload.extend_from_slice(&0i32.to_le_bytes()); // speed
    payload.extend_from_slice(&100u32.to_le_bytes()); // sAcc 0.1 m/s
    payload.extend_from_slice(&0i32.to_le_bytes()); // heading
    payload.extend_from_slice(&200_000u32.to_le_bytes()); // headAcc 2 deg
    device.stream(DeviceFunction::GetGnssData, &payload);

    let event = client.wait_for_next_event().unwrap();
    assert_eq!(event.component, Some(gnss));
    let EventKind::GnssData(sample) = event.kind else {
        panic!("expected a GNSS sample");
    };
    assert_eq!(sample.year, 2024);
    assert_eq!(sample.fix_type, 3);
    assert_eq!(sample.carrier_phase_solution, 1);
    assert_eq!(sample.num_satellites, 9);
    assert!((sample.height_m - 1.0).abs() < 1e-9);
    assert!((sample.speed_accuracy_mps - 0.1).abs() < 1e-9);
    assert!((sample.heading_accuracy_deg - 2.0).abs() < 1e-9);
}

#[test]
fn release_drains_events_and_rejects_double_release() {
    let device = MockDevice::ig1("dev0");
    let (client, _manager) = client_with_device(Arc::clone(&device));
    let handle = client.obtain_sensor_by_name("mock", "dev0", 0).unwrap();

    // Queue a data event, then release without consuming it.
    let mut payload = Vec::new();
    payload.extend_from_slice(&1u32.to_le_bytes());
    for value in [0.0f32, 0.0, 0.0] {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    for value in [1.0f32, 0.0, 0.0, 0.0] {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    payload.extend_from_slice(&0f32.to_le_bytes());
    device.stream(DeviceFunction::GetSensorData, &payload);

    client.release_sensor(handle).unwrap();
    assert_eq!(client.poll_next_event(), None);
    assert_eq!(client.release_sensor(handle), Err(SensorError::InvalidHandle));
    assert!(client.sensor(handle).is_err());
}

#[test]
fn silent_device_fails_negotiation() {
    let mut device = MockDevice::ig1("quiet");
    Arc::get_mut(&mut device).unwrap().mute = true;
    let (client, _manager) = client_with_device(device);

    let result = client.obtain_sensor_by_name("mock", "quiet", 0);
    assert_eq!(result, Err(SensorError::ConnectionFailed));
}

#[test]
fn nack_surfaces_as_protocol_error_through_properties() {
    let mut device = MockDevice::ig1("dev0");
    Arc::get_mut(&mut device).unwrap().nacked =
        vec![u16::from(DeviceFunction::RestoreFactorySettings)];
    let (client, _manager) = client_with_device(device);
    let handle = client.obtain_sensor_by_name("mock", "dev0", 0).unwrap();

    let result = client
        .properties(handle)
        .unwrap()
        .execute(PropertyKey::RestoreFactorySettings);
    assert_eq!(result, Err(SensorError::ProtocolNack));
}

#[test]
fn core_properties_round_trip() {
    let device = MockDevice::ig1("dev0");
    let (client, _manager) = client_with_device(Arc::clone(&device));
    let handle = client.obtain_sensor_by_name("mock", "dev0", 0).unwrap();
    let properties = client.properties(handle).unwrap();

    assert_eq!(
        properties.get_string(PropertyKey::DeviceName).unwrap(),
        "LPMS-IG1"
    );
    assert_eq!(properties.get_i32(PropertyKey::SamplingRate).unwrap(), 100);
    assert!((properties.get_f32(PropertyKey::BatteryLevel).unwrap() - 3.9).abs() < 1e-6);

    // Firmware version array comes back major-first despite the wire order.
    let mut version = [0i32; 4];
    let count = properties
        .get_array(
            PropertyKey::FirmwareVersion,
            crate::properties::ArrayBuf::Int32(&mut version),
        )
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(&version[..3], &[2, 7, 3]);

    // Executable keys refuse typed getters.
    assert_eq!(
        properties.get_bool(PropertyKey::StoreSettingsInFlash),
        Err(SensorError::WrongDataType)
    );
}

#[test]
fn imu_properties_cover_ranges_matrices_and_output_flags() {
    let device = MockDevice::ig1("dev0");
    let (client, _manager) = client_with_device(Arc::clone(&device));
    let handle = client.obtain_sensor_by_name("mock", "dev0", 0).unwrap();
    let imu = client
        .any_component_of(handle, ComponentKind::ImuIg1)
        .unwrap()
        .unwrap();
    let properties = client.component_properties(handle, imu).unwrap();

    assert_eq!(properties.get_i32(PropertyKey::AccRange).unwrap(), 8);

    let alignment = properties.get_matrix33(PropertyKey::AccAlignment).unwrap();
    assert_eq!(alignment, crate::datatypes::Matrix3x3::identity());
    properties
        .set_matrix33(PropertyKey::AccAlignment, &alignment)
        .unwrap();

    let mut bias = [0f32; 3];
    let count = properties
        .get_array(
            PropertyKey::AccBias,
            crate::properties::ArrayBuf::Float(&mut bias),
        )
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(bias, [0.01, -0.02, 0.03]);

    let mut ranges = [0i32; 8];
    let count = properties
        .get_array(
            PropertyKey::AccSupportedRanges,
            crate::properties::ArrayBuf::Int32(&mut ranges),
        )
        .unwrap();
    assert_eq!(&ranges[..count], &[2, 4, 8, 16]);

    // Raw magnetometer output was off in the init bitset; enabling it
    // rewrites the transmit-data register and the cache follows.
    assert!(!properties.get_bool(PropertyKey::OutputRawMag).unwrap());
    device.clear_log();
    properties.set_bool(PropertyKey::OutputRawMag, true).unwrap();
    assert!(
        device
            .functions_sent()
            .contains(&u16::from(DeviceFunction::SetTransmitData))
    );
    assert!(properties.get_bool(PropertyKey::OutputRawMag).unwrap());

    // Commands are executable, not readable.
    assert!(properties.is_executable(PropertyKey::CalibrateGyro));
    assert_eq!(
        properties.get_bool(PropertyKey::CalibrateGyro),
        Err(SensorError::WrongDataType)
    );
    properties.execute(PropertyKey::CalibrateGyro).unwrap();
}

#[test]
fn firmware_upload_runs_to_completion() {
    let device = MockDevice::ig1("dev0");
    let (client, _manager) = client_with_device(Arc::clone(&device));
    let handle = client.obtain_sensor_by_name("mock", "dev0", 0).unwrap();
    let sensor = client.sensor(handle).unwrap();

    let image = vec![0xAB; 600];
    assert_eq!(sensor.update_firmware_async(&image), AsyncStatus::Updating);

    let mut status = AsyncStatus::Updating;
    for _ in 0..200 {
        status = sensor.update_firmware_async(&[]);
        if status != AsyncStatus::Updating {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(status, AsyncStatus::Finished);

    // Page-count header plus three 256-byte pages.
    let uploads = device
        .functions_sent()
        .iter()
        .filter(|&&function| function == u16::from(DeviceFunction::UpdateFirmware))
        .count();
    assert_eq!(uploads, 4);

    // The state was consumed; an empty image is now an argument error.
    assert_eq!(
        sensor.update_firmware_async(&[]),
        AsyncStatus::InvalidArgument
    );

    // The IAP path shares the upload slot and state machine.
    assert_eq!(sensor.update_iap_async(&[1, 2, 3]), AsyncStatus::Updating);
    let mut status = AsyncStatus::Updating;
    for _ in 0..200 {
        status = sensor.update_iap_async(&[]);
        if status != AsyncStatus::Updating {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(status, AsyncStatus::Finished);
}

#[test]
fn legacy_sensor_negotiates_the_v0_framing() {
    let device = MockDevice::legacy_b2("b2");
    let (client, _manager) = client_with_device(Arc::clone(&device));

    let handle = client.obtain_sensor_by_name("mock", "b2", 0).unwrap();
    let sensor = client.sensor(handle).unwrap();
    assert_eq!(
        sensor.synced().communicator().format(),
        FrameFormat::LegacyV0
    );

    let imu = client.any_component_of(handle, ComponentKind::ImuV0).unwrap();
    assert!(imu.is_some());
    assert!(
        client
            .any_component_of(handle, ComponentKind::Gnss)
            .unwrap()
            .is_none()
    );

    // Configuration round-trips work over the narrow framing too.
    device.clear_log();
    client
        .properties(handle)
        .unwrap()
        .set_i32(PropertyKey::SamplingRate, 25)
        .unwrap();
    assert_eq!(
        device.functions_sent(),
        vec![
            u16::from(DeviceFunction::GotoCommandMode),
            u16::from(DeviceFunction::SetStreamFreq),
            u16::from(DeviceFunction::GotoStreamMode),
        ]
    );

    // A v0 sample (acc + quaternion) flows end to end.
    let mut payload = Vec::new();
    payload.extend_from_slice(&10u32.to_le_bytes());
    for value in [1.0f32, 2.0, 3.0] {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    for value in [1.0f32, 0.0, 0.0, 0.0] {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    device.stream(DeviceFunction::GetSensorData, &payload);

    // Skip the property-changed event from the sampling-rate set.
    let event = loop {
        let event = client.wait_for_next_event().unwrap();
        if !matches!(event.kind, EventKind::PropertyChanged(_)) {
            break event;
        }
    };
    let EventKind::ImuData(sample) = event.kind else {
        panic!("expected an IMU sample");
    };
    assert_eq!(sample.acc, [1.0, 2.0, 3.0]);
    assert_eq!(sample.quat, [1.0, 0.0, 0.0, 0.0]);
}

#[test]
fn closing_the_client_unblocks_event_waiters() {
    let (client, _manager) = client_with_device(MockDevice::ig1("dev0"));
    let client = Arc::new(client);

    let waiter = {
        let client = Arc::clone(&client);
        thread::spawn(move || client.wait_for_next_event())
    };
    thread::sleep(Duration::from_millis(30));
    client.close();

    assert_eq!(waiter.join().unwrap(), None);
}
