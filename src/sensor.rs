//! The sensor aggregate: one negotiated connection, its components, the
//! synchronous communicator and the firmware upload machinery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::components::{
    Component, ComponentKind, GnssDecoder, Ig1Decoder, OutputConfig, V0Decoder,
};
use crate::connection::{Communicator, FrameSink};
use crate::datatypes::{
    ComponentHandle, DeviceFunction, Event, EventKind, PropertyKey, SENSOR_CORE_ADDRESS,
    SensorDesc, SensorHandle,
};
use crate::error::{AsyncStatus, SensorError, SensorResult};
use crate::negotiation::SensorAgreement;
use crate::properties::{
    CoreProperties, GnssProperties, ImuFamily, ImuProperties, PropertyInterface, PropertyNotifier,
    StreamControl,
};
use crate::sync::SyncedCommunicator;

/// Receives events decoded by sensors and fans them out to client queues.
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, event: Event);
}

/// Bytes written per firmware/IAP upload page.
const UPLOAD_PAGE_SIZE: usize = 256;

#[derive(Default)]
struct UploadState {
    busy: AtomicBool,
    finished: AtomicBool,
    failed: AtomicBool,
}

pub struct Sensor {
    handle: SensorHandle,
    device_name: String,
    synced: Arc<SyncedCommunicator>,
    stream: Arc<StreamControl>,
    output: Arc<OutputConfig>,
    core_properties: Arc<dyn PropertyInterface>,
    components: Vec<Component>,
    dispatcher: Arc<dyn EventDispatcher>,
    upload: Arc<UploadState>,
    upload_thread: Mutex<Option<JoinHandle<()>>>,
    released: AtomicBool,
}

/// Build a sensor from a negotiated connection.
///
/// The IMU variant follows the protocol version, with a device-name check
/// for IG1 units that still report the legacy version; a GNSS component is
/// added iff the capability bit was reported.
pub fn make_sensor(
    handle: SensorHandle,
    agreement: &SensorAgreement,
    communicator: Arc<Communicator>,
    dispatcher: Arc<dyn EventDispatcher>,
) -> Arc<Sensor> {
    let synced = Arc::new(SyncedCommunicator::new(communicator));
    let stream = Arc::new(StreamControl::new(Arc::clone(&synced)));
    let output = Arc::new(OutputConfig::new(0));
    let notifier = Arc::new(PropertyNotifier::new());

    let family = if agreement.protocol_version >= 1 || agreement.device_name.contains("IG1") {
        ImuFamily::Ig1
    } else {
        ImuFamily::V0
    };

    let imu_properties: Arc<dyn PropertyInterface> = Arc::new(ImuProperties::new(
        Arc::clone(&synced),
        Arc::clone(&stream),
        Arc::clone(&output),
        Arc::clone(&notifier),
        family,
    ));

    let mut components = Vec::new();
    match family {
        ImuFamily::Ig1 => components.push(Component::new(
            ComponentKind::ImuIg1,
            imu_properties,
            Arc::new(Ig1Decoder::new(Arc::clone(&output), true, true)),
        )),
        ImuFamily::V0 => components.push(Component::new(
            ComponentKind::ImuV0,
            imu_properties,
            Arc::new(V0Decoder::new(Arc::clone(&output))),
        )),
    }
    if agreement.has_gnss {
        components.push(Component::new(
            ComponentKind::Gnss,
            Arc::new(GnssProperties::new(Arc::clone(&synced), Arc::clone(&stream))),
            GnssDecoder::new(),
        ));
    }

    let core_properties: Arc<dyn PropertyInterface> = Arc::new(CoreProperties::new(
        Arc::clone(&synced),
        Arc::clone(&stream),
        Arc::clone(&output),
        Arc::clone(&notifier),
    ));

    // Property changes fan out as events on the setter's thread.
    {
        let dispatcher = Arc::clone(&dispatcher);
        notifier.observe(move |key: PropertyKey| {
            dispatcher.dispatch(Event {
                sensor: Some(handle),
                component: None,
                kind: EventKind::PropertyChanged(key),
            });
        });
    }

    Arc::new(Sensor {
        handle,
        device_name: agreement.device_name.clone(),
        synced,
        stream,
        output,
        core_properties,
        components,
        dispatcher,
        upload: Arc::new(UploadState::default()),
        upload_thread: Mutex::new(None),
        released: AtomicBool::new(false),
    })
}

impl Sensor {
    /// Pull state that requires an active connection: the output-data
    /// bitset the firmware is configured with.
    pub fn init(&self) {
        let result: SensorResult<u32> = self.stream.pause_for(|| {
            self.synced.send_and_wait_for_result(
                SENSOR_CORE_ADDRESS,
                u16::from(DeviceFunction::GetConfig),
                u16::from(DeviceFunction::GetConfig),
                &[],
            )
        });
        match result {
            Ok(bits) => self.output.set_bits(bits),
            Err(err) => warn!(%err, "could not read output configuration, keeping defaults"),
        }
    }

    pub fn handle(&self) -> SensorHandle {
        self.handle
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn io_type(&self) -> SensorResult<String> {
        self.synced.communicator().io_type()
    }

    pub fn matches(&self, desc: &SensorDesc) -> bool {
        self.synced.communicator().matches(desc)
    }

    /// Core (non-component) properties.
    pub fn properties(&self) -> &Arc<dyn PropertyInterface> {
        &self.core_properties
    }

    /// Handles of all components, in ordinal order.
    pub fn components(&self) -> Vec<ComponentHandle> {
        (1..=self.components.len()).map(ComponentHandle).collect()
    }

    pub fn component_kind(&self, handle: ComponentHandle) -> SensorResult<ComponentKind> {
        self.component(handle).map(Component::kind)
    }

    /// First component of the given kind, if any.
    pub fn any_component_of(&self, kind: ComponentKind) -> Option<ComponentHandle> {
        self.components
            .iter()
            .position(|component| component.kind() == kind)
            .map(|idx| ComponentHandle(idx + 1))
    }

    pub fn component_properties(
        &self,
        handle: ComponentHandle,
    ) -> SensorResult<&Arc<dyn PropertyInterface>> {
        self.component(handle).map(Component::properties)
    }

    fn component(&self, handle: ComponentHandle) -> SensorResult<&Component> {
        if handle.0 == 0 {
            return Err(SensorError::InvalidHandle);
        }
        self.components
            .get(handle.0 - 1)
            .ok_or(SensorError::InvalidHandle)
    }

    pub fn synced(&self) -> &Arc<SyncedCommunicator> {
        &self.synced
    }

    /// On first call starts the firmware upload; subsequent calls report
    /// progress. Completion and failure are consumed by the poll that
    /// observes them.
    pub fn update_firmware_async(&self, image: &[u8]) -> AsyncStatus {
        self.start_upload(DeviceFunction::UpdateFirmware, image)
    }

    /// Same contract as [`Sensor::update_firmware_async`] for the in-app
    /// programming image.
    pub fn update_iap_async(&self, image: &[u8]) -> AsyncStatus {
        self.start_upload(DeviceFunction::UpdateIap, image)
    }

    fn start_upload(&self, function: DeviceFunction, image: &[u8]) -> AsyncStatus {
        if self.upload.busy.load(Ordering::Acquire) {
            return AsyncStatus::Updating;
        }
        if self.upload.finished.swap(false, Ordering::AcqRel) {
            return AsyncStatus::Finished;
        }
        if self.upload.failed.swap(false, Ordering::AcqRel) {
            return AsyncStatus::Failed;
        }
        if image.is_empty() {
            return AsyncStatus::InvalidArgument;
        }

        let mut slot = self.upload_thread.lock().unwrap();
        if self.upload.busy.swap(true, Ordering::AcqRel) {
            return AsyncStatus::ThreadBusy;
        }
        if let Some(previous) = slot.take() {
            let _ = previous.join();
        }

        let synced = Arc::clone(&self.synced);
        let stream = Arc::clone(&self.stream);
        let state = Arc::clone(&self.upload);
        let image = image.to_vec();

        *slot = Some(thread::spawn(move || {
            let result = stream.pause_for(|| upload_pages(&synced, function, &image));
            match result {
                Ok(()) => state.finished.store(true, Ordering::Release),
                Err(err) => {
                    warn!(%err, "firmware upload failed");
                    state.failed.store(true, Ordering::Release);
                }
            }
            state.busy.store(false, Ordering::Release);
        }));

        AsyncStatus::Updating
    }

    /// Terminate the sensor: resolve any pending request, stop the reader
    /// thread and join the uploader. Safe to call once; the session manager
    /// rejects the second release.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(handle = self.handle.0, "releasing sensor");

        // Persist the receiver's downloaded satellite state while the
        // connection still works; losing it forces a cold start next time.
        if let Some(gnss) = self.any_component_of(ComponentKind::Gnss) {
            if let Ok(properties) = self.component_properties(gnss) {
                if let Err(err) = properties.execute(PropertyKey::StoreNavigationState) {
                    warn!(%err, "could not store GNSS navigation state");
                }
            }
        }

        self.synced.fail_pending(SensorError::ReadFailed);
        self.synced.communicator().close();
        if let Some(uploader) = self.upload_thread.lock().unwrap().take() {
            let _ = uploader.join();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for Sensor {
    fn drop(&mut self) {
        self.release();
    }
}

fn upload_pages(
    synced: &SyncedCommunicator,
    function: DeviceFunction,
    image: &[u8],
) -> SensorResult<()> {
    let write = |payload: &[u8]| {
        synced
            .send_and_wait_for_ack(SENSOR_CORE_ADDRESS, u16::from(function), payload)
            .map_err(|err| match err {
                // A nack here means the firmware rejected the image.
                SensorError::ProtocolNack => SensorError::FirmwareFailed,
                other => other,
            })
    };

    let pages = image.len().div_ceil(UPLOAD_PAGE_SIZE) as u32;
    write(&pages.to_le_bytes())?;
    for page in image.chunks(UPLOAD_PAGE_SIZE) {
        write(page)?;
    }
    Ok(())
}

impl FrameSink for Sensor {
    fn on_frame(&self, address: u8, function: u16, payload: Bytes) -> SensorResult<()> {
        // A pending request may claim the frame first.
        let Some((_address, function, payload)) = self.synced.classify(address, function, payload)
        else {
            return Ok(());
        };

        for (idx, component) in self.components.iter().enumerate() {
            if component.handles(function) {
                let kind = component.decode(function, &payload)?;
                self.dispatcher.dispatch(Event::for_component(
                    self.handle,
                    ComponentHandle(idx + 1),
                    kind,
                ));
                return Ok(());
            }
        }
        Err(SensorError::UnsupportedFunction(function))
    }
}
