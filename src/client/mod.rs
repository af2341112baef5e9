//! The host-facing client: obtain sensors, stream their events through a
//! bounded queue and access properties.
//!
//! A client is reachable both from host threads and from the library's
//! reader and discovery threads. The shared part lives in `ClientCore`
//! behind an `Arc`; internal paths hold it weakly, so a client that the
//! host dropped stops receiving events without further coordination.

mod queue;

pub use queue::{DEFAULT_QUEUE_CAPACITY, EventQueue};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::components::ComponentKind;
use crate::datatypes::{ComponentHandle, Event, SensorDesc, SensorHandle};
use crate::error::{SensorError, SensorResult};
use crate::manager::SensorManager;
use crate::properties::PropertyInterface;
use crate::sensor::Sensor;

/// State shared between the host-held client and the event sources.
pub(crate) struct ClientCore {
    queue: EventQueue,
    owned: Mutex<HashSet<SensorHandle>>,
}

impl ClientCore {
    fn new(capacity: usize) -> Arc<Self> {
        Arc::new(ClientCore {
            queue: EventQueue::new(capacity),
            owned: Mutex::new(HashSet::new()),
        })
    }

    pub(crate) fn push(&self, event: Event) {
        self.queue.push(event);
    }

    pub(crate) fn owns(&self, handle: SensorHandle) -> bool {
        self.owned.lock().unwrap().contains(&handle)
    }
}

/// Handle to one client session.
///
/// Dropping the client closes it: queued waiters are released, owned
/// sensors are returned to the session manager.
pub struct SensorClient {
    core: Arc<ClientCore>,
    manager: Arc<SensorManager>,
}

impl SensorClient {
    /// Client on the process-wide session manager.
    pub fn new() -> Self {
        Self::with_manager(SensorManager::global())
    }

    /// Client on a specific manager instance (isolated setups, tests).
    pub fn with_manager(manager: Arc<SensorManager>) -> Self {
        let core = ClientCore::new(DEFAULT_QUEUE_CAPACITY);
        manager.register_client(&core);
        SensorClient { core, manager }
    }

    /// Kick off (or join) a device scan. Results arrive on the event queue
    /// as `ListingProgress` and `SensorFound` events.
    pub fn list_sensors_async(&self) {
        self.manager.subscribe_discovery(&self.core);
    }

    /// Open the sensor described by `desc`, negotiating the connection.
    /// Obtaining an already-open sensor returns its existing handle.
    pub fn obtain_sensor(&self, desc: &SensorDesc) -> SensorResult<SensorHandle> {
        let sensor = self.manager.obtain(desc)?;
        let handle = sensor.handle();
        self.core.owned.lock().unwrap().insert(handle);
        Ok(handle)
    }

    /// Open a sensor by transport coordinates instead of a discovery
    /// descriptor. A `baud_rate` of 0 selects the family default.
    pub fn obtain_sensor_by_name(
        &self,
        io_type: &str,
        identifier: &str,
        baud_rate: u32,
    ) -> SensorResult<SensorHandle> {
        if identifier.is_empty() {
            return Err(SensorError::InvalidArgument("identifier is empty"));
        }
        let desc = SensorDesc {
            io_type: io_type.to_owned(),
            identifier: identifier.to_owned(),
            baud_rate,
            ..Default::default()
        };
        self.obtain_sensor(&desc)
    }

    /// The sensor behind a handle, for component and property access.
    pub fn sensor(&self, handle: SensorHandle) -> SensorResult<Arc<Sensor>> {
        self.manager.sensor(handle)
    }

    pub fn components(&self, handle: SensorHandle) -> SensorResult<Vec<ComponentHandle>> {
        Ok(self.sensor(handle)?.components())
    }

    pub fn any_component_of(
        &self,
        handle: SensorHandle,
        kind: ComponentKind,
    ) -> SensorResult<Option<ComponentHandle>> {
        Ok(self.sensor(handle)?.any_component_of(kind))
    }

    /// Core property access for a sensor.
    pub fn properties(&self, handle: SensorHandle) -> SensorResult<Arc<dyn PropertyInterface>> {
        Ok(Arc::clone(self.sensor(handle)?.properties()))
    }

    /// Property access for one component.
    pub fn component_properties(
        &self,
        handle: SensorHandle,
        component: ComponentHandle,
    ) -> SensorResult<Arc<dyn PropertyInterface>> {
        let sensor = self.sensor(handle)?;
        sensor.component_properties(component).map(Arc::clone)
    }

    /// Release a sensor: terminate its connection and drop its queued
    /// events. Releasing the same handle again fails with `InvalidHandle`.
    pub fn release_sensor(&self, handle: SensorHandle) -> SensorResult<()> {
        self.core.owned.lock().unwrap().remove(&handle);
        let result = self.manager.release(handle);
        self.core.queue.drain_sensor(handle);
        result
    }

    /// Block until the next event. Returns `None` once the client is
    /// closed.
    pub fn wait_for_next_event(&self) -> Option<Event> {
        self.core.queue.wait_next()
    }

    pub fn poll_next_event(&self) -> Option<Event> {
        self.core.queue.poll_next()
    }

    /// Close the client: release owned sensors and unblock event waiters.
    pub fn close(&self) {
        let owned: Vec<SensorHandle> = self.core.owned.lock().unwrap().drain().collect();
        for handle in owned {
            let _ = self.manager.release(handle);
        }
        self.core.queue.terminate();
    }
}

impl Default for SensorClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SensorClient {
    fn drop(&mut self) {
        self.close();
    }
}
