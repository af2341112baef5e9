//! The session manager: transport registration, the discovery worker,
//! connection establishment and the sensor map.
//!
//! One instance serves the whole process (see [`SensorManager::global`]);
//! isolated instances exist for tests and embedded setups. Lock order
//! throughout: client list, then sensor map, then any per-sensor lock. The
//! reader threads only ever take per-sensor and queue locks, so discovery,
//! obtain and release can never deadlock against I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::client::ClientCore;
use crate::codec::FrameFormat;
use crate::connection::{Communicator, FrameSink};
use crate::datatypes::{Event, EventKind, SensorDesc, SensorHandle};
use crate::error::{SensorError, SensorResult};
use crate::negotiation::ConnectionNegotiator;
use crate::sensor::{EventDispatcher, Sensor, make_sensor};
use crate::transport::{ByteSink, TransportFamily, TransportRegistry};

/// Tick of the poll thread serving transports without an interrupt-driven
/// receive path.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Bound on how long the background threads sleep before rechecking the
/// termination flag.
const WORKER_PARK: Duration = Duration::from_millis(100);

#[derive(Default)]
struct DiscoveryState {
    active: bool,
    subscribers: Vec<Weak<ClientCore>>,
}

pub struct SensorManager {
    registry: TransportRegistry,
    sensors: Mutex<HashMap<u64, Arc<Sensor>>>,
    next_handle: AtomicU64,
    clients: Mutex<Vec<Weak<ClientCore>>>,
    discovery: Mutex<DiscoveryState>,
    discovery_wake: Condvar,
    terminate: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    poll_running: AtomicBool,
}

impl SensorManager {
    pub fn new() -> Arc<Self> {
        let manager = Arc::new(SensorManager {
            registry: TransportRegistry::new(),
            sensors: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            clients: Mutex::new(Vec::new()),
            discovery: Mutex::new(DiscoveryState::default()),
            discovery_wake: Condvar::new(),
            terminate: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            poll_running: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&manager);
        let worker = thread::spawn(move || discovery_loop(weak));
        manager.workers.lock().unwrap().push(worker);

        manager
    }

    /// The process-wide manager instance.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<SensorManager>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(SensorManager::new))
    }

    /// Register a transport family. Starts the poll thread on the first
    /// family that needs it.
    pub fn register_transport(
        self: &Arc<Self>,
        family: Arc<dyn TransportFamily>,
    ) -> SensorResult<()> {
        let polling = family.needs_polling();
        self.registry.register(family)?;
        if polling && !self.poll_running.swap(true, Ordering::AcqRel) {
            let weak = Arc::downgrade(self);
            let worker = thread::spawn(move || poll_loop(weak));
            self.workers.lock().unwrap().push(worker);
        }
        Ok(())
    }

    pub(crate) fn register_client(&self, core: &Arc<ClientCore>) {
        let mut clients = self.clients.lock().unwrap();
        clients.retain(|client| client.upgrade().is_some());
        clients.push(Arc::downgrade(core));
    }

    /// Subscribe a client to the next device scan, starting one if none is
    /// running. Concurrent subscribers share the scan.
    pub(crate) fn subscribe_discovery(&self, core: &Arc<ClientCore>) {
        let mut discovery = self.discovery.lock().unwrap();
        discovery.subscribers.push(Arc::downgrade(core));
        discovery.active = true;
        self.discovery_wake.notify_one();
    }

    /// Open (or return the already-open) sensor for a descriptor.
    pub fn obtain(self: &Arc<Self>, desc: &SensorDesc) -> SensorResult<Arc<Sensor>> {
        {
            let sensors = self.sensors.lock().unwrap();
            if let Some(sensor) = sensors.values().find(|sensor| sensor.matches(desc)) {
                return Ok(Arc::clone(sensor));
            }
        }

        let family = self.registry.get(&desc.io_type)?;
        let mut desc = desc.clone();
        if desc.baud_rate == 0 {
            desc.baud_rate = family.default_baud_rate();
        }

        let communicator = Arc::new(Communicator::new(FrameFormat::Lp));
        let sink: Arc<dyn ByteSink> = Arc::clone(&communicator) as Arc<dyn ByteSink>;
        let transport = family.open(&desc, sink)?;
        communicator.init(transport);

        let negotiator = ConnectionNegotiator::new();
        communicator
            .set_subscriber(Arc::downgrade(&negotiator) as Weak<dyn FrameSink>);
        let agreement = match negotiator.negotiate(&communicator, desc.baud_rate) {
            Ok(agreement) => agreement,
            Err(err) => {
                communicator.close();
                return Err(err);
            }
        };

        let handle = SensorHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let dispatcher: Arc<dyn EventDispatcher> = Arc::clone(self) as Arc<dyn EventDispatcher>;
        let sensor = make_sensor(handle, &agreement, Arc::clone(&communicator), dispatcher);
        communicator.set_subscriber(Arc::downgrade(&sensor) as Weak<dyn FrameSink>);
        sensor.init();

        self.sensors
            .lock()
            .unwrap()
            .insert(handle.0, Arc::clone(&sensor));
        debug!(handle = handle.0, name = sensor.device_name(), "sensor obtained");
        Ok(sensor)
    }

    pub fn sensor(&self, handle: SensorHandle) -> SensorResult<Arc<Sensor>> {
        self.sensors
            .lock()
            .unwrap()
            .get(&handle.0)
            .cloned()
            .ok_or(SensorError::InvalidHandle)
    }

    /// Release a sensor: remove it from the map and terminate it. A second
    /// release of the same handle fails with `InvalidHandle`.
    pub fn release(&self, handle: SensorHandle) -> SensorResult<()> {
        let sensor = self
            .sensors
            .lock()
            .unwrap()
            .remove(&handle.0)
            .ok_or(SensorError::InvalidHandle)?;
        sensor.release();
        Ok(())
    }

    /// Stop the background workers. Called on drop; exposed for embedders
    /// that tear the library down explicitly.
    pub fn shutdown(&self) {
        self.terminate.store(true, Ordering::Release);
        self.discovery_wake.notify_all();
        let workers: Vec<_> = self.workers.lock().unwrap().drain(..).collect();
        for worker in workers {
            // The final strong reference can die on a worker; never join
            // the thread running the drop.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }

    fn terminated(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    fn notify_discovery(&self, event: Event) {
        let discovery = self.discovery.lock().unwrap();
        for subscriber in &discovery.subscribers {
            if let Some(client) = subscriber.upgrade() {
                client.push(event.clone());
            }
        }
    }

    fn run_discovery(&self) {
        let families = self.registry.snapshot();
        let family_count = families.len();
        let mut devices: Vec<SensorDesc> = Vec::new();

        for (idx, family) in families.iter().enumerate() {
            if self.terminated() {
                return;
            }
            let progress = (idx as f32 + 0.5) / family_count as f32;
            self.notify_discovery(Event::discovery(EventKind::ListingProgress {
                progress,
                complete: false,
            }));

            let mut found = Vec::new();
            if let Err(err) = family.list_devices(&mut found) {
                warn!(io_type = family.io_type(), %err, "device listing failed");
                continue;
            }
            for desc in found {
                if !devices.iter().any(|known| known.same_device(&desc)) {
                    devices.push(desc);
                }
            }
        }

        for desc in devices {
            self.notify_discovery(Event::discovery(EventKind::SensorFound(desc)));
        }
        self.notify_discovery(Event::discovery(EventKind::ListingProgress {
            progress: 1.0,
            complete: true,
        }));

        let mut discovery = self.discovery.lock().unwrap();
        discovery.active = false;
        discovery.subscribers.clear();
    }
}

impl EventDispatcher for SensorManager {
    /// Deliver a sensor event to every live client that owns the sensor.
    fn dispatch(&self, event: Event) {
        let Some(handle) = event.sensor else {
            return;
        };
        let clients = self.clients.lock().unwrap();
        for client in clients.iter() {
            if let Some(client) = client.upgrade() {
                if client.owns(handle) {
                    client.push(event.clone());
                }
            }
        }
    }
}

impl Drop for SensorManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn discovery_loop(weak: Weak<SensorManager>) {
    loop {
        let Some(manager) = weak.upgrade() else {
            return;
        };
        if manager.terminated() {
            return;
        }

        let pending = {
            let discovery = manager.discovery.lock().unwrap();
            let (discovery, _timeout) = manager
                .discovery_wake
                .wait_timeout_while(discovery, WORKER_PARK, |state| !state.active)
                .unwrap();
            discovery.active
        };

        if pending && !manager.terminated() {
            manager.run_discovery();
        }
        // Drop the strong reference each round so the manager can die.
        drop(manager);
    }
}

fn poll_loop(weak: Weak<SensorManager>) {
    loop {
        let Some(manager) = weak.upgrade() else {
            return;
        };
        if manager.terminated() {
            return;
        }
        for family in manager.registry.snapshot() {
            if family.needs_polling() {
                family.poll();
            }
        }
        drop(manager);
        thread::sleep(POLL_INTERVAL);
    }
}
