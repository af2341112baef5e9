//! Transport abstraction: byte-level send plus push-based receive.
//!
//! Concrete drivers (serial, USB, Bluetooth, CAN) live outside the core.
//! The core only requires [`Transport`] for an open device and
//! [`TransportFamily`] for discovery and opening. A transport owns its
//! reader thread: the byte sink is installed before the thread starts, the
//! thread delivers reads of unspecified size, and `close` guarantees the
//! sink is never called again before it returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::datatypes::SensorDesc;
use crate::error::{SensorError, SensorResult};

/// Receives bytes pushed up from a transport's reader thread. Reads may
/// split a frame or join several; the parser downstream copes.
pub trait ByteSink: Send + Sync {
    fn on_bytes(&self, data: &[u8]);
}

/// An open byte-level connection to one sensor.
pub trait Transport: Send + Sync {
    /// Blocking write of one serialized frame. Writes are atomic with
    /// respect to each other; the implementation carries any lock needed.
    fn send(&self, data: &[u8]) -> SensorResult<()>;

    fn set_baud_rate(&self, rate: u32) -> SensorResult<()>;
    fn baud_rate(&self) -> SensorResult<u32>;
    fn supported_baud_rates(&self) -> SensorResult<Vec<u32>>;

    /// Key of the transport family this connection belongs to.
    fn io_type(&self) -> &str;
    fn identifier(&self) -> String;

    fn matches(&self, desc: &SensorDesc) -> bool {
        desc.io_type == self.io_type() && desc.identifier == self.identifier()
    }

    /// Stop the reader thread and release the device. Idempotent; once it
    /// returns, the byte sink will not be called again.
    fn close(&self);
}

/// A registered family of transports (one per IO type).
pub trait TransportFamily: Send + Sync {
    fn io_type(&self) -> &str;

    /// Baud rate used when a descriptor does not supply one.
    fn default_baud_rate(&self) -> u32;

    /// Append descriptors for every reachable device of this family.
    fn list_devices(&self, devices: &mut Vec<SensorDesc>) -> SensorResult<()>;

    /// Open a device. The sink must be wired up before the reader thread
    /// delivers its first bytes.
    fn open(&self, desc: &SensorDesc, sink: Arc<dyn ByteSink>)
    -> SensorResult<Box<dyn Transport>>;

    /// Families that have no interrupt-driven receive path (CAN) return
    /// true and get called on [`TransportFamily::poll`] from the manager's
    /// poll thread.
    fn needs_polling(&self) -> bool {
        false
    }

    fn poll(&self) {}
}

/// Registry of transport families, keyed by IO type.
#[derive(Default)]
pub struct TransportRegistry {
    families: Mutex<HashMap<String, Arc<dyn TransportFamily>>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a family. A second registration for the same IO type fails
    /// with `AlreadyInitialized`.
    pub fn register(&self, family: Arc<dyn TransportFamily>) -> SensorResult<()> {
        let mut families = self.families.lock().unwrap();
        let key = family.io_type().to_owned();
        if families.contains_key(&key) {
            return Err(SensorError::AlreadyInitialized);
        }
        families.insert(key, family);
        Ok(())
    }

    pub fn get(&self, io_type: &str) -> SensorResult<Arc<dyn TransportFamily>> {
        self.families
            .lock()
            .unwrap()
            .get(io_type)
            .cloned()
            .ok_or_else(|| SensorError::UnsupportedIoType(io_type.to_owned()))
    }

    /// Stable snapshot for the discovery loop, ordered by IO type so that
    /// listing progress is deterministic.
    pub fn snapshot(&self) -> Vec<Arc<dyn TransportFamily>> {
        let families = self.families.lock().unwrap();
        let mut sorted: Vec<_> = families.values().cloned().collect();
        sorted.sort_by(|a, b| a.io_type().cmp(b.io_type()));
        sorted
    }

    /// Whether any registered family wants the 1 ms poll tick.
    pub fn any_polling(&self) -> bool {
        self.families
            .lock()
            .unwrap()
            .values()
            .any(|family| family.needs_polling())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeFamily {
        io_type: &'static str,
        polling: bool,
    }

    impl TransportFamily for FakeFamily {
        fn io_type(&self) -> &str {
            self.io_type
        }

        fn default_baud_rate(&self) -> u32 {
            921_600
        }

        fn list_devices(&self, _devices: &mut Vec<SensorDesc>) -> SensorResult<()> {
            Ok(())
        }

        fn open(
            &self,
            _desc: &SensorDesc,
            _sink: Arc<dyn ByteSink>,
        ) -> SensorResult<Box<dyn Transport>> {
            Err(SensorError::InitFailed("fake".into()))
        }

        fn needs_polling(&self) -> bool {
            self.polling
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = TransportRegistry::new();
        registry
            .register(Arc::new(FakeFamily {
                io_type: "SiUsb",
                polling: false,
            }))
            .unwrap();

        assert!(registry.get("SiUsb").is_ok());
        assert!(matches!(
            registry.get("Bluetooth"),
            Err(SensorError::UnsupportedIoType(_))
        ));

        let duplicate = registry.register(Arc::new(FakeFamily {
            io_type: "SiUsb",
            polling: false,
        }));
        assert_eq!(duplicate, Err(SensorError::AlreadyInitialized));
    }

    #[test]
    fn snapshot_is_sorted_and_polling_detected() {
        let registry = TransportRegistry::new();
        registry
            .register(Arc::new(FakeFamily {
                io_type: "Serial",
                polling: false,
            }))
            .unwrap();
        registry
            .register(Arc::new(FakeFamily {
                io_type: "Can",
                polling: true,
            }))
            .unwrap();

        let io_types: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|family| family.io_type().to_owned())
            .collect();
        assert_eq!(io_types, ["Can", "Serial"]);
        assert!(registry.any_polling());
    }
}
