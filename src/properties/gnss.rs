// ABOUTME: Property provider for the GNSS component. One executable:
// ABOUTME: persisting the receiver's navigation state for warm starts.

use std::sync::Arc;

use crate::datatypes::{DeviceFunction, PropertyKey, PropertyType, SENSOR_CORE_ADDRESS};
use crate::error::{SensorError, SensorResult};
use crate::sync::SyncedCommunicator;

use super::{PropertyInterface, StreamControl};

pub struct GnssProperties {
    synced: Arc<SyncedCommunicator>,
    stream: Arc<StreamControl>,
}

impl GnssProperties {
    pub fn new(synced: Arc<SyncedCommunicator>, stream: Arc<StreamControl>) -> Self {
        GnssProperties { synced, stream }
    }
}

impl PropertyInterface for GnssProperties {
    fn execute(&self, key: PropertyKey) -> SensorResult<()> {
        match key {
            // Without this the receiver cold-starts and a good fix can take
            // over half an hour.
            PropertyKey::StoreNavigationState => self.stream.pause_for(|| {
                self.synced.send_and_wait_for_ack(
                    SENSOR_CORE_ADDRESS,
                    u16::from(DeviceFunction::SaveGnssState),
                    &[],
                )
            }),
            _ => Err(SensorError::UnknownCommand),
        }
    }

    fn get_bool(&self, key: PropertyKey) -> SensorResult<bool> {
        if self.is_executable(key) {
            return Err(SensorError::WrongDataType);
        }
        Err(SensorError::UnknownProperty)
    }

    fn is_array(&self, _key: PropertyKey) -> bool {
        false
    }

    fn is_constant(&self, _key: PropertyKey) -> bool {
        false
    }

    fn is_executable(&self, key: PropertyKey) -> bool {
        key == PropertyKey::StoreNavigationState
    }

    fn type_of(&self, _key: PropertyKey) -> PropertyType {
        PropertyType::Invalid
    }
}
