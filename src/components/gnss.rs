// ABOUTME: Streaming decoder for the GNSS position-velocity-time records
// ABOUTME: emitted by IG1 sensors with the GNSS capability bit.

use std::sync::Arc;

use crate::datatypes::{DeviceFunction, EventKind, GnssSample};
use crate::error::{SensorError, SensorResult};

use super::{SampleDecoder, SampleReader};

/// Fixed wire size of one PVT record.
pub const PVT_RECORD_SIZE: usize = 54;

/// Decoder for GNSS PVT payloads. Stateless; the record layout is fixed and
/// does not follow the IMU output bitset.
#[derive(Default)]
pub struct GnssDecoder;

impl GnssDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(GnssDecoder)
    }

    fn parse(&self, payload: &[u8]) -> SensorResult<GnssSample> {
        if payload.len() < PVT_RECORD_SIZE {
            return Err(SensorError::MessageCorrupt);
        }
        let mut reader = SampleReader::new(payload, false);

        let itow_ms = reader.read_u32()?;
        let year = reader.read_u16()?;
        let month = reader.read_u8()?;
        let day = reader.read_u8()?;
        let hour = reader.read_u8()?;
        let minute = reader.read_u8()?;
        let second = reader.read_u8()?;
        let nanosecond_correction = reader.read_i32()?;
        let fix_type = reader.read_u8()?;
        let carrier_phase_solution = reader.read_u8()?;
        let num_satellites = reader.read_u8()?;
        let longitude = reader.read_i32()?;
        let latitude = reader.read_i32()?;
        let height = reader.read_i32()?;
        let horizontal_accuracy = reader.read_u32()?;
        let vertical_accuracy = reader.read_u32()?;
        let ground_speed = reader.read_i32()?;
        let speed_accuracy = reader.read_u32()?;
        let heading = reader.read_i32()?;
        let heading_accuracy = reader.read_u32()?;

        Ok(GnssSample {
            itow_ms,
            year,
            month,
            day,
            hour,
            minute,
            second,
            nanosecond_correction,
            fix_type,
            carrier_phase_solution,
            num_satellites,
            longitude_deg: f64::from(longitude) * 1e-7,
            latitude_deg: f64::from(latitude) * 1e-7,
            height_m: f64::from(height) * 1e-3,
            horizontal_accuracy_m: f64::from(horizontal_accuracy) * 1e-3,
            vertical_accuracy_m: f64::from(vertical_accuracy) * 1e-3,
            ground_speed_mps: f64::from(ground_speed) * 1e-3,
            speed_accuracy_mps: f64::from(speed_accuracy) * 1e-3,
            heading_deg: f64::from(heading) * 1e-5,
            heading_accuracy_deg: f64::from(heading_accuracy) * 1e-5,
        })
    }
}

impl SampleDecoder for GnssDecoder {
    fn handles(&self, function: u16) -> bool {
        function == u16::from(DeviceFunction::GetGnssData)
    }

    fn decode(&self, function: u16, payload: &[u8]) -> SensorResult<EventKind> {
        if !self.handles(function) {
            return Err(SensorError::UnsupportedFunction(function));
        }
        Ok(EventKind::GnssData(Box::new(self.parse(payload)?)))
    }
}
