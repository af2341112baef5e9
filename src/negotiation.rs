//! Connection negotiation: probe the sensor for its version information,
//! walking the supported baud rates when it stays silent, and settle on the
//! wire variant and component set before the sensor object is built.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};

use crate::codec::FrameFormat;
use crate::connection::{Communicator, FrameSink};
use crate::datatypes::{DeviceFunction, SENSOR_CORE_ADDRESS};
use crate::error::{SensorError, SensorResult};

/// What negotiation settled on; input to component construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorAgreement {
    pub format: FrameFormat,
    pub protocol_version: u32,
    pub device_name: String,
    pub has_gnss: bool,
}

/// Per-probe reply wait; shorter than the regular request timeout because a
/// silent baud rate is the common case during the walk.
const PROBE_TIMEOUT: Duration = Duration::from_millis(800);

/// Capability bit advertised by sensors carrying a GNSS receiver.
const CAPABILITY_GNSS: u32 = 1 << 0;

/// Temporary frame subscriber used while a sensor is being opened.
///
/// The negotiator probes with a version-info request and interprets the
/// reply payload: protocol version, capability bits, then the device name.
/// Firmware reporting protocol version 1 or newer expects the 16-bit
/// function framing, and the parser/factory are replaced accordingly.
#[derive(Default)]
pub struct ConnectionNegotiator {
    reply: Mutex<Option<Bytes>>,
    arrived: Condvar,
}

impl ConnectionNegotiator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn negotiate(
        &self,
        communicator: &Communicator,
        configured_baud: u32,
    ) -> SensorResult<SensorAgreement> {
        if let Some(agreement) = self.try_baud_rate(communicator, configured_baud, false)? {
            return Ok(agreement);
        }

        // No answer at the configured rate; walk the supported rates in
        // decreasing order.
        let mut rates = communicator
            .supported_baud_rates()
            .map_err(|_| SensorError::BaudRatesUnknown)?;
        rates.sort_unstable_by(|a, b| b.cmp(a));

        for rate in rates {
            if rate == configured_baud {
                continue;
            }
            if let Some(agreement) = self.try_baud_rate(communicator, rate, true)? {
                return Ok(agreement);
            }
        }

        Err(SensorError::ConnectionFailed)
    }

    fn try_baud_rate(
        &self,
        communicator: &Communicator,
        rate: u32,
        switch: bool,
    ) -> SensorResult<Option<SensorAgreement>> {
        if switch {
            debug!(rate, "retrying negotiation at lower baud rate");
            communicator.set_baud_rate(rate)?;
        }

        // A sensor speaking the other wire variant will not produce a
        // parseable reply, so each rate is probed in both framings.
        for format in [FrameFormat::Lp, FrameFormat::LegacyV0] {
            communicator.set_format(format);
            if let Some(payload) = self.probe(communicator)? {
                let agreement = Self::interpret(&payload)?;
                if agreement.format != format {
                    communicator.set_format(agreement.format);
                }
                info!(
                    version = agreement.protocol_version,
                    name = %agreement.device_name,
                    gnss = agreement.has_gnss,
                    "negotiated sensor connection"
                );
                return Ok(Some(agreement));
            }
        }
        Ok(None)
    }

    fn probe(&self, communicator: &Communicator) -> SensorResult<Option<Bytes>> {
        self.reply.lock().unwrap().take();
        communicator.send(
            SENSOR_CORE_ADDRESS,
            u16::from(DeviceFunction::GetFirmwareInfo),
            &[],
        )?;

        let guard = self.reply.lock().unwrap();
        let (mut guard, result) = self
            .arrived
            .wait_timeout_while(guard, PROBE_TIMEOUT, |reply| reply.is_none())
            .unwrap();
        if result.timed_out() && guard.is_none() {
            return Ok(None);
        }
        Ok(guard.take())
    }

    fn interpret(payload: &[u8]) -> SensorResult<SensorAgreement> {
        if payload.len() < 8 {
            return Err(SensorError::MessageCorrupt);
        }
        let protocol_version = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let capabilities = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let name_bytes = &payload[8..];
        let end = name_bytes
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(name_bytes.len());
        let device_name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();

        let format = if protocol_version >= 1 {
            FrameFormat::Lp
        } else {
            FrameFormat::LegacyV0
        };

        Ok(SensorAgreement {
            format,
            protocol_version,
            has_gnss: capabilities & CAPABILITY_GNSS != 0,
            device_name,
        })
    }
}

impl FrameSink for ConnectionNegotiator {
    fn on_frame(&self, _address: u8, function: u16, payload: Bytes) -> SensorResult<()> {
        if function == u16::from(DeviceFunction::GetFirmwareInfo) {
            *self.reply.lock().unwrap() = Some(payload);
            self.arrived.notify_all();
        }
        // Streaming frames arriving mid-negotiation are expected noise.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_payload(version: u32, capabilities: u32, name: &str) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&version.to_le_bytes());
        payload.extend_from_slice(&capabilities.to_le_bytes());
        payload.extend_from_slice(name.as_bytes());
        payload.push(0);
        payload
    }

    #[test]
    fn interprets_ig1_reply() {
        let payload = info_payload(1, CAPABILITY_GNSS, "LPMS-IG1-RS485");
        let agreement = ConnectionNegotiator::interpret(&payload).unwrap();
        assert_eq!(agreement.format, FrameFormat::Lp);
        assert_eq!(agreement.protocol_version, 1);
        assert!(agreement.has_gnss);
        assert_eq!(agreement.device_name, "LPMS-IG1-RS485");
    }

    #[test]
    fn interprets_legacy_reply() {
        let payload = info_payload(0, 0, "LPMS-B2");
        let agreement = ConnectionNegotiator::interpret(&payload).unwrap();
        assert_eq!(agreement.format, FrameFormat::LegacyV0);
        assert!(!agreement.has_gnss);
    }

    #[test]
    fn short_reply_is_corrupt() {
        assert_eq!(
            ConnectionNegotiator::interpret(&[1, 2, 3]),
            Err(SensorError::MessageCorrupt)
        );
    }
}
