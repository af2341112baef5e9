//! Turns the push-based frame stream into synchronous request/reply.
//!
//! Callers take an exclusive turn: at most one request is outstanding per
//! sensor at any moment. Under the turn the request frame is transmitted and
//! the caller suspends on a condition variable until the reader thread
//! resolves the turn with a matching reply, an acknowledgement, a negative
//! acknowledgement, a transport failure, or the timeout fires. Frames that
//! do not resolve the open turn are unsolicited streaming data and flow on
//! to the component decoders.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use tracing::debug;

use crate::connection::Communicator;
use crate::datatypes::{DeviceFunction, Matrix3x3};
use crate::error::{SensorError, SensorResult};

/// Per-call timeout applied when the caller does not override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
enum Outcome {
    Ack,
    Nack,
    Reply(Bytes),
    Failed(SensorError),
}

#[derive(Default)]
struct TurnState {
    /// A caller holds the turn and has not yet been resolved.
    waiting: bool,
    expected_address: u8,
    expected_function: u16,
    outcome: Option<Outcome>,
}

/// Synchronous request/reply coordinator for one sensor.
pub struct SyncedCommunicator {
    communicator: Arc<Communicator>,
    /// Serializes callers; the critical section spans send, wait and commit.
    turn: Mutex<()>,
    state: Mutex<TurnState>,
    resolved: Condvar,
    timeout: Mutex<Duration>,
}

impl SyncedCommunicator {
    pub fn new(communicator: Arc<Communicator>) -> Self {
        SyncedCommunicator {
            communicator,
            turn: Mutex::new(()),
            state: Mutex::new(TurnState::default()),
            resolved: Condvar::new(),
            timeout: Mutex::new(DEFAULT_TIMEOUT),
        }
    }

    pub fn communicator(&self) -> &Arc<Communicator> {
        &self.communicator
    }

    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock().unwrap() = timeout;
    }

    pub fn timeout(&self) -> Duration {
        *self.timeout.lock().unwrap()
    }

    /// Send a request and wait until the sensor acknowledges it.
    pub fn send_and_wait_for_ack(
        &self,
        address: u8,
        function: u16,
        payload: &[u8],
    ) -> SensorResult<()> {
        let outcome =
            self.run_turn(address, function, u16::from(DeviceFunction::Ack), payload)?;
        match outcome {
            Outcome::Ack => Ok(()),
            Outcome::Nack => Err(SensorError::ProtocolNack),
            Outcome::Reply(_) => Err(SensorError::ExpectedAck),
            Outcome::Failed(err) => Err(err),
        }
    }

    /// Send a request and decode the typed reply payload.
    pub fn send_and_wait_for_result<T: FromReplyPayload>(
        &self,
        address: u8,
        function: u16,
        reply_function: u16,
        payload: &[u8],
    ) -> SensorResult<T> {
        let outcome = self.run_turn(address, function, reply_function, payload)?;
        match outcome {
            Outcome::Reply(reply) => T::from_payload(&reply),
            Outcome::Ack => Err(SensorError::UnexpectedFunction(u16::from(
                DeviceFunction::Ack,
            ))),
            Outcome::Nack => Err(SensorError::ProtocolNack),
            Outcome::Failed(err) => Err(err),
        }
    }

    /// Send a request and copy the reply's element array into `out`,
    /// returning the element count. A short buffer fails with
    /// `BufferTooSmall` carrying the required length.
    pub fn send_and_wait_for_array<T: ReplyElement>(
        &self,
        address: u8,
        function: u16,
        reply_function: u16,
        payload: &[u8],
        out: &mut [T],
    ) -> SensorResult<usize> {
        let outcome = self.run_turn(address, function, reply_function, payload)?;
        let reply = match outcome {
            Outcome::Reply(reply) => reply,
            Outcome::Ack => {
                return Err(SensorError::UnexpectedFunction(u16::from(
                    DeviceFunction::Ack,
                )));
            }
            Outcome::Nack => return Err(SensorError::ProtocolNack),
            Outcome::Failed(err) => return Err(err),
        };

        let count = reply.len() / T::WIRE_SIZE;
        if count > out.len() {
            return Err(SensorError::BufferTooSmall { required: count });
        }
        for (idx, slot) in out.iter_mut().take(count).enumerate() {
            let offset = idx * T::WIRE_SIZE;
            *slot = T::read(&reply[offset..offset + T::WIRE_SIZE]);
        }
        Ok(count)
    }

    /// Fire-and-forget transmit, bypassing the turn discipline. Used for
    /// upload pages whose pacing the firmware controls.
    pub fn publish(&self, address: u8, function: u16, payload: &[u8]) -> SensorResult<()> {
        self.communicator.send(address, function, payload)
    }

    /// Classify an inbound frame on the reader thread. Consumed frames
    /// resolve the open turn and return `None`; everything else is returned
    /// for the unsolicited-data path.
    pub fn classify(
        &self,
        address: u8,
        function: u16,
        payload: Bytes,
    ) -> Option<(u8, u16, Bytes)> {
        let mut state = self.state.lock().unwrap();
        if state.waiting && state.outcome.is_none() {
            if function == u16::from(DeviceFunction::Ack) {
                state.outcome = Some(Outcome::Ack);
                self.resolved.notify_all();
                return None;
            }
            if function == u16::from(DeviceFunction::Nack) {
                state.outcome = Some(Outcome::Nack);
                self.resolved.notify_all();
                return None;
            }
            if function == state.expected_function && address == state.expected_address {
                state.outcome = Some(Outcome::Reply(payload));
                self.resolved.notify_all();
                return None;
            }
        }
        Some((address, function, payload))
    }

    /// Resolve an open turn with a failure; called when the transport dies
    /// or the sensor is released.
    pub fn fail_pending(&self, err: SensorError) {
        let mut state = self.state.lock().unwrap();
        if state.waiting && state.outcome.is_none() {
            state.outcome = Some(Outcome::Failed(err));
            self.resolved.notify_all();
        }
    }

    fn run_turn(
        &self,
        address: u8,
        function: u16,
        reply_function: u16,
        payload: &[u8],
    ) -> SensorResult<Outcome> {
        let _turn = self.turn.lock().unwrap();

        let timeout = self.timeout();
        if timeout.is_zero() {
            return Err(SensorError::Timeout);
        }

        {
            let mut state = self.state.lock().unwrap();
            state.waiting = true;
            state.expected_address = address;
            state.expected_function = reply_function;
            state.outcome = None;
        }

        if let Err(err) = self.communicator.send(address, function, payload) {
            self.state.lock().unwrap().waiting = false;
            return Err(err);
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        while state.outcome.is_none() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(function, "request timed out");
                state.outcome = Some(Outcome::Failed(SensorError::Timeout));
                break;
            }
            let (guard, _result) = self.resolved.wait_timeout(state, remaining).unwrap();
            state = guard;
        }

        let outcome = state.outcome.take().unwrap_or(Outcome::Failed(SensorError::Timeout));
        state.waiting = false;
        Ok(outcome)
    }
}

/// Decodes a typed value from a reply payload. All wire values are
/// little-endian.
pub trait FromReplyPayload: Sized {
    fn from_payload(payload: &[u8]) -> SensorResult<Self>;
}

impl FromReplyPayload for u32 {
    fn from_payload(payload: &[u8]) -> SensorResult<Self> {
        let mut buf = payload;
        if buf.remaining() < 4 {
            return Err(SensorError::MessageCorrupt);
        }
        Ok(buf.get_u32_le())
    }
}

impl FromReplyPayload for i32 {
    fn from_payload(payload: &[u8]) -> SensorResult<Self> {
        u32::from_payload(payload).map(|value| value as i32)
    }
}

impl FromReplyPayload for u64 {
    fn from_payload(payload: &[u8]) -> SensorResult<Self> {
        let mut buf = payload;
        if buf.remaining() < 8 {
            return Err(SensorError::MessageCorrupt);
        }
        Ok(buf.get_u64_le())
    }
}

impl FromReplyPayload for f32 {
    fn from_payload(payload: &[u8]) -> SensorResult<Self> {
        let mut buf = payload;
        if buf.remaining() < 4 {
            return Err(SensorError::MessageCorrupt);
        }
        Ok(buf.get_f32_le())
    }
}

impl FromReplyPayload for bool {
    fn from_payload(payload: &[u8]) -> SensorResult<Self> {
        u32::from_payload(payload).map(|value| value != 0)
    }
}

impl FromReplyPayload for Matrix3x3 {
    fn from_payload(payload: &[u8]) -> SensorResult<Self> {
        let mut buf = payload;
        if buf.remaining() < 36 {
            return Err(SensorError::MessageCorrupt);
        }
        let mut matrix = Matrix3x3::default();
        for slot in matrix.data.iter_mut() {
            *slot = buf.get_f32_le();
        }
        Ok(matrix)
    }
}

impl FromReplyPayload for String {
    fn from_payload(payload: &[u8]) -> SensorResult<Self> {
        let end = payload
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(payload.len());
        String::from_utf8(payload[..end].to_vec()).map_err(|_| SensorError::MessageCorrupt)
    }
}

/// Fixed-size element of an array reply.
pub trait ReplyElement: Sized + Default + Copy {
    const WIRE_SIZE: usize;
    fn read(chunk: &[u8]) -> Self;
}

impl ReplyElement for u8 {
    const WIRE_SIZE: usize = 1;
    fn read(chunk: &[u8]) -> Self {
        chunk[0]
    }
}

impl ReplyElement for u32 {
    const WIRE_SIZE: usize = 4;
    fn read(chunk: &[u8]) -> Self {
        u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
    }
}

impl ReplyElement for i32 {
    const WIRE_SIZE: usize = 4;
    fn read(chunk: &[u8]) -> Self {
        i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
    }
}

impl ReplyElement for f32 {
    const WIRE_SIZE: usize = 4;
    fn read(chunk: &[u8]) -> Self {
        f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
    }
}
