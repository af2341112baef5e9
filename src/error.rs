// ABOUTME: Library-wide error type covering argument, transport, protocol,
// ABOUTME: semantic and state failures surfaced by the sensor client.

use crate::codec::CodecError;
use std::io;
use thiserror::Error;

/// Comprehensive error type for sensor operations.
///
/// Transport errors during a pending request resolve that request and are
/// surfaced to the caller. Protocol errors during parsing are logged and
/// recovered internally; they only become visible as a [`SensorError::Timeout`]
/// when the expected reply never assembles.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// Invalid argument (null-equivalent handle, empty identifier, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A handle that does not refer to a live client, sensor or component.
    #[error("invalid handle")]
    InvalidHandle,

    /// Property exists but not with the requested data type.
    #[error("wrong data type for property")]
    WrongDataType,

    /// Caller-provided buffer is too small; carries the required size.
    #[error("buffer too small, {required} elements required")]
    BufferTooSmall { required: usize },

    #[error("already initialized")]
    AlreadyInitialized,

    #[error("not initialized")]
    NotInitialized,

    /// No transport family is registered for the descriptor's IO type.
    #[error("unsupported IO type {0:?}")]
    UnsupportedIoType(String),

    #[error("wrong sensor type")]
    WrongSensorType,

    #[error("unknown device id {0:?}")]
    UnknownDeviceId(String),

    /// A device listing is already in progress for this client.
    #[error("device listing in progress")]
    ListingBusy,

    #[error("sending to the transport failed")]
    SendFailed,

    #[error("reading from the transport failed")]
    ReadFailed,

    #[error("transport initialization failed: {0}")]
    InitFailed(String),

    /// Transport is busy with another exchange; try again later.
    #[error("transport busy")]
    Busy,

    /// The request timed out waiting for the sensor's reply.
    #[error("request timed out")]
    Timeout,

    /// A reply arrived with a function the pending request did not expect.
    #[error("unexpected function {0:#06x}")]
    UnexpectedFunction(u16),

    #[error("unsupported function {0:#06x}")]
    UnsupportedFunction(u16),

    /// Received message failed framing validation.
    #[error("received message is corrupt")]
    MessageCorrupt,

    /// Outbound payload exceeds what a single frame can carry.
    #[error("message too big for a single frame")]
    MessageTooBig,

    /// The sensor was expected to acknowledge and did not.
    #[error("expected an acknowledgement")]
    ExpectedAck,

    /// The sensor answered with a negative acknowledgement.
    #[error("negative acknowledgement from sensor")]
    ProtocolNack,

    #[error("transport does not know its supported baud rates")]
    BaudRatesUnknown,

    #[error("unknown property")]
    UnknownProperty,

    #[error("unknown command")]
    UnknownCommand,

    /// The firmware rejected or failed the requested function.
    #[error("firmware failed to execute the function")]
    FirmwareFailed,

    /// Connection negotiation never got an answer at any supported baud rate.
    #[error("connection negotiation failed")]
    ConnectionFailed,
}

impl From<CodecError> for SensorError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::PayloadTooLarge(_) | CodecError::FunctionTooLarge(_) => {
                SensorError::MessageTooBig
            }
            _ => SensorError::MessageCorrupt,
        }
    }
}

impl From<io::Error> for SensorError {
    fn from(_err: io::Error) -> Self {
        SensorError::SendFailed
    }
}

/// Result type alias for sensor operations.
pub type SensorResult<T> = Result<T, SensorError>;

/// Status of a long-running asynchronous operation (firmware / IAP upload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncStatus {
    /// The upload completed; state has been cleared for a new one.
    Finished,
    /// An upload is already running on this sensor.
    ThreadBusy,
    /// The provided image was empty or otherwise unusable.
    InvalidArgument,
    /// The upload thread is still writing pages.
    Updating,
    /// The upload aborted; state has been cleared for a retry.
    Failed,
}
