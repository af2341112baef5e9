//! LP frame codec - wire format encoding and the streaming frame parser.
//!
//! The LP format frames every message the same way:
//!
//! ```text
//! 0x3A | addr:u16le | func:u16le | len:u16le | payload[len] | cksum:u16le | 0x0D 0x0A
//! ```
//!
//! The legacy v0 variant carries the function as a single byte instead of a
//! little-endian u16; everything else is identical. Which variant is in use
//! is decided during connection negotiation, after which the communicator
//! swaps its parser and factory once.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Every frame opens with a colon.
pub const FRAME_START: u8 = 0x3A;

/// Every frame closes with CR LF.
pub const FRAME_END: [u8; 2] = [0x0D, 0x0A];

/// Maximum payload carried by a single frame; bounded by the 16-bit length
/// field.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Wire variant of the LP format, selected at negotiation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Original firmware framing: 8-bit function field.
    LegacyV0,
    /// Current framing: 16-bit little-endian function field.
    Lp,
}

impl FrameFormat {
    /// Encoded size of a frame with the given payload length.
    pub fn frame_size(&self, payload_len: usize) -> usize {
        match self {
            FrameFormat::LegacyV0 => 10 + payload_len,
            FrameFormat::Lp => 11 + payload_len,
        }
    }
}

/// A parsed LP frame.
///
/// The address selects the logical endpoint (0 for the sensor core, non-zero
/// for component buses), the function identifies the operation or reply kind
/// and the payload is opaque at this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: u8,
    pub function: u16,
    pub payload: Bytes,
}

/// Codec errors. Parse errors are expected during normal operation: opening
/// a streaming sensor mid-flight lands the parser in the middle of a frame,
/// and the communicator recovers by dropping one byte and retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("expected start byte 0x3A, got {0:#04x}")]
    ExpectedStart(u8),

    #[error("checksum mismatch: computed {computed:#06x}, received {received:#06x}")]
    ChecksumInvalid { computed: u16, received: u16 },

    #[error("expected end sequence 0x0D 0x0A")]
    ExpectedEnd,

    #[error("frame declares {declared} payload bytes, limit is {limit}")]
    UnexpectedCharacter { declared: usize, limit: usize },

    #[error("payload of {0} bytes exceeds the 16-bit length field")]
    PayloadTooLarge(usize),

    #[error("function {0:#06x} does not fit the legacy 8-bit function field")]
    FunctionTooLarge(u16),
}

/// Checksum over address, function and length as 16-bit values plus every
/// payload byte, with ordinary modulo-2^16 wrapping.
pub fn checksum(address: u16, function: u16, payload: &[u8]) -> u16 {
    let mut sum = address
        .wrapping_add(function)
        .wrapping_add(payload.len() as u16);
    for &byte in payload {
        sum = sum.wrapping_add(u16::from(byte));
    }
    sum
}

/// Serialize a frame for the given wire variant.
///
/// Rejects payloads longer than the length field can describe, and functions
/// that do not fit the legacy variant's single function byte.
pub fn make_frame(
    format: FrameFormat,
    address: u8,
    function: u16,
    payload: &[u8],
) -> Result<Bytes, CodecError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }
    if format == FrameFormat::LegacyV0 && function > u16::from(u8::MAX) {
        return Err(CodecError::FunctionTooLarge(function));
    }

    let mut buf = BytesMut::with_capacity(format.frame_size(payload.len()));
    buf.put_u8(FRAME_START);
    buf.put_u16_le(u16::from(address));
    match format {
        FrameFormat::LegacyV0 => buf.put_u8(function as u8),
        FrameFormat::Lp => buf.put_u16_le(function),
    }
    buf.put_u16_le(payload.len() as u16);
    buf.put_slice(payload);
    buf.put_u16_le(checksum(u16::from(address), function, payload));
    buf.put_slice(&FRAME_END);

    Ok(buf.freeze())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Start,
    Address1,
    Address2,
    Function1,
    Function2,
    Length1,
    Length2,
    Data,
    Check1,
    Check2,
    End1,
    End2,
    Finished,
}

/// Byte-fed parser for LP frames.
///
/// Each call to [`FrameParser::parse`] consumes as many bytes from the input
/// as possible, stopping once a full frame has been assembled or the input
/// is exhausted. After `finished()` reports true the caller takes the frame
/// with [`FrameParser::take_frame`], which resets the parser for the next
/// frame. On a parse error the parser state is stale and the caller must
/// `reset()` before feeding more bytes.
#[derive(Debug)]
pub struct FrameParser {
    format: FrameFormat,
    max_payload: usize,
    state: ParseState,
    low_byte: u8,
    address: u8,
    function: u16,
    length: u16,
    payload: Vec<u8>,
    received_checksum: u16,
}

impl FrameParser {
    pub fn new(format: FrameFormat) -> Self {
        FrameParser {
            format,
            max_payload: MAX_PAYLOAD_SIZE,
            state: ParseState::Start,
            low_byte: 0,
            address: 0,
            function: 0,
            length: 0,
            payload: Vec::new(),
            received_checksum: 0,
        }
    }

    /// Lower the accepted payload length below the wire maximum. Frames
    /// declaring more are rejected before their payload is buffered.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload.min(MAX_PAYLOAD_SIZE);
        self
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn finished(&self) -> bool {
        self.state == ParseState::Finished
    }

    pub fn reset(&mut self) {
        self.state = ParseState::Start;
        self.low_byte = 0;
        self.address = 0;
        self.function = 0;
        self.length = 0;
        self.payload = Vec::new();
        self.received_checksum = 0;
    }

    /// Consume bytes from the front of `data`, advancing the slice past
    /// everything that was accepted. On error the offending byte is left at
    /// the head of `data`, so the caller can drop it and retry.
    pub fn parse(&mut self, data: &mut &[u8]) -> Result<(), CodecError> {
        while let Some((&byte, rest)) = data.split_first() {
            if self.state == ParseState::Finished {
                break;
            }
            self.step(byte)?;
            *data = rest;
        }
        Ok(())
    }

    fn step(&mut self, byte: u8) -> Result<(), CodecError> {
        match self.state {
            ParseState::Start => {
                if byte != FRAME_START {
                    return Err(CodecError::ExpectedStart(byte));
                }
                self.state = ParseState::Address1;
            }
            ParseState::Address1 => {
                self.address = byte;
                self.state = ParseState::Address2;
            }
            ParseState::Address2 => {
                // High address byte is always zero on this bus; it still
                // participates in the checksum via the 16-bit address value.
                self.low_byte = byte;
                self.state = ParseState::Function1;
            }
            ParseState::Function1 => match self.format {
                FrameFormat::LegacyV0 => {
                    self.function = u16::from(byte);
                    self.state = ParseState::Length1;
                }
                FrameFormat::Lp => {
                    self.low_byte = byte;
                    self.state = ParseState::Function2;
                }
            },
            ParseState::Function2 => {
                self.function = u16::from_le_bytes([self.low_byte, byte]);
                self.state = ParseState::Length1;
            }
            ParseState::Length1 => {
                self.low_byte = byte;
                self.state = ParseState::Length2;
            }
            ParseState::Length2 => {
                self.length = u16::from_le_bytes([self.low_byte, byte]);
                if usize::from(self.length) > self.max_payload {
                    return Err(CodecError::UnexpectedCharacter {
                        declared: usize::from(self.length),
                        limit: self.max_payload,
                    });
                }
                self.payload = Vec::with_capacity(usize::from(self.length));
                self.state = if self.length == 0 {
                    ParseState::Check1
                } else {
                    ParseState::Data
                };
            }
            ParseState::Data => {
                self.payload.push(byte);
                if self.payload.len() == usize::from(self.length) {
                    self.state = ParseState::Check1;
                }
            }
            ParseState::Check1 => {
                self.low_byte = byte;
                self.state = ParseState::Check2;
            }
            ParseState::Check2 => {
                self.received_checksum = u16::from_le_bytes([self.low_byte, byte]);
                let computed = checksum(u16::from(self.address), self.function, &self.payload);
                if computed != self.received_checksum {
                    return Err(CodecError::ChecksumInvalid {
                        computed,
                        received: self.received_checksum,
                    });
                }
                self.state = ParseState::End1;
            }
            ParseState::End1 => {
                if byte != FRAME_END[0] {
                    return Err(CodecError::ExpectedEnd);
                }
                self.state = ParseState::End2;
            }
            ParseState::End2 => {
                if byte != FRAME_END[1] {
                    return Err(CodecError::ExpectedEnd);
                }
                self.state = ParseState::Finished;
            }
            ParseState::Finished => unreachable!("parse() stops at Finished"),
        }
        Ok(())
    }

    /// Take the completed frame and reset the parser. Callers check
    /// `finished()` first.
    pub fn take_frame(&mut self) -> Frame {
        debug_assert!(self.finished());
        let frame = Frame {
            address: self.address,
            function: self.function,
            payload: Bytes::from(std::mem::take(&mut self.payload)),
        };
        self.reset();
        frame
    }
}
