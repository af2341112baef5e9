//! Glues the frame codec to a transport: serializes outbound frames, feeds
//! inbound bytes through the streaming parser and hands completed frames to
//! the frame subscriber.
//!
//! The communicator is stateless apart from the parser. Opening a streaming
//! sensor mid-flight routinely drops the parser into the middle of a frame;
//! the recovery policy is to discard the leading byte of the buffer and
//! re-enter the parser until a valid frame assembles.

use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use tracing::{debug, error};

use crate::codec::{self, Frame, FrameFormat, FrameParser};
use crate::datatypes::SensorDesc;
use crate::error::{SensorError, SensorResult};
use crate::transport::{ByteSink, Transport};

/// Receives completed frames on the transport's reader thread.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, address: u8, function: u16, payload: Bytes) -> SensorResult<()>;
}

/// Frame-level communicator for one sensor connection.
pub struct Communicator {
    /// Parser plus the wire format used for outbound frames. Replaced once,
    /// during version negotiation; the reader thread contends with the
    /// setter for microseconds at most, so a plain mutex does fine.
    parser: Mutex<FrameParser>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    subscriber: Mutex<Option<Weak<dyn FrameSink>>>,
}

impl Communicator {
    pub fn new(format: FrameFormat) -> Self {
        Communicator {
            parser: Mutex::new(FrameParser::new(format)),
            transport: Mutex::new(None),
            subscriber: Mutex::new(None),
        }
    }

    /// Attach the transport once the device is open.
    pub fn init(&self, transport: Box<dyn Transport>) {
        *self.transport.lock().unwrap() = Some(Arc::from(transport));
    }

    /// Point completed frames at a new subscriber. Held weakly: a released
    /// subscriber silently stops receiving.
    pub fn set_subscriber(&self, subscriber: Weak<dyn FrameSink>) {
        *self.subscriber.lock().unwrap() = Some(subscriber);
    }

    /// Swap the wire variant after negotiation settles on one.
    pub fn set_format(&self, format: FrameFormat) {
        *self.parser.lock().unwrap() = FrameParser::new(format);
    }

    pub fn format(&self) -> FrameFormat {
        self.parser.lock().unwrap().format()
    }

    /// Serialize and transmit one frame.
    pub fn send(&self, address: u8, function: u16, payload: &[u8]) -> SensorResult<()> {
        debug!(address, function, len = payload.len(), "sending frame");
        let encoded = codec::make_frame(self.format(), address, function, payload)?;
        self.transport()?.send(&encoded)
    }

    pub fn baud_rate(&self) -> SensorResult<u32> {
        self.transport()?.baud_rate()
    }

    pub fn set_baud_rate(&self, rate: u32) -> SensorResult<()> {
        self.transport()?.set_baud_rate(rate)
    }

    pub fn supported_baud_rates(&self) -> SensorResult<Vec<u32>> {
        self.transport()?.supported_baud_rates()
    }

    pub fn io_type(&self) -> SensorResult<String> {
        Ok(self.transport()?.io_type().to_owned())
    }

    pub fn matches(&self, desc: &SensorDesc) -> bool {
        match self.transport() {
            Ok(transport) => transport.matches(desc),
            Err(_) => false,
        }
    }

    /// Close the underlying transport; the reader thread is joined before
    /// this returns.
    pub fn close(&self) {
        if let Some(transport) = self.transport.lock().unwrap().take() {
            transport.close();
        }
    }

    fn transport(&self) -> SensorResult<Arc<dyn Transport>> {
        self.transport
            .lock()
            .unwrap()
            .clone()
            .ok_or(SensorError::NotInitialized)
    }

    fn dispatch(&self, frame: Frame) {
        let subscriber = self
            .subscriber
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade);
        let Some(subscriber) = subscriber else {
            debug!("dropping frame, no live subscriber");
            return;
        };

        match subscriber.on_frame(frame.address, frame.function, frame.payload) {
            Ok(()) => {}
            Err(SensorError::BufferTooSmall { required }) => {
                debug!(required, "subscriber reported a short buffer, frame dropped");
            }
            Err(err) => {
                error!(
                    address = frame.address,
                    function = frame.function,
                    %err,
                    "failed to process frame"
                );
            }
        }
    }
}

impl ByteSink for Communicator {
    fn on_bytes(&self, data: &[u8]) {
        let mut data = data;
        while !data.is_empty() {
            let frame = {
                let mut parser = self.parser.lock().unwrap();
                if let Err(err) = parser.parse(&mut data) {
                    // Usually a mid-frame join; drop one byte and rescan.
                    debug!(%err, "frame parse failed, resyncing");
                    parser.reset();
                    data = &data[1..];
                    continue;
                }
                if parser.finished() {
                    Some(parser.take_frame())
                } else {
                    None
                }
            };

            if let Some(frame) = frame {
                debug!(
                    address = frame.address,
                    function = frame.function,
                    len = frame.payload.len(),
                    "received frame"
                );
                self.dispatch(frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        frames: StdMutex<Vec<(u8, u16, Vec<u8>)>>,
        fail_with: StdMutex<Option<SensorError>>,
    }

    impl FrameSink for RecordingSink {
        fn on_frame(&self, address: u8, function: u16, payload: Bytes) -> SensorResult<()> {
            self.frames
                .lock()
                .unwrap()
                .push((address, function, payload.to_vec()));
            match self.fail_with.lock().unwrap().clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn communicator_with_sink() -> (Arc<Communicator>, Arc<RecordingSink>) {
        let communicator = Arc::new(Communicator::new(FrameFormat::Lp));
        let sink = Arc::new(RecordingSink::default());
        let weak: Weak<RecordingSink> = Arc::downgrade(&sink);
        communicator.set_subscriber(weak);
        (communicator, sink)
    }

    #[test]
    fn delivers_frames_in_wire_order() {
        let (communicator, sink) = communicator_with_sink();

        let mut stream = Vec::new();
        stream.extend_from_slice(&codec::make_frame(FrameFormat::Lp, 0, 9, &[1, 2]).unwrap());
        stream.extend_from_slice(&codec::make_frame(FrameFormat::Lp, 1, 4, &[]).unwrap());
        communicator.on_bytes(&stream);

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], (0, 9, vec![1, 2]));
        assert_eq!(frames[1], (1, 4, vec![]));
    }

    #[test]
    fn resyncs_after_leading_noise() {
        let (communicator, sink) = communicator_with_sink();

        let mut stream = vec![0xFF, 0xFF];
        stream.extend_from_slice(&[
            0x3A, 0x0A, 0x00, 0x0B, 0x00, 0x04, 0x00, 0x01, 0x02, 0x03, 0x04, 0x23, 0x00, 0x0D,
            0x0A,
        ]);
        communicator.on_bytes(&stream);

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], (0x0A, 0x0B, vec![1, 2, 3, 4]));
    }

    #[test]
    fn reassembles_across_split_reads() {
        let (communicator, sink) = communicator_with_sink();

        let encoded = codec::make_frame(FrameFormat::Lp, 0, 9, &[7, 7, 7]).unwrap();
        for byte in encoded.iter() {
            communicator.on_bytes(&[*byte]);
        }

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].2, vec![7, 7, 7]);
    }

    #[test]
    fn subscriber_failure_discards_frame_and_continues() {
        let (communicator, sink) = communicator_with_sink();
        *sink.fail_with.lock().unwrap() = Some(SensorError::UnknownProperty);

        let mut stream = Vec::new();
        stream.extend_from_slice(&codec::make_frame(FrameFormat::Lp, 0, 9, &[1]).unwrap());
        stream.extend_from_slice(&codec::make_frame(FrameFormat::Lp, 0, 9, &[2]).unwrap());
        communicator.on_bytes(&stream);

        // Both frames reach the subscriber; the failure never propagates.
        assert_eq!(sink.frames.lock().unwrap().len(), 2);
    }

    #[test]
    fn send_without_transport_reports_uninitialized() {
        let communicator = Communicator::new(FrameFormat::Lp);
        assert_eq!(
            communicator.send(0, 9, &[]),
            Err(SensorError::NotInitialized)
        );
    }
}
