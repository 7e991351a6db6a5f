use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use hgipc_transport::IpcStream;
use tracing::trace;

use crate::codec::{encode_frame, Frame, FrameConfig, PacketType};
use crate::envelope::Envelope;
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// A frame is written in full or the call fails; a failed write leaves the
/// stream in an unknown position and the connection must be dropped.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.packet_type, frame.payload.as_ref())
    }

    /// Encode `envelope` and write it as one frame.
    pub fn send_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        let mut payload = BytesMut::new();
        envelope.encode_payload(&mut payload)?;
        self.send(envelope.packet_type(), &payload)
    }

    /// Frame and send a raw payload.
    ///
    /// With a write timeout configured, a `WouldBlock`/`TimedOut` error means
    /// the timeout expired and is returned as [`FrameError::Io`].
    pub fn send(&mut self, packet_type: PacketType, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(packet_type, payload, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_write_error(err)),
            }
        }
        trace!(packet = %packet_type, len = payload.len(), "frame written");

        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_write_error(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl FrameWriter<IpcStream> {
    /// Create a frame writer for `IpcStream` and apply the write timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

fn map_write_error(err: std::io::Error) -> FrameError {
    match err.kind() {
        ErrorKind::BrokenPipe => FrameError::BrokenPipe,
        _ => FrameError::Io(err),
    }
}
