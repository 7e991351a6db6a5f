//! Connection supervisor and read loop.
//!
//! One `hgipc-supervisor` thread per client owns the read half of every
//! connection. It correlates Response and Fault frames with the oldest
//! pending call, hands events to the event thread, and reconnects according
//! to the [`ReconnectPolicy`](crate::ReconnectPolicy) whenever the link is
//! lost.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use hgipc_frame::{Envelope, FrameError, FrameReader, FrameWriter, PacketType, ProtocolError};
use hgipc_transport::{IpcStream, UnixDomainSocket};
use tracing::{debug, error, info, trace, warn};

use crate::client::PeerCredentials;
use crate::config::ClientConfig;
use crate::error::{ConnectionError, Error, Result};
use crate::events::EventSink;
use crate::pending::{PendingCalls, Reply};
use crate::state::{lock, ConnectionState, StateCell};

/// State shared by the client handle, the supervisor and the event thread.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) state: StateCell,
    pub(crate) events: EventSink,
    pending: PendingCalls,
    /// Write half. `None` while disconnected. Held across enqueue + write so
    /// that wire order equals queue order.
    writer: Mutex<Option<FrameWriter<IpcStream>>>,
    /// Extra handle used to shut the socket down without the writer lock.
    control: Mutex<Option<IpcStream>>,
    peer: Mutex<Option<PeerCredentials>>,
}

impl Shared {
    pub(crate) fn new(config: ClientConfig) -> Result<Self> {
        let events = EventSink::start(
            config.on_event.clone(),
            config.on_connect.clone(),
            config.event_queue_depth,
        )
        .map_err(ConnectionError::Io)?;
        Ok(Self {
            config,
            state: StateCell::new(ConnectionState::Disconnected),
            events,
            pending: PendingCalls::new(),
            writer: Mutex::new(None),
            control: Mutex::new(None),
            peer: Mutex::new(None),
        })
    }

    /// Connect to the hub socket and install the new connection.
    pub(crate) fn open(&self) -> Result<FrameReader<IpcStream>> {
        self.state.set(ConnectionState::Connecting);
        let path = &self.config.socket_path;
        debug!(?path, timeout = ?self.config.connect_timeout, "connecting to hub");
        let stream = UnixDomainSocket::connect_timeout(path, self.config.connect_timeout)?;
        self.attach(stream)
    }

    fn attach(&self, stream: IpcStream) -> Result<FrameReader<IpcStream>> {
        let reader_stream = stream.try_clone()?;
        let control = stream.try_clone()?;
        let reader = FrameReader::with_config_ipc(reader_stream, self.config.reader_frame_config())?;
        let writer = FrameWriter::with_config_ipc(stream, self.config.writer_frame_config())?;
        let peer = control.peer_credentials().map(PeerCredentials::from);

        *lock(&self.writer) = Some(writer);
        {
            let mut slot = lock(&self.control);
            // close() may have run between connect and here.
            if self.state.is_stopping() {
                let _ = control.shutdown();
            }
            *slot = Some(control);
        }
        *lock(&self.peer) = peer;

        info!(
            path = ?self.config.socket_path,
            peer_pid = ?peer.map(|p| p.pid),
            peer_uid = ?peer.map(|p| p.uid),
            "connected to hub"
        );
        self.state.set(ConnectionState::Connected);
        self.events.connected();
        Ok(reader)
    }

    /// Enqueue a pending slot and write the request, atomically with respect
    /// to other callers.
    pub(crate) fn send_request(&self, method: &str, payload: &[u8]) -> Result<Receiver<Reply>> {
        let mut guard = lock(&self.writer);
        let Some(writer) = guard.as_mut() else {
            return Err(Error::not_connected());
        };

        let (id, rx) = self.pending.push();
        match writer.send(PacketType::Request, payload) {
            Ok(()) => {
                trace!(call = id, method, "request sent");
                Ok(rx)
            }
            Err(err) => {
                self.pending.withdraw(id);
                // A partial write leaves the stream unusable. The read loop
                // sees the shutdown and does the rest of the teardown.
                if let Some(writer) = guard.take() {
                    let _ = writer.get_ref().shutdown();
                }
                warn!(call = id, method, error = %err, "request write failed; dropping connection");
                Err(err.into())
            }
        }
    }

    /// Shut the socket down so the read loop wakes up.
    pub(crate) fn shutdown_socket(&self) {
        if let Some(control) = lock(&self.control).as_ref() {
            let _ = control.shutdown();
        }
    }

    pub(crate) fn peer_credentials(&self) -> Option<PeerCredentials> {
        *lock(&self.peer)
    }

    pub(crate) fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    fn complete_oldest(
        &self,
        packet: PacketType,
        reply: Reply,
    ) -> std::result::Result<(), ProtocolError> {
        match self.pending.pop_front() {
            Some(slot) => {
                trace!(call = slot.id(), %packet, "response received");
                slot.complete(reply);
                Ok(())
            }
            None => Err(ProtocolError::UnexpectedPacket(packet)),
        }
    }

    /// Tear down the current connection after the read loop ended.
    ///
    /// The state leaves `Connected` before any pending caller is woken, so a
    /// failed call never observes a stale connected flag.
    fn drop_connection(&self, reason: &FrameError) {
        drop(lock(&self.writer).take());
        let stopping = self.state.is_stopping();
        if !stopping {
            self.state.set(ConnectionState::Disconnected);
        }
        if let Some(control) = lock(&self.control).take() {
            let _ = control.shutdown();
        }
        lock(&self.peer).take();
        let failed = self.pending.fail_all();

        if stopping {
            debug!(failed_calls = failed, "connection closed");
            return;
        }
        match reason {
            FrameError::ConnectionClosed => {
                warn!(failed_calls = failed, "hub closed the connection")
            }
            err if err.is_protocol() => {
                error!(error = %err, failed_calls = failed, "protocol error; dropping connection")
            }
            err => warn!(error = %err, failed_calls = failed, "connection lost"),
        }
    }
}

/// Supervisor thread body.
///
/// `reader` is the already established first connection, if any. Without
/// one the first connect is attempted immediately and does not count
/// against the reconnect budget.
pub(crate) fn run(shared: Arc<Shared>, mut reader: Option<FrameReader<IpcStream>>) {
    let policy = shared.config.reconnect.clone();
    let mut free_attempt = reader.is_none();
    let mut failures: u32 = 0;

    loop {
        if shared.state.is_stopping() {
            // close() can win the race against the first iteration.
            if reader.take().is_some() {
                shared.drop_connection(&FrameError::ConnectionClosed);
            }
            break;
        }

        let current = match reader.take() {
            Some(current) => current,
            None => {
                if free_attempt {
                    free_attempt = false;
                } else {
                    if !policy.allows(failures) {
                        error!(attempts = failures, "reconnect attempts exhausted; giving up");
                        shared.state.set(ConnectionState::Failed);
                        break;
                    }
                    failures += 1;
                    let delay = policy.delay(failures);
                    debug!(attempt = failures, ?delay, "waiting before reconnect");
                    if !shared.state.sleep_unless_stopped(delay) {
                        break;
                    }
                }
                match shared.open() {
                    Ok(current) => current,
                    Err(err) => {
                        warn!(attempt = failures, error = %err, "connect to hub failed");
                        shared.state.set(ConnectionState::Disconnected);
                        continue;
                    }
                }
            }
        };

        failures = 0;
        let reason = read_loop(&shared, current);
        shared.drop_connection(&reason);
    }
    debug!("supervisor finished");
}

/// Read frames until the connection ends; returns why it ended.
fn read_loop(shared: &Shared, mut reader: FrameReader<IpcStream>) -> FrameError {
    loop {
        let envelope = match reader.read_envelope() {
            Ok(envelope) => envelope,
            Err(err) => return err,
        };

        let outcome = match envelope {
            Envelope::Response(value) => shared.complete_oldest(PacketType::Response, Ok(value)),
            Envelope::Fault(fault) => {
                shared.complete_oldest(PacketType::Fault, Err(Error::Fault(fault)))
            }
            Envelope::Event(batch) => {
                shared.events.dispatch(batch);
                Ok(())
            }
            Envelope::Request { method, .. } => {
                debug!(%method, "hub sent a request");
                Err(ProtocolError::UnexpectedPacket(PacketType::Request))
            }
        };
        if let Err(err) = outcome {
            return FrameError::Protocol(err);
        }
    }
}
