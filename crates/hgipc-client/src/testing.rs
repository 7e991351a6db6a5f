//! In-process hub double for client tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use hgipc_frame::{Envelope, FrameReader, FrameWriter, PacketType, RpcFault};
use hgipc_transport::{IpcStream, UnixDomainSocket};
use hgipc_variant::Variant;

use crate::state::lock;

pub(crate) fn temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/hgipc-client-{}-{}-{}",
        tag,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

pub(crate) enum HubReply {
    Value(Variant),
    Fault(RpcFault),
    /// Hang up without answering.
    Close,
    /// Read the request and never answer it.
    Silent,
    /// Send an arbitrary payload under the given marker.
    Raw(PacketType, Vec<u8>),
}

/// Answers every request with its first parameter (or void).
pub(crate) fn echo_handler(_: &HubConn, _: &str, params: &[Variant]) -> HubReply {
    HubReply::Value(params.first().cloned().unwrap_or_default())
}

type Handler = Arc<dyn Fn(&HubConn, &str, &[Variant]) -> HubReply + Send + Sync>;

pub(crate) struct HubConn {
    writer: Mutex<FrameWriter<IpcStream>>,
    control: IpcStream,
}

impl HubConn {
    pub(crate) fn send(&self, envelope: &Envelope) {
        let _ = lock(&self.writer).send_envelope(envelope);
    }

    fn send_raw(&self, packet_type: PacketType, payload: &[u8]) {
        let _ = lock(&self.writer).send(packet_type, payload);
    }

    fn close(&self) {
        let _ = self.control.shutdown();
    }
}

/// A listening hub that serves each connection on its own thread, handling
/// requests strictly in arrival order.
pub(crate) struct FakeHub {
    path: PathBuf,
    owned_dir: Option<PathBuf>,
    stopping: Arc<AtomicBool>,
    conns: Arc<Mutex<Vec<Arc<HubConn>>>>,
    /// Connections accepted so far, including ones already closed.
    accepted: Arc<AtomicUsize>,
    acceptor: Option<JoinHandle<()>>,
}

impl FakeHub {
    /// Listen on a fresh temp socket, removed again on drop.
    pub(crate) fn start<F>(handler: F) -> Self
    where
        F: Fn(&HubConn, &str, &[Variant]) -> HubReply + Send + Sync + 'static,
    {
        let dir = temp_dir("hub");
        let mut hub = Self::start_at(&dir.join("hub.sock"), handler);
        hub.owned_dir = Some(dir);
        hub
    }

    pub(crate) fn start_at<F>(path: &Path, handler: F) -> Self
    where
        F: Fn(&HubConn, &str, &[Variant]) -> HubReply + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let listener = UnixDomainSocket::bind(path).expect("hub should bind");
        let stopping = Arc::new(AtomicBool::new(false));
        let conns: Arc<Mutex<Vec<Arc<HubConn>>>> = Arc::default();
        let accepted = Arc::new(AtomicUsize::new(0));

        let acceptor = {
            let stopping = Arc::clone(&stopping);
            let conns = Arc::clone(&conns);
            let accepted = Arc::clone(&accepted);
            thread::spawn(move || {
                while let Ok(stream) = listener.accept() {
                    if stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    let reader = FrameReader::new(stream.try_clone().expect("clone"));
                    let control = stream.try_clone().expect("clone");
                    let conn = Arc::new(HubConn {
                        writer: Mutex::new(FrameWriter::new(stream)),
                        control,
                    });
                    lock(&conns).push(Arc::clone(&conn));
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let handler = Arc::clone(&handler);
                    thread::spawn(move || serve(conn, reader, handler));
                }
            })
        };

        Self {
            path: path.to_path_buf(),
            owned_dir: None,
            stopping,
            conns,
            accepted,
            acceptor: Some(acceptor),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Block until `count` connections have been accepted in total.
    ///
    /// A client's connect returns once the kernel queued the connection,
    /// which can be before the hub registered it.
    pub(crate) fn wait_for_connections(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.accepted.load(Ordering::SeqCst) < count {
            assert!(Instant::now() < deadline, "hub never saw connection {count}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Write an envelope to every live connection.
    pub(crate) fn broadcast(&self, envelope: &Envelope) {
        for conn in lock(&self.conns).iter() {
            conn.send(envelope);
        }
    }

    pub(crate) fn kill_connections(&self) {
        for conn in lock(&self.conns).drain(..) {
            conn.close();
        }
    }
}

impl Drop for FakeHub {
    fn drop(&mut self) {
        // Stop listening first so that clients cannot reconnect to a
        // listener nobody accepts on.
        self.stopping.store(true, Ordering::SeqCst);
        // Waking accept() needs the socket file. If a test removed it, the
        // acceptor is left blocked rather than joined.
        let woken = UnixDomainSocket::connect(&self.path).is_ok();
        if let Some(acceptor) = self.acceptor.take() {
            if woken {
                let _ = acceptor.join();
            }
        }
        self.kill_connections();
        if let Some(dir) = self.owned_dir.take() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

fn serve(conn: Arc<HubConn>, mut reader: FrameReader<IpcStream>, handler: Handler) {
    while let Ok(envelope) = reader.read_envelope() {
        let Envelope::Request { method, params } = envelope else {
            continue;
        };
        match handler(&conn, &method, &params) {
            HubReply::Value(value) => conn.send(&Envelope::Response(value)),
            HubReply::Fault(fault) => conn.send(&Envelope::Fault(fault)),
            HubReply::Close => {
                conn.close();
                break;
            }
            HubReply::Silent => {}
            HubReply::Raw(packet_type, payload) => conn.send_raw(packet_type, &payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_hub_answers_requests() {
        let hub = FakeHub::start(echo_handler);
        let stream = UnixDomainSocket::connect(hub.path()).unwrap();
        hub.wait_for_connections(1);
        let mut reader = FrameReader::new(stream.try_clone().unwrap());
        let mut writer = FrameWriter::new(stream);

        writer
            .send_envelope(&Envelope::request("echo", vec![Variant::Integer(4)]))
            .unwrap();
        assert_eq!(
            reader.read_envelope().unwrap(),
            Envelope::Response(Variant::Integer(4))
        );

        hub.kill_connections();
        assert!(reader.read_envelope().is_err());
    }

    #[test]
    fn drop_returns_when_socket_file_is_gone() {
        let dir = temp_dir("gone");
        let hub = FakeHub::start_at(&dir.join("hub.sock"), echo_handler);
        std::fs::remove_dir_all(&dir).unwrap();
        drop(hub);
    }
}
