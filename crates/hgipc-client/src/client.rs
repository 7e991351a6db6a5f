use std::path::Path;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use hgipc_frame::{Envelope, ProtocolError};
use hgipc_variant::Variant;
use serde::Serialize;
use tracing::{debug, error};

use crate::config::ClientConfig;
use crate::dispatcher::{self, Shared};
use crate::error::{ConnectionError, Error, Result};
use crate::state::{lock, ConnectionState};

/// Identity of the process on the other end of the socket (Linux only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
}

impl From<(u32, u32, u32)> for PeerCredentials {
    fn from((uid, gid, pid): (u32, u32, u32)) -> Self {
        Self { uid, gid, pid }
    }
}

/// RPC client for the hub IPC socket.
///
/// Cheap to share between threads by reference (or in an `Arc`): calls from
/// any number of threads are serialized on the socket and each caller gets
/// the response to its own request. A background supervisor keeps the
/// connection alive and delivers events to the configured callback.
pub struct Client {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Connect to the hub and start the background dispatcher.
    ///
    /// Fails if the hub does not accept within `connect_timeout`. Once
    /// connected, lost connections are re-established in the background.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let shared = Arc::new(Shared::new(config)?);
        let reader = match shared.open() {
            Ok(reader) => reader,
            Err(err) => {
                shared.state.set(ConnectionState::Disconnected);
                shared.events.shutdown();
                return Err(err);
            }
        };
        Self::spawn(shared, Some(reader))
    }

    /// Start the background dispatcher and wait at most `connect_timeout`
    /// for the first connection.
    ///
    /// Returns the client whether or not the hub was reachable; check
    /// [`is_connected`](Self::is_connected).
    pub fn start(config: ClientConfig) -> Result<Self> {
        let timeout = config.connect_timeout;
        let shared = Arc::new(Shared::new(config)?);
        let client = Self::spawn(shared, None)?;
        if !client.wait_connected(timeout) {
            debug!(state = %client.state(), "hub not reachable yet; continuing in background");
        }
        Ok(client)
    }

    fn spawn(
        shared: Arc<Shared>,
        reader: Option<hgipc_frame::FrameReader<hgipc_transport::IpcStream>>,
    ) -> Result<Self> {
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("hgipc-supervisor".to_string())
            .spawn(move || dispatcher::run(worker, reader));
        match handle {
            Ok(handle) => Ok(Self {
                shared,
                supervisor: Mutex::new(Some(handle)),
            }),
            Err(err) => {
                shared.state.stop();
                shared.shutdown_socket();
                shared.events.shutdown();
                Err(ConnectionError::Io(err).into())
            }
        }
    }

    /// Call `method` with the configured default timeout.
    pub fn call(&self, method: &str, params: Vec<Variant>) -> Result<Variant> {
        self.call_with_timeout(method, params, self.shared.config.call_timeout)
    }

    /// Call `method`, waiting at most `timeout` for the response.
    ///
    /// On timeout the call is abandoned: its response is still read off the
    /// socket when it arrives and then discarded.
    pub fn call_with_timeout(
        &self,
        method: &str,
        params: Vec<Variant>,
        timeout: Option<Duration>,
    ) -> Result<Variant> {
        let mut payload = BytesMut::new();
        Envelope::request(method, params).encode_payload(&mut payload)?;
        let max = self.shared.config.max_payload_size;
        if payload.len() > max {
            return Err(ProtocolError::TooLarge {
                what: "request",
                len: payload.len(),
                max,
            }
            .into());
        }

        let rx = self.shared.send_request(method, &payload)?;
        match timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(reply) => reply,
                Err(RecvTimeoutError::Timeout) => {
                    debug!(method, ?timeout, "call timed out");
                    Err(Error::Timeout(timeout))
                }
                Err(RecvTimeoutError::Disconnected) => Err(Error::not_connected()),
            },
            None => rx.recv().unwrap_or_else(|_| Err(Error::not_connected())),
        }
    }

    /// Call `method` with parameters converted from a native value.
    ///
    /// A value that serializes to a sequence becomes the parameter list,
    /// `()` means no parameters, anything else is a single parameter.
    /// Conversion failures are returned before anything is sent.
    pub fn call_serialized<P: Serialize + ?Sized>(&self, method: &str, params: &P) -> Result<Variant> {
        let params = match Variant::from_serialize(params)? {
            Variant::Array(items) => items,
            Variant::Void => Vec::new(),
            other => vec![other],
        };
        self.call(method, params)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Block until connected, for at most `timeout`. Returns `false` on
    /// timeout or when the client has given up reconnecting.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        self.wait_state(timeout, |state| {
            state == ConnectionState::Connected || state.is_terminal()
        }) == ConnectionState::Connected
    }

    /// Block until `pred` holds for the connection state, for at most
    /// `timeout`. Returns the last observed state.
    pub fn wait_state<F>(&self, timeout: Duration, pred: F) -> ConnectionState
    where
        F: FnMut(ConnectionState) -> bool,
    {
        self.shared.state.wait_until(timeout, pred)
    }

    /// Credentials of the hub process for the current connection.
    pub fn peer_credentials(&self) -> Option<PeerCredentials> {
        self.shared.peer_credentials()
    }

    pub fn socket_path(&self) -> &Path {
        &self.shared.config.socket_path
    }

    /// Calls sent and not yet answered, including abandoned ones.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending_calls()
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Outstanding calls fail with `NotConnected`. Queued events are still
    /// delivered before this returns. Calling it again is a no-op.
    pub fn close(&self) {
        if self.shared.state.stop() {
            debug!(path = ?self.shared.config.socket_path, "closing client");
            self.shared.state.set(ConnectionState::Disconnecting);
            self.shared.shutdown_socket();
        }

        if let Some(handle) = lock(&self.supervisor).take() {
            if handle.join().is_err() {
                error!("supervisor thread panicked");
            }
        }
        self.shared.events.shutdown();
        self.shared.state.set(ConnectionState::Disconnected);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("socket_path", &self.shared.config.socket_path)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::time::Instant;

    use hgipc_frame::{Event, EventBatch, PacketType, RpcFault};

    use super::*;
    use crate::config::ReconnectPolicy;
    use crate::testing::{echo_handler, temp_dir, FakeHub, HubReply};

    fn fast_config(path: &Path) -> ClientConfig {
        ClientConfig::new(path)
            .with_connect_timeout(Duration::from_millis(500))
            .with_reconnect(ReconnectPolicy::default().with_interval(Duration::from_millis(20)))
    }

    #[test]
    fn call_returns_hub_result() {
        let hub = FakeHub::start(|_, method, params| match method {
            "getSystemVariable" if params == [Variant::from("TEST")] => {
                HubReply::Value(Variant::Integer(6))
            }
            _ => HubReply::Fault(RpcFault::new(-1, "Unknown method")),
        });
        let client = Client::connect(fast_config(hub.path())).unwrap();

        assert!(client.is_connected());
        let value = client
            .call("getSystemVariable", vec![Variant::from("TEST")])
            .unwrap();
        assert_eq!(value, Variant::Integer(6));
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn fault_is_returned_to_caller() {
        let hub = FakeHub::start(|_, _, _| HubReply::Fault(RpcFault::new(-1, "Unknown method")));
        let client = Client::connect(fast_config(hub.path())).unwrap();

        let err = client.call("noSuchMethod", vec![]).unwrap_err();
        match err {
            Error::Fault(fault) => {
                assert_eq!(fault.code, -1);
                assert_eq!(fault.message, "Unknown method");
            }
            other => panic!("expected fault, got {other:?}"),
        }
        // The connection survives a fault.
        assert!(client.is_connected());
    }

    #[test]
    fn concurrent_callers_get_their_own_responses() {
        let hub = FakeHub::start(echo_handler);
        let client = Client::connect(fast_config(hub.path())).unwrap();

        thread::scope(|scope| {
            for worker in 0..8i64 {
                let client = &client;
                scope.spawn(move || {
                    for i in 0..25i64 {
                        let sent = Variant::Integer(worker * 1000 + i);
                        let got = client.call("echo", vec![sent.clone()]).unwrap();
                        assert_eq!(got, sent);
                    }
                });
            }
        });
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn timed_out_call_does_not_disturb_later_calls() {
        let hub = FakeHub::start(|conn, method, params| match method {
            "slow" => {
                thread::sleep(Duration::from_millis(200));
                HubReply::Value(Variant::from("late"))
            }
            _ => echo_handler(conn, method, params),
        });
        let client = Client::connect(fast_config(hub.path())).unwrap();

        let err = client
            .call_with_timeout("slow", vec![], Some(Duration::from_millis(1)))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(t) if t == Duration::from_millis(1)));

        let value = client.call("echo", vec![Variant::from("mine")]).unwrap();
        assert_eq!(value, Variant::from("mine"));
        assert!(client.is_connected());
    }

    #[test]
    fn event_is_delivered_without_consuming_a_call() {
        let (events_tx, events_rx) = channel::<Event>();
        let events_tx = Mutex::new(events_tx);

        let hub = FakeHub::start(|conn, method, params| {
            if method == "withEvent" {
                conn.send(&Envelope::Event(EventBatch::single(
                    5,
                    1,
                    "TEST",
                    Variant::Integer(6),
                )));
            }
            echo_handler(conn, method, params)
        });
        let config = fast_config(hub.path()).on_event(move |event| {
            let _ = lock(&events_tx).send(event.clone());
        });
        let client = Client::connect(config).unwrap();

        let value = client
            .call("withEvent", vec![Variant::from("reply")])
            .unwrap();
        assert_eq!(value, Variant::from("reply"));

        let event = events_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.peer_id, 5);
        assert_eq!(event.channel, 1);
        assert_eq!(event.variable, "TEST");
        assert_eq!(event.value, Variant::Integer(6));
        assert!(events_rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn batched_event_fans_out_one_callback_per_variable() {
        let (events_tx, events_rx) = channel::<(String, Variant)>();
        let events_tx = Mutex::new(events_tx);
        let hub = FakeHub::start(echo_handler);
        let config = fast_config(hub.path()).on_event(move |event| {
            let _ = lock(&events_tx).send((event.variable.clone(), event.value.clone()));
        });
        let client = Client::connect(config).unwrap();
        hub.wait_for_connections(1);

        hub.broadcast(&Envelope::Event(EventBatch {
            source: Some("device".to_string()),
            peer_id: 12,
            channel: 1,
            values: vec![
                ("STATE".to_string(), Variant::Bool(true)),
                ("LEVEL".to_string(), Variant::Float(0.5)),
            ],
        }));

        let first = events_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = events_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first, ("STATE".to_string(), Variant::Bool(true)));
        assert_eq!(second, ("LEVEL".to_string(), Variant::Float(0.5)));
        assert!(client.is_connected());
    }

    #[test]
    fn panicking_callback_keeps_dispatcher_alive() {
        let (events_tx, events_rx) = channel::<String>();
        let events_tx = Mutex::new(events_tx);
        let hub = FakeHub::start(echo_handler);
        let config = fast_config(hub.path()).on_event(move |event| {
            if event.variable == "BOOM" {
                panic!("callback failure");
            }
            let _ = lock(&events_tx).send(event.variable.clone());
        });
        let client = Client::connect(config).unwrap();
        hub.wait_for_connections(1);

        hub.broadcast(&Envelope::Event(EventBatch::single(1, 0, "BOOM", Variant::Void)));
        hub.broadcast(&Envelope::Event(EventBatch::single(1, 0, "OK", Variant::Void)));

        assert_eq!(events_rx.recv_timeout(Duration::from_secs(2)).unwrap(), "OK");
        assert_eq!(
            client.call("echo", vec![Variant::Integer(1)]).unwrap(),
            Variant::Integer(1)
        );
    }

    #[test]
    fn reconnects_after_hub_restart() {
        let dir = temp_dir("restart");
        let path = dir.join("hub.sock");
        let connects = Arc::new(AtomicUsize::new(0));

        let hub = FakeHub::start_at(&path, echo_handler);
        let counter = Arc::clone(&connects);
        let config = fast_config(&path).on_connect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let client = Client::connect(config).unwrap();
        assert_eq!(
            client.call("echo", vec![Variant::Integer(1)]).unwrap(),
            Variant::Integer(1)
        );

        drop(hub);
        let state = client.wait_state(Duration::from_secs(2), |s| s != ConnectionState::Connected);
        assert_ne!(state, ConnectionState::Connected);
        assert!(!client.is_connected());

        let err = client.call("echo", vec![Variant::Integer(2)]).unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::NotConnected)
        ));

        let hub = FakeHub::start_at(&path, echo_handler);
        assert!(client.wait_connected(Duration::from_secs(3)));
        assert_eq!(
            client.call("echo", vec![Variant::Integer(3)]).unwrap(),
            Variant::Integer(3)
        );

        let deadline = Instant::now() + Duration::from_secs(2);
        while connects.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(connects.load(Ordering::SeqCst), 2);

        drop(client);
        drop(hub);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn in_flight_call_fails_when_hub_hangs_up() {
        let hub = FakeHub::start(|conn, method, params| match method {
            "hangUp" => HubReply::Close,
            _ => echo_handler(conn, method, params),
        });
        let client = Client::connect(fast_config(hub.path())).unwrap();

        let err = client.call("hangUp", vec![]).unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::NotConnected)
        ));

        assert!(client.wait_connected(Duration::from_secs(2)));
        assert_eq!(
            client.call("echo", vec![Variant::from("again")]).unwrap(),
            Variant::from("again")
        );
    }

    #[test]
    fn corrupt_response_forces_reconnect() {
        let hub = FakeHub::start(|conn, method, params| match method {
            "garbage" => HubReply::Raw(PacketType::Response, vec![0x42]),
            _ => echo_handler(conn, method, params),
        });
        let client = Client::connect(fast_config(hub.path())).unwrap();

        let err = client.call("garbage", vec![]).unwrap_err();
        assert!(err.is_connection(), "got {err:?}");

        assert!(client.wait_connected(Duration::from_secs(2)));
        assert_eq!(
            client.call("echo", vec![Variant::Integer(7)]).unwrap(),
            Variant::Integer(7)
        );
    }

    #[test]
    fn unsolicited_response_drops_connection() {
        let connects = Arc::new(AtomicUsize::new(0));
        let hub = FakeHub::start(echo_handler);
        let counter = Arc::clone(&connects);
        let config = fast_config(hub.path()).on_connect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let client = Client::connect(config).unwrap();
        hub.wait_for_connections(1);

        hub.broadcast(&Envelope::Response(Variant::Integer(1)));

        let deadline = Instant::now() + Duration::from_secs(3);
        while connects.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert!(client.wait_connected(Duration::from_secs(2)));
    }

    #[test]
    fn connect_fails_without_hub() {
        let dir = temp_dir("nohub");
        let config = ClientConfig::new(dir.join("absent.sock"))
            .with_connect_timeout(Duration::from_millis(100));

        let err = Client::connect(config).unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::Transport(
                hgipc_transport::TransportError::ConnectTimeout { .. }
            ))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn start_keeps_trying_until_hub_appears() {
        let dir = temp_dir("late-hub");
        let path = dir.join("hub.sock");
        let config = fast_config(&path).with_connect_timeout(Duration::from_millis(100));

        let client = Client::start(config).unwrap();
        assert!(!client.is_connected());
        assert!(matches!(
            client.call("echo", vec![]).unwrap_err(),
            Error::Connection(ConnectionError::NotConnected)
        ));

        let hub = FakeHub::start_at(&path, echo_handler);
        assert!(client.wait_connected(Duration::from_secs(3)));
        assert_eq!(
            client.call("echo", vec![Variant::Integer(1)]).unwrap(),
            Variant::Integer(1)
        );

        drop(client);
        drop(hub);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn gives_up_after_reconnect_budget() {
        let dir = temp_dir("budget");
        let path = dir.join("hub.sock");
        let hub = FakeHub::start_at(&path, echo_handler);
        let config = ClientConfig::new(&path)
            .with_connect_timeout(Duration::from_millis(50))
            .with_reconnect(
                ReconnectPolicy::default()
                    .with_interval(Duration::from_millis(10))
                    .with_max_attempts(Some(2)),
            );
        let client = Client::connect(config).unwrap();

        drop(hub);
        let state = client.wait_state(Duration::from_secs(3), ConnectionState::is_terminal);
        assert_eq!(state, ConnectionState::Failed);
        assert!(!client.wait_connected(Duration::from_millis(10)));

        drop(client);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn close_is_idempotent_and_fails_later_calls() {
        let hub = FakeHub::start(echo_handler);
        let client = Client::connect(fast_config(hub.path())).unwrap();

        client.close();
        client.close();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(
            client.call("echo", vec![]).unwrap_err(),
            Error::Connection(ConnectionError::NotConnected)
        ));
    }

    #[test]
    fn close_right_after_connect_fails_outstanding_call() {
        let hub = FakeHub::start(|_, _, _| HubReply::Silent);
        let mut payload = BytesMut::new();
        Envelope::request("never", vec![])
            .encode_payload(&mut payload)
            .unwrap();

        for _ in 0..20 {
            let client = Client::connect(fast_config(hub.path())).unwrap();
            let reply = client.shared.send_request("never", &payload).unwrap();
            client.close();

            let outcome = reply.recv_timeout(Duration::from_secs(2)).unwrap();
            assert!(matches!(
                outcome,
                Err(Error::Connection(ConnectionError::NotConnected))
            ));
            assert_eq!(client.pending_calls(), 0);
            assert!(matches!(
                client.call("echo", vec![]).unwrap_err(),
                Error::Connection(ConnectionError::NotConnected)
            ));
        }
    }

    #[test]
    fn failed_call_never_sees_connected_state() {
        let (seen_tx, seen_rx) = channel::<()>();
        let seen_tx = Mutex::new(seen_tx);
        let hub = FakeHub::start(move |conn, method, params| match method {
            "never" => {
                let _ = lock(&seen_tx).send(());
                HubReply::Silent
            }
            _ => echo_handler(conn, method, params),
        });
        let config = fast_config(hub.path())
            .with_reconnect(ReconnectPolicy::default().with_interval(Duration::from_secs(10)));
        let client = Client::connect(config).unwrap();
        hub.wait_for_connections(1);

        thread::scope(|scope| {
            let waiter = scope.spawn(|| {
                let result = client.call("never", vec![]);
                (result, client.state())
            });
            seen_rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(client.pending_calls(), 1);
            hub.kill_connections();

            let (result, state) = waiter.join().unwrap();
            assert!(matches!(
                result,
                Err(Error::Connection(ConnectionError::NotConnected))
            ));
            assert_ne!(state, ConnectionState::Connected);
        });
    }

    #[test]
    fn close_from_callback_does_not_deadlock() {
        let hub = FakeHub::start(echo_handler);
        let slot: Arc<Mutex<Option<Arc<Client>>>> = Arc::new(Mutex::new(None));
        let (done_tx, done_rx) = channel::<()>();
        let done_tx = Mutex::new(done_tx);

        let from_callback = Arc::clone(&slot);
        let config = fast_config(hub.path()).on_event(move |_| {
            if let Some(client) = lock(&from_callback).take() {
                client.close();
            }
            let _ = lock(&done_tx).send(());
        });
        let client = Arc::new(Client::connect(config).unwrap());
        *lock(&slot) = Some(Arc::clone(&client));
        hub.wait_for_connections(1);

        hub.broadcast(&Envelope::Event(EventBatch::single(1, 0, "X", Variant::Void)));
        done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn call_serialized_converts_parameters() {
        let hub = FakeHub::start(|_, _, params| HubReply::Value(Variant::Array(params.to_vec())));
        let client = Client::connect(fast_config(hub.path())).unwrap();

        let got = client
            .call_serialized("setSystemVariable", &("TEST", [1, 2]))
            .unwrap();
        assert_eq!(
            got,
            Variant::Array(vec![Variant::from("TEST"), Variant::array([1i64, 2])])
        );

        let got = client.call_serialized("getAllSystemVariables", &()).unwrap();
        assert_eq!(got, Variant::Array(vec![]));

        let err = client
            .call_serialized("setSystemVariable", &u64::MAX)
            .unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
        assert_eq!(client.pending_calls(), 0);
    }

    #[test]
    fn oversized_request_is_rejected_locally() {
        let hub = FakeHub::start(echo_handler);
        let client =
            Client::connect(fast_config(hub.path()).with_max_payload_size(64)).unwrap();

        let err = client
            .call("echo", vec![Variant::binary(vec![0u8; 128])])
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::TooLarge { .. })));
        assert!(client.is_connected());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn peer_credentials_name_the_hub_process() {
        let hub = FakeHub::start(echo_handler);
        let client = Client::connect(fast_config(hub.path())).unwrap();

        let creds = client.peer_credentials().unwrap();
        assert_eq!(creds.pid, std::process::id());
    }
}
