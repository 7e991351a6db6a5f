use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hgipc_frame::{Event, FrameConfig};

/// Socket the hub listens on in a default installation.
pub const DEFAULT_SOCKET_PATH: &str = "/var/lib/homegear/homegearIPC.sock";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Events queued for the callback thread before new ones are dropped.
pub const DEFAULT_EVENT_QUEUE_DEPTH: usize = 1024;

/// Called once per variable change, on the event thread.
pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Called after every successful connect, on the event thread.
pub type ConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// How long to wait between reconnect attempts, and for how many attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub interval: Duration,
    /// Upper bound for the backed-off delay.
    pub max_interval: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: f64,
    /// Consecutive failed attempts before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Never reconnect: the first lost connection is final.
    pub fn disabled() -> Self {
        Self {
            max_attempts: Some(0),
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = self.interval.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_interval.as_secs_f64() {
            return self.max_interval.max(self.interval);
        }
        Duration::from_secs_f64(secs)
    }

    /// Whether another attempt is allowed after `failed` consecutive failures.
    pub fn allows(&self, failed: u32) -> bool {
        self.max_attempts.map_or(true, |max| failed < max)
    }
}

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    pub socket_path: PathBuf,
    /// How long a single connect may wait for the hub to accept.
    pub connect_timeout: Duration,
    /// Timeout for calls made without an explicit one; `None` waits forever.
    pub call_timeout: Option<Duration>,
    /// A request write blocked longer than this fails and drops the connection.
    pub write_timeout: Duration,
    /// Frame size limit for both directions.
    pub max_payload_size: usize,
    pub reconnect: ReconnectPolicy,
    /// Capacity of the queue between the read loop and the event callback.
    pub event_queue_depth: usize,
    pub on_event: Option<EventCallback>,
    pub on_connect: Option<ConnectCallback>,
}

impl ClientConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_payload_size: FrameConfig::default().max_payload_size,
            reconnect: ReconnectPolicy::default(),
            event_queue_depth: DEFAULT_EVENT_QUEUE_DEPTH,
            on_event: None,
            on_connect: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Values below one are raised to one.
    pub fn with_event_queue_depth(mut self, depth: usize) -> Self {
        self.event_queue_depth = depth.max(1);
        self
    }

    /// Register the event callback, replacing any previous one.
    ///
    /// Events wait in a queue of `event_queue_depth` entries. While the
    /// callback is too slow to keep up and the queue is full, new events are
    /// dropped with a warning so the read loop keeps serving responses.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.on_event = Some(Arc::new(callback));
        self
    }

    pub fn on_connect<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(callback));
        self
    }

    pub(crate) fn reader_frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            read_timeout: None,
            write_timeout: None,
        }
    }

    pub(crate) fn writer_frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            read_timeout: None,
            write_timeout: Some(self.write_timeout),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SOCKET_PATH)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("socket_path", &self.socket_path)
            .field("connect_timeout", &self.connect_timeout)
            .field("call_timeout", &self.call_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("max_payload_size", &self.max_payload_size)
            .field("reconnect", &self.reconnect)
            .field("event_queue_depth", &self.event_queue_depth)
            .field("on_event", &self.on_event.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .finish()
    }
}
