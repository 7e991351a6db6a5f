use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lifecycle of the link to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// `close()` was called and the connection is being torn down.
    Disconnecting,
    /// The reconnect budget is exhausted; the client will not connect again.
    Failed,
}

impl ConnectionState {
    pub const fn name(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Failed => "failed",
        }
    }

    /// No further transition will happen without outside action.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared connection state plus a stop flag, with a condvar for waiters.
///
/// The stop flag lives next to the state so that `close()` can wake a
/// supervisor sleeping between reconnect attempts.
pub(crate) struct StateCell {
    state: Mutex<ConnectionState>,
    changed: Condvar,
    stopping: AtomicBool,
}

impl StateCell {
    pub(crate) fn new(initial: ConnectionState) -> Self {
        Self {
            state: Mutex::new(initial),
            changed: Condvar::new(),
            stopping: AtomicBool::new(false),
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub(crate) fn set(&self, next: ConnectionState) {
        let mut state = lock(&self.state);
        if *state != next {
            tracing::debug!(from = %*state, to = %next, "connection state changed");
            *state = next;
        }
        self.changed.notify_all();
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Raise the stop flag. Returns `false` if it was already raised.
    pub(crate) fn stop(&self) -> bool {
        let _state = lock(&self.state);
        let first = !self.stopping.swap(true, Ordering::SeqCst);
        self.changed.notify_all();
        first
    }

    /// Wait until `pred` holds for the current state, or `timeout` passes.
    ///
    /// Returns the state observed last. A timeout too large to represent
    /// waits without a deadline.
    pub(crate) fn wait_until<F>(&self, timeout: Duration, mut pred: F) -> ConnectionState
    where
        F: FnMut(ConnectionState) -> bool,
    {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = lock(&self.state);
        loop {
            if pred(*state) {
                return *state;
            }
            let (next, expired) = self.wait(state, deadline);
            if expired {
                return *next;
            }
            state = next;
        }
    }

    /// Sleep for `duration` unless the stop flag is raised first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub(crate) fn sleep_unless_stopped(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut state = lock(&self.state);
        loop {
            if self.is_stopping() {
                return false;
            }
            let (next, expired) = self.wait(state, deadline);
            if expired {
                return true;
            }
            state = next;
        }
    }

    /// One condvar wait bounded by `deadline`. The flag is set, without
    /// waiting, once the deadline has passed.
    fn wait<'a>(
        &self,
        state: MutexGuard<'a, ConnectionState>,
        deadline: Option<Instant>,
    ) -> (MutexGuard<'a, ConnectionState>, bool) {
        let Some(deadline) = deadline else {
            let state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            return (state, false);
        };
        let now = Instant::now();
        if now >= deadline {
            return (state, true);
        }
        let state = self
            .changed
            .wait_timeout(state, deadline - now)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
        (state, false)
    }
}

/// Lock a mutex, recovering the guard if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
