//! Delivery of hub events to user callbacks.
//!
//! Callbacks run on a dedicated `hgipc-events` thread fed through a bounded
//! channel, so a slow callback never delays the read loop that correlates
//! responses. Delivery order is arrival order. When the queue is full new
//! notices are dropped and counted.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Mutex;
use std::thread::{self, JoinHandle, ThreadId};

use hgipc_frame::{Event, EventBatch};
use tracing::{debug, error, trace, warn};

use crate::config::{ConnectCallback, EventCallback};
use crate::state::lock;

enum Notice {
    Event(Event),
    Connected,
}

pub(crate) struct EventSink {
    tx: Mutex<Option<SyncSender<Notice>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: Option<ThreadId>,
    wants_connect: bool,
    dropped: AtomicU64,
}

impl EventSink {
    /// Start the callback thread if there is anything to call.
    pub(crate) fn start(
        on_event: Option<EventCallback>,
        on_connect: Option<ConnectCallback>,
        depth: usize,
    ) -> std::io::Result<Self> {
        if on_event.is_none() && on_connect.is_none() {
            return Ok(Self {
                tx: Mutex::new(None),
                worker: Mutex::new(None),
                worker_id: None,
                wants_connect: false,
                dropped: AtomicU64::new(0),
            });
        }

        let wants_connect = on_connect.is_some();
        let (tx, rx) = mpsc::sync_channel::<Notice>(depth.max(1));
        let worker = thread::Builder::new()
            .name("hgipc-events".to_string())
            .spawn(move || {
                for notice in rx {
                    match notice {
                        Notice::Event(event) => {
                            if let Some(callback) = &on_event {
                                guarded("event", || callback(&event));
                            }
                        }
                        Notice::Connected => {
                            if let Some(callback) = &on_connect {
                                guarded("connect", || callback());
                            }
                        }
                    }
                }
                debug!("event thread finished");
            })?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker_id: Some(worker.thread().id()),
            worker: Mutex::new(Some(worker)),
            wants_connect,
            dropped: AtomicU64::new(0),
        })
    }

    /// Queue every variable change in `batch`, one callback each.
    pub(crate) fn dispatch(&self, batch: EventBatch) {
        let tx = lock(&self.tx);
        let Some(tx) = tx.as_ref() else {
            trace!(peer_id = batch.peer_id, "no event callback; dropping event");
            return;
        };
        for event in batch.into_events() {
            trace!(
                peer_id = event.peer_id,
                channel = event.channel,
                variable = %event.variable,
                "event"
            );
            match tx.try_send(Notice::Event(event)) {
                Ok(()) => {}
                Err(TrySendError::Full(Notice::Event(event))) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        peer_id = event.peer_id,
                        variable = %event.variable,
                        dropped,
                        "event queue full; dropping event"
                    );
                }
                Err(_) => return,
            }
        }
    }

    pub(crate) fn connected(&self) {
        if !self.wants_connect {
            return;
        }
        if let Some(tx) = lock(&self.tx).as_ref() {
            if let Err(TrySendError::Full(_)) = tx.try_send(Notice::Connected) {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "event queue full; dropping connect notice");
            }
        }
    }

    /// Notices dropped because the queue was full.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the caller is running inside a callback.
    pub(crate) fn on_worker_thread(&self) -> bool {
        self.worker_id == Some(thread::current().id())
    }

    /// Stop accepting notices, let queued ones drain, and join the thread.
    ///
    /// When called from a callback the thread is left to finish on its own.
    pub(crate) fn shutdown(&self) {
        lock(&self.tx).take();
        if self.on_worker_thread() {
            return;
        }
        if let Some(worker) = lock(&self.worker).take() {
            if worker.join().is_err() {
                error!("event thread panicked");
            }
        }
    }
}

fn guarded(kind: &str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        error!(
            callback = kind,
            panic = %panic_message(payload.as_ref()),
            "callback panicked; continuing"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
