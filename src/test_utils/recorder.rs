use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::BusConnection;
use crate::SchedulingContext;
use crate::WatchHandlers;

const NEXT_EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// One callback invocation as seen by the caller of a watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Appeared { name: String, owner: String },
    Vanished { name: String, connected: bool },
}

impl WatchEvent {
    pub fn appeared(
        name: &str,
        owner: &str,
    ) -> Self {
        WatchEvent::Appeared {
            name: name.to_string(),
            owner: owner.to_string(),
        }
    }

    pub fn vanished(
        name: &str,
        connected: bool,
    ) -> Self {
        WatchEvent::Vanished {
            name: name.to_string(),
            connected,
        }
    }
}

/// Records every callback of the watches whose handlers it built.
pub struct CallbackRecorder {
    history: Arc<Mutex<Vec<WatchEvent>>>,
    tx: mpsc::UnboundedSender<WatchEvent>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<WatchEvent>>,
}

impl CallbackRecorder {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            history: Arc::new(Mutex::new(Vec::new())),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Handlers recording both callbacks, delivered on the caller's default.
    pub fn handlers(&self) -> WatchHandlers {
        let (history, tx) = (self.history.clone(), self.tx.clone());
        let on_appeared = move |_: &Arc<dyn BusConnection>, name: &str, owner: &str| {
            let event = WatchEvent::appeared(name, owner);
            history.lock().push(event.clone());
            let _ = tx.send(event);
        };

        let (history, tx) = (self.history.clone(), self.tx.clone());
        let on_vanished = move |connection: Option<&Arc<dyn BusConnection>>, name: &str| {
            let event = WatchEvent::vanished(name, connection.is_some());
            history.lock().push(event.clone());
            let _ = tx.send(event);
        };

        WatchHandlers::new().on_appeared(on_appeared).on_vanished(on_vanished)
    }

    /// Like [`CallbackRecorder::handlers`], delivered on `context`.
    pub fn handlers_on(
        &self,
        context: Arc<dyn SchedulingContext>,
    ) -> WatchHandlers {
        self.handlers().deliver_on(context)
    }

    /// Every event recorded so far, in delivery order.
    pub fn events(&self) -> Vec<WatchEvent> {
        self.history.lock().clone()
    }

    /// Waits for the next event not yet returned by `next`.
    ///
    /// # Panics
    /// Panics when nothing arrives within five seconds.
    pub async fn next(&self) -> WatchEvent {
        let mut rx = self.rx.lock().await;
        match timeout(NEXT_EVENT_TIMEOUT, rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => unreachable!("recorder holds a sender"),
            Err(_) => panic!("no watch callback within {NEXT_EVENT_TIMEOUT:?}"),
        }
    }

    /// Asserts no further event arrives within `quiet`.
    pub async fn assert_quiet(
        &self,
        quiet: Duration,
    ) {
        let mut rx = self.rx.lock().await;
        if let Ok(Some(event)) = timeout(quiet, rx.recv()).await {
            panic!("unexpected watch callback: {event:?}");
        }
    }
}

impl Default for CallbackRecorder {
    fn default() -> Self {
        Self::new()
    }
}
