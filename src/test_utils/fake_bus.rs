//! In-memory bus with a directory service, for tests.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use parking_lot::ReentrantMutex;
use tokio::sync::watch;

use crate::constants::ERROR_NAME_HAS_NO_OWNER;
use crate::constants::ERROR_SERVICE_UNKNOWN;
use crate::constants::GET_NAME_OWNER;
use crate::constants::NAME_OWNER_CHANGED;
use crate::constants::START_REPLY_ALREADY_RUNNING;
use crate::constants::START_REPLY_SUCCESS;
use crate::constants::START_SERVICE_BY_NAME;
use crate::BusConnection;
use crate::BusError;
use crate::BusProvider;
use crate::BusType;
use crate::ClosedHandler;
use crate::ClosedHandlerId;
use crate::MethodCall;
use crate::ReplyHandler;
use crate::Result;
use crate::Signal;
use crate::SignalHandler;
use crate::SignalRule;
use crate::SubscriptionId;
use crate::Value;

const ERROR_UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";

#[derive(Default)]
struct FakeState {
    owners: HashMap<String, String>,
    activatable: HashMap<String, String>,
    start_reply: Option<u32>,
    calls: Vec<MethodCall>,
    subscriptions: HashMap<u64, (SignalRule, SignalHandler)>,
    closed_handlers: HashMap<u64, ClosedHandler>,
    journal: Vec<String>,
    holding: bool,
    parked: Vec<(MethodCall, ReplyHandler)>,
}

/// A connection whose directory service is a pair of maps.
///
/// Owner changes made through the setters are broadcast as
/// `NameOwnerChanged` to matching subscriptions, synchronously on the
/// calling thread. Method calls are answered the same way unless replies are
/// held, which opens race windows between a reply and later signals.
///
/// Replies, signals and closed notifications are dispatched under one
/// reentrant lock, so handlers never overlap and run in emission order.
pub struct FakeConnection {
    dispatch: ReentrantMutex<()>,
    state: Mutex<FakeState>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl FakeConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            dispatch: ReentrantMutex::new(()),
            state: Mutex::new(FakeState::default()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    /// Sets the owner without broadcasting, for initial state.
    pub fn preset_owner(
        &self,
        name: &str,
        owner: &str,
    ) {
        self.state.lock().owners.insert(name.to_string(), owner.to_string());
    }

    /// Transfers `name` to `owner` and broadcasts the change.
    pub fn set_owner(
        &self,
        name: &str,
        owner: &str,
    ) {
        let _dispatch = self.dispatch.lock();
        let old = self
            .state
            .lock()
            .owners
            .insert(name.to_string(), owner.to_string())
            .unwrap_or_default();
        self.emit_owner_changed(name, &old, owner);
    }

    /// Drops the owner of `name` and broadcasts the change.
    pub fn release_name(
        &self,
        name: &str,
    ) {
        let _dispatch = self.dispatch.lock();
        let old = self.state.lock().owners.remove(name);
        if let Some(old) = old {
            self.emit_owner_changed(name, &old, "");
        }
    }

    /// `StartServiceByName` for `name` will start a service owning it as `owner`.
    pub fn make_activatable(
        &self,
        name: &str,
        owner: &str,
    ) {
        self.state.lock().activatable.insert(name.to_string(), owner.to_string());
    }

    /// Forces the reply code of every `StartServiceByName` call.
    pub fn set_start_reply(
        &self,
        code: u32,
    ) {
        self.state.lock().start_reply = Some(code);
    }

    pub fn emit_owner_changed(
        &self,
        name: &str,
        old_owner: &str,
        new_owner: &str,
    ) {
        self.emit(&Signal::directory(
            NAME_OWNER_CHANGED,
            vec![name.into(), old_owner.into(), new_owner.into()],
        ));
    }

    /// Delivers `signal` to every subscription whose rule matches.
    pub fn emit(
        &self,
        signal: &Signal,
    ) {
        let _dispatch = self.dispatch.lock();
        let handlers: Vec<SignalHandler> = self
            .state
            .lock()
            .subscriptions
            .values()
            .filter(|(rule, _)| rule.matches(signal))
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(signal);
        }
    }

    /// Marks the connection closed and runs the closed handlers.
    pub fn close(&self) {
        let _dispatch = self.dispatch.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let handlers: Vec<ClosedHandler> = self.state.lock().closed_handlers.values().cloned().collect();
        for handler in handlers {
            handler();
        }
    }

    /// Method calls are parked until [`FakeConnection::release_replies`].
    pub fn hold_replies(&self) {
        self.state.lock().holding = true;
    }

    /// Answers every parked call in arrival order, against the directory
    /// state at release time, and stops holding.
    pub fn release_replies(&self) {
        let _dispatch = self.dispatch.lock();
        let parked = {
            let mut state = self.state.lock();
            state.holding = false;
            std::mem::take(&mut state.parked)
        };
        for (call, on_reply) in parked {
            on_reply(self.answer(&call));
        }
    }

    /// Number of calls waiting for [`FakeConnection::release_replies`].
    pub fn parked_count(&self) -> usize {
        self.state.lock().parked.len()
    }

    /// Members of every method call received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.iter().map(|c| c.member.clone()).collect()
    }

    pub fn method_calls(&self) -> Vec<MethodCall> {
        self.state.lock().calls.clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    pub fn closed_handler_count(&self) -> usize {
        self.state.lock().closed_handlers.len()
    }

    /// Subscription bookkeeping operations, in order.
    pub fn journal(&self) -> Vec<String> {
        self.state.lock().journal.clone()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn answer(
        &self,
        call: &MethodCall,
    ) -> Result<Vec<Value>> {
        if self.is_closed() {
            return Err(BusError::Closed.into());
        }

        let name = call.args.first().and_then(Value::as_str).unwrap_or_default();
        match call.member.as_str() {
            START_SERVICE_BY_NAME => self.start_service(name),
            GET_NAME_OWNER => self.get_name_owner(name),
            other => Err(BusError::method_error(ERROR_UNKNOWN_METHOD, format!("No such method '{other}'")).into()),
        }
    }

    fn start_service(
        &self,
        name: &str,
    ) -> Result<Vec<Value>> {
        let (reply, started) = {
            let mut state = self.state.lock();
            if let Some(code) = state.start_reply {
                (code, None)
            } else if state.owners.contains_key(name) {
                (START_REPLY_ALREADY_RUNNING, None)
            } else if let Some(owner) = state.activatable.remove(name) {
                state.owners.insert(name.to_string(), owner.clone());
                (START_REPLY_SUCCESS, Some(owner))
            } else {
                return Err(BusError::method_error(
                    ERROR_SERVICE_UNKNOWN,
                    format!("The name {name} was not provided by any .service files"),
                )
                .into());
            }
        };

        if let Some(owner) = started {
            self.emit_owner_changed(name, "", &owner);
        }
        Ok(vec![Value::U32(reply)])
    }

    fn get_name_owner(
        &self,
        name: &str,
    ) -> Result<Vec<Value>> {
        match self.state.lock().owners.get(name) {
            Some(owner) => Ok(vec![Value::Str(owner.clone())]),
            None => Err(BusError::method_error(
                ERROR_NAME_HAS_NO_OWNER,
                format!("Could not get owner of name '{name}': no such name"),
            )
            .into()),
        }
    }
}

impl BusConnection for FakeConnection {
    fn call(
        &self,
        call: MethodCall,
        on_reply: ReplyHandler,
    ) {
        let _dispatch = self.dispatch.lock();
        {
            let mut state = self.state.lock();
            state.calls.push(call.clone());
            if state.holding {
                state.parked.push((call, on_reply));
                return;
            }
        }
        on_reply(self.answer(&call));
    }

    fn subscribe_signal(
        &self,
        rule: SignalRule,
        handler: SignalHandler,
    ) -> SubscriptionId {
        let id = self.next_id();
        let mut state = self.state.lock();
        state.subscriptions.insert(id, (rule, handler));
        state.journal.push(format!("subscribe_signal:{id}"));
        SubscriptionId(id)
    }

    fn unsubscribe_signal(
        &self,
        id: SubscriptionId,
    ) {
        let mut state = self.state.lock();
        state.subscriptions.remove(&id.0);
        state.journal.push(format!("unsubscribe_signal:{}", id.0));
    }

    fn connect_closed(
        &self,
        handler: ClosedHandler,
    ) -> ClosedHandlerId {
        let id = self.next_id();
        let mut state = self.state.lock();
        state.closed_handlers.insert(id, handler);
        state.journal.push(format!("connect_closed:{id}"));
        ClosedHandlerId(id)
    }

    fn disconnect_closed(
        &self,
        id: ClosedHandlerId,
    ) {
        let mut state = self.state.lock();
        state.closed_handlers.remove(&id.0);
        state.journal.push(format!("disconnect_closed:{}", id.0));
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Provider handing out one shared [`FakeConnection`].
pub struct FakeBus {
    connection: Arc<FakeConnection>,
    fail: AtomicBool,
    requests: AtomicUsize,
    held: watch::Sender<bool>,
}

impl FakeBus {
    pub fn new(connection: Arc<FakeConnection>) -> Arc<Self> {
        let (held, _) = watch::channel(false);
        Arc::new(Self {
            connection,
            fail: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
            held,
        })
    }

    pub fn connection(&self) -> &Arc<FakeConnection> {
        &self.connection
    }

    /// Subsequent `get` calls fail to connect.
    pub fn fail_connections(&self) {
        self.fail.store(true, Ordering::Release);
    }

    /// `get` calls wait until [`FakeBus::release_connections`].
    pub fn hold_connections(&self) {
        self.held.send_replace(true);
    }

    pub fn release_connections(&self) {
        self.held.send_replace(false);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Acquire)
    }
}

#[async_trait]
impl BusProvider for FakeBus {
    async fn get(
        &self,
        bus_type: BusType,
    ) -> Result<Arc<dyn BusConnection>> {
        self.requests.fetch_add(1, Ordering::AcqRel);

        let mut held = self.held.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        if self.fail.load(Ordering::Acquire) {
            return Err(BusError::ConnectFailed {
                bus_type,
                reason: "fake bus refuses connections".to_string(),
            }
            .into());
        }
        Ok(self.connection.clone())
    }
}
