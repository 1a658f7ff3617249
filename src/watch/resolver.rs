use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::constants::GET_NAME_OWNER;
use crate::constants::START_REPLY_ALREADY_RUNNING;
use crate::constants::START_REPLY_SUCCESS;
use crate::constants::START_SERVICE_BY_NAME;
use crate::constants::START_SERVICE_FLAGS;
use crate::BusConnection;
use crate::BusError;
use crate::BusName;
use crate::Error;
use crate::MethodCall;
use crate::Result;
use crate::Value;

/// Outcome of resolving who owns a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    Owned(String),
    Unowned,
}

/// Answers "who owns this name right now" through the directory service.
pub(crate) struct OwnerResolver {
    connection: Arc<dyn BusConnection>,
    name: BusName,
    timeout: Duration,
}

impl OwnerResolver {
    pub(crate) fn new(
        connection: Arc<dyn BusConnection>,
        name: BusName,
        timeout: Duration,
    ) -> Self {
        Self {
            connection,
            name,
            timeout,
        }
    }

    /// Resolves the current owner, asking the bus to activate a provider
    /// first when `auto_start` is set, and hands the outcome to `done`.
    ///
    /// `done` runs from the connection's reply dispatch, so it is ordered
    /// with the owner-change signals of the same connection. Never fails:
    /// every error is folded into [`Resolution::Unowned`].
    pub(crate) fn resolve<F>(
        self,
        auto_start: bool,
        done: F,
    ) where
        F: FnOnce(Resolution) + Send + 'static,
    {
        if auto_start {
            self.start_service(done);
        } else {
            self.get_name_owner(done);
        }
    }

    fn start_service<F>(
        self,
        done: F,
    ) where
        F: FnOnce(Resolution) + Send + 'static,
    {
        let call = MethodCall::directory(
            START_SERVICE_BY_NAME,
            vec![self.name.as_str().into(), START_SERVICE_FLAGS.into()],
            self.timeout,
        );
        let connection = self.connection.clone();
        connection.call(
            call,
            Box::new(move |reply| {
                match start_reply_code(reply) {
                    Ok(START_REPLY_SUCCESS) | Ok(START_REPLY_ALREADY_RUNNING) => {}
                    Ok(reply) => {
                        warn!(
                            name = %self.name,
                            reply,
                            "Unexpected reply {} from StartServiceByName() method", reply
                        );
                        done(Resolution::Unowned);
                        return;
                    }
                    Err(e) => {
                        // The name may still be owned without being activatable,
                        // e.g. ServiceUnknown for names no service file provides
                        debug!(name = %self.name, error = %e, "StartServiceByName() failed, checking owner anyway");
                    }
                }
                self.get_name_owner(done);
            }),
        );
    }

    fn get_name_owner<F>(
        self,
        done: F,
    ) where
        F: FnOnce(Resolution) + Send + 'static,
    {
        let call = MethodCall::directory(GET_NAME_OWNER, vec![self.name.as_str().into()], self.timeout);
        let connection = self.connection.clone();
        connection.call(call, Box::new(move |reply| done(self.owner_from_reply(reply))));
    }

    fn owner_from_reply(
        &self,
        reply: Result<Vec<Value>>,
    ) -> Resolution {
        match reply {
            Ok(reply) => match reply.first().and_then(Value::as_str) {
                Some(owner) if !owner.is_empty() => Resolution::Owned(owner.to_string()),
                _ => {
                    debug!(name = %self.name, ?reply, "GetNameOwner() returned no usable owner");
                    Resolution::Unowned
                }
            },
            Err(Error::Bus(e)) if e.is_name_has_no_owner() => {
                trace!(name = %self.name, "Name has no owner");
                Resolution::Unowned
            }
            Err(e) => {
                debug!(name = %self.name, error = %e, "GetNameOwner() failed");
                Resolution::Unowned
            }
        }
    }
}

fn start_reply_code(reply: Result<Vec<Value>>) -> Result<u32> {
    reply?.first().and_then(Value::as_u32).ok_or_else(|| {
        Error::Bus(BusError::MalformedReply {
            member: START_SERVICE_BY_NAME.to_string(),
        })
    })
}
