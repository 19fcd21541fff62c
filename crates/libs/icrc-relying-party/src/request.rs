//! One correlated request over the popup channel.
//!
//! Each request subscribes to the host's messages before posting, so
//! concurrent requests on the same popup each see every response and pick
//! out their own by id. The receiver and the deadline live in the request's
//! future: whichever way it settles, both go away with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use icrc_rpc::{IcrcMethod, MessageEvent, RpcId, RpcRequest, RpcResponse};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::RelyingPartyError;
use crate::window::{Popup, WindowHost};

pub type DisconnectCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Id to send instead of a generated one.
    pub request_id: Option<RpcId>,
    /// Overrides the operation's default deadline.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { request_id: None, timeout: Some(timeout) }
    }

    pub fn with_id(request_id: impl Into<RpcId>) -> Self {
        Self { request_id: Some(request_id.into()), timeout: None }
    }
}

/// Whether the popup should be brought forward before posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attention {
    Quiet,
    Focus,
}

/// The bound popup and the state every request checks first.
pub(crate) struct Connection {
    origin: String,
    popup: Arc<dyn Popup>,
    host: Arc<dyn WindowHost>,
    connected: AtomicBool,
    on_disconnect: Mutex<Option<DisconnectCallback>>,
}

impl Connection {
    pub(crate) fn new(origin: String, popup: Arc<dyn Popup>, host: Arc<dyn WindowHost>) -> Self {
        Self {
            origin,
            popup,
            host,
            connected: AtomicBool::new(true),
            on_disconnect: Mutex::new(None),
        }
    }

    pub(crate) fn origin(&self) -> &str {
        &self.origin
    }

    pub(crate) fn popup(&self) -> &Arc<dyn Popup> {
        &self.popup
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_on_disconnect(&self, callback: DisconnectCallback) {
        *self.on_disconnect.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    /// Flips to disconnected, closing the popup and running the callback.
    /// Only the first call has any effect.
    pub(crate) fn mark_disconnected(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        log::debug!("rp(connection): disconnected from {}", self.origin);
        self.popup.close();
        let callback = self.on_disconnect.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Sends `method` and waits for the response carrying the same id.
    ///
    /// `accept` sees the `result` of that response and returns `None` for a
    /// payload of the wrong shape, in which case the request keeps waiting.
    pub(crate) async fn request<T>(
        &self,
        method: IcrcMethod,
        params: Option<Value>,
        attention: Attention,
        options: &RequestOptions,
        default_timeout: Duration,
        accept: impl Fn(&Value) -> Option<T>,
    ) -> Result<T, RelyingPartyError> {
        if !self.is_connected() {
            return Err(RelyingPartyError::Disconnected);
        }
        if self.popup.is_closed() {
            return Err(RelyingPartyError::PopupClosed);
        }
        let timeout = options.timeout.unwrap_or(default_timeout);
        if timeout.is_zero() {
            return Err(RelyingPartyError::invalid_request_options("timeout must be positive"));
        }
        let id = options.request_id.clone().unwrap_or_else(RpcId::generate);

        let mut events = self.host.subscribe();
        let request = RpcRequest::new(id.clone(), method, params).to_value();
        if attention == Attention::Focus {
            self.popup.focus();
        }
        self.popup.post_message(request, &self.origin);
        log::trace!("rp(request): {} id={id}", method.as_str());

        match tokio::time::timeout(timeout, self.await_response(&mut events, &id, accept)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                log::debug!("rp(request): {} id={id} timed out", method.as_str());
                Err(RelyingPartyError::RequestTimeout { timeout_ms: timeout.as_millis() })
            }
        }
    }

    async fn await_response<T>(
        &self,
        events: &mut broadcast::Receiver<MessageEvent>,
        id: &RpcId,
        accept: impl Fn(&Value) -> Option<T>,
    ) -> Result<T, RelyingPartyError> {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    // The response may be among the dropped messages; the
                    // request then settles on its timeout.
                    log::warn!("rp(request): id={id} lagged, {skipped} messages dropped");
                    continue;
                }
                Err(RecvError::Closed) => return Err(RelyingPartyError::Disconnected),
            };
            let Some(response) = RpcResponse::from_value(&event.data) else {
                continue;
            };
            if event.source != Some(self.popup.id()) {
                return Err(RelyingPartyError::SourceMismatch);
            }
            if !event.origin.is_empty() && event.origin != self.origin {
                return Err(RelyingPartyError::OriginMismatch {
                    origin: event.origin,
                    expected: self.origin.clone(),
                });
            }
            if &response.id != id {
                continue;
            }
            if let Some(result) = response.result().and_then(&accept) {
                return Ok(result);
            }
            if let Some(error) = response.error() {
                return Err(error.clone().into());
            }
        }
    }
}
