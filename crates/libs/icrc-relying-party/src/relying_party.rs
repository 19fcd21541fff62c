//! The dapp's handle on a connected signer popup.

use std::sync::{Arc, Mutex, PoisonError};

use icrc_agent::assert_call_result;
use icrc_rpc::{
    parse_result, retries_for, retry_until_ready, AccountsResult, CallCanisterParams,
    CallCanisterResult, IcrcAccount, IcrcMethod, MessageEvent, ReadyState,
    RequestPermissionsParams, RetryOutcome, RpcId, RpcRequest, RpcResponse, Scope, ScopedMethod,
    ScopesResult, SupportedStandard, SupportedStandardsResult, ICRC29_STATUS_READY,
};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::config::RelyingPartyConfig;
use crate::error::RelyingPartyError;
use crate::request::{Attention, Connection, RequestOptions};
use crate::watchdog;
use crate::window::{Popup, WindowHost};

/// Outcome of [`RelyingParty::request_permissions_not_granted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionsGrant {
    pub all_granted: bool,
}

struct Inner {
    connection: Arc<Connection>,
    config: RelyingPartyConfig,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(watchdog) = self.watchdog.lock().unwrap_or_else(PoisonError::into_inner).take() {
            watchdog.abort();
        }
    }
}

#[derive(Clone)]
pub struct RelyingParty {
    inner: Arc<Inner>,
}

impl RelyingParty {
    /// Opens the signer popup and polls it with `icrc29_status` until it
    /// answers `ready`. The popup is closed again if that fails; on success
    /// the liveness watchdog starts.
    pub async fn connect(
        host: Arc<dyn WindowHost>,
        config: RelyingPartyConfig,
    ) -> Result<Self, RelyingPartyError> {
        let origin = config.validate()?;
        let features = config.window.features(host.geometry());

        let mut events = host.subscribe();
        let popup = host
            .open(&config.url, &config.window_name, features.as_deref())
            .ok_or(RelyingPartyError::PopupBlocked)?;
        log::debug!("rp(connect): opened {} as window {}", config.url, popup.id());

        if let Err(err) = handshake(&config, &origin, &popup, &mut events).await {
            log::debug!("rp(connect): {err}");
            popup.close();
            return Err(err);
        }
        drop(events);

        let connection = Arc::new(Connection::new(origin, popup, host));
        let watchdog = watchdog::spawn(Arc::downgrade(&connection), config.watchdog.clone());
        log::debug!("rp(connect): connected to {}", connection.origin());
        Ok(Self {
            inner: Arc::new(Inner { connection, config, watchdog: Mutex::new(Some(watchdog)) }),
        })
    }

    pub fn origin(&self) -> &str {
        self.inner.connection.origin()
    }

    pub fn popup(&self) -> &Arc<dyn Popup> {
        self.inner.connection.popup()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// Runs once, when the connection is lost or [`Self::disconnect`] is called.
    pub fn on_disconnect(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner.connection.set_on_disconnect(Box::new(callback));
    }

    /// Stops the watchdog and closes the popup. Later requests fail with
    /// [`RelyingPartyError::Disconnected`].
    pub fn disconnect(&self) {
        if let Some(watchdog) =
            self.inner.watchdog.lock().unwrap_or_else(PoisonError::into_inner).take()
        {
            watchdog.abort();
        }
        self.inner.connection.mark_disconnected();
    }

    pub async fn supported_standards(
        &self,
        options: &RequestOptions,
    ) -> Result<Vec<SupportedStandard>, RelyingPartyError> {
        self.inner
            .connection
            .request(
                IcrcMethod::SupportedStandards,
                None,
                Attention::Quiet,
                options,
                self.inner.config.timeouts.supported_standards,
                |result| {
                    parse_result::<SupportedStandardsResult>(result)
                        .map(|standards| standards.supported_standards)
                },
            )
            .await
    }

    /// Current permission states. Empty when nothing was ever requested or
    /// the session has expired.
    pub async fn permissions(
        &self,
        options: &RequestOptions,
    ) -> Result<Vec<Scope>, RelyingPartyError> {
        self.inner
            .connection
            .request(
                IcrcMethod::Permissions,
                None,
                Attention::Quiet,
                options,
                self.inner.config.timeouts.permissions,
                scopes,
            )
            .await
    }

    /// Asks the user to grant `params`, every scoped method when `None`.
    pub async fn request_permissions(
        &self,
        params: Option<RequestPermissionsParams>,
        options: &RequestOptions,
    ) -> Result<Vec<Scope>, RelyingPartyError> {
        let params =
            params.unwrap_or_else(|| RequestPermissionsParams::for_methods(ScopedMethod::ALL));
        self.inner
            .connection
            .request(
                IcrcMethod::RequestPermissions,
                Some(to_value(&params)?),
                Attention::Focus,
                options,
                self.inner.config.timeouts.request_permissions,
                scopes,
            )
            .await
    }

    /// Requests only the scoped methods that are not granted yet.
    pub async fn request_permissions_not_granted(
        &self,
        options: &RequestOptions,
    ) -> Result<PermissionsGrant, RelyingPartyError> {
        let current = self.permissions(&RequestOptions::default()).await?;
        if current.is_empty() {
            return Err(RelyingPartyError::NoPermissionData);
        }
        let missing: Vec<ScopedMethod> =
            current.iter().filter(|scope| !scope.is_granted()).map(Scope::method).collect();
        if missing.is_empty() {
            return Ok(PermissionsGrant { all_granted: true });
        }
        let scopes = self
            .request_permissions(Some(RequestPermissionsParams::for_methods(missing)), options)
            .await?;
        Ok(PermissionsGrant { all_granted: scopes.iter().all(Scope::is_granted) })
    }

    pub async fn accounts(
        &self,
        options: &RequestOptions,
    ) -> Result<Vec<IcrcAccount>, RelyingPartyError> {
        self.inner
            .connection
            .request(
                IcrcMethod::Accounts,
                None,
                Attention::Focus,
                options,
                self.inner.config.timeouts.accounts,
                |result| {
                    parse_result::<AccountsResult>(result)
                        .filter(|accounts| accounts.validate().is_ok())
                        .map(|accounts| accounts.accounts)
                },
            )
            .await
    }

    /// Has the signer execute `params`. The returned content map is checked
    /// against `params` before the result is handed back, so a signer cannot
    /// answer with a different call under the same id.
    pub async fn call(
        &self,
        params: &CallCanisterParams,
        options: &RequestOptions,
    ) -> Result<CallCanisterResult, RelyingPartyError> {
        let result = self
            .inner
            .connection
            .request(
                IcrcMethod::CallCanister,
                Some(to_value(params)?),
                Attention::Focus,
                options,
                self.inner.config.timeouts.call,
                parse_result::<CallCanisterResult>,
            )
            .await?;
        assert_call_result(params, &result)?;
        Ok(result)
    }
}

fn scopes(result: &Value) -> Option<Vec<Scope>> {
    parse_result::<ScopesResult>(result).map(|result| result.scopes)
}

fn to_value<T: serde::Serialize>(params: &T) -> Result<Value, RelyingPartyError> {
    serde_json::to_value(params).map_err(RelyingPartyError::invalid_request_options)
}

/// Probes the fresh popup until it reports `ready`, fails the origin check
/// or the connection timeout runs out.
async fn handshake(
    config: &RelyingPartyConfig,
    origin: &str,
    popup: &Arc<dyn Popup>,
    events: &mut broadcast::Receiver<MessageEvent>,
) -> Result<(), RelyingPartyError> {
    let probe = RpcRequest::new(RpcId::generate(), IcrcMethod::Status, None).to_value();
    let mut outcome: Option<Result<(), RelyingPartyError>> = None;

    let retried = retry_until_ready(
        retries_for(config.connection.timeout, config.connection.polling_interval),
        || {
            while outcome.is_none() {
                match events.try_recv() {
                    Ok(event) => outcome = inspect_handshake(&event, config, origin, popup),
                    Err(TryRecvError::Lagged(skipped)) => {
                        log::debug!("rp(connect): skipped {skipped} lagged messages");
                    }
                    Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                }
            }
            match outcome {
                None => ReadyState::Pending,
                Some(Ok(())) => ReadyState::Ready,
                Some(Err(_)) => ReadyState::Error,
            }
        },
        || popup.post_message(probe.clone(), "*"),
        config.connection.polling_interval,
    )
    .await;

    match (retried, outcome) {
        (RetryOutcome::Timeout, _) | (_, None) => Err(RelyingPartyError::ConnectionTimeout),
        (_, Some(outcome)) => outcome,
    }
}

fn inspect_handshake(
    event: &MessageEvent,
    config: &RelyingPartyConfig,
    origin: &str,
    popup: &Arc<dyn Popup>,
) -> Option<Result<(), RelyingPartyError>> {
    let response = RpcResponse::from_value(&event.data)?;
    if event.source.is_some_and(|source| source != popup.id()) {
        log::trace!("rp(connect): ignoring a response from window {:?}", event.source);
        return None;
    }
    // Probes posted with "*" may echo back without an origin.
    if !event.origin.is_empty() && event.origin != origin {
        return Some(Err(RelyingPartyError::ConnectOriginMismatch {
            origin: event.origin.clone(),
            url: config.url.clone(),
        }));
    }
    (response.result().and_then(Value::as_str) == Some(ICRC29_STATUS_READY)).then_some(Ok(()))
}

#[cfg(test)]
mod tests;
