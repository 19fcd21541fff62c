//! The signer's side of the channel: answers relying-party requests posted
//! to its window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use icrc_agent::Agent;
use icrc_rpc::{
    parse_params, CallCanisterParams, Clock, IcrcLedgerCodec, IcrcMethod, MessageEvent,
    MessageTarget, PermissionState, Principal, RequestPermissionsParams, RpcRequest, Scope,
    ScopedMethod, SignerErrorCode, SystemClock,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::config::SignerConfig;
use crate::consent::{ConsentMessageSource, TokenMetadataSource};
use crate::notify::ReplyTo;
use crate::prompts::{
    AccountsDecision, AccountsPromptPayload, CallCanisterPayload, ConsentMessagePayload,
    PermissionsPrompt, PermissionsPromptPayload, Prompt, Prompts, Responder,
};
use crate::service::{ConsentStatus, SignerService};
use crate::sessions::SessionStore;
use crate::store::{KeyValueStore, MemoryStore};

pub struct SignerBuilder {
    agent: Arc<Agent>,
    opener: Arc<dyn MessageTarget>,
    consent_source: Arc<dyn ConsentMessageSource>,
    fallback: Option<(Arc<dyn TokenMetadataSource>, Arc<dyn IcrcLedgerCodec>)>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: SignerConfig,
}

impl SignerBuilder {
    pub fn token_fallback(
        mut self,
        metadata: Arc<dyn TokenMetadataSource>,
        codec: Arc<dyn IcrcLedgerCodec>,
    ) -> Self {
        self.fallback = Some((metadata, codec));
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = store;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: SignerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Signer {
        let owner = self.agent.sender();
        let mut service = SignerService::new(self.agent, self.consent_source)
            .with_language(self.config.language.clone())
            .with_strings(self.config.strings.clone());
        if let Some((metadata, codec)) = self.fallback {
            service = service.with_fallback(metadata, codec);
        }
        if owner.is_anonymous() {
            log::warn!("signer(init): owner is anonymous, interactive requests will be refused");
        }
        Signer {
            inner: Arc::new(Inner {
                owner,
                opener: self.opener,
                sessions: SessionStore::new(self.store, self.clock),
                service,
                session_validity: self.config.session_validity,
                prompts: Mutex::new(Prompts::default()),
                relying_party_origin: Mutex::new(None),
                busy: AtomicBool::new(false),
                listener: Mutex::new(None),
            }),
        }
    }
}

struct Inner {
    owner: Principal,
    opener: Arc<dyn MessageTarget>,
    sessions: SessionStore,
    service: SignerService,
    session_validity: Duration,
    prompts: Mutex<Prompts>,
    relying_party_origin: Mutex<Option<String>>,
    busy: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the busy flag when the interactive request that set it finishes.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok().map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct Signer {
    inner: Arc<Inner>,
}

impl Signer {
    /// `opener` is the relying party's window; `agent` carries the owner
    /// identity every call is signed with.
    pub fn builder(
        agent: Arc<Agent>,
        opener: Arc<dyn MessageTarget>,
        consent_source: Arc<dyn ConsentMessageSource>,
    ) -> SignerBuilder {
        SignerBuilder {
            agent,
            opener,
            consent_source,
            fallback: None,
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(SystemClock),
            config: SignerConfig::default(),
        }
    }

    pub fn owner(&self) -> &Principal {
        &self.inner.owner
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    /// The origin bound by the first `icrc29_status`, if any.
    pub fn relying_party_origin(&self) -> Option<String> {
        self.inner.relying_party_origin.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn with_prompts(&self, update: impl FnOnce(&mut Prompts)) {
        update(&mut self.inner.prompts.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn prompts(&self) -> Prompts {
        self.inner.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn register_permissions_prompt(
        &self,
        prompt: impl Prompt<PermissionsPromptPayload> + 'static,
    ) {
        self.with_prompts(|prompts| prompts.permissions = Some(Arc::new(prompt)));
    }

    pub fn register_accounts_prompt(&self, prompt: impl Prompt<AccountsPromptPayload> + 'static) {
        self.with_prompts(|prompts| prompts.accounts = Some(Arc::new(prompt)));
    }

    pub fn register_consent_message_prompt(
        &self,
        prompt: impl Prompt<ConsentMessagePayload> + 'static,
    ) {
        self.with_prompts(|prompts| prompts.consent_message = Some(Arc::new(prompt)));
    }

    pub fn register_call_canister_prompt(
        &self,
        prompt: impl Prompt<CallCanisterPayload> + 'static,
    ) {
        self.with_prompts(|prompts| prompts.call_canister = Some(Arc::new(prompt)));
    }

    /// Handles every message delivered to the signer window. Requests are
    /// processed concurrently; interactive ones are refused with BUSY while
    /// another is in progress.
    pub fn listen(&self, mut events: broadcast::Receiver<MessageEvent>) {
        let signer = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let signer = signer.clone();
                        tokio::spawn(async move { signer.handle_message(event).await });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("signer(listen): {skipped} lagged messages dropped unanswered");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        let previous = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stops listening and forgets the bound relying-party origin.
    pub fn disconnect(&self) {
        if let Some(listener) =
            self.inner.listener.lock().unwrap_or_else(PoisonError::into_inner).take()
        {
            listener.abort();
        }
        *self.inner.relying_party_origin.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub async fn handle_message(&self, event: MessageEvent) {
        let Some(request) = RpcRequest::from_value(&event.data) else {
            log::trace!("signer(message): ignoring a non-request payload from {}", event.origin);
            return;
        };
        let reply = ReplyTo::new(request.id.clone(), event.origin.clone(), self.inner.opener.clone());
        let method = request.icrc_method();

        if !self.accept_origin(&event.origin, method == Some(IcrcMethod::Status)) {
            log::debug!("signer(message): {} refused from {}", request.method, event.origin);
            reply.error(SignerErrorCode::Origin);
            return;
        }

        log::debug!("signer(message): {} {}", request.id, request.method);
        match method {
            Some(IcrcMethod::Status) => reply.ready(),
            Some(IcrcMethod::SupportedStandards) => reply.supported_standards(),
            Some(IcrcMethod::Permissions) => reply.scopes(self.current_scopes(&event.origin)),
            Some(IcrcMethod::RequestPermissions) => self.request_permissions(&request, &reply).await,
            Some(IcrcMethod::Accounts) => self.accounts(&reply).await,
            Some(IcrcMethod::CallCanister) => self.call_canister(&request, &reply).await,
            Some(IcrcMethod::CallConsentMessage) | None => {
                reply.error(SignerErrorCode::RequestNotSupported)
            }
        }
    }

    fn accept_origin(&self, origin: &str, is_status: bool) -> bool {
        let mut bound = self.inner.relying_party_origin.lock().unwrap_or_else(PoisonError::into_inner);
        match bound.as_deref() {
            Some(expected) => expected == origin,
            None if is_status => {
                *bound = Some(origin.to_string());
                true
            }
            None => false,
        }
    }

    fn current_scopes(&self, origin: &str) -> Vec<Scope> {
        self.inner.sessions.current_scopes(origin, &self.inner.owner, self.inner.session_validity)
    }

    fn begin_interaction(&self, reply: &ReplyTo) -> Option<BusyGuard<'_>> {
        if self.inner.owner.is_anonymous() {
            reply.error(SignerErrorCode::NotInitialized);
            return None;
        }
        let guard = BusyGuard::acquire(&self.inner.busy);
        if guard.is_none() {
            reply.error(SignerErrorCode::Busy);
        }
        guard
    }

    /// Shows the permissions prompt and returns the confirmed subset of
    /// `requested`. A dropped responder confirms nothing.
    async fn ask_permissions(
        &self,
        prompt: &PermissionsPrompt,
        origin: &str,
        requested: Vec<Scope>,
    ) -> Vec<Scope> {
        let methods: Vec<ScopedMethod> = requested.iter().map(Scope::method).collect();
        let (confirm, decision) = Responder::channel();
        prompt.prompt(PermissionsPromptPayload {
            origin: origin.to_string(),
            requested_scopes: requested,
            confirm,
        });
        let mut confirmed = decision.wait().await.unwrap_or_default();
        confirmed.retain(|scope| methods.contains(&scope.method()));
        confirmed
    }

    async fn request_permissions(&self, request: &RpcRequest, reply: &ReplyTo) {
        let params: RequestPermissionsParams =
            match parse_params(&request.method, request.params.as_ref()) {
                Ok(params) => params,
                Err(err) => return reply.invalid_params(err.to_string()),
            };
        let Some(_guard) = self.begin_interaction(reply) else { return };

        let methods = params.scoped_methods();
        if !methods.is_empty() {
            let Some(prompt) = self.prompts().permissions else {
                return reply.error(SignerErrorCode::PermissionsPromptNotRegistered);
            };
            let requested =
                methods.into_iter().map(|method| Scope::new(method, PermissionState::AskOnUse)).collect();
            let confirmed = self.ask_permissions(&prompt, reply.origin(), requested).await;
            self.inner.sessions.save(reply.origin(), &self.inner.owner, &confirmed);
        }
        reply.scopes(self.current_scopes(reply.origin()));
    }

    /// Checks the session grant for `method`, prompting once when it is
    /// still `ask_on_use`. Replies with the error itself when refused.
    async fn assert_permission(&self, method: ScopedMethod, reply: &ReplyTo) -> bool {
        let state = self.inner.sessions.scope_state(
            reply.origin(),
            &self.inner.owner,
            method.as_str(),
            self.inner.session_validity,
        );
        match state {
            PermissionState::Granted => true,
            PermissionState::Denied => {
                reply.error(SignerErrorCode::PermissionNotGranted);
                false
            }
            PermissionState::AskOnUse => {
                let Some(prompt) = self.prompts().permissions else {
                    reply.error(SignerErrorCode::PermissionsPromptNotRegistered);
                    return false;
                };
                let confirmed = self
                    .ask_permissions(
                        &prompt,
                        reply.origin(),
                        vec![Scope::new(method, PermissionState::AskOnUse)],
                    )
                    .await;
                self.inner.sessions.save(reply.origin(), &self.inner.owner, &confirmed);
                let granted = confirmed.iter().any(|scope| scope.method() == method && scope.is_granted());
                if !granted {
                    reply.error(SignerErrorCode::PermissionNotGranted);
                }
                granted
            }
        }
    }

    async fn accounts(&self, reply: &ReplyTo) {
        let Some(_guard) = self.begin_interaction(reply) else { return };
        if !self.assert_permission(ScopedMethod::Accounts, reply).await {
            return;
        }
        let Some(prompt) = self.prompts().accounts else {
            return reply.error(SignerErrorCode::PermissionsPromptNotRegistered);
        };
        let (respond, decision) = Responder::channel();
        prompt.prompt(AccountsPromptPayload { origin: reply.origin().to_string(), respond });
        match decision.wait().await {
            Some(AccountsDecision::Approve(accounts)) if !accounts.is_empty() => reply.accounts(accounts),
            _ => reply.error(SignerErrorCode::ActionAborted),
        }
    }

    async fn call_canister(&self, request: &RpcRequest, reply: &ReplyTo) {
        let params: CallCanisterParams =
            match parse_params(&request.method, request.params.as_ref()) {
                Ok(params) => params,
                Err(err) => return reply.invalid_params(err.to_string()),
            };
        if let Err(err) = params.validate() {
            return reply.invalid_params(err.to_string());
        }
        let Some(_guard) = self.begin_interaction(reply) else { return };
        if !self.assert_permission(ScopedMethod::CallCanister, reply).await {
            return;
        }

        let prompts = self.prompts();
        let consent = self
            .inner
            .service
            .assert_and_prompt_consent_message(&params, prompts.consent_message.as_ref(), reply)
            .await;
        if consent != ConsentStatus::Approved {
            return;
        }
        self.inner.service.call_canister(&params, prompts.call_canister.as_ref(), reply).await;
    }
}

#[cfg(test)]
mod tests;
