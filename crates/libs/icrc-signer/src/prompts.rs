//! Prompt capabilities the wallet UI registers with the signer.
//!
//! A prompt is a plain function from payload to nothing. Payloads that need a
//! decision carry a [`Responder`]; dropping it unanswered counts as a
//! rejection.

use std::sync::Arc;

use icrc_rpc::{CallCanisterResult, IcrcAccount, Scope};
use tokio::sync::oneshot;

use crate::consent::ResultConsentInfo;

pub trait Prompt<P>: Send + Sync {
    fn prompt(&self, payload: P);
}

impl<P, F> Prompt<P> for F
where
    F: Fn(P) + Send + Sync,
{
    fn prompt(&self, payload: P) {
        self(payload)
    }
}

#[derive(Debug)]
pub struct Responder<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Responder<T> {
    pub fn channel() -> (Self, Decision<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, Decision { rx })
    }

    pub fn respond(self, value: T) {
        if self.tx.send(value).is_err() {
            log::debug!("signer(prompt): decision arrived after the request was dropped");
        }
    }
}

#[derive(Debug)]
pub struct Decision<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Decision<T> {
    /// `None` when the responder was dropped.
    pub async fn wait(self) -> Option<T> {
        self.rx.await.ok()
    }
}

#[derive(Debug)]
pub struct PermissionsPromptPayload {
    pub origin: String,
    pub requested_scopes: Vec<Scope>,
    /// Confirms all, a subset or none of the requested scopes. Skipped scopes
    /// keep their current state.
    pub confirm: Responder<Vec<Scope>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountsDecision {
    Approve(Vec<IcrcAccount>),
    Reject,
}

#[derive(Debug)]
pub struct AccountsPromptPayload {
    pub origin: String,
    pub respond: Responder<AccountsDecision>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentDecision {
    Approve,
    Reject,
}

#[derive(Debug)]
pub enum ConsentMessagePayload {
    Loading { origin: String },
    Result { origin: String, consent_info: ResultConsentInfo, respond: Responder<ConsentDecision> },
    Error { origin: String, details: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallCanisterPayload {
    Executing { origin: String },
    Result { origin: String, result: CallCanisterResult },
    Error { origin: String, details: Option<String> },
}

pub type PermissionsPrompt = Arc<dyn Prompt<PermissionsPromptPayload>>;
pub type AccountsPrompt = Arc<dyn Prompt<AccountsPromptPayload>>;
pub type ConsentMessagePrompt = Arc<dyn Prompt<ConsentMessagePayload>>;
pub type CallCanisterPrompt = Arc<dyn Prompt<CallCanisterPayload>>;

/// The prompts registered so far.
#[derive(Clone, Default)]
pub struct Prompts {
    pub permissions: Option<PermissionsPrompt>,
    pub accounts: Option<AccountsPrompt>,
    pub consent_message: Option<ConsentMessagePrompt>,
    pub call_canister: Option<CallCanisterPrompt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_responder_yields_no_decision() {
        let (responder, decision) = Responder::<ConsentDecision>::channel();
        drop(responder);
        assert_eq!(decision.wait().await, None);
    }

    #[tokio::test]
    async fn closures_are_prompts() {
        let prompt: ConsentMessagePrompt = Arc::new(|payload: ConsentMessagePayload| {
            if let ConsentMessagePayload::Result { respond, .. } = payload {
                respond.respond(ConsentDecision::Approve);
            }
        });
        prompt.prompt(ConsentMessagePayload::Loading { origin: "https://a.example".into() });
        let (respond, decision) = Responder::channel();
        prompt.prompt(ConsentMessagePayload::Result {
            origin: "https://a.example".into(),
            consent_info: ResultConsentInfo::Ok(crate::consent::ConsentInfo::generic("hi", "en")),
            respond,
        });
        assert_eq!(decision.wait().await, Some(ConsentDecision::Approve));
    }
}
