//! Consent and execution steps of an `icrc49_call_canister` request.

use std::sync::Arc;

use icrc_agent::Agent;
use icrc_rpc::{CallCanisterParams, CallCanisterResult, IcrcLedgerCodec, SignerErrorCode};

use crate::builders::{fallback_builder, BuildContext, BuilderStrings};
use crate::consent::{
    ConsentInfo, ConsentMessageRequest, ConsentMessageSource, ResultConsentInfo,
    TokenMetadataSource,
};
use crate::error::SignerError;
use crate::notify::ReplyTo;
use crate::prompts::{
    CallCanisterPayload, CallCanisterPrompt, ConsentDecision, ConsentMessagePayload,
    ConsentMessagePrompt, Responder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentStatus {
    Approved,
    Rejected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallStatus {
    Success(CallCanisterResult),
    Error,
}

struct TokenFallback {
    metadata: Arc<dyn TokenMetadataSource>,
    codec: Arc<dyn IcrcLedgerCodec>,
}

pub struct SignerService {
    agent: Arc<Agent>,
    consent_source: Arc<dyn ConsentMessageSource>,
    fallback: Option<TokenFallback>,
    language: String,
    strings: BuilderStrings,
}

impl SignerService {
    pub fn new(agent: Arc<Agent>, consent_source: Arc<dyn ConsentMessageSource>) -> Self {
        Self {
            agent,
            consent_source,
            fallback: None,
            language: "en".to_string(),
            strings: BuilderStrings::default(),
        }
    }

    /// Enables locally built consent messages for ledger methods when the
    /// canister's own consent endpoint fails.
    pub fn with_fallback(
        mut self,
        metadata: Arc<dyn TokenMetadataSource>,
        codec: Arc<dyn IcrcLedgerCodec>,
    ) -> Self {
        self.fallback = Some(TokenFallback { metadata, codec });
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_strings(mut self, strings: BuilderStrings) -> Self {
        self.strings = strings;
        self
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub async fn assert_and_prompt_consent_message(
        &self,
        params: &CallCanisterParams,
        prompt: Option<&ConsentMessagePrompt>,
        reply: &ReplyTo,
    ) -> ConsentStatus {
        let owner = self.agent.sender();
        if params.sender.to_text() != owner.to_text() {
            log::debug!("signer(consent): sender {} is not the owner", params.sender);
            reply.error(SignerErrorCode::SenderNotAllowed);
            return ConsentStatus::Error;
        }
        let Some(prompt) = prompt else {
            reply.error(SignerErrorCode::PermissionsPromptNotRegistered);
            return ConsentStatus::Error;
        };
        let origin = reply.origin().to_string();

        prompt.prompt(ConsentMessagePayload::Loading { origin: origin.clone() });

        let request = ConsentMessageRequest::new(
            params.method.clone(),
            params.arg.as_slice().to_vec(),
            self.language.clone(),
        );
        let consent_info = match self.consent_source.consent_message(&params.canister_id, &request).await
        {
            Ok(Ok(info)) => ResultConsentInfo::Ok(info),
            Ok(Err(refusal)) => {
                let details = refusal.to_string();
                log::debug!("signer(consent): {} refused: {details}", params.canister_id);
                prompt.prompt(ConsentMessagePayload::Error {
                    origin,
                    details: Some(details.clone()),
                });
                reply.request_not_supported(details);
                return ConsentStatus::Error;
            }
            Err(err) => match self.fallback_consent_info(params).await {
                Some(info) => ResultConsentInfo::Warn {
                    canister_id: params.canister_id.clone(),
                    method: params.method.clone(),
                    arg: params.arg.clone(),
                    consent_info: info,
                },
                None => {
                    log::warn!("signer(consent): {} unavailable: {err}", params.canister_id);
                    prompt.prompt(ConsentMessagePayload::Error {
                        origin,
                        details: Some(err.message().to_string()),
                    });
                    reply.network_error(Some(err.message().to_string()));
                    return ConsentStatus::Error;
                }
            },
        };

        let (respond, decision) = Responder::channel();
        prompt.prompt(ConsentMessagePayload::Result { origin, consent_info, respond });

        match decision.wait().await {
            Some(ConsentDecision::Approve) => ConsentStatus::Approved,
            Some(ConsentDecision::Reject) | None => {
                reply.error(SignerErrorCode::ActionAborted);
                ConsentStatus::Rejected
            }
        }
    }

    async fn fallback_consent_info(&self, params: &CallCanisterParams) -> Option<ConsentInfo> {
        let builder = fallback_builder(&params.method)?;
        let fallback = self.fallback.as_ref()?;
        let owner = self.agent.sender();

        let token = match fallback.metadata.token_metadata(&params.canister_id).await {
            Ok(token) => token,
            Err(err) => {
                log::warn!("signer(consent): fallback for {} skipped: {err}", params.method);
                return None;
            }
        };
        let context = BuildContext {
            arg: params.arg.as_slice(),
            token: &token,
            owner: &owner,
            codec: fallback.codec.as_ref(),
            strings: &self.strings,
        };
        match builder(&context) {
            Ok(message) => Some(ConsentInfo::generic(message, self.language.clone())),
            Err(err) => {
                log::warn!("signer(consent): fallback for {} failed: {err}", params.method);
                None
            }
        }
    }

    pub async fn call_canister(
        &self,
        params: &CallCanisterParams,
        prompt: Option<&CallCanisterPrompt>,
        reply: &ReplyTo,
    ) -> CallStatus {
        let origin = reply.origin().to_string();
        if let Some(prompt) = prompt {
            prompt.prompt(CallCanisterPayload::Executing { origin: origin.clone() });
        }

        match self.agent.call(params).await {
            Ok(outcome) => {
                let result = outcome.to_result();
                reply.call_result(&result);
                if let Some(prompt) = prompt {
                    prompt.prompt(CallCanisterPayload::Result { origin, result: result.clone() });
                }
                CallStatus::Success(result)
            }
            Err(err) => {
                log::warn!("signer(call): {}.{} failed: {err}", params.canister_id, params.method);
                let details = err.to_string();
                if let Some(prompt) = prompt {
                    prompt.prompt(CallCanisterPayload::Error {
                        origin,
                        details: Some(details.clone()),
                    });
                }
                reply.network_error(Some(details));
                CallStatus::Error
            }
        }
    }
}
