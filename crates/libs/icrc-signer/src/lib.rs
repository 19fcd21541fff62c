//! Wallet side of the ICRC signer protocol.
//!
//! A [`Signer`] listens on the wallet window, binds to the first relying
//! party that asks for its status and answers permission, account and call
//! requests through prompts the wallet UI registers. Grants are kept per
//! (origin, owner) in a [`SessionStore`] over any [`KeyValueStore`].
//!
//! Calls go through [`SignerService`]: the owner must be the sender, the
//! target canister's ICRC-21 consent message is shown (or, for ledger
//! methods, one built locally by [`builders`]) and only an approved call is
//! signed and executed by the certificate-checking agent.

pub mod builders;
pub mod config;
pub mod consent;
pub mod error;
pub mod notify;
pub mod prompts;
pub mod service;
pub mod sessions;
pub mod signer;
pub mod store;

#[cfg(test)]
mod test_support;

pub use builders::{
    build_icrc1_transfer, build_icrc2_approve, build_icrc2_transfer_from, decode_memo,
    fallback_builder, format_amount, format_date, BuildContext, BuilderStrings, FallbackBuilder,
    MAX_ARG_BYTES,
};
pub use config::SignerConfig;
pub use consent::{
    AgentCanisterApi, ConsentInfo, ConsentMessage, ConsentMessageRequest, ConsentMessageResponse,
    ConsentMessageSource, Icrc21Codec, Icrc21Error, ResultConsentInfo, TokenMetadataSource,
};
pub use error::{SignerError, StoreError};
pub use notify::ReplyTo;
pub use prompts::{
    AccountsDecision, AccountsPromptPayload, CallCanisterPayload, ConsentDecision,
    ConsentMessagePayload, PermissionsPromptPayload, Prompt, Responder,
};
pub use service::{CallStatus, ConsentStatus, SignerService};
pub use sessions::{SessionPermissions, SessionStore, StoredScope, DEFAULT_SESSION_VALIDITY};
pub use signer::{Signer, SignerBuilder};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
