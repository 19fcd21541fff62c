//! Certificate-verified calls against the ledger platform.
//!
//! The [`Agent`] signs a call, submits it through a [`Transport`] and only
//! hands back a reply once a [`Certificate`] signed by the trusted root key
//! says `replied`. Calls carrying a nonce reuse the first ingress expiry they
//! were given (see [`expiry`]) so resubmissions map to the same request id.
//!
//! [`HttpTransport`] is the production transport over the platform's HTTP
//! interface.
//!
//! The relying-party side of the same checks lives in [`response`].

pub mod agent;
pub mod certificate;
pub mod content_map;
pub mod error;
pub mod expiry;
pub mod hash_tree;
pub mod http;
pub mod identity;
pub mod polling;
pub mod request_id;
pub mod response;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use agent::{Agent, AgentBuilder, AgentConfig, CallOutcome};
pub use certificate::{Certificate, Delegation, RootKey};
pub use content_map::{decode_call_content, encode_call_content, CallContent};
pub use error::{AgentError, CallAssertionError, CertificateError};
pub use expiry::{call_hash, ExpiryCache};
pub use hash_tree::{HashTree, LookupResult};
pub use http::HttpTransport;
pub use identity::{AnonymousIdentity, Ed25519Identity, Identity};
pub use polling::PollStrategy;
pub use request_id::RequestId;
pub use response::{assert_call_request, assert_call_result, decode_call_response};
pub use transport::{SubmitResponse, Transport};
