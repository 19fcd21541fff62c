//! [`Transport`] over the platform's HTTP interface.
//!
//! Envelopes are posted as CBOR to `/api/v3/canister/<id>/call` and
//! `/api/v2/canister/<id>/read_state`. ureq is blocking, so every request
//! runs on the tokio blocking pool.

use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use icrc_rpc::Principal;
use serde::Deserialize;
use serde_bytes::ByteBuf;

use crate::certificate::RootKey;
use crate::error::AgentError;
use crate::transport::{SubmitResponse, Transport};

const CONTENT_TYPE_CBOR: &str = "application/cbor";
const LOCAL_HOSTNAMES: [&str; 2] = ["localhost", "127.0.0.1"];

#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    local: bool,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct CallReply {
    status: String,
    #[serde(default)]
    certificate: Option<ByteBuf>,
    #[serde(default)]
    reject_code: Option<u64>,
    #[serde(default)]
    reject_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadStateReply {
    certificate: ByteBuf,
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    root_key: Option<ByteBuf>,
}

impl HttpTransport {
    pub fn new(host: &str) -> Result<Self, AgentError> {
        Self::new_with_timeouts(
            host,
            Duration::from_secs(5),
            Duration::from_secs(30),
            Duration::from_secs(30),
        )
    }

    /// Only `https` hosts are accepted, except for a local replica which may
    /// also be reached over plain `http`.
    pub fn new_with_timeouts(
        host: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self, AgentError> {
        let (base_url, local) = parse_host(host)?;
        Ok(Self {
            base_url,
            local,
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect_timeout)
                .timeout_read(read_timeout)
                .timeout_write(write_timeout)
                .build(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the host is a local replica whose root key must be fetched.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Reads the root key advertised by `/api/v2/status`. Only meaningful for
    /// a local replica; a production root key must be pinned instead.
    pub async fn fetch_root_key(&self) -> Result<RootKey, AgentError> {
        let url = format!("{}/api/v2/status", self.base_url);
        let agent = self.agent.clone();
        let body = blocking(move || {
            let response =
                agent.get(&url).call().map_err(|err| http_error("status request failed", &url, err))?;
            read_body(response)
        })
        .await?;
        let status: StatusReply = serde_cbor::from_slice(&body).map_err(AgentError::encoding)?;
        let root_key = status
            .root_key
            .ok_or_else(|| AgentError::transport("status response carries no root key"))?;
        Ok(RootKey::from_bytes(&root_key)?)
    }

    fn canister_url(&self, version: &str, canister_id: &Principal, endpoint: &str) -> String {
        format!("{}/api/{version}/canister/{}/{endpoint}", self.base_url, canister_id.to_text())
    }

    async fn post(&self, url: String, envelope: Vec<u8>) -> Result<(u16, Vec<u8>), AgentError> {
        let agent = self.agent.clone();
        blocking(move || {
            let response = agent
                .post(&url)
                .set("Content-Type", CONTENT_TYPE_CBOR)
                .send_bytes(&envelope)
                .map_err(|err| http_error("request failed", &url, err))?;
            let status = response.status();
            Ok((status, read_body(response)?))
        })
        .await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        canister_id: &Principal,
        envelope: Vec<u8>,
    ) -> Result<SubmitResponse, AgentError> {
        let url = self.canister_url("v3", canister_id, "call");
        let (status, body) = self.post(url, envelope).await?;
        decode_call_reply(status, &body)
    }

    async fn read_state(
        &self,
        canister_id: &Principal,
        envelope: Vec<u8>,
    ) -> Result<Vec<u8>, AgentError> {
        let url = self.canister_url("v2", canister_id, "read_state");
        let (_, body) = self.post(url, envelope).await?;
        decode_read_state(&body)
    }
}

fn parse_host(host: &str) -> Result<(String, bool), AgentError> {
    let trimmed = host.trim().trim_end_matches('/');
    let (scheme, rest) = trimmed
        .split_once("://")
        .ok_or_else(|| AgentError::transport(format!("host {host:?} has no scheme")))?;
    let authority = rest.split('/').next().unwrap_or_default();
    let hostname = match authority.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => authority,
    };
    if hostname.is_empty() {
        return Err(AgentError::transport(format!("host {host:?} has no hostname")));
    }
    let local = LOCAL_HOSTNAMES.contains(&hostname);
    match scheme {
        "https" => Ok((trimmed.to_string(), local)),
        "http" if local => Ok((trimmed.to_string(), local)),
        _ => Err(AgentError::transport(format!(
            "host {host:?} must use https unless it is a local replica"
        ))),
    }
}

pub(crate) fn decode_call_reply(status: u16, body: &[u8]) -> Result<SubmitResponse, AgentError> {
    if status == 202 && body.is_empty() {
        return Ok(SubmitResponse::Accepted);
    }
    let reply: CallReply = serde_cbor::from_slice(body).map_err(AgentError::encoding)?;
    match reply.status.as_str() {
        "replied" => {
            let certificate = reply
                .certificate
                .ok_or_else(|| AgentError::transport("replied call carries no certificate"))?;
            Ok(SubmitResponse::Certified { certificate: certificate.into_vec() })
        }
        "accepted" => Ok(SubmitResponse::Accepted),
        "rejected" | "non_replicated_rejection" => Ok(SubmitResponse::Rejected {
            reject_code: reply.reject_code.unwrap_or_default(),
            reject_message: reply.reject_message.unwrap_or_default(),
        }),
        other => Err(AgentError::InvalidStatus { status: other.to_string() }),
    }
}

pub(crate) fn decode_read_state(body: &[u8]) -> Result<Vec<u8>, AgentError> {
    let reply: ReadStateReply = serde_cbor::from_slice(body).map_err(AgentError::encoding)?;
    Ok(reply.certificate.into_vec())
}

async fn blocking<T, F>(task: F) -> Result<T, AgentError>
where
    F: FnOnce() -> Result<T, AgentError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| AgentError::transport(format!("http task join error: {err}")))?
}

fn read_body(response: ureq::Response) -> Result<Vec<u8>, AgentError> {
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|err| AgentError::transport(format!("failed to read response body: {err}")))?;
    Ok(bytes)
}

fn http_error(prefix: &str, url: &str, err: ureq::Error) -> AgentError {
    match err {
        ureq::Error::Status(code, response) => {
            let detail = response.into_string().unwrap_or_default();
            log::debug!("agent(http): {url} answered {code}: {detail}");
            AgentError::transport(format!("{prefix}: http status {code} from {url}"))
        }
        ureq::Error::Transport(transport) => AgentError::transport(format!("{prefix}: {transport}")),
    }
}
