//! Checks a relying party runs on a call result it got back from the signer.

use std::time::Duration;

use icrc_rpc::{CallCanisterParams, CallCanisterResult};

use crate::agent::{request_status, RequestStatus};
use crate::certificate::{Certificate, RootKey};
use crate::content_map::{decode_call_content, CallContent};
use crate::error::{AgentError, CallAssertionError};
use crate::request_id::RequestId;

/// Asserts the replayed content map describes exactly the requested call.
pub fn assert_call_request(
    params: &CallCanisterParams,
    content: &CallContent,
) -> Result<(), CallAssertionError> {
    if content.canister_id != params.canister_id.as_slice() {
        return Err(CallAssertionError::CanisterId);
    }
    if content.method_name != params.method {
        return Err(CallAssertionError::Method);
    }
    if content.arg != params.arg.as_slice() {
        return Err(CallAssertionError::Arg);
    }
    if content.sender != params.sender.as_slice() {
        return Err(CallAssertionError::Sender);
    }
    Ok(())
}

/// Decodes the content map of `result` and asserts it against `params`.
pub fn assert_call_result(
    params: &CallCanisterParams,
    result: &CallCanisterResult,
) -> Result<CallContent, AgentError> {
    let content = decode_call_content(&result.content_map)?;
    assert_call_request(params, &content)?;
    Ok(content)
}

/// Re-verifies the certificate of a call result against the relying party's
/// own trusted root key and extracts the reply bytes.
pub fn decode_call_response(
    params: &CallCanisterParams,
    result: &CallCanisterResult,
    root_key: &RootKey,
    now_nanos: u64,
    max_skew: Duration,
) -> Result<Vec<u8>, AgentError> {
    let content = assert_call_result(params, result)?;
    let request_id = RequestId::of_call(&content);

    let certificate = Certificate::from_cbor(&result.certificate)?;
    certificate.verify(root_key, &params.canister_id)?;
    certificate.verify_time(now_nanos, max_skew)?;

    match request_status(&certificate, &request_id)? {
        RequestStatus::Replied(reply) => Ok(reply),
        RequestStatus::Pending(status) => Err(AgentError::InvalidStatus { status }),
    }
}
