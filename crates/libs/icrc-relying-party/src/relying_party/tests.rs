use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use icrc_agent::{encode_call_content, AgentError, CallAssertionError, CallContent};
use icrc_rpc::{
    Blob, CallCanisterParams, CallCanisterResult, IcrcAccount, IcrcMethod, MessageEvent,
    MessageTarget, PermissionState, Principal, RpcId, RpcRequest, RpcResponse, RpcResponseError,
    Scope, ScopedMethod, WindowId,
};
use serde_json::{json, Value};

use super::*;
use crate::memory::MemoryHost;
use crate::window::Popup;

const DAPP: &str = "https://dapp.example";
const WALLET_URL: &str = "https://wallet.example/sign";
const WALLET: &str = "https://wallet.example";

enum Reply {
    Result(Value),
    Error(i64, &'static str),
    After(Duration, Value),
    Silent,
    /// Delivered to the relying-party window as is.
    Forge(MessageEvent),
}

type Script = Arc<dyn Fn(&RpcRequest, WindowId) -> Reply + Send + Sync>;

/// Answers requests posted to the popup according to `script`.
struct FakeSigner {
    requests: Arc<Mutex<Vec<RpcRequest>>>,
}

impl FakeSigner {
    fn install(
        host: &Arc<MemoryHost>,
        script: impl Fn(&RpcRequest, WindowId) -> Reply + Send + Sync + 'static,
    ) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let script: Script = Arc::new(script);
        let seen = requests.clone();
        let weak: Weak<MemoryHost> = Arc::downgrade(host);
        host.on_open(move |opened| {
            let mut inbox = opened.window.subscribe();
            let popup_id = opened.window.id();
            let opener = opened.opener;
            let script = script.clone();
            let seen = seen.clone();
            let weak = weak.clone();
            tokio::spawn(async move {
                while let Ok(event) = inbox.recv().await {
                    let Some(request) = RpcRequest::from_value(&event.data) else {
                        continue;
                    };
                    seen.lock().expect("requests").push(request.clone());
                    match script(&request, popup_id) {
                        Reply::Result(result) => opener
                            .post_message(RpcResponse::success(request.id, result).to_value(), DAPP),
                        Reply::Error(code, message) => opener.post_message(
                            RpcResponse::failure(request.id, RpcResponseError::new(code, message))
                                .to_value(),
                            DAPP,
                        ),
                        Reply::After(delay, result) => {
                            let opener = opener.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                opener.post_message(
                                    RpcResponse::success(request.id, result).to_value(),
                                    DAPP,
                                );
                            });
                        }
                        Reply::Silent => {}
                        Reply::Forge(forged) => {
                            if let Some(host) = weak.upgrade() {
                                host.deliver(forged);
                            }
                        }
                    }
                }
            });
        });
        Self { requests }
    }

    fn requests(&self) -> Vec<RpcRequest> {
        self.requests.lock().expect("requests").clone()
    }

    fn requests_for(&self, method: IcrcMethod) -> Vec<RpcRequest> {
        self.requests().into_iter().filter(|request| request.icrc_method() == Some(method)).collect()
    }
}

fn ready_or(request: &RpcRequest, otherwise: impl FnOnce() -> Reply) -> Reply {
    if request.icrc_method() == Some(IcrcMethod::Status) {
        Reply::Result(json!("ready"))
    } else {
        otherwise()
    }
}

fn scopes(scopes: &[(ScopedMethod, PermissionState)]) -> Value {
    let scopes: Vec<Scope> = scopes.iter().map(|(method, state)| Scope::new(*method, *state)).collect();
    json!({ "scopes": scopes })
}

fn host() -> Arc<MemoryHost> {
    Arc::new(MemoryHost::new(DAPP))
}

async fn connect(host: &Arc<MemoryHost>) -> RelyingParty {
    RelyingParty::connect(host.clone(), RelyingPartyConfig::new(WALLET_URL)).await.expect("connect")
}

fn ledger() -> Principal {
    Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, 2, 1, 1]).expect("principal")
}

fn call_params() -> CallCanisterParams {
    CallCanisterParams {
        canister_id: ledger(),
        sender: Principal::self_authenticating(&[1u8; 44]),
        method: "icrc1_transfer".into(),
        arg: Blob::new(b"DIDL\x00\x00".to_vec()),
        nonce: None,
    }
}

fn call_result_for(params: &CallCanisterParams) -> Value {
    let content_map =
        encode_call_content(&CallContent::from_params(params, 1_700_000_000_000_000_000)).expect("cbor");
    serde_json::to_value(CallCanisterResult {
        certificate: Blob::new(b"certificate".to_vec()),
        content_map: Blob::from(content_map),
    })
    .expect("result")
}

#[tokio::test]
async fn connect_waits_for_ready_and_binds_the_url_origin() {
    let host = host();
    let signer = FakeSigner::install(&host, |request, _| ready_or(request, || Reply::Silent));

    let rp = connect(&host).await;
    assert_eq!(rp.origin(), WALLET);
    assert!(rp.is_connected());
    assert!(!rp.popup().is_closed());
    assert!(!signer.requests_for(IcrcMethod::Status).is_empty());
    assert_eq!(host.opened().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_popup_times_out_and_is_closed() {
    let host = host();
    let signer = FakeSigner::install(&host, |_, _| Reply::Silent);
    let started = tokio::time::Instant::now();

    let err = RelyingParty::connect(host.clone(), RelyingPartyConfig::new(WALLET_URL))
        .await
        .err()
        .expect("timeout");
    assert!(matches!(err, RelyingPartyError::ConnectionTimeout));
    assert_eq!(err.to_string(), "Connection timeout. Unable to connect to the signer.");
    assert!(host.opened()[0].is_closed());
    assert!(started.elapsed() <= Duration::from_millis(120_000));
    assert!(started.elapsed() >= Duration::from_millis(119_000));

    let probes = signer.requests();
    assert!(probes.len() > 200);
    assert!(probes.iter().all(|probe| probe.icrc_method() == Some(IcrcMethod::Status)));
    assert_eq!(host.opened()[0].focus_count(), 0);
}

#[tokio::test]
async fn ready_from_another_origin_fails_the_handshake() {
    let host = host();
    let weak = Arc::downgrade(&host);
    host.on_open(move |opened| {
        if let Some(host) = weak.upgrade() {
            host.deliver(MessageEvent {
                origin: "https://evil.example".into(),
                source: Some(opened.window.id()),
                data: RpcResponse::success("probe".into(), json!("ready")).to_value(),
            });
        }
    });

    let err = RelyingParty::connect(host.clone(), RelyingPartyConfig::new(WALLET_URL))
        .await
        .err()
        .expect("origin mismatch");
    assert_eq!(
        err.to_string(),
        "The response origin https://evil.example does not match the requested signer URL https://wallet.example/sign."
    );
    assert!(host.opened()[0].is_closed());
}

#[tokio::test]
async fn same_window_artifacts_without_origin_are_tolerated() {
    let host = host();
    let weak = Arc::downgrade(&host);
    host.on_open(move |opened| {
        if let Some(host) = weak.upgrade() {
            host.deliver(MessageEvent { origin: String::new(), source: None, data: json!("noise") });
            host.deliver(MessageEvent {
                origin: String::new(),
                source: Some(opened.window.id()),
                data: RpcResponse::success("probe".into(), json!("ready")).to_value(),
            });
        }
    });

    let rp = connect(&host).await;
    assert_eq!(rp.origin(), WALLET);
}

#[tokio::test]
async fn invalid_options_and_blocked_popups_fail_before_probing() {
    let host = host();
    let err = RelyingParty::connect(host.clone(), RelyingPartyConfig::new("wallet.example"))
        .await
        .err()
        .expect("invalid url");
    assert!(matches!(err, RelyingPartyError::InvalidOptions { .. }));
    assert!(host.opened().is_empty());

    host.refuse_popups(true);
    let err = RelyingParty::connect(host.clone(), RelyingPartyConfig::new(WALLET_URL))
        .await
        .err()
        .expect("blocked");
    assert_eq!(err.to_string(), "Unable to open the signer window.");
}

#[tokio::test]
async fn passive_queries_do_not_focus_the_popup() {
    let host = host();
    let _signer = FakeSigner::install(&host, |request, _| {
        ready_or(request, || match request.icrc_method() {
            Some(IcrcMethod::SupportedStandards) => Reply::Result(json!({
                "supportedStandards": [{"name": "ICRC-25", "url": "https://github.com/dfinity/ICRC/blob/main/ICRCs/ICRC-25/ICRC-25.md"}]
            })),
            Some(IcrcMethod::Permissions) => {
                Reply::Result(scopes(&[(ScopedMethod::Accounts, PermissionState::Granted)]))
            }
            _ => Reply::Silent,
        })
    });
    let rp = connect(&host).await;

    let standards = rp.supported_standards(&RequestOptions::default()).await.expect("standards");
    assert_eq!(standards.len(), 1);
    assert_eq!(standards[0].name, "ICRC-25");

    let current = rp.permissions(&RequestOptions::default()).await.expect("permissions");
    assert_eq!(current, vec![Scope::new(ScopedMethod::Accounts, PermissionState::Granted)]);
    assert_eq!(host.opened()[0].focus_count(), 0);
}

#[tokio::test]
async fn request_permissions_defaults_to_every_scoped_method() {
    let host = host();
    let signer = FakeSigner::install(&host, |request, _| {
        ready_or(request, || {
            Reply::Result(scopes(&[
                (ScopedMethod::Accounts, PermissionState::Granted),
                (ScopedMethod::CallCanister, PermissionState::Denied),
            ]))
        })
    });
    let rp = connect(&host).await;

    let granted = rp.request_permissions(None, &RequestOptions::default()).await.expect("scopes");
    assert_eq!(granted.len(), 2);
    let sent = signer.requests_for(IcrcMethod::RequestPermissions);
    assert_eq!(
        sent[0].params,
        Some(json!({"scopes": [{"method": "icrc27_accounts"}, {"method": "icrc49_call_canister"}]}))
    );
    assert_eq!(host.opened()[0].focus_count(), 1);
}

#[tokio::test]
async fn not_granted_permissions_are_requested_alone() {
    let host = host();
    let signer = FakeSigner::install(&host, |request, _| {
        ready_or(request, || match request.icrc_method() {
            Some(IcrcMethod::Permissions) => Reply::Result(scopes(&[
                (ScopedMethod::Accounts, PermissionState::Granted),
                (ScopedMethod::CallCanister, PermissionState::Denied),
            ])),
            Some(IcrcMethod::RequestPermissions) => Reply::Result(scopes(&[
                (ScopedMethod::Accounts, PermissionState::Granted),
                (ScopedMethod::CallCanister, PermissionState::Granted),
            ])),
            _ => Reply::Silent,
        })
    });
    let rp = connect(&host).await;

    let grant = rp.request_permissions_not_granted(&RequestOptions::default()).await.expect("grant");
    assert!(grant.all_granted);

    let sent = signer.requests_for(IcrcMethod::RequestPermissions);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].params, Some(json!({"scopes": [{"method": "icrc49_call_canister"}]})));
}

#[tokio::test]
async fn nothing_is_requested_when_everything_is_granted() {
    let host = host();
    let signer = FakeSigner::install(&host, |request, _| {
        ready_or(request, || {
            Reply::Result(scopes(&[
                (ScopedMethod::Accounts, PermissionState::Granted),
                (ScopedMethod::CallCanister, PermissionState::Granted),
            ]))
        })
    });
    let rp = connect(&host).await;

    let grant = rp.request_permissions_not_granted(&RequestOptions::default()).await.expect("grant");
    assert!(grant.all_granted);
    assert!(signer.requests_for(IcrcMethod::RequestPermissions).is_empty());
}

#[tokio::test]
async fn empty_permissions_are_an_error() {
    let host = host();
    let _signer =
        FakeSigner::install(&host, |request, _| ready_or(request, || Reply::Result(json!({"scopes": []}))));
    let rp = connect(&host).await;

    let err = rp.request_permissions_not_granted(&RequestOptions::default()).await.expect_err("empty");
    assert!(matches!(err, RelyingPartyError::NoPermissionData));
}

#[tokio::test]
async fn error_envelope_with_the_same_id_rejects_with_its_code() {
    let host = host();
    let _signer = FakeSigner::install(&host, |request, _| {
        ready_or(request, || {
            Reply::Error(3001, "The signer has canceled the action requested by the relying party.")
        })
    });
    let rp = connect(&host).await;

    let err = rp.accounts(&RequestOptions::default()).await.expect_err("aborted");
    assert_eq!(err.response_code(), Some(3001));
    assert_eq!(err.to_string(), "The signer has canceled the action requested by the relying party.");
}

#[tokio::test(start_paused = true)]
async fn responses_for_other_ids_are_ignored_until_the_deadline() {
    let host = host();
    let _signer = FakeSigner::install(&host, |request, popup| {
        ready_or(request, || {
            Reply::Forge(MessageEvent {
                origin: WALLET.into(),
                source: Some(popup),
                data: RpcResponse::failure("someone-else".into(), RpcResponseError::new(1000, "boom"))
                    .to_value(),
            })
        })
    });
    let rp = connect(&host).await;

    let err = rp.permissions(&RequestOptions::default()).await.expect_err("timeout");
    assert_eq!(err.to_string(), "Request to signer timed out after 5000 milliseconds.");
}

#[tokio::test]
async fn caller_supplied_ids_are_sent_verbatim() {
    let host = host();
    let signer = FakeSigner::install(&host, |request, _| {
        ready_or(request, || Reply::Result(scopes(&[(ScopedMethod::Accounts, PermissionState::Denied)])))
    });
    let rp = connect(&host).await;

    rp.permissions(&RequestOptions::with_id("my-request")).await.expect("permissions");
    assert_eq!(signer.requests_for(IcrcMethod::Permissions)[0].id, RpcId::from("my-request"));

    let err = rp
        .permissions(&RequestOptions::with_timeout(Duration::ZERO))
        .await
        .expect_err("zero timeout");
    assert!(matches!(err, RelyingPartyError::InvalidRequestOptions { .. }));
}

#[tokio::test]
async fn responses_from_another_window_are_rejected() {
    let host = host();
    let _signer = FakeSigner::install(&host, |request, _| {
        ready_or(request, || {
            Reply::Forge(MessageEvent {
                origin: WALLET.into(),
                source: Some(999),
                data: RpcResponse::success(request.id.clone(), json!({"scopes": []})).to_value(),
            })
        })
    });
    let rp = connect(&host).await;

    let err = rp.permissions(&RequestOptions::default()).await.expect_err("source");
    assert!(matches!(err, RelyingPartyError::SourceMismatch));
}

#[tokio::test]
async fn responses_from_another_origin_are_rejected() {
    let host = host();
    let _signer = FakeSigner::install(&host, |request, popup| {
        ready_or(request, || {
            Reply::Forge(MessageEvent {
                origin: "https://evil.example".into(),
                source: Some(popup),
                data: RpcResponse::success(request.id.clone(), json!({"scopes": []})).to_value(),
            })
        })
    });
    let rp = connect(&host).await;

    let err = rp.permissions(&RequestOptions::default()).await.expect_err("origin");
    assert_eq!(
        err.to_string(),
        "The response origin https://evil.example does not match the signer origin https://wallet.example."
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_resolve_independently() {
    let host = host();
    let owner = Principal::self_authenticating(&[1u8; 44]);
    let account = IcrcAccount::new(owner.clone());
    let accounts = json!({ "accounts": [account] });
    let _signer = FakeSigner::install(&host, move |request, _| {
        ready_or(request, || match request.icrc_method() {
            Some(IcrcMethod::Accounts) => Reply::After(Duration::from_millis(300), accounts.clone()),
            Some(IcrcMethod::Permissions) => {
                Reply::Result(scopes(&[(ScopedMethod::Accounts, PermissionState::Granted)]))
            }
            _ => Reply::Silent,
        })
    });
    let rp = connect(&host).await;

    let default = RequestOptions::default();
    let (listed, current) = tokio::join!(rp.accounts(&default), rp.permissions(&default));
    assert_eq!(listed.expect("accounts"), vec![IcrcAccount::new(owner)]);
    assert_eq!(current.expect("permissions").len(), 1);
}

#[tokio::test]
async fn call_returns_results_that_describe_the_request() {
    let host = host();
    let _signer = FakeSigner::install(&host, |request, _| {
        ready_or(request, || {
            let params: CallCanisterParams =
                serde_json::from_value(request.params.clone().expect("params")).expect("call params");
            Reply::Result(call_result_for(&params))
        })
    });
    let rp = connect(&host).await;

    let result = rp.call(&call_params(), &RequestOptions::default()).await.expect("call");
    assert_eq!(result.certificate.as_slice(), b"certificate");
}

#[tokio::test]
async fn call_result_for_another_canister_is_rejected() {
    let host = host();
    let _signer = FakeSigner::install(&host, |request, _| {
        ready_or(request, || {
            let mut substituted = call_params();
            substituted.canister_id = Principal::management();
            Reply::Result(call_result_for(&substituted))
        })
    });
    let rp = connect(&host).await;

    let err = rp.call(&call_params(), &RequestOptions::default()).await.expect_err("mismatch");
    assert!(matches!(
        err,
        RelyingPartyError::Agent(AgentError::CallAssertion(CallAssertionError::CanisterId))
    ));
    assert_eq!(err.to_string(), "The response canister ID does not match the requested canister ID.");
}

#[tokio::test]
async fn disconnect_closes_the_popup_and_refuses_requests() {
    let host = host();
    let _signer = FakeSigner::install(&host, |request, _| ready_or(request, || Reply::Silent));
    let rp = connect(&host).await;
    let notified = Arc::new(AtomicBool::new(false));
    let flag = notified.clone();
    rp.on_disconnect(move || flag.store(true, Ordering::SeqCst));

    rp.disconnect();
    assert!(!rp.is_connected());
    assert!(rp.popup().is_closed());
    assert!(notified.load(Ordering::SeqCst));

    let err = rp.permissions(&RequestOptions::default()).await.expect_err("disconnected");
    assert!(matches!(err, RelyingPartyError::Disconnected));
}

#[tokio::test]
async fn closed_popup_fails_requests_immediately() {
    let host = host();
    let _signer = FakeSigner::install(&host, |request, _| ready_or(request, || Reply::Silent));
    let rp = connect(&host).await;

    host.opened()[0].close();
    let err = rp.accounts(&RequestOptions::default()).await.expect_err("closed");
    assert!(err.is_connection_lost());
    assert!(matches!(err, RelyingPartyError::PopupClosed));
}

#[tokio::test(start_paused = true)]
async fn watchdog_disconnects_once_the_signer_stops_answering() {
    let host = host();
    let alive = Arc::new(AtomicBool::new(true));
    let answering = alive.clone();
    let _signer = FakeSigner::install(&host, move |request, _| {
        if answering.load(Ordering::SeqCst) {
            ready_or(request, || Reply::Silent)
        } else {
            Reply::Silent
        }
    });
    let rp = connect(&host).await;
    let notified = Arc::new(AtomicBool::new(false));
    let flag = notified.clone();
    rp.on_disconnect(move || flag.store(true, Ordering::SeqCst));

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert!(rp.is_connected());

    alive.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(7_000)).await;
    assert!(!rp.is_connected());
    assert!(rp.popup().is_closed());
    assert!(notified.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn watchdog_leaves_pending_requests_to_their_own_deadline() {
    let host = host();
    let alive = Arc::new(AtomicBool::new(true));
    let answering = alive.clone();
    let _signer = FakeSigner::install(&host, move |request, _| {
        if answering.load(Ordering::SeqCst) {
            ready_or(request, || Reply::Silent)
        } else {
            Reply::Silent
        }
    });
    let rp = connect(&host).await;
    alive.store(false, Ordering::SeqCst);
    let started = tokio::time::Instant::now();

    let err = rp.accounts(&RequestOptions::default()).await.expect_err("timeout");
    assert!(!rp.is_connected());
    assert_eq!(err.to_string(), "Request to signer timed out after 120000 milliseconds.");
    assert!(started.elapsed() >= Duration::from_millis(120_000));
}
