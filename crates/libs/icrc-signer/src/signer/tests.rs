use super::*;
use crate::prompts::ConsentDecision;
use crate::test_support::*;
use icrc_agent::testing::ReplicaBehavior;
use icrc_agent::{decode_call_response, AnonymousIdentity};
use icrc_rpc::{parse_result, CallCanisterResult, IcrcAccount, RpcId, ScopesResult};
use serde_json::{json, Value};

const DAY_MS: u64 = 24 * 60 * 60 * 1_000;

struct Harness {
    fx: Fixture,
    outbox: Arc<Outbox>,
    source: Arc<StubConsentSource>,
    signer: Signer,
}

fn harness() -> Harness {
    let fx = fixture();
    let outbox = Arc::new(Outbox::default());
    let source = StubConsentSource::ok("Send 1.5 ICP");
    let signer = Signer::builder(fx.agent.clone(), outbox.clone(), source.clone())
        .clock(Arc::new(fx.clock.clone()))
        .build();
    Harness { fx, outbox, source, signer }
}

fn event_from(origin: &str, data: Value) -> MessageEvent {
    MessageEvent { origin: origin.to_string(), source: Some(1), data }
}

fn request(id: &str, method: IcrcMethod, params: Option<Value>) -> MessageEvent {
    event_from(ORIGIN, RpcRequest::new(RpcId::from(id), method, params).to_value())
}

impl Harness {
    async fn send(&self, event: MessageEvent) -> Value {
        let before = self.outbox.sent().len();
        self.signer.handle_message(event).await;
        let sent = self.outbox.sent();
        assert_eq!(sent.len(), before + 1, "expected exactly one reply");
        sent[before].0.clone()
    }

    async fn connect(&self) {
        let response = self.send(request("status", IcrcMethod::Status, None)).await;
        assert_eq!(response["result"], "ready");
    }

    fn grant(&self, method: ScopedMethod, state: PermissionState) {
        self.signer.sessions().save(ORIGIN, &self.fx.owner, &[Scope::new(method, state)]);
    }

    fn call_request(&self, id: &str) -> MessageEvent {
        let params = serde_json::to_value(transfer_params(&self.fx.owner)).expect("params");
        request(id, IcrcMethod::CallCanister, Some(params))
    }
}

#[tokio::test]
async fn first_status_binds_the_relying_party_origin() {
    let h = harness();
    let early = h.send(request("accounts", IcrcMethod::Accounts, None)).await;
    assert_eq!(early["error"]["code"], 500);

    h.connect().await;
    assert_eq!(h.signer.relying_party_origin().as_deref(), Some(ORIGIN));

    let foreign = event_from(
        "https://evil.example",
        RpcRequest::new(RpcId::from("x"), IcrcMethod::Status, None).to_value(),
    );
    let response = h.send(foreign).await;
    assert_eq!(response["error"]["code"], 500);
    assert_eq!(
        response["error"]["message"],
        "The relying party's origin is not allowed to interact with the signer."
    );
    assert_eq!(h.outbox.sent().last().map(|(_, origin)| origin.as_str()), Some("https://evil.example"));
}

#[tokio::test]
async fn foreign_payloads_are_ignored() {
    let h = harness();
    h.signer.handle_message(event_from(ORIGIN, json!({"hello": "world"}))).await;
    h.signer.handle_message(event_from(ORIGIN, json!({"jsonrpc": "2.0", "method": "icrc29_status"}))).await;
    assert!(h.outbox.sent().is_empty());
}

#[tokio::test]
async fn unknown_methods_are_not_supported() {
    let h = harness();
    h.connect().await;
    let response = h
        .send(event_from(ORIGIN, json!({"jsonrpc": "2.0", "id": 9, "method": "icrc99_whatever"})))
        .await;
    assert_eq!(response["id"], 9);
    assert_eq!(response["error"]["code"], 2000);
}

#[tokio::test]
async fn read_only_queries_are_always_answered() {
    let h = harness();
    h.connect().await;

    let standards = h.send(request("std", IcrcMethod::SupportedStandards, None)).await;
    assert_eq!(standards["result"]["supportedStandards"].as_array().map(Vec::len), Some(5));

    let permissions = h.send(request("perm", IcrcMethod::Permissions, None)).await;
    let scopes: ScopesResult = parse_result(&permissions["result"]).expect("scopes");
    assert_eq!(
        scopes.scopes,
        vec![
            Scope::new(ScopedMethod::Accounts, PermissionState::AskOnUse),
            Scope::new(ScopedMethod::CallCanister, PermissionState::AskOnUse),
        ]
    );
}

#[tokio::test]
async fn requested_permissions_are_prompted_and_persisted() {
    let h = harness();
    h.connect().await;
    h.signer.register_permissions_prompt(permissions_answering(PermissionState::Granted));

    let params = RequestPermissionsParams::for_methods([ScopedMethod::Accounts]);
    let response = h
        .send(request(
            "req",
            IcrcMethod::RequestPermissions,
            Some(serde_json::to_value(params).expect("params")),
        ))
        .await;

    let scopes: ScopesResult = parse_result(&response["result"]).expect("scopes");
    assert_eq!(
        scopes.scopes,
        vec![
            Scope::new(ScopedMethod::Accounts, PermissionState::Granted),
            Scope::new(ScopedMethod::CallCanister, PermissionState::AskOnUse),
        ]
    );
    assert_eq!(
        h.signer.sessions().scope_state(
            ORIGIN,
            &h.fx.owner,
            "icrc27_accounts",
            crate::sessions::DEFAULT_SESSION_VALIDITY
        ),
        PermissionState::Granted
    );
}

#[tokio::test]
async fn permission_requests_need_a_prompt_and_valid_params() {
    let h = harness();
    h.connect().await;

    let params = RequestPermissionsParams::for_methods([ScopedMethod::Accounts]);
    let response = h
        .send(request(
            "req",
            IcrcMethod::RequestPermissions,
            Some(serde_json::to_value(params).expect("params")),
        ))
        .await;
    assert_eq!(response["error"]["code"], 501);

    let response = h
        .send(request("bad", IcrcMethod::RequestPermissions, Some(json!({"scopes": "all"}))))
        .await;
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn denied_scope_refuses_accounts() {
    let h = harness();
    h.connect().await;
    h.grant(ScopedMethod::Accounts, PermissionState::Denied);

    let response = h.send(request("acc", IcrcMethod::Accounts, None)).await;
    assert_eq!(response["error"]["code"], 3000);
}

#[tokio::test]
async fn ask_on_use_prompts_once_then_lists_accounts() {
    let h = harness();
    h.connect().await;
    h.signer.register_permissions_prompt(permissions_answering(PermissionState::Granted));
    let owner = h.fx.owner.clone();
    h.signer.register_accounts_prompt(move |payload: AccountsPromptPayload| {
        payload.respond.respond(AccountsDecision::Approve(vec![IcrcAccount::new(owner.clone())]));
    });

    let response = h.send(request("acc", IcrcMethod::Accounts, None)).await;
    assert_eq!(response["result"]["accounts"][0]["owner"], h.fx.owner.to_text());
    assert_eq!(
        h.signer.sessions().current_scopes(ORIGIN, &h.fx.owner, crate::sessions::DEFAULT_SESSION_VALIDITY)[0],
        Scope::new(ScopedMethod::Accounts, PermissionState::Granted)
    );
}

#[tokio::test]
async fn refused_ask_on_use_is_remembered() {
    let h = harness();
    h.connect().await;
    h.signer.register_permissions_prompt(permissions_answering(PermissionState::Denied));

    let response = h.send(request("acc", IcrcMethod::Accounts, None)).await;
    assert_eq!(response["error"]["code"], 3000);
    h.signer.register_permissions_prompt(|_: PermissionsPromptPayload| panic!("asked twice"));
    let response = h.send(request("acc-2", IcrcMethod::Accounts, None)).await;
    assert_eq!(response["error"]["code"], 3000);
}

#[tokio::test]
async fn rejected_accounts_prompt_aborts() {
    let h = harness();
    h.connect().await;
    h.grant(ScopedMethod::Accounts, PermissionState::Granted);
    h.signer.register_accounts_prompt(|payload: AccountsPromptPayload| {
        payload.respond.respond(AccountsDecision::Reject);
    });

    let response = h.send(request("acc", IcrcMethod::Accounts, None)).await;
    assert_eq!(response["error"]["code"], 3001);
}

#[tokio::test]
async fn call_canister_runs_consent_then_the_certified_call() {
    let h = harness();
    h.connect().await;
    h.fx.replica.on("icrc1_transfer", ReplicaBehavior::Reply(br#"{"Ok":7}"#.to_vec()));
    h.signer.register_permissions_prompt(permissions_answering(PermissionState::Granted));
    let consent = ConsentRecorder::new(Answer::Approve);
    h.signer.register_consent_message_prompt(ConsentPrompt(consent.clone()));

    let response = h.send(h.call_request("call")).await;

    assert_eq!(consent.seen(), vec!["loading", "result"]);
    let result: CallCanisterResult = parse_result(&response["result"]).expect("call result");
    let reply = decode_call_response(
        &transfer_params(&h.fx.owner),
        &result,
        &h.fx.replica.root_key(),
        h.fx.clock.now_nanos(),
        Duration::from_secs(300),
    )
    .expect("verified by the relying party");
    assert_eq!(reply, br#"{"Ok":7}"#.to_vec());
}

/// Forwards to a shared recorder so the test keeps a handle on it.
struct ConsentPrompt(Arc<ConsentRecorder>);

impl Prompt<ConsentMessagePayload> for ConsentPrompt {
    fn prompt(&self, payload: ConsentMessagePayload) {
        self.0.prompt(payload)
    }
}

#[tokio::test]
async fn call_from_another_sender_is_refused_without_fetching_consent() {
    let h = harness();
    h.connect().await;
    h.grant(ScopedMethod::CallCanister, PermissionState::Granted);
    h.signer.register_consent_message_prompt(ConsentPrompt(ConsentRecorder::new(Answer::Approve)));

    let params = serde_json::to_value(transfer_params(&Principal::anonymous())).expect("params");
    let response = h.send(request("call", IcrcMethod::CallCanister, Some(params))).await;

    assert_eq!(response["error"]["code"], 502);
    assert_eq!(h.source.calls(), 0);
    assert!(h.fx.replica.calls().is_empty());
}

#[tokio::test]
async fn malformed_call_params_are_invalid() {
    let h = harness();
    h.connect().await;
    let response = h
        .send(request("call", IcrcMethod::CallCanister, Some(json!({"canisterId": "aaaaa-aa"}))))
        .await;
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn interactive_requests_are_serialized() {
    let h = harness();
    h.connect().await;
    h.fx.replica.on("icrc1_transfer", ReplicaBehavior::Reply(br#"{"Ok":1}"#.to_vec()));
    h.grant(ScopedMethod::CallCanister, PermissionState::Granted);
    let consent = ConsentRecorder::new(Answer::Hold);
    h.signer.register_consent_message_prompt(ConsentPrompt(consent.clone()));

    let signer = h.signer.clone();
    let first = h.call_request("first");
    let pending = tokio::spawn(async move { signer.handle_message(first).await });
    while consent.held.lock().expect("held").is_empty() {
        tokio::task::yield_now().await;
    }

    let busy = h.send(request("acc", IcrcMethod::Accounts, None)).await;
    assert_eq!(busy["error"]["code"], 503);
    let status = h.send(request("status-2", IcrcMethod::Status, None)).await;
    assert_eq!(status["result"], "ready");

    let responder = consent.held.lock().expect("held").pop().expect("responder");
    responder.respond(ConsentDecision::Approve);
    pending.await.expect("first request");
    assert!(h.outbox.last()["result"]["certificate"].is_string());

    h.grant(ScopedMethod::Accounts, PermissionState::Denied);
    let after = h.send(request("acc-2", IcrcMethod::Accounts, None)).await;
    assert_eq!(after["error"]["code"], 3000);
}

#[tokio::test]
async fn anonymous_owner_is_not_initialized() {
    let fx = fixture();
    let agent = Arc::new(
        icrc_agent::Agent::builder(fx.replica.clone(), Arc::new(AnonymousIdentity))
            .root_key(fx.replica.root_key())
            .build(),
    );
    let outbox = Arc::new(Outbox::default());
    let signer = Signer::builder(agent, outbox.clone(), StubConsentSource::ok("hi")).build();

    signer.handle_message(request("status", IcrcMethod::Status, None)).await;
    signer.handle_message(request("acc", IcrcMethod::Accounts, None)).await;
    assert_eq!(outbox.last()["error"]["code"], 504);
}

#[tokio::test]
async fn sessions_expire_after_the_validity_window() {
    let h = harness();
    h.connect().await;
    h.grant(ScopedMethod::Accounts, PermissionState::Granted);

    h.fx.clock.advance(7 * DAY_MS + 1);
    let permissions = h.send(request("perm", IcrcMethod::Permissions, None)).await;
    assert_eq!(permissions["result"]["scopes"][0]["state"], "ask_on_use");
}

#[tokio::test]
async fn listen_answers_broadcast_messages_until_disconnected() {
    let h = harness();
    let (tx, rx) = broadcast::channel(16);
    h.signer.listen(rx);

    tx.send(request("status", IcrcMethod::Status, None)).expect("send");
    while h.outbox.sent().is_empty() {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.outbox.last()["result"], "ready");

    h.signer.disconnect();
    assert_eq!(h.signer.relying_party_origin(), None);
}
