//! Consent messages the signer builds itself for well-known ledger methods
//! when the target canister cannot produce one.

use icrc_rpc::{
    IcrcAccount, IcrcLedgerCodec, Principal, Subaccount, TokenMetadata, ICRC1_TRANSFER,
    ICRC2_APPROVE, ICRC2_TRANSFER_FROM,
};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::SignerError;

/// Arguments larger than this are not decoded locally.
pub const MAX_ARG_BYTES: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreStrings {
    pub amount: String,
    pub from: String,
    pub to: String,
    pub fee: String,
    pub memo: String,
}

impl Default for CoreStrings {
    fn default() -> Self {
        Self {
            amount: "Amount".into(),
            from: "From".into(),
            to: "To".into(),
            fee: "Fee".into(),
            memo: "Memo".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransferStrings {
    pub title: String,
}

impl Default for TransferStrings {
    fn default() -> Self {
        Self { title: "Approve transfer".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApproveStrings {
    pub title: String,
    pub address_is_allowed: String,
    pub your_account: String,
    pub requested_withdrawal_allowance: String,
    pub current_withdrawal_allowance: String,
    pub expiration_date: String,
    pub approval_fee: String,
}

impl Default for ApproveStrings {
    fn default() -> Self {
        Self {
            title: "Authorize another address to withdraw from your account".into(),
            address_is_allowed: "The following address is allowed to withdraw from your account".into(),
            your_account: "Your account".into(),
            requested_withdrawal_allowance: "Requested withdrawal allowance".into(),
            current_withdrawal_allowance: "Current withdrawal allowance".into(),
            expiration_date: "Expiration date".into(),
            approval_fee: "Approval fees".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransferFromStrings {
    pub title: String,
    pub spender: String,
}

impl Default for TransferFromStrings {
    fn default() -> Self {
        Self { title: "Transfer from a withdrawal account".into(), spender: "Spender".into() }
    }
}

/// Labels used in locally built consent messages. English by default; any
/// subset can be overridden from config.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct BuilderStrings {
    pub core: CoreStrings,
    pub icrc1_transfer: TransferStrings,
    pub icrc2_approve: ApproveStrings,
    pub icrc2_transfer_from: TransferFromStrings,
}

pub struct BuildContext<'a> {
    pub arg: &'a [u8],
    pub token: &'a TokenMetadata,
    pub owner: &'a Principal,
    pub codec: &'a dyn IcrcLedgerCodec,
    pub strings: &'a BuilderStrings,
}

pub type FallbackBuilder = fn(&BuildContext<'_>) -> Result<String, SignerError>;

pub fn fallback_builder(method: &str) -> Option<FallbackBuilder> {
    match method {
        ICRC1_TRANSFER => Some(build_icrc1_transfer),
        ICRC2_APPROVE => Some(build_icrc2_approve),
        ICRC2_TRANSFER_FROM => Some(build_icrc2_transfer_from),
        _ => None,
    }
}

struct Message(Vec<String>);

impl Message {
    fn titled(title: &str) -> Self {
        Self(vec![format!("# {title}")])
    }

    fn section(&mut self, label: &str, value: impl AsRef<str>) -> &mut Self {
        self.0.push(format!("**{label}:**\n{}", value.as_ref()));
        self
    }

    fn finish(&self) -> String {
        self.0.join("\n\n")
    }
}

fn check_size(arg: &[u8]) -> Result<(), SignerError> {
    if arg.len() > MAX_ARG_BYTES {
        return Err(SignerError::builder(format!(
            "argument is {} bytes, at most {MAX_ARG_BYTES} are decoded",
            arg.len()
        )));
    }
    Ok(())
}

fn token_amount(amount: u128, token: &TokenMetadata) -> String {
    format!("{} {}", format_amount(amount, token.decimals), token.symbol)
}

fn owner_account(owner: &Principal, subaccount: Option<Subaccount>) -> String {
    IcrcAccount { owner: owner.clone(), subaccount }.to_text()
}

pub fn build_icrc1_transfer(ctx: &BuildContext<'_>) -> Result<String, SignerError> {
    check_size(ctx.arg)?;
    let arg = ctx.codec.decode_transfer(ctx.arg).map_err(|err| SignerError::builder(err.to_string()))?;
    let core = &ctx.strings.core;

    let mut message = Message::titled(&ctx.strings.icrc1_transfer.title);
    message
        .section(&core.amount, token_amount(arg.amount, ctx.token))
        .section(&core.from, owner_account(ctx.owner, arg.from_subaccount))
        .section(&core.to, arg.to.to_text())
        .section(&core.fee, token_amount(arg.fee.unwrap_or(ctx.token.fee), ctx.token));
    if let Some(memo) = &arg.memo {
        message.section(&core.memo, decode_memo(memo));
    }
    Ok(message.finish())
}

pub fn build_icrc2_approve(ctx: &BuildContext<'_>) -> Result<String, SignerError> {
    check_size(ctx.arg)?;
    let arg = ctx.codec.decode_approve(ctx.arg).map_err(|err| SignerError::builder(err.to_string()))?;
    let strings = &ctx.strings.icrc2_approve;

    let mut message = Message::titled(&strings.title);
    message
        .section(&strings.address_is_allowed, arg.spender.to_text())
        .section(&strings.your_account, owner_account(ctx.owner, arg.from_subaccount))
        .section(&strings.requested_withdrawal_allowance, token_amount(arg.amount, ctx.token));
    if let Some(expected) = arg.expected_allowance {
        message.section(&strings.current_withdrawal_allowance, token_amount(expected, ctx.token));
    }
    if let Some(expires_at) = arg.expires_at {
        message.section(&strings.expiration_date, format_date(expires_at));
    }
    message.section(&strings.approval_fee, token_amount(arg.fee.unwrap_or(ctx.token.fee), ctx.token));
    if let Some(memo) = &arg.memo {
        message.section(&ctx.strings.core.memo, decode_memo(memo));
    }
    Ok(message.finish())
}

pub fn build_icrc2_transfer_from(ctx: &BuildContext<'_>) -> Result<String, SignerError> {
    check_size(ctx.arg)?;
    let arg =
        ctx.codec.decode_transfer_from(ctx.arg).map_err(|err| SignerError::builder(err.to_string()))?;
    let core = &ctx.strings.core;

    let mut message = Message::titled(&ctx.strings.icrc2_transfer_from.title);
    message
        .section(&core.amount, token_amount(arg.amount, ctx.token))
        .section(&core.from, arg.from.to_text())
        .section(&core.to, arg.to.to_text())
        .section(
            &ctx.strings.icrc2_transfer_from.spender,
            owner_account(ctx.owner, arg.spender_subaccount),
        )
        .section(&core.fee, token_amount(arg.fee.unwrap_or(ctx.token.fee), ctx.token));
    if let Some(memo) = &arg.memo {
        message.section(&core.memo, decode_memo(memo));
    }
    Ok(message.finish())
}

/// `amount / 10^decimals` with thousands separators, trailing zeros trimmed
/// but at least one fraction digit when the token has any.
pub fn format_amount(amount: u128, decimals: u8) -> String {
    let decimals = usize::from(decimals);
    let mut digits = amount.to_string();
    if digits.len() <= decimals {
        digits = format!("{}{digits}", "0".repeat(decimals + 1 - digits.len()));
    }
    let (int, frac) = digits.split_at(digits.len() - decimals);

    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (index, digit) in int.chars().enumerate() {
        if index > 0 && (int.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let frac = frac.trim_end_matches('0');
    match (frac.is_empty(), decimals) {
        (true, 0) => grouped,
        (true, _) => format!("{grouped}.0"),
        (false, _) => format!("{grouped}.{frac}"),
    }
}

/// Nanoseconds since the epoch as `Thu, Jan 1, 1970, 00:00:00 UTC`.
pub fn format_date(nanoseconds: u64) -> String {
    let Ok(date) = OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanoseconds)) else {
        return format!("{nanoseconds} ns");
    };
    let short = |name: String| name.chars().take(3).collect::<String>();
    format!(
        "{}, {} {}, {}, {:02}:{:02}:{:02} UTC",
        short(date.weekday().to_string()),
        short(date.month().to_string()),
        date.day(),
        date.year(),
        date.hour(),
        date.minute(),
        date.second()
    )
}

/// UTF-8 text when the memo is valid UTF-8, `0x`-prefixed hex otherwise.
pub fn decode_memo(memo: &[u8]) -> String {
    match std::str::from_utf8(memo) {
        Ok(text) => text.to_string(),
        Err(_) => format!("0x{}", hex::encode(memo)),
    }
}
