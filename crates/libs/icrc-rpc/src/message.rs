//! Cross-window message seams.

use serde_json::Value;

/// Identifies a window taking part in the message exchange.
pub type WindowId = u64;

/// A message delivered to a window, as the host saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Origin of the sending window; empty for same-window artifacts.
    pub origin: String,
    pub source: Option<WindowId>,
    pub data: Value,
}

/// Anything a window can post a message to.
pub trait MessageTarget: Send + Sync {
    /// Posts `data`; the host drops it when the target's origin does not match
    /// `target_origin` (`"*"` matches any origin).
    fn post_message(&self, data: Value, target_origin: &str);
}

/// Extracts `scheme://host[:port]` from an absolute http(s) url, dropping
/// default ports and user info.
pub fn parse_origin(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let scheme = scheme.to_ascii_lowercase();
    let default_port = match scheme.as_str() {
        "http" => "80",
        "https" => "443",
        _ => return None,
    };
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if host_port.is_empty() {
        return None;
    }
    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port)) if !port.contains(']') => {
            if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            (host, Some(port))
        }
        _ => (host_port, None),
    };
    if host.is_empty() {
        return None;
    }
    let host = host.to_ascii_lowercase();
    match port {
        Some(port) if port != default_port => Some(format!("{scheme}://{host}:{port}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}
