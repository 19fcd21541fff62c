//! Dapp side of the ICRC signer protocol.
//!
//! [`RelyingParty::connect`] opens the signer in a popup through a
//! [`WindowHost`], waits for it to report `ready` and then correlates every
//! request with its response by id. A background watchdog keeps probing the
//! popup and marks the connection lost when it stops answering.
//!
//! Call results are never taken on trust: [`RelyingParty::call`] checks the
//! returned content map against the request, and [`IcrcLedger`] additionally
//! verifies the certificate against the relying party's own root key.
//!
//! [`MemoryHost`] wires both windows together in process, which is how the
//! tests run a real `icrc-signer` against this crate.

pub mod config;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod relying_party;
pub mod request;
mod watchdog;
pub mod window;

pub use config::{
    ConnectionOptions, RelyingPartyConfig, RequestTimeouts, WatchdogOptions, INTERACTIVE_TIMEOUT,
    PASSIVE_TIMEOUT,
};
pub use error::RelyingPartyError;
pub use ledger::{IcrcLedger, ICP_LEDGER_CANISTER_ID};
pub use memory::{MemoryHost, MemoryWindow, OpenedWindow};
pub use relying_party::{PermissionsGrant, RelyingParty};
pub use request::{DisconnectCallback, RequestOptions};
pub use window::{Popup, ScreenGeometry, WindowHost, WindowOptions, WindowPosition};
