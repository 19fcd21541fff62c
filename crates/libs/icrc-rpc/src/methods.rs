use serde::{Deserialize, Serialize};

/// Every method the protocol knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IcrcMethod {
    #[serde(rename = "icrc21_call_consent_message")]
    CallConsentMessage,
    #[serde(rename = "icrc25_request_permissions")]
    RequestPermissions,
    #[serde(rename = "icrc25_permissions")]
    Permissions,
    #[serde(rename = "icrc25_supported_standards")]
    SupportedStandards,
    #[serde(rename = "icrc27_accounts")]
    Accounts,
    #[serde(rename = "icrc29_status")]
    Status,
    #[serde(rename = "icrc49_call_canister")]
    CallCanister,
}

impl IcrcMethod {
    pub const ALL: [IcrcMethod; 7] = [
        Self::CallConsentMessage,
        Self::RequestPermissions,
        Self::Permissions,
        Self::SupportedStandards,
        Self::Accounts,
        Self::Status,
        Self::CallCanister,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CallConsentMessage => "icrc21_call_consent_message",
            Self::RequestPermissions => "icrc25_request_permissions",
            Self::Permissions => "icrc25_permissions",
            Self::SupportedStandards => "icrc25_supported_standards",
            Self::Accounts => "icrc27_accounts",
            Self::Status => "icrc29_status",
            Self::CallCanister => "icrc49_call_canister",
        }
    }

    pub fn parse(method: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == method)
    }

    pub fn scoped(self) -> Option<ScopedMethod> {
        match self {
            Self::Accounts => Some(ScopedMethod::Accounts),
            Self::CallCanister => Some(ScopedMethod::CallCanister),
            _ => None,
        }
    }
}

/// The closed set of methods a permission scope can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScopedMethod {
    #[serde(rename = "icrc27_accounts")]
    Accounts,
    #[serde(rename = "icrc49_call_canister")]
    CallCanister,
}

impl ScopedMethod {
    pub const ALL: [ScopedMethod; 2] = [Self::Accounts, Self::CallCanister];

    pub const fn method(self) -> IcrcMethod {
        match self {
            Self::Accounts => IcrcMethod::Accounts,
            Self::CallCanister => IcrcMethod::CallCanister,
        }
    }

    pub const fn as_str(self) -> &'static str {
        self.method().as_str()
    }

    pub fn parse(method: &str) -> Option<Self> {
        IcrcMethod::parse(method).and_then(IcrcMethod::scoped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    AskOnUse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeMethod {
    pub method: ScopedMethod,
}

/// One permission grant, `{scope:{method}, state}` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub scope: ScopeMethod,
    pub state: PermissionState,
}

impl Scope {
    pub const fn new(method: ScopedMethod, state: PermissionState) -> Self {
        Self { scope: ScopeMethod { method }, state }
    }

    pub const fn method(&self) -> ScopedMethod {
        self.scope.method
    }

    pub fn is_granted(&self) -> bool {
        self.state == PermissionState::Granted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcrcStandard {
    Icrc21,
    Icrc25,
    Icrc27,
    Icrc29,
    Icrc49,
}

impl IcrcStandard {
    pub const ALL: [IcrcStandard; 5] =
        [Self::Icrc21, Self::Icrc25, Self::Icrc27, Self::Icrc29, Self::Icrc49];

    pub const fn number(self) -> u16 {
        match self {
            Self::Icrc21 => 21,
            Self::Icrc25 => 25,
            Self::Icrc27 => 27,
            Self::Icrc29 => 29,
            Self::Icrc49 => 49,
        }
    }

    pub fn name(self) -> String {
        format!("ICRC-{}", self.number())
    }

    pub fn url(self) -> String {
        let n = self.number();
        format!("https://github.com/dfinity/ICRC/blob/main/ICRCs/ICRC-{n}/ICRC-{n}.md")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedStandard {
    pub name: String,
    pub url: String,
}

impl From<IcrcStandard> for SupportedStandard {
    fn from(standard: IcrcStandard) -> Self {
        Self { name: standard.name(), url: standard.url() }
    }
}

pub fn signer_supported_standards() -> Vec<SupportedStandard> {
    IcrcStandard::ALL.into_iter().map(SupportedStandard::from).collect()
}
