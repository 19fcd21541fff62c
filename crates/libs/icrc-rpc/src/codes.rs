/// JSON-RPC 2.0 reserved error codes.
pub mod rpc {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const SERVER_ERROR: i64 = -32000;
}

/// Application error codes the signer answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignerErrorCode {
    Origin,
    PermissionsPromptNotRegistered,
    SenderNotAllowed,
    Busy,
    NotInitialized,
    Generic,
    RequestNotSupported,
    PermissionNotGranted,
    ActionAborted,
    Network,
}

impl SignerErrorCode {
    pub const fn code(self) -> i64 {
        match self {
            Self::Origin => 500,
            Self::PermissionsPromptNotRegistered => 501,
            Self::SenderNotAllowed => 502,
            Self::Busy => 503,
            Self::NotInitialized => 504,
            Self::Generic => 1000,
            Self::RequestNotSupported => 2000,
            Self::PermissionNotGranted => 3000,
            Self::ActionAborted => 3001,
            Self::Network => 4000,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            500 => Self::Origin,
            501 => Self::PermissionsPromptNotRegistered,
            502 => Self::SenderNotAllowed,
            503 => Self::Busy,
            504 => Self::NotInitialized,
            1000 => Self::Generic,
            2000 => Self::RequestNotSupported,
            3000 => Self::PermissionNotGranted,
            3001 => Self::ActionAborted,
            4000 => Self::Network,
            _ => return None,
        })
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::Origin => {
                "The relying party's origin is not allowed to interact with the signer."
            }
            Self::PermissionsPromptNotRegistered => {
                "The signer has not registered a prompt to respond to permission requests."
            }
            Self::SenderNotAllowed => "The sender must match the owner of the signer.",
            Self::Busy => {
                "The signer is currently processing a request and cannot handle new requests at this time."
            }
            Self::NotInitialized => "The signer does not have an owner set.",
            Self::Generic => "An unknown error occurred",
            Self::RequestNotSupported => {
                "The request sent by the relying party is not supported by the signer."
            }
            Self::PermissionNotGranted => {
                "The signer has not granted the necessary permissions to process the request from the relying party."
            }
            Self::ActionAborted => {
                "The signer has canceled the action requested by the relying party."
            }
            Self::Network => "An unknown error occurred",
        }
    }
}
