use crate::types::ApiErrorBody;
use reqwest::StatusCode;

/// Error code the backend's JWT layer puts on expired or malformed access tokens.
pub const TOKEN_NOT_VALID_CODE: &str = "token_not_valid";

/// Which authorization failures are treated as an expired access token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// Every 401 attempts a refresh.
    #[default]
    AnyUnauthorized,
    /// Only a 401 whose body carries `"code": "token_not_valid"`.
    TokenNotValidCode,
}

impl RefreshTrigger {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "any" | "any_unauthorized" | "401" => Some(Self::AnyUnauthorized),
            "token_not_valid" | "code" => Some(Self::TokenNotValidCode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureClass {
    /// The access token expired; one refresh-and-replay is allowed.
    ExpiredCredential,
    /// An authorization failure on a request that was already replayed.
    RetryExhausted,
    /// Anything else goes back to the caller as-is.
    Terminal,
}

pub(crate) fn classify_failure(
    trigger: RefreshTrigger,
    status: StatusCode,
    body: Option<&ApiErrorBody>,
    already_retried: bool,
) -> FailureClass {
    if status != StatusCode::UNAUTHORIZED {
        return FailureClass::Terminal;
    }

    let expired = match trigger {
        RefreshTrigger::AnyUnauthorized => true,
        RefreshTrigger::TokenNotValidCode => body
            .and_then(|b| b.code.as_deref())
            .is_some_and(|code| code == TOKEN_NOT_VALID_CODE),
    };

    match (expired, already_retried) {
        (true, false) => FailureClass::ExpiredCredential,
        (true, true) => FailureClass::RetryExhausted,
        (false, _) => FailureClass::Terminal,
    }
}
