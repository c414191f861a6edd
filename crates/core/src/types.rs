/// Local wall-clock reading. Printer end times are shown in local time.
pub type LocalTimestamp = chrono::NaiveDateTime;

/// Opaque session credentials obtained from the server's login endpoint.
///
/// One authentication payload is built from these per connection or
/// re-authentication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub user: String,
    pub session_token: String,
}

impl SessionCredentials {
    pub fn new(user: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            session_token: session_token.into(),
        }
    }

    /// The `<user>:<session>` string carried by the socket `auth` message.
    pub fn auth_token(&self) -> String {
        format!("{}:{}", self.user, self.session_token)
    }
}
