#![forbid(unsafe_code)]

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::MatrixClient;
use crate::error::{HarnessError, Result};

/// Login flow selector, serialized to its wire identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoginType {
    #[serde(rename = "m.login.password")]
    Password,
    #[serde(rename = "m.login.dummy")]
    Dummy,
}

/// One identity's login material. Immutable once created; the login body
/// is the serialized form of this struct.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    #[serde(rename = "type")]
    pub login_type: LoginType,
}

impl Credentials {
    pub fn password_login(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            login_type: LoginType::Password,
        }
    }
}

/// Authentication state for one identity: anonymous until a login or
/// registration stores an access token, authenticated afterwards. There
/// is no transition back within a run.
#[derive(Debug, Default)]
pub struct Session {
    access_token: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// Token to attach to outbound calls; `None` while anonymous.
    pub fn token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// POST the credentials to `login`. On 200 the token is stored. On
    /// 403 (unknown account) the session falls through to [`signup`] and
    /// returns ITS result in place of the login result; any other status
    /// is logged and handed back unchanged for the caller to judge.
    ///
    /// [`signup`]: Session::signup
    pub async fn login(
        &mut self,
        client: &MatrixClient,
        credentials: &Credentials,
    ) -> Result<(Value, StatusCode)> {
        let body = serde_json::to_value(credentials)?;
        let (response, status) = client.post("login", &body, self.token(), None).await?;

        if status == StatusCode::OK {
            let token = response
                .get("access_token")
                .and_then(Value::as_str)
                .ok_or(HarnessError::MissingField("access_token"))?;
            self.access_token = Some(token.to_string());
            info!(user = %credentials.user, "logged in");
        } else {
            warn!(user = %credentials.user, %status, body = %response, "login error");
        }

        if status == StatusCode::FORBIDDEN {
            return self.signup(client, credentials).await;
        }

        Ok((response, status))
    }

    /// Register the account with the dummy-auth flow (no CAPTCHA/email).
    /// A registration response without an access token is a structured
    /// failure that aborts this identity's startup.
    pub async fn signup(
        &mut self,
        client: &MatrixClient,
        credentials: &Credentials,
    ) -> Result<(Value, StatusCode)> {
        let body = json!({
            "username": credentials.user,
            "password": credentials.password,
            "auth": { "type": "m.login.dummy" },
        });
        let (response, status) = client.post("register", &body, self.token(), None).await?;

        let token = response
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| HarnessError::SignupFailed {
                user: credentials.user.clone(),
                status: status.as_u16(),
            })?;
        self.access_token = Some(token.to_string());
        info!(user = %credentials.user, %status, "registered");

        Ok((response, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_wire_shape() {
        let creds = Credentials::password_login("stress_testing1", "mysecretpassword");
        let value = serde_json::to_value(&creds).unwrap();
        assert_eq!(
            value,
            json!({
                "user": "stress_testing1",
                "password": "mysecretpassword",
                "type": "m.login.password",
            })
        );
    }

    #[test]
    fn test_dummy_login_type_identifier() {
        let value = serde_json::to_value(LoginType::Dummy).unwrap();
        assert_eq!(value, json!("m.login.dummy"));
    }

    #[test]
    fn test_session_starts_anonymous() {
        let session = Session::new();
        assert!(!session.is_authenticated());
        assert!(session.token().is_none());
    }
}
