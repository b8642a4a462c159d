#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::MatrixClient;
use crate::error::{HarnessError, Result};
use crate::host::HostCoordinator;
use crate::session::{Credentials, Session};
use crate::text::MessageGenerator;

/// Process-wide counter that keeps generated usernames unique.
static NEXT_USER_ID: AtomicU64 = AtomicU64::new(0);

const PARTICIPANT_PASSWORD: &str = "mysecretpassword";
const MESSAGES_PER_BURST: usize = 5;
const MAX_MESSAGE_CHARS: usize = 100;

/// Allocate credentials for the next participant.
fn next_credentials() -> Credentials {
    let id = NEXT_USER_ID.fetch_add(1, Ordering::Relaxed) + 1;
    Credentials::password_login(format!("stress_testing{id}"), PARTICIPANT_PASSWORD)
}

/// Whether the shared room shows up among this user's joined rooms.
fn is_joined(sync: &Value, room_id: &str) -> bool {
    sync.pointer("/rooms/join")
        .and_then(Value::as_object)
        .map(|rooms| rooms.contains_key(room_id))
        .unwrap_or(false)
}

/// One simulated user: authenticates, converges on the shared room via
/// the host coordinator, then sends message bursts for the rest of the
/// run.
pub struct ParticipantAgent {
    client: MatrixClient,
    session: Session,
    host: Arc<HostCoordinator>,
    credentials: Credentials,
    text: MessageGenerator,
}

impl ParticipantAgent {
    pub fn new(client: MatrixClient, host: Arc<HostCoordinator>) -> Self {
        Self {
            client,
            session: Session::new(),
            host,
            credentials: next_credentials(),
            text: MessageGenerator::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.credentials.user
    }

    /// Startup sequence: authenticate (registering on first contact),
    /// then make sure this user is a member of the shared room. An error
    /// here aborts this agent only, never the run.
    pub async fn start(&mut self) -> Result<()> {
        let (login_body, status) = self.session.login(&self.client, &self.credentials).await?;
        if !self.session.is_authenticated() {
            return Err(HarnessError::LoginFailed {
                user: self.credentials.user.clone(),
                status: status.as_u16(),
            });
        }

        let (sync, _) = self.client.get("sync", self.session.token(), None).await?;
        self.host.bind_transport(self.client.clone());

        // An initial sync without a "rooms" key is an eventual-consistency
        // artifact of the protocol, not a failure. Note it, keep going.
        if sync.get("rooms").is_none() {
            warn!(user = %self.credentials.user, body = %sync, "sync response missing rooms");
        }

        let room_id = self.host.room_id().await?;
        if !is_joined(&sync, &room_id) {
            let user_id = login_body
                .get("user_id")
                .and_then(Value::as_str)
                .ok_or(HarnessError::MissingField("user_id"))?;
            self.host.invite(user_id).await?;
            let endpoint = format!("rooms/{room_id}/join");
            self.client
                .post(&endpoint, &json!({}), self.session.token(), Some("join"))
                .await?;
            info!(user = %self.credentials.user, %room_id, "joined shared room");
        }

        Ok(())
    }

    /// Send one burst of synthetic messages to the shared room. Send
    /// failures are logged and swallowed; losing a synthetic message
    /// must not kill the simulated user.
    pub async fn send_burst(&mut self) -> Result<()> {
        let room_id = self.host.room_id().await?;
        let endpoint = format!("rooms/{room_id}/send/m.room.message");

        for _ in 0..MESSAGES_PER_BURST {
            let body = json!({
                "msgtype": "m.text",
                "body": self.text.message(MAX_MESSAGE_CHARS),
            });
            match self
                .client
                .post(&endpoint, &body, self.session.token(), Some("SendMessage"))
                .await
            {
                Ok((_, status)) if status.is_success() => {
                    self.client.metrics().record_message_sent();
                    debug!(user = %self.credentials.user, "message sent");
                }
                Ok((response, status)) => {
                    self.client.metrics().record_message_failure();
                    warn!(user = %self.credentials.user, %status, body = %response, "message error");
                }
                Err(e) => {
                    self.client.metrics().record_message_failure();
                    warn!(user = %self.credentials.user, error = %e, "message send failed");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_usernames_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let creds = next_credentials();
            assert!(creds.user.starts_with("stress_testing"));
            assert_eq!(creds.password, PARTICIPANT_PASSWORD);
            assert!(seen.insert(creds.user));
        }
    }

    #[test]
    fn test_is_joined_detects_membership() {
        let sync = json!({"rooms": {"join": {"!abc:server": {}}}});
        assert!(is_joined(&sync, "!abc:server"));
        assert!(!is_joined(&sync, "!other:server"));
    }

    #[test]
    fn test_is_joined_tolerates_missing_rooms_key() {
        let sync = json!({"next_batch": "s1"});
        assert!(!is_joined(&sync, "!abc:server"));
    }
}
