#![forbid(unsafe_code)]

use std::sync::OnceLock;

use serde_json::{json, Value};
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use crate::client::MatrixClient;
use crate::error::{HarnessError, Result};
use crate::session::{Credentials, Session};

/// Alias the shared room is created under when the host has not joined
/// one yet.
const ROOM_ALIAS: &str = "stress-testing-room";

fn host_credentials() -> Credentials {
    Credentials::password_login("host_user", "password")
}

/// The single privileged identity shared by every participant. It owns
/// (or discovers) the target room and performs invitations. The room is
/// resolved lazily, at most once per run, and the coordinator rides on
/// the transport of whichever participant binds one first so its
/// authenticated session persists across calls made on behalf of
/// different participants.
///
/// Both the transport slot and the room cell are guarded: concurrent
/// first accesses cannot create duplicate rooms or trample the bound
/// transport.
pub struct HostCoordinator {
    transport: OnceLock<MatrixClient>,
    session: Mutex<Session>,
    room: OnceCell<String>,
}

impl HostCoordinator {
    pub fn new() -> Self {
        Self {
            transport: OnceLock::new(),
            session: Mutex::new(Session::new()),
            room: OnceCell::new(),
        }
    }

    /// Store `transport` unless one is already bound; either way the
    /// bound transport is returned. First writer wins, never reassigned.
    pub fn bind_transport(&self, transport: MatrixClient) -> &MatrixClient {
        self.transport.get_or_init(|| transport)
    }

    fn transport(&self) -> Result<&MatrixClient> {
        self.transport.get().ok_or(HarnessError::TransportUnbound)
    }

    /// Log the host in lazily, on first real use. `login`/`register`
    /// themselves are exempt from this gate. Returns the host token.
    async fn ensure_authenticated(&self, client: &MatrixClient) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(token) = session.token() {
            return Ok(token.to_string());
        }

        let credentials = host_credentials();
        let (_, status) = session.login(client, &credentials).await?;
        match session.token() {
            Some(token) => Ok(token.to_string()),
            None => Err(HarnessError::LoginFailed {
                user: credentials.user,
                status: status.as_u16(),
            }),
        }
    }

    /// The shared room id, computed at most once per run: reuse the
    /// first room the host's sync lists as joined, otherwise create one
    /// under the fixed alias. Concurrent first accesses serialize on the
    /// cell; every later access returns the memoized id.
    pub async fn room_id(&self) -> Result<String> {
        let room = self.room.get_or_try_init(|| self.resolve_room()).await?;
        Ok(room.clone())
    }

    async fn resolve_room(&self) -> Result<String> {
        let client = self.transport()?;
        let token = self.ensure_authenticated(client).await?;

        let (sync, _) = client.get("sync", Some(&token), None).await?;
        if let Some(existing) = sync
            .pointer("/rooms/join")
            .and_then(Value::as_object)
            .and_then(|rooms| rooms.keys().next())
        {
            info!(room_id = %existing, "host reusing joined room");
            return Ok(existing.clone());
        }

        let body = json!({ "room_alias_name": ROOM_ALIAS });
        let (response, status) = client
            .post("createRoom", &body, Some(&token), None)
            .await?;
        let room_id = response
            .get("room_id")
            .and_then(Value::as_str)
            .ok_or(HarnessError::MissingField("room_id"))?;
        info!(%room_id, %status, "host created room");
        Ok(room_id.to_string())
    }

    /// Invite `user_id` into the shared room. Membership is not tracked
    /// here; callers re-derive it from their own sync.
    pub async fn invite(&self, user_id: &str) -> Result<()> {
        let client = self.transport()?;
        let token = self.ensure_authenticated(client).await?;
        let room_id = self.room_id().await?;

        let endpoint = format!("rooms/{room_id}/invite");
        let body = json!({ "user_id": user_id });
        let (response, status) = client
            .post(&endpoint, &body, Some(&token), Some("invite"))
            .await?;
        if status.is_success() {
            info!(%user_id, %room_id, "invited");
        } else {
            warn!(%user_id, %room_id, %status, body = %response, "invite failed");
        }
        Ok(())
    }
}

impl Default for HostCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
