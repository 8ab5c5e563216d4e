//! # Sessions
//!
//! A session is one signed-in device. Mobile platforms allow a single
//! active session per device id.

use crate::credentials::new_token;
use crate::storage::{Record, RecordTable, index};
use crate::{CoreError, CoreResult, Reader, SessionId, Timestamp, UserId, WriteTx};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};

/// Client platform reported when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Android,
    Ios,
    Web,
}

impl Platform {
    /// Platforms bound to a physical device id.
    #[must_use]
    pub fn is_mobile(self) -> bool {
        matches!(self, Self::Android | Self::Ios)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub token: String,
    pub platform: Platform,
    pub device_id: String,
    pub fcm_token: Option<String>,
    pub voip_token: Option<String>,
    pub created_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

impl Record for Session {
    const TABLE: RecordTable = TableDefinition::new("sessions");
    const KIND: &'static str = "session";
    fn key(&self) -> u64 {
        self.id.0
    }
}

impl Session {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Input for `create_session`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub platform: Platform,
    pub device_id: String,
    #[serde(default)]
    pub fcm_token: Option<String>,
    #[serde(default)]
    pub voip_token: Option<String>,
}

/// A new session plus the sessions it ended on the same device.
#[derive(Debug, Clone)]
pub struct StartedSession {
    pub session: Session,
    pub replaced: Vec<Session>,
}

/// Start a session for `user`.
///
/// On mobile platforms an active session of another user on the same device
/// is an error, and the user's own earlier sessions there are ended and
/// returned in `replaced`.
pub fn create_session(
    tx: &WriteTx,
    user: UserId,
    input: NewSession,
    now: Timestamp,
) -> CoreResult<StartedSession> {
    let device_id = input.device_id.trim().to_string();
    if device_id.is_empty() {
        return Err(CoreError::invalid("deviceId is required"));
    }
    let mut replaced = Vec::new();
    if input.platform.is_mobile() {
        let on_device = tx.filter::<Session>(|s| {
            s.is_active() && s.platform.is_mobile() && s.device_id == device_id
        })?;
        if on_device.iter().any(|s| s.user_id != user) {
            return Err(CoreError::invalid("Another session is running on this device"));
        }
        for session in on_device {
            replaced.push(end(tx, session, now)?);
        }
    }

    let session = Session {
        id: SessionId(tx.next_id::<Session>()?),
        user_id: user,
        token: new_token(),
        platform: input.platform,
        device_id,
        fcm_token: input.fcm_token.filter(|t| !t.is_empty()),
        voip_token: input.voip_token.filter(|t| !t.is_empty()),
        created_at: now,
        ended_at: None,
    };
    tx.put(&session)?;
    tx.set_index(index::SESSION_TOKEN, &session.token, session.id.0)?;
    Ok(StartedSession { session, replaced })
}

/// Resolve a session token to an active session.
pub fn validate_session(tx: &impl Reader, token: &str) -> CoreResult<Session> {
    let unauthorized = || CoreError::unauthorized("invalid session");
    let id = tx
        .lookup(index::SESSION_TOKEN, token)?
        .ok_or_else(unauthorized)?;
    let session: Session = tx.get(id)?.ok_or_else(unauthorized)?;
    if !session.is_active() {
        return Err(unauthorized());
    }
    Ok(session)
}

fn end(tx: &WriteTx, mut session: Session, now: Timestamp) -> CoreResult<Session> {
    tx.remove_index(index::SESSION_TOKEN, &session.token)?;
    session.ended_at = Some(now);
    tx.put(&session)?;
    Ok(session)
}

/// End the session with `token`.
pub fn end_session(tx: &WriteTx, token: Option<&str>, now: Timestamp) -> CoreResult<Session> {
    let not_found = || CoreError::invalid("session not found");
    let token = token.ok_or_else(not_found)?;
    let id = tx.lookup(index::SESSION_TOKEN, token)?.ok_or_else(not_found)?;
    let session: Session = tx.get(id)?.ok_or_else(not_found)?;
    end(tx, session, now)
}

/// End every active session of a user. Returns the ended tokens.
pub fn end_all_for_user(tx: &WriteTx, user: UserId, now: Timestamp) -> CoreResult<Vec<String>> {
    let sessions = tx.filter::<Session>(|s| s.user_id == user && s.is_active())?;
    let mut tokens = Vec::with_capacity(sessions.len());
    for session in sessions {
        tokens.push(session.token.clone());
        end(tx, session, now)?;
    }
    Ok(tokens)
}

pub fn update_fcm_token(tx: &WriteTx, token: &str, fcm_token: &str) -> CoreResult<()> {
    let mut session = validate_session(tx, token)?;
    session.fcm_token = Some(fcm_token.to_string()).filter(|t| !t.is_empty());
    tx.put(&session)
}

pub fn update_voip_token(tx: &WriteTx, token: &str, voip_token: &str) -> CoreResult<()> {
    let mut session = validate_session(tx, token)?;
    session.voip_token = Some(voip_token.to_string()).filter(|t| !t.is_empty());
    tx.put(&session)
}

/// Push tokens of every active session of a user.
pub fn push_tokens(tx: &impl Reader, user: UserId) -> CoreResult<Vec<String>> {
    Ok(tx
        .filter::<Session>(|s| s.user_id == user && s.is_active())?
        .into_iter()
        .filter_map(|s| s.fcm_token)
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Store;
    use crate::users::tests::{new_user, now};

    fn mobile(device: &str) -> NewSession {
        NewSession {
            platform: Platform::Android,
            device_id: device.into(),
            fcm_token: Some("fcm-1".into()),
            voip_token: None,
        }
    }

    #[test]
    fn create_and_validate() {
        let store = Store::in_memory().unwrap();
        let user = new_user(&store, "Ann");
        let session = store
            .write(|tx| create_session(tx, user.id, mobile("dev-1"), now()).map(|s| s.session))
            .unwrap();
        let found = store
            .read(|tx| validate_session(tx, &session.token))
            .unwrap();
        assert_eq!(found.user_id, user.id);
        assert_eq!(
            store.read(|tx| push_tokens(tx, user.id)).unwrap(),
            vec!["fcm-1".to_string()]
        );
    }

    #[test]
    fn other_user_on_same_device_is_rejected() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        store
            .write(|tx| create_session(tx, a.id, mobile("dev-1"), now()).map(|s| s.session))
            .unwrap();
        let err = store
            .write(|tx| create_session(tx, b.id, mobile("dev-1"), now()).map(|s| s.session))
            .unwrap_err();
        assert_eq!(err.to_string(), "Another session is running on this device");
    }

    #[test]
    fn same_user_replaces_device_session() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let first = store
            .write(|tx| create_session(tx, a.id, mobile("dev-1"), now()))
            .unwrap();
        assert!(first.replaced.is_empty());
        let second = store
            .write(|tx| create_session(tx, a.id, mobile("dev-1"), now()))
            .unwrap();
        let replaced: Vec<&str> = second.replaced.iter().map(|s| s.token.as_str()).collect();
        assert_eq!(replaced, vec![first.session.token.as_str()]);
        assert!(second.replaced.iter().all(|s| !s.is_active()));
        assert!(store.read(|tx| validate_session(tx, &first.session.token)).is_err());
        assert!(store.read(|tx| validate_session(tx, &second.session.token)).is_ok());
    }

    #[test]
    fn web_sessions_share_devices() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let b = new_user(&store, "Ben");
        let web = |device: &str| NewSession {
            platform: Platform::Web,
            device_id: device.into(),
            fcm_token: None,
            voip_token: None,
        };
        store
            .write(|tx| create_session(tx, a.id, web("browser"), now()).map(|s| s.session))
            .unwrap();
        store
            .write(|tx| create_session(tx, b.id, web("browser"), now()).map(|s| s.session))
            .unwrap();
    }

    #[test]
    fn end_session_requires_token() {
        let store = Store::in_memory().unwrap();
        let a = new_user(&store, "Ann");
        let err = store.write(|tx| end_session(tx, None, now())).unwrap_err();
        assert_eq!(err.to_string(), "session not found");

        let session = store
            .write(|tx| create_session(tx, a.id, mobile("dev-1"), now()).map(|s| s.session))
            .unwrap();
        store
            .write(|tx| end_session(tx, Some(&session.token), now()))
            .unwrap();
        assert!(store.read(|tx| validate_session(tx, &session.token)).is_err());
        assert!(
            store
                .write(|tx| end_session(tx, Some(&session.token), now()))
                .is_err()
        );
    }
}
