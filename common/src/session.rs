//! Persisted login state.
//!
//! A session is either an admin login or a unit login, never both, so a single
//! file holds a single tagged value. Expiry is checked against an injected clock.

use crate::SESSION_DURATION_HOURS;
use crate::clock::Clock;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Session {
    Admin {
        expires_at: DateTime<Utc>,
    },
    Unit {
        unit_id: String,
        unit_name: String,
        expires_at: DateTime<Utc>,
    },
}

impl Session {
    pub fn admin(clock: &dyn Clock) -> Self {
        Session::Admin {
            expires_at: clock.now() + TimeDelta::hours(SESSION_DURATION_HOURS),
        }
    }

    pub fn unit(unit_id: impl Into<String>, unit_name: impl Into<String>, clock: &dyn Clock) -> Self {
        Session::Unit {
            unit_id: unit_id.into(),
            unit_name: unit_name.into(),
            expires_at: clock.now() + TimeDelta::hours(SESSION_DURATION_HOURS),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        match self {
            Session::Admin { expires_at } | Session::Unit { expires_at, .. } => *expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }

    /// The unit id of a unit session.
    pub fn unit_id(&self) -> Option<&str> {
        match self {
            Session::Unit { unit_id, .. } => Some(unit_id),
            Session::Admin { .. } => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Session::Admin { .. })
    }
}

/// Reads and writes the session file.
pub struct SessionStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `session`, replacing whatever login was stored before.
    ///
    /// # Errors
    /// Returns an error if the parent directory or the file cannot be written.
    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(session).context("Failed to serialize session")?;
        fs::write(&self.path, body)
            .with_context(|| format!("Failed to write session to {}", self.path.display()))?;
        log::debug!("Saved session to {}", self.path.display());
        Ok(())
    }

    /// Read the stored session. A missing file or an expired session gives `None`;
    /// an expired one is also removed.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<Session>> {
        let body = match fs::read_to_string(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read session from {}", self.path.display()));
            }
        };
        let session: Session = serde_json::from_str(&body)
            .with_context(|| format!("Malformed session file {}", self.path.display()))?;

        if session.is_expired(self.clock.now()) {
            log::info!("Stored session expired at {}, clearing it", session.expires_at());
            self.clear()?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Remove the stored session. Succeeds if there was none.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("Cleared session at {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove session at {}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn setup() -> (tempfile::TempDir, ManualClock, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::default();
        let store = SessionStore::new(dir.path().join("state/session.json"), Arc::new(clock.clone()));
        (dir, clock, store)
    }

    #[test_log::test]
    fn test_load_without_file() {
        let (_dir, _clock, store) = setup();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test_log::test]
    fn test_unit_session_round_trip() {
        let (_dir, clock, store) = setup();
        let session = Session::unit("u-7", "Falcons", &clock);

        store.save(&session).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded, session);
        assert_eq!(loaded.unit_id(), Some("u-7"));
        assert!(!loaded.is_admin());
    }

    #[test_log::test]
    fn test_admin_replaces_unit_session() {
        let (_dir, clock, store) = setup();
        store.save(&Session::unit("u-7", "Falcons", &clock)).unwrap();
        store.save(&Session::admin(&clock)).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert!(loaded.is_admin());
        assert_eq!(loaded.unit_id(), None);
    }

    #[test_log::test]
    fn test_expired_session_is_cleared() {
        let (_dir, clock, store) = setup();
        store.save(&Session::admin(&clock)).unwrap();

        clock.advance(TimeDelta::hours(SESSION_DURATION_HOURS) - TimeDelta::seconds(1));
        assert!(store.load().unwrap().is_some());

        clock.advance(TimeDelta::seconds(1));
        assert_eq!(store.load().unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test_log::test]
    fn test_serialized_form_is_tagged() {
        let clock = ManualClock::default();
        let value = serde_json::to_value(Session::unit("u-1", "Owls", &clock)).unwrap();
        assert_eq!(value["role"], "unit");
        assert_eq!(value["unit_name"], "Owls");
    }

    #[test_log::test]
    fn test_malformed_file_is_an_error() {
        let (_dir, _clock, store) = setup();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();

        assert!(store.load().is_err());
    }

    #[test_log::test]
    fn test_clear_without_file() {
        let (_dir, _clock, store) = setup();
        assert!(store.clear().is_ok());
    }
}
