//! Authentication session bookkeeping for feature 0x1602.
//!
//! Password material comes from an injected provider so the codec never
//! touches the filesystem; the encrypted password container lives in the
//! test runtime. Sessions are per account name and last until the device
//! power-cycles or a new session on the same account replaces them.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ProtocolError, Result};

/// Account names the deactivatable-features flow authenticates against.
pub const ACCOUNT_MANUFACTURING: &str = "x1E02_Manuf";
pub const ACCOUNT_COMPLIANCE: &str = "x1E02_Compl";
pub const ACCOUNT_GOTHARD: &str = "x1E02_Gothard";

/// Source of per-account password material.
pub trait PasswordProvider {
    /// 16 bytes for short passwords, 32 for long ones.
    fn password(&self, account_name: &str) -> Result<Vec<u8>>;
}

/// In-memory provider for tests and fixed-credential devices.
#[derive(Debug, Default, Clone)]
pub struct StaticPasswords {
    entries: HashMap<String, Vec<u8>>,
}

impl StaticPasswords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, account_name: &str, material: Vec<u8>) {
        self.entries.insert(account_name.to_string(), material);
    }
}

impl PasswordProvider for StaticPasswords {
    fn password(&self, account_name: &str) -> Result<Vec<u8>> {
        self.entries
            .get(account_name)
            .cloned()
            .ok_or_else(|| ProtocolError::InvalidArgument(format!(
                "no password material for account '{account_name}'"
            )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Started,
    Authenticated,
    Closed,
}

/// One account's authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    pub account_name: String,
    pub state: SessionState,
    pub long_password: bool,
}

/// Tracks sessions across accounts, enforcing single authentication per
/// account.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: HashMap<String, Session>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a startSession. Starting on an already-authenticated
    /// account closes the old session first.
    pub fn start(&mut self, account_name: &str, long_password: bool) {
        if let Some(existing) = self.sessions.get_mut(account_name) {
            if existing.state == SessionState::Authenticated {
                debug!(account = account_name, "closing superseded session");
                existing.state = SessionState::Closed;
            }
        }
        self.sessions.insert(
            account_name.to_string(),
            Session {
                account_name: account_name.to_string(),
                state: SessionState::Started,
                long_password,
            },
        );
    }

    /// Record a successful password exchange.
    pub fn authenticate(&mut self, account_name: &str) -> Result<()> {
        let session = self.sessions.get_mut(account_name).ok_or_else(|| {
            ProtocolError::InvalidArgument(format!(
                "no started session for account '{account_name}'"
            ))
        })?;
        if session.state != SessionState::Started {
            return Err(ProtocolError::InvalidArgument(format!(
                "account '{account_name}' session is not in the started state"
            )));
        }
        session.state = SessionState::Authenticated;
        Ok(())
    }

    /// Record an endSession (or a failed authentication).
    pub fn close(&mut self, account_name: &str) {
        if let Some(session) = self.sessions.get_mut(account_name) {
            session.state = SessionState::Closed;
        }
    }

    pub fn state(&self, account_name: &str) -> SessionState {
        self.sessions
            .get(account_name)
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn is_authenticated(&self, account_name: &str) -> bool {
        self.state(account_name) == SessionState::Authenticated
    }
}

/// Split password material into the 16-byte halves fed to passwd0 and
/// passwd1.
pub fn password_halves(material: &[u8]) -> Result<([u8; 16], Option<[u8; 16]>)> {
    match material.len() {
        16 => {
            let mut p0 = [0u8; 16];
            p0.copy_from_slice(material);
            Ok((p0, None))
        }
        32 => {
            let mut p0 = [0u8; 16];
            let mut p1 = [0u8; 16];
            p0.copy_from_slice(&material[..16]);
            p1.copy_from_slice(&material[16..]);
            Ok((p0, Some(p1)))
        }
        n => Err(ProtocolError::InvalidArgument(format!(
            "password material must be 16 or 32 bytes, got {n}"
        ))),
    }
}
