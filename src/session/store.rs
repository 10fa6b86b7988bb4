use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::tprintln;

use super::clock::Clock;
use super::credential::Credential;
use super::identity::Identity;
use super::storage::{Storage, StorageError};

pub const TOKEN_KEY: &str = "sp_token";
pub const USER_KEY: &str = "sp_user";

/// Owner of the persisted session: the raw credential under `sp_token` and the
/// serialized identity under `sp_user`.
///
/// Both entries are written and cleared together under `pair`, and readers that need both
/// take the read side, so a credential is never observed next to another session's identity.
/// The live identity view is a `watch` channel; front ends subscribe to it and treat `None`
/// as "go to the login screen".
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    pair: RwLock<()>,
    current: watch::Sender<Option<Identity>>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        let (current, _) = watch::channel(None);
        let store = Self { storage, clock, pair: RwLock::new(()), current };
        let restored = store.get_stored_identity();
        if let Some(id) = &restored {
            debug!(target: "session", "restored session for {}", id.username);
        }
        store.current.send_replace(restored);
        store
    }

    pub fn clock(&self) -> &dyn Clock { self.clock.as_ref() }

    /// The stored credential if it has not expired. An expired or undecodable credential
    /// clears the whole session.
    pub fn get_token(&self) -> Option<Credential> {
        let raw = {
            let _g = self.pair.read();
            self.storage.get(TOKEN_KEY)?
        };
        match Credential::parse(raw.as_str()) {
            Ok(cred) if !cred.is_expired_at(self.clock.now_epoch_secs()) => Some(cred),
            Ok(cred) => {
                info!(target: "session", "credential expired at {}, clearing session", cred.expires_at());
                self.clear_if_token(&raw);
                None
            }
            Err(e) => {
                warn!(target: "session", "stored credential is malformed ({}), clearing session", e);
                self.clear_if_token(&raw);
                None
            }
        }
    }

    pub fn set_session(&self, credential: &Credential, identity: &Identity) -> Result<(), StorageError> {
        let user_json = serde_json::to_string(identity)?;
        {
            let _g = self.pair.write();
            self.storage.set(&[(TOKEN_KEY, credential.token()), (USER_KEY, user_json.as_str())])?;
            self.current.send_replace(Some(identity.clone()));
        }
        tprintln!("session.set user={} exp={}", identity.username, credential.expires_at());
        Ok(())
    }

    pub fn clear_session(&self) {
        let _g = self.pair.write();
        self.clear_locked();
    }

    /// Stored identity after shape validation. Anything malformed clears the session.
    pub fn get_stored_identity(&self) -> Option<Identity> {
        let raw = {
            let _g = self.pair.read();
            self.storage.get(USER_KEY)?
        };
        match Identity::from_stored(&raw) {
            Ok(id) => Some(id),
            Err(reason) => {
                warn!(target: "session", "stored identity rejected: {}; clearing session", reason);
                let _g = self.pair.write();
                if self.storage.get(USER_KEY).as_deref() == Some(raw.as_str()) {
                    self.clear_locked();
                }
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        if self.current.borrow().is_none() {
            return false;
        }
        let _g = self.pair.read();
        match self.storage.get(TOKEN_KEY).and_then(|t| Credential::parse(t).ok()) {
            Some(cred) => !cred.is_expired_at(self.clock.now_epoch_secs()),
            None => false,
        }
    }

    /// Live identity view, as last set by login/refresh/logout.
    pub fn current_identity(&self) -> Option<Identity> { self.current.borrow().clone() }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> { self.current.subscribe() }

    /// Both halves read under one guard. `None` unless both are present and decodable;
    /// expiry is not checked.
    pub fn snapshot(&self) -> Option<(Credential, Identity)> {
        let _g = self.pair.read();
        let cred = Credential::parse(self.storage.get(TOKEN_KEY)?).ok()?;
        let id = Identity::from_stored(&self.storage.get(USER_KEY)?).ok()?;
        Some((cred, id))
    }

    // Clear only if the token is still the one we judged; a refresh may have replaced it meanwhile.
    fn clear_if_token(&self, raw: &str) {
        let _g = self.pair.write();
        if self.storage.get(TOKEN_KEY).as_deref() == Some(raw) {
            self.clear_locked();
        }
    }

    fn clear_locked(&self) {
        if let Err(e) = self.storage.remove(&[TOKEN_KEY, USER_KEY]) {
            warn!(target: "session", "failed to remove session entries: {}", e);
        }
        self.current.send_replace(None);
        tprintln!("session.clear");
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
