use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use log::{debug, error, info};

use crate::error_handling::types::StorageError;
use crate::session_management::session::Session;
use crate::status::RawSession;
use crate::storage::storage_trait::RegistryStore;

/// The authoritative mapping from a client's real address to its session.
///
/// This is the only place `session_id`s are generated. Every mutating call
/// persists the whole mapping through the store before returning.
///
/// # Fields Overview
///
/// - `sessions`: current registry, keyed by `real_address`
/// - `store`: durable backend the registry is loaded from and saved to
pub struct SessionRegistry {
    sessions: BTreeMap<String, Session>,
    store: Box<dyn RegistryStore>,
}

impl SessionRegistry {
    /// Loads the persisted registry so session ids survive a restart.
    pub fn open(store: Box<dyn RegistryStore>) -> Result<Self, StorageError> {
        let sessions = store.load()?;
        info!("Session registry loaded with {} session(s)", sessions.len());
        Ok(Self { sessions, store })
    }

    /// Applies one status snapshot and returns the resulting registry.
    ///
    /// Known real addresses keep their id and get their metadata refreshed, new
    /// ones get a fresh id, and entries missing from the snapshot are dropped.
    /// The registry is written once, after all changes.
    pub fn reconcile(
        &mut self,
        snapshot: &[RawSession],
    ) -> Result<BTreeMap<String, Session>, StorageError> {
        let now = Utc::now();
        let mut seen = BTreeSet::new();

        for raw in snapshot {
            seen.insert(raw.real_address.clone());
            match self.sessions.get_mut(&raw.real_address) {
                Some(session) => {
                    if session.virtual_address != raw.virtual_address
                        || session.common_name != raw.common_name
                    {
                        info!(
                            "[{}] Session updated: {} ({}) -> {} ({})",
                            raw.real_address,
                            session.virtual_address,
                            session.common_name,
                            raw.virtual_address,
                            raw.common_name
                        );
                        session.virtual_address = raw.virtual_address.clone();
                        session.common_name = raw.common_name.clone();
                    }
                    session.last_seen = now;
                }
                None => {
                    let session =
                        Session::new(&raw.real_address, &raw.virtual_address, &raw.common_name);
                    info!(
                        "[{}] Session created for {} ({}) with id {}",
                        raw.real_address,
                        raw.virtual_address,
                        raw.common_name,
                        session.session_id
                    );
                    self.sessions.insert(raw.real_address.clone(), session);
                }
            }
        }

        self.sessions.retain(|real, session| {
            let keep = seen.contains(real);
            if !keep {
                info!(
                    "[{}] Session {} disconnected ({})",
                    real, session.session_id, session.virtual_address
                );
            }
            keep
        });

        self.persist()?;
        Ok(self.sessions.clone())
    }

    /// Inserts a session with a new id, replacing any entry under the same real address.
    pub fn add(
        &mut self,
        real_address: &str,
        virtual_address: &str,
        common_name: &str,
    ) -> Result<Session, StorageError> {
        let session = Session::new(real_address, virtual_address, common_name);
        match self.sessions.insert(real_address.to_string(), session.clone()) {
            Some(previous) => info!(
                "[{}] Session {} replaced by {}",
                real_address, previous.session_id, session.session_id
            ),
            None => info!(
                "[{}] Session added for {} ({}) with id {}",
                real_address, virtual_address, common_name, session.session_id
            ),
        }
        self.persist()?;
        Ok(session)
    }

    /// Removes the session for `real_address`. `Ok(None)` if there was none.
    pub fn remove(&mut self, real_address: &str) -> Result<Option<Session>, StorageError> {
        let Some(removed) = self.sessions.remove(real_address) else {
            debug!("[{}] No session to remove", real_address);
            return Ok(None);
        };
        info!("[{}] Session {} removed", real_address, removed.session_id);
        self.persist()?;
        Ok(Some(removed))
    }

    pub fn get(&self, real_address: &str) -> Option<&Session> {
        self.sessions.get(real_address)
    }

    pub fn sessions(&self) -> &BTreeMap<String, Session> {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn persist(&self) -> Result<(), StorageError> {
        self.store.save(&self.sessions).map_err(|e| {
            error!("Unable to persist the session registry: {}", e);
            e
        })
    }
}
