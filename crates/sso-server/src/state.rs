//! Application state management.
//!
//! This module defines the shared state that is passed to all request handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sso_protocol_saml::endpoints::PendingRequestStore;
use sso_protocol_saml::ConfigCell;

use crate::actors::SamlActors;
use crate::config::ServerConfig;

/// How long an issued AuthnRequest can be answered.
pub const PENDING_REQUEST_TTL: Duration = Duration::from_secs(10 * 60);

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Current role builders, replaced whole on reload.
    pub actors: Arc<ConfigCell<SamlActors>>,

    /// AuthnRequests issued by the SP role and not yet answered.
    pub pending: Arc<PendingRequests>,
}

impl AppState {
    /// Builds the state, constructing the actors from `config`.
    ///
    /// # Errors
    ///
    /// Fails if the actors cannot be built.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let actors = SamlActors::from_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            actors: Arc::new(ConfigCell::new(actors)),
            pending: Arc::new(PendingRequests::new(PENDING_REQUEST_TTL)),
        })
    }

    /// Rebuilds the actors from the configuration, re-reading metadata files.
    ///
    /// On failure the current actors stay in place.
    ///
    /// # Errors
    ///
    /// Returns the construction error.
    pub fn reload(&self) -> anyhow::Result<()> {
        let actors = SamlActors::from_config(&self.config)?;
        self.actors.replace(actors);
        Ok(())
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// IDs of outstanding AuthnRequests with their issue time.
#[derive(Debug)]
pub struct PendingRequests {
    ttl: Duration,
    issued: Mutex<HashMap<String, Instant>>,
}

impl PendingRequests {
    /// Creates an empty set whose entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            issued: Mutex::new(HashMap::new()),
        }
    }

    /// Remembers a request issued now.
    pub fn insert(&self, request_id: impl Into<String>) {
        self.insert_at(request_id, Instant::now());
    }

    /// Consumes `request_id`, returning true if it was outstanding.
    pub fn take(&self, request_id: &str) -> bool {
        self.take_at(request_id, Instant::now())
    }

    /// Returns true if `request_id` was issued and has not expired.
    pub fn contains(&self, request_id: &str) -> bool {
        self.contains_at(request_id, Instant::now())
    }

    /// Number of entries, expired ones included until the next insert.
    pub fn len(&self) -> usize {
        self.issued.lock().len()
    }

    /// Returns true if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_at(&self, request_id: impl Into<String>, now: Instant) {
        let mut issued = self.issued.lock();
        issued.retain(|_, at| now.duration_since(*at) < self.ttl);
        issued.insert(request_id.into(), now);
    }

    fn contains_at(&self, request_id: &str, now: Instant) -> bool {
        self.issued
            .lock()
            .get(request_id)
            .is_some_and(|at| now.duration_since(*at) < self.ttl)
    }

    fn take_at(&self, request_id: &str, now: Instant) -> bool {
        self.issued
            .lock()
            .remove(request_id)
            .is_some_and(|at| now.duration_since(at) < self.ttl)
    }
}

impl PendingRequestStore for PendingRequests {
    fn is_pending(&self, request_id: &str) -> bool {
        self.contains(request_id)
    }

    fn consume(&self, request_id: &str) -> bool {
        self.take(request_id)
    }
}
