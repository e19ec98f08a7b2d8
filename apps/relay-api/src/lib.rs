pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod validator;

use std::sync::Arc;

use auth::tokens::JwtAuthenticator;
use auth::Authenticator;
use config::Config;
use gateway::fanout::RoomBroadcaster;
use gateway::handler::EventGateway;
use gateway::registry::SessionRegistry;
use validator::{BasicValidator, Validator};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<dyn Authenticator>,
    pub sessions: Arc<SessionRegistry>,
    pub broadcaster: RoomBroadcaster,
    pub gateway: Arc<EventGateway>,
}

impl AppState {
    /// Wire the relay services around the given collaborators.
    pub fn new(
        config: Config,
        auth: Arc<dyn Authenticator>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        let sessions = Arc::new(SessionRegistry::new(
            config.outbox_capacity,
            config.overflow_policy,
        ));
        let broadcaster = RoomBroadcaster::new(sessions.clone());
        let gateway = Arc::new(EventGateway::new(
            sessions.clone(),
            broadcaster.clone(),
            validator,
            auth.clone(),
        ));

        Self {
            config: Arc::new(config),
            auth,
            sessions,
            broadcaster,
            gateway,
        }
    }

    /// State backed by the JWT authenticator and the field-level validator.
    pub fn from_config(config: Config) -> Self {
        let auth = Arc::new(JwtAuthenticator::new(&config.jwt_secret));
        let validator = Arc::new(BasicValidator::new(config.max_page));
        Self::new(config, auth, validator)
    }
}
