use axum::Router;
use jsonwebtoken::{Algorithm, EncodingKey, Header};

use relay_api::auth::tokens::AccessClaims;
use relay_api::config::Config;
use relay_api::gateway::session::OverflowPolicy;
use relay_api::AppState;

/// Shared secret the test state verifies tokens with.
pub const TEST_SECRET: &str = "relay-test-secret";

/// Highest page the test validator accepts.
pub const TEST_MAX_PAGE: i32 = 50;

pub fn test_config() -> Config {
    Config {
        jwt_secret: TEST_SECRET.to_string(),
        port: 0,
        outbox_capacity: 1024,
        overflow_policy: OverflowPolicy::DropOldest,
        max_page: Some(TEST_MAX_PAGE),
        heartbeat_interval_ms: 41250,
    }
}

/// Build a test AppState with the JWT authenticator and field validator.
pub fn test_state() -> AppState {
    AppState::from_config(test_config())
}

/// Build the full application router wired to the test state.
pub fn test_app() -> (Router, AppState) {
    test_app_with(test_config())
}

/// Build the application router around a caller-supplied config.
#[allow(dead_code)]
pub fn test_app_with(config: Config) -> (Router, AppState) {
    let state = AppState::from_config(config);
    let app = relay_api::routes::router().with_state(state.clone());
    (app, state)
}

fn mint(user_id: i64, exp: i64) -> String {
    let claims = AccessClaims {
        sub: user_id.to_string(),
        exp,
        iat: Some(chrono::Utc::now().timestamp()),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

/// Mint an access token valid for five minutes.
pub fn mint_token(user_id: i64) -> String {
    mint(user_id, (chrono::Utc::now() + chrono::Duration::seconds(300)).timestamp())
}

/// Mint an access token that expired ten minutes ago.
pub fn mint_expired_token(user_id: i64) -> String {
    mint(user_id, (chrono::Utc::now() - chrono::Duration::seconds(600)).timestamp())
}
