use ulid::Ulid;

/// Numeric room identifier, assigned by the review service that owns rooms.
pub type RoomId = i64;

/// Numeric user identifier, carried in the `sub` claim of access tokens.
pub type UserId = i64;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = relay_common::id::prefixed_ulid("ses");
/// assert!(id.starts_with("ses_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Generates a fresh gateway session ID.
pub fn session_id() -> String {
    prefixed_ulid(prefix::SESSION)
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const SESSION: &str = "ses";
}
