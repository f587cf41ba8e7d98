//! Account-level helpers: email normalization and profile fallbacks.

/// Base URL of the generated-avatar service used when a user has no picture.
pub const AVATAR_FALLBACK_BASE: &str = "https://api.dicebear.com/7.x/avataaars/svg";

/// Initial value of `users.token_version` for every new account.
pub const INITIAL_TOKEN_VERSION: i32 = 1;

/// Normalize an email for lookup and uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Display name used when signup does not supply one: the local part of the
/// (normalized) email address.
pub fn default_display_name(normalized_email: &str) -> String {
    normalized_email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .unwrap_or(normalized_email)
        .to_string()
}

/// Resolve the avatar to show for a user.
///
/// Falls back to a deterministic generated avatar keyed by email, so the same
/// account always renders the same picture.
pub fn avatar_or_fallback(avatar: Option<&str>, email: &str) -> String {
    match avatar.map(str::trim).filter(|a| !a.is_empty()) {
        Some(url) => url.to_string(),
        None => format!("{AVATAR_FALLBACK_BASE}?seed={}", urlencoding::encode(email)),
    }
}
