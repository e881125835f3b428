use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, header, request::Parts},
};
use sha2::{Digest, Sha256};

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::{Identity, Session},
    repository::Repository,
    session::SessionStore,
};

/// Path prefix reserved for administrators.
pub const ADMIN_PREFIX: &str = "/admin";

// --- Credential Verifier ---

/// Lowercase hex SHA-256 of the password, the format stored in `credentials.password_hash`.
pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// authenticate
///
/// Verifies `login`/`password` against the stored credential and, on a match, mints a
/// session bound to the credential's identity.
///
/// * `NotFound` when no credential has this login.
/// * `InvalidCredentials` when the password does not match. No session is minted.
///
/// Setting the cookie is left to the caller.
pub async fn authenticate(
    repo: &dyn Repository,
    sessions: &dyn SessionStore,
    login: &str,
    password: &str,
) -> Result<Session, AppError> {
    let credential = repo
        .get_credential(login)
        .await?
        .ok_or(AppError::NotFound("credential"))?;

    let submitted = hash_password(password);
    if !constant_time_eq(submitted.as_bytes(), credential.password_hash.as_bytes()) {
        tracing::info!(login, "password mismatch");
        return Err(AppError::InvalidCredentials);
    }

    let session = sessions.create(credential.identity_id).await?;
    tracing::info!(identity_id = credential.identity_id, "authenticated");
    Ok(session)
}

// --- Access Guard ---

/// Whether `path` lies under the admin prefix. Matches whole segments only:
/// `/admin` and `/admin/votings` do, `/administration` does not.
pub fn is_admin_path(path: &str) -> bool {
    match path.strip_prefix(ADMIN_PREFIX) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// authorize
///
/// Resolves `token` to an identity and applies the role rule for `path`.
///
/// 1. No token, or a token the session store does not know: `Unauthenticated`.
/// 2. Identity lookup through the repository (one lookup per request, no caching). A
///    session whose identity has since disappeared is treated as `Unauthenticated`.
/// 3. Admin paths require `Role::Admin`, otherwise `Forbidden`. Every other path is open to
///    any authenticated identity.
pub async fn authorize(
    sessions: &dyn SessionStore,
    repo: &dyn Repository,
    token: Option<&str>,
    path: &str,
) -> Result<Identity, AppError> {
    let token = token.ok_or(AppError::Unauthenticated)?;

    let identity_id = sessions
        .resolve(token)
        .await
        .ok_or(AppError::Unauthenticated)?;

    let identity = repo.get_identity(identity_id).await?.ok_or_else(|| {
        tracing::warn!(identity_id, "session refers to a missing identity");
        AppError::Unauthenticated
    })?;

    if is_admin_path(path) && !identity.is_admin() {
        tracing::warn!(identity_id, path, "non-admin identity on admin path");
        return Err(AppError::Forbidden);
    }

    Ok(identity)
}

// --- Token Transport ---

/// extract_token
///
/// Reads the session token from the named cookie, falling back to an
/// `Authorization: Bearer <token>` header.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    })
}

/// `Set-Cookie` value issuing the session token.
pub fn session_cookie(config: &AppConfig, token: &str) -> Option<HeaderValue> {
    let secure = if config.env == Env::Production { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax{}",
        config.session_cookie, token, secure
    ))
    .ok()
}

/// `Set-Cookie` value that makes the client drop the session cookie.
pub fn cleared_session_cookie(config: &AppConfig) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        config.session_cookie
    ))
    .ok()
}

/// Identity Extractor Implementation
///
/// Handlers behind the access guard take `Identity` as an argument. The guard stores the
/// resolved identity in the request extensions; this extractor hands it over as a typed
/// value. Reaching a handler without it (a route registered outside the guard) rejects with
/// `Unauthenticated` rather than running unauthenticated.
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(AppError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_is_lowercase_hex_sha256() {
        assert_eq!(
            hash_password("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[test]
    fn admin_prefix_matches_whole_segments() {
        assert!(is_admin_path("/admin"));
        assert!(is_admin_path("/admin/votings/3"));
        assert!(!is_admin_path("/administration"));
        assert!(!is_admin_path("/votings/1/questions/answers"));
        assert!(!is_admin_path("/"));
    }

    #[test]
    fn token_prefers_cookie_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(extract_token(&headers, "session").as_deref(), Some("abc"));

        headers.remove(header::COOKIE);
        assert_eq!(extract_token(&headers, "session").as_deref(), Some("xyz"));

        headers.remove(header::AUTHORIZATION);
        assert_eq!(extract_token(&headers, "session"), None);
    }
}
