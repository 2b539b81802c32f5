use axum::{
    body::Body,
    extract::Query,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::debug;

use shared_models::error::AppError;
use shared_models::{Role, User};

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

#[derive(Debug, Deserialize, Default)]
struct IdentityQuery {
    user_id: Option<String>,
    role: Option<String>,
}

// Resolves the calling party from headers, or from the query string for
// WebSocket upgrades where browsers cannot set headers.
pub async fn identity_middleware(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let user = resolve_user(&request)?;
    debug!("Resolved caller {} ({:?})", user.id, user.role);

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn resolve_user<B>(request: &Request<B>) -> Result<User, AppError> {
    let (id, role) = match from_headers(request.headers())? {
        Some(found) => found,
        None => {
            let query = Query::<IdentityQuery>::try_from_uri(request.uri())
                .map(|Query(q)| q)
                .unwrap_or_default();
            match (query.user_id, query.role) {
                (Some(id), Some(role)) => (id, role),
                _ => return Err(AppError::Auth("Missing caller identity".to_string())),
            }
        }
    };

    let id = id.trim().to_string();
    if id.is_empty() {
        return Err(AppError::Auth("Empty caller identity".to_string()));
    }

    let role = Role::parse(&role)
        .ok_or_else(|| AppError::Auth(format!("Unsupported role '{}'", role)))?;

    Ok(User { id, role })
}

fn from_headers(headers: &HeaderMap) -> Result<Option<(String, String)>, AppError> {
    let id = headers.get(USER_ID_HEADER);
    let role = headers.get(USER_ROLE_HEADER);

    match (id, role) {
        (Some(id), Some(role)) => {
            let id = id
                .to_str()
                .map_err(|_| AppError::Auth("Invalid identity header format".to_string()))?;
            let role = role
                .to_str()
                .map_err(|_| AppError::Auth("Invalid role header format".to_string()))?;
            Ok(Some((id.to_string(), role.to_string())))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_resolve_from_headers() {
        let request = Request::builder()
            .uri("/escalations")
            .header(USER_ID_HEADER, "doc-1")
            .header(USER_ROLE_HEADER, "doctor")
            .body(())
            .unwrap();

        let user = resolve_user(&request).unwrap();
        assert_eq!(user.id, "doc-1");
        assert_eq!(user.role, Role::Doctor);
    }

    #[test]
    fn test_resolve_from_query() {
        let request = Request::builder()
            .uri("/realtime/ws?user_id=p-9&role=patient")
            .body(())
            .unwrap();

        let user = resolve_user(&request).unwrap();
        assert_eq!(user.id, "p-9");
        assert_eq!(user.role, Role::Patient);
    }

    #[test]
    fn test_missing_identity_is_rejected() {
        let request = Request::builder().uri("/realtime/ws").body(()).unwrap();
        assert_matches!(resolve_user(&request), Err(AppError::Auth(_)));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let request = Request::builder()
            .uri("/x?user_id=a&role=pharmacist")
            .body(())
            .unwrap();
        assert_matches!(resolve_user(&request), Err(AppError::Auth(_)));
    }
}
