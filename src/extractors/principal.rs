//! Extract the calling principal from request extensions or identity headers.

use crate::service::Principal;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

/// Header carrying the principal id. Default: `X-Principal-Id`.
pub const PRINCIPAL_ID_HEADER: &str = "X-Principal-Id";
/// Comma-separated roles of the principal.
pub const PRINCIPAL_ROLES_HEADER: &str = "X-Principal-Roles";

/// Optional principal. A [`Principal`] inserted into the request extensions by upstream
/// middleware wins over the headers.
#[derive(Clone, Debug, Default)]
pub struct MaybePrincipal(pub Option<Principal>);

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybePrincipal
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(p) = parts.extensions.get::<Principal>() {
            return Ok(MaybePrincipal(Some(p.clone())));
        }
        let principal = header_str(&parts.headers, PRINCIPAL_ID_HEADER).map(|id| {
            let roles = header_str(&parts.headers, PRINCIPAL_ROLES_HEADER)
                .map(|r| {
                    r.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            Principal {
                id: id.to_string(),
                roles,
            }
        });
        Ok(MaybePrincipal(principal))
    }
}
