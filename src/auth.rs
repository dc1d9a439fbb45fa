use std::env;
use std::future::Future;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

const AUTH_COOKIE_NAME: &str = "auth_token";

/// Who the caller is. Tokens are issued by the external auth provider;
/// browsing without a token is the Anonymous role.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Donor,
    Organization,
    Anonymous,
}

/// Capability set per role. A pure mapping so view routing never falls back
/// to ad-hoc role string checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub browse_requests: bool,
    pub create_requests: bool,
    pub transition_requests: bool,
    pub make_offers: bool,
    pub edit_profile: bool,
    pub post_stories: bool,
}

pub fn permissions(role: Role) -> Permissions {
    match role {
        Role::Donor => Permissions {
            browse_requests: true,
            create_requests: false,
            transition_requests: false,
            make_offers: true,
            edit_profile: false,
            post_stories: false,
        },
        Role::Organization => Permissions {
            browse_requests: true,
            create_requests: true,
            transition_requests: true,
            make_offers: false,
            edit_profile: true,
            post_stories: true,
        },
        Role::Anonymous => Permissions {
            browse_requests: true,
            create_requests: false,
            transition_requests: false,
            make_offers: false,
            edit_profile: false,
            post_stories: false,
        },
    }
}

// Claims in tokens minted by the auth provider.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
    name: String,
    role: Role,
    iss: Option<String>,
    aud: Option<String>,
}

pub struct AuthenticatedUser {
    pub id: String,
    pub name: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn permissions(&self) -> Permissions {
        permissions(self.role)
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync + 'static,
{
    type Rejection = (StatusCode, String);

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let token = extract_token(parts)
                .ok_or((StatusCode::UNAUTHORIZED, "Missing auth token".to_string()))?;
            let claims = validate_token_str(&token).map_err(|e| {
                tracing::error!("Token error: {}", e);
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            })?;

            Ok(AuthenticatedUser {
                id: claims.sub,
                name: claims.name,
                role: claims.role,
            })
        }
    }
}

/// Optional authentication for endpoints that anonymous visitors may browse.
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl MaybeUser {
    pub fn role(&self) -> Role {
        self.0.as_ref().map(|u| u.role).unwrap_or(Role::Anonymous)
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync + 'static,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            Ok(MaybeUser(
                AuthenticatedUser::from_request_parts(parts, state).await.ok(),
            ))
        }
    }
}

fn validate_token_str(token: &str) -> anyhow::Result<Claims> {
    let secret = env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;

    let mut validation = Validation::default();
    validation.validate_exp = true;
    if let Ok(issuer) = env::var("JWT_ISSUER") {
        validation.set_issuer(&[issuer.as_str()]);
    }
    if let Ok(audience) = env::var("JWT_AUDIENCE") {
        validation.set_audience(&[audience.as_str()]);
    }

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;
    Ok(data.claims)
}

fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(auth_header) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    if let Some(cookie_header) = parts
        .headers
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
    {
        for cookie in cookie_header.split(';') {
            let cookie = cookie.trim();
            if let Some((k, v)) = cookie.split_once('=') {
                if k == AUTH_COOKIE_NAME {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_may_only_browse() {
        let p = permissions(Role::Anonymous);
        assert!(p.browse_requests);
        assert!(!p.create_requests);
        assert!(!p.transition_requests);
        assert!(!p.make_offers);
        assert!(!p.edit_profile);
        assert!(!p.post_stories);
    }

    #[test]
    fn donors_browse_and_offer_but_never_manage_requests() {
        let p = permissions(Role::Donor);
        assert!(p.browse_requests);
        assert!(p.make_offers);
        assert!(!p.create_requests);
        assert!(!p.transition_requests);
        assert!(!p.post_stories);
    }

    #[test]
    fn organizations_manage_their_side_but_do_not_offer() {
        let p = permissions(Role::Organization);
        assert!(p.create_requests);
        assert!(p.transition_requests);
        assert!(p.edit_profile);
        assert!(p.post_stories);
        assert!(!p.make_offers);
    }
}
