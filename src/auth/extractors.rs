use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use crate::auth::jwt::JwtKeys;
use crate::error::AuthRejection;

/// Identity carried by a validated bearer token.
#[derive(Debug)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = match parts.headers.get(axum::http::header::AUTHORIZATION) {
            Some(value) => value
                .to_str()
                .map_err(|_| AuthRejection::MalformedCredential)?,
            None => "",
        };
        if header.is_empty() {
            warn!("authorization header is missing");
            return Err(AuthRejection::MissingCredential);
        }

        // strictly "<scheme> <token>", nothing more and nothing less
        let fields: Vec<&str> = header.split_whitespace().collect();
        if fields.len() != 2 {
            warn!("authorization header is not of the form '<scheme> <token>'");
            return Err(AuthRejection::MalformedCredential);
        }

        let scheme = fields[0];
        if !scheme.eq_ignore_ascii_case("bearer") {
            warn!(scheme = %scheme, "unsupported authorization scheme");
            return Err(AuthRejection::UnsupportedScheme(scheme.to_ascii_lowercase()));
        }

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(fields[1])?;
        Ok(AuthUser {
            user_id: claims.sub,
            username: claims.username,
        })
    }
}
