use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use crate::auth::claims::Claims;
use crate::auth::user::User;
use crate::config::JwtConfig;
use crate::error::AuthRejection;
use crate::state::AppState;

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            ttl: Duration::from_secs((ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    pub fn sign(&self, user: &User) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: user.id,
            username: user.username.clone(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = user.id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthRejection> {
        let mut validation = Validation::new(Algorithm::HS256);
        // any HMAC variant of the shared secret is fine; everything else,
        // RSA headers included, is an algorithm-substitution attempt
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // no expiry leeway
        validation.leeway = 0;

        // signature and expiry are checked first, the claim shape after, so
        // an expired token reports Expired even when its payload is broken
        let data = decode::<serde_json::Value>(token, &self.decoding, &validation).map_err(|e| {
            warn!(error = %e, "jwt validation failed");
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthRejection::Expired,
                ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => {
                    AuthRejection::MalformedClaims
                }
                _ => AuthRejection::InvalidSignature,
            }
        })?;
        let claims: Claims = serde_json::from_value(data.claims).map_err(|e| {
            warn!(error = %e, "jwt payload has an unexpected shape");
            AuthRejection::MalformedClaims
        })?;
        debug!(user_id = claims.sub, "jwt verified");
        Ok(claims)
    }
}
