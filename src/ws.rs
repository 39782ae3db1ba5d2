use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRef, Query, State};
use axum::response::Response;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::auth::claims::Claims;
use crate::auth::jwt::JwtKeys;
use crate::error::AuthRejection;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

/// Token-gated websocket endpoint; echoes every frame back to the sender.
/// Browsers cannot set headers on the upgrade request, so the credential
/// arrives as a query parameter instead.
pub async fn handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Result<Response, AuthRejection> {
    let token = match params.token.as_deref() {
        Some(token) if !token.is_empty() => token,
        _ => {
            warn!("websocket connection attempt without a token");
            return Err(AuthRejection::MissingCredential);
        }
    };

    let claims = JwtKeys::from_ref(&state).verify(token)?;
    info!(user_id = claims.sub, username = %claims.username, "websocket authorized");
    Ok(ws.on_upgrade(move |socket| echo(socket, claims)))
}

async fn echo(mut socket: WebSocket, claims: Claims) {
    while let Some(message) = socket.recv().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(user_id = claims.sub, error = %e, "websocket read error");
                break;
            }
        };
        match message {
            Message::Text(_) | Message::Binary(_) => {
                debug!(user_id = claims.sub, "echoing frame");
                if socket.send(message).await.is_err() {
                    warn!(user_id = claims.sub, "websocket write failed");
                    break;
                }
            }
            Message::Close(_) => break,
            // ping/pong is answered by the protocol layer
            _ => {}
        }
    }
    debug!(user_id = claims.sub, "websocket client disconnected");
}
