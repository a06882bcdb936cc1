use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::{authenticate, ACCESS_COOKIE},
    models::session::AuthUser,
    services::notifications::{course_room, user_room, ClientFrame, ConnectionId},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// Picks the access token: `?token=`, then the `token` header, then the
/// access cookie.
fn socket_token(query: &SocketQuery, headers: &HeaderMap, cookies: &Cookies) -> Option<String> {
    let non_empty = |token: String| Some(token).filter(|t| !t.trim().is_empty());

    query
        .token
        .clone()
        .and_then(non_empty)
        .or_else(|| {
            headers
                .get("token")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .and_then(non_empty)
        })
        .or_else(|| {
            cookies
                .get(ACCESS_COOKIE)
                .map(|cookie| cookie.value().to_string())
                .and_then(non_empty)
        })
}

/// Authenticates, then upgrades to the notification socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<SocketQuery>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Response> {
    let token = socket_token(&query, &headers, &cookies)
        .ok_or_else(|| AppError::Authentication("Authentication error".to_string()))?;
    let user = authenticate(&state, &token)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, user: AuthUser) {
    let hub = state.notifications.clone();
    let (id, mut outbound) = hub.connect();
    hub.join(id, user_room(user.id));
    tracing::info!(
        "🔌 Socket {} connected for user {} ({} open)",
        id,
        user.id,
        hub.connection_count()
    );

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::warn!("websocket receive error: {e}");
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => handle_client_frame(&state, id, text.as_str()),
                    Message::Ping(data) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    Message::Binary(_) | Message::Pong(_) => {}
                }
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if socket.send(Message::Text(frame.as_ref().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.disconnect(id);
    tracing::info!("🔌 Socket {} disconnected", id);
}

/// Applies a room subscription request. Unknown or malformed frames are
/// logged and ignored.
fn handle_client_frame(state: &AppState, id: ConnectionId, text: &str) {
    let frame: ClientFrame = match sonic_rs::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!("Ignoring malformed frame on socket {}: {}", id, e);
            return;
        }
    };

    let course_id = frame.data.as_deref().and_then(|raw| Uuid::parse_str(raw.trim()).ok());

    match (frame.event.as_str(), course_id) {
        ("join-course", Some(course_id)) => {
            let room = course_room(course_id);
            state.notifications.join(id, room.clone());
            tracing::debug!(
                "Socket {} joined course {} ({} listening)",
                id,
                course_id,
                state.notifications.room_size(&room)
            );
        }
        ("leave-course", Some(course_id)) => {
            state.notifications.leave(id, &course_room(course_id));
            tracing::debug!("Socket {} left course {}", id, course_id);
        }
        (event, _) => tracing::debug!("Ignoring {:?} frame on socket {}", event, id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn query_token_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert("token", HeaderValue::from_static("from-header"));
        let cookies = Cookies::default();

        let query = SocketQuery {
            token: Some("from-query".to_string()),
        };
        assert_eq!(
            socket_token(&query, &headers, &cookies).as_deref(),
            Some("from-query")
        );

        let empty = SocketQuery {
            token: Some("  ".to_string()),
        };
        assert_eq!(
            socket_token(&empty, &headers, &cookies).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn missing_token_is_none() {
        let cookies = Cookies::default();
        assert_eq!(
            socket_token(&SocketQuery::default(), &HeaderMap::new(), &cookies),
            None
        );
    }
}
