use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use log::*;
use realtime::auth::{authenticate, AuthConfig, RawHandshake};
use realtime::manager::{FanoutEvent, Manager};
use realtime::message::{ClientMessage, Event};
use realtime::registry::ConnectionId;
use realtime::Id;
use serde::Deserialize;
use service::AppState;
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
pub(crate) struct WsParams {
    /// Token presented as an explicit handshake field. Browsers that rely
    /// on the session cookie omit it.
    token: Option<String>,
}

/// WebSocket upgrade handler: the realtime connection entry point.
///
/// Authentication happens during the handshake; a connection is either
/// admitted or refused here, never upgraded unauthenticated and promoted
/// later. Rejection is a generic 401 with no detail about which check
/// failed, and is terminal for this attempt - the client must reconnect.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(app_state): State<AppState>,
) -> Response {
    let handshake = RawHandshake {
        auth_token: params.token.or_else(|| bearer_token(&headers)),
        cookie_header: headers
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    };

    let auth_config = AuthConfig {
        require_credential: app_state.config.require_socket_credential(),
        ..AuthConfig::default()
    };

    let outcome = match authenticate(&auth_config, &handshake) {
        Ok(outcome) => outcome,
        Err(e) => {
            debug!("Rejected socket handshake: {e}");
            return crate::Error::from(e).into_response();
        }
    };

    let identity = outcome.identity().cloned();
    ws.on_upgrade(move |socket| handle_socket(socket, identity, app_state))
}

/// Per-connection task: register, seed rooms, then pump frames both ways
/// until the transport closes.
async fn handle_socket(socket: WebSocket, identity: Option<Id>, app_state: AppState) {
    let manager = app_state.realtime_manager.clone();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection_id = manager.register_connection(identity.clone(), tx);

    // Seed conversation rooms from durable participant records. Awaited
    // inside this connection's task only; other handshakes are not blocked.
    if let Some(identity) = &identity {
        manager
            .seed_participant_rooms(&connection_id, identity, app_state.participant_source.as_ref())
            .await;
    }

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(frame) => {
                        if sink.send(frame).await.is_err() {
                            break;
                        }
                    }
                    // Registry entry gone; nothing more will arrive
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_frame(&manager, &connection_id, identity.as_deref(), &text);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/ping/pong frames: nothing to do
                    Some(Err(e)) => {
                        debug!("Socket read error on {}: {e}", connection_id.as_str());
                        break;
                    }
                }
            }
        }
    }

    // Exactly one teardown per connection, regardless of which side closed.
    manager.unregister_connection(&connection_id);
    debug!("Socket connection {} closed", connection_id.as_str());
}

/// Handle one inbound client frame. Malformed frames are logged and
/// dropped; the connection stays open.
fn handle_client_frame(
    manager: &Manager,
    connection_id: &ConnectionId,
    identity: Option<&str>,
    text: &str,
) {
    let frame: ClientMessage = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("Ignoring unparseable client frame: {e}");
            return;
        }
    };

    match frame {
        ClientMessage::JoinConversation { conversation_id } => {
            if conversation_id.is_empty() {
                return;
            }

            manager.join_room(connection_id, &conversation_id);

            // Tell the room a user joined, but don't echo to the joiner
            manager.dispatch(
                FanoutEvent::to_rooms(
                    Event::UserJoined {
                        conversation_id: conversation_id.clone(),
                        user_id: identity.map(str::to_string),
                        timestamp: Utc::now().to_rfc3339(),
                    },
                    [conversation_id],
                )
                .excluding(connection_id.clone()),
            );
        }
        ClientMessage::LeaveConversation { conversation_id } => {
            if conversation_id.is_empty() {
                return;
            }

            manager.leave_room(connection_id, &conversation_id);
        }
        ClientMessage::Ping => {
            manager.send_to_connection(
                connection_id,
                Event::Pong {
                    timestamp: Utc::now().to_rfc3339(),
                },
            );
        }
    }
}

/// Extract a bearer token from the `Authorization` header, if present.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value);
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn recv_event(rx: &mut UnboundedReceiver<Message>) -> Option<Event> {
        match rx.try_recv() {
            Ok(Message::Text(text)) => Some(serde_json::from_str(&text).unwrap()),
            Ok(other) => panic!("expected text frame, got {other:?}"),
            Err(_) => None,
        }
    }

    #[test]
    fn bearer_token_strips_the_scheme_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn bearer_token_absent_when_no_header() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn join_frame_joins_and_notifies_other_members_only() {
        let manager = Manager::new();
        let (joiner_tx, mut joiner_rx) = mpsc::unbounded_channel();
        let joiner = manager.register_connection(Some("u1".to_string()), joiner_tx);
        let (member_tx, mut member_rx) = mpsc::unbounded_channel();
        let member = manager.register_connection(Some("u2".to_string()), member_tx);
        manager.join_room(&member, &"conv1".to_string());

        handle_client_frame(
            &manager,
            &joiner,
            Some("u1"),
            r#"{"type":"JOIN_CONVERSATION","payload":{"conversationId":"conv1"}}"#,
        );

        assert!(manager
            .registry()
            .members_of(&"conv1".to_string())
            .contains(&joiner));
        match recv_event(&mut member_rx) {
            Some(Event::UserJoined { user_id, .. }) => {
                assert_eq!(user_id.as_deref(), Some("u1"));
            }
            other => panic!("expected UserJoined, got {other:?}"),
        }
        assert_eq!(recv_event(&mut joiner_rx), None);
    }

    #[test]
    fn leave_frame_removes_membership() {
        let manager = Manager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = manager.register_connection(Some("u1".to_string()), tx);
        manager.join_room(&conn, &"conv1".to_string());

        handle_client_frame(
            &manager,
            &conn,
            Some("u1"),
            r#"{"type":"LEAVE_CONVERSATION","payload":{"conversationId":"conv1"}}"#,
        );

        assert!(manager.registry().members_of(&"conv1".to_string()).is_empty());
    }

    #[test]
    fn ping_frame_gets_a_pong_on_the_same_connection_only() {
        let manager = Manager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = manager.register_connection(Some("u1".to_string()), tx);
        let (other_tx, mut other_rx) = mpsc::unbounded_channel();
        let _other = manager.register_connection(Some("u2".to_string()), other_tx);

        handle_client_frame(&manager, &conn, Some("u1"), r#"{"type":"PING"}"#);

        assert!(matches!(recv_event(&mut rx), Some(Event::Pong { .. })));
        assert_eq!(recv_event(&mut other_rx), None);
    }

    #[test]
    fn garbage_frame_is_ignored() {
        let manager = Manager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = manager.register_connection(Some("u1".to_string()), tx);

        handle_client_frame(&manager, &conn, Some("u1"), "not json at all");

        assert_eq!(recv_event(&mut rx), None);
        assert!(manager.registry().rooms_of(&conn).len() == 1); // personal room only
    }
}
