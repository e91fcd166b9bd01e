//! Push channel
//!
//! Full-duplex WebSocket endpoint that fans progress-bus events out to
//! connected clients. A client may identify with a user id; events
//! scoped to other users are filtered at this edge. Delivery is
//! best-effort: lagging connections skip dropped events.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Identify {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

/// GET /ws
pub async fn upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut incoming) = socket.split();
    let mut events = BroadcastStream::new(state.bus.subscribe());

    // Set once the client identifies; used to filter scoped events
    let mut identified_user: Option<String> = None;

    info!("Push channel client connected");

    loop {
        tokio::select! {
            message = incoming.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Identify { user_id }) => {
                                debug!(user_id = %user_id, "Push channel client identified");
                                identified_user = Some(user_id);
                            }
                            Err(_) => {
                                debug!("Ignoring unrecognized client message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "Push channel receive error");
                        break;
                    }
                }
            }
            event = events.next() => {
                match event {
                    Some(Ok(event)) => {
                        if !visible_to(&event.user_id, &identified_user) {
                            continue;
                        }

                        let payload = json!({
                            "event": event.channel,
                            "scopeId": event.scope_id,
                            "timestamp": event.timestamp,
                            "data": event.payload,
                        });

                        if sink
                            .send(Message::Text(payload.to_string().into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        // Slow subscriber; drop and continue
                        warn!(skipped, "Push channel client lagged, events dropped");
                    }
                    None => break,
                }
            }
        }
    }

    info!("Push channel client disconnected");
}

/// Events without a user scope go to everyone; scoped events only go to
/// the matching identified client
fn visible_to(event_user: &Option<String>, identified: &Option<String>) -> bool {
    match event_user {
        None => true,
        Some(owner) => identified.as_deref() == Some(owner.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unscoped_events_reach_everyone() {
        assert!(visible_to(&None, &None));
        assert!(visible_to(&None, &Some("u".to_string())));
    }

    #[test]
    fn test_scoped_events_filtered_by_identity() {
        let owner = Some("u".to_string());
        assert!(visible_to(&owner, &Some("u".to_string())));
        assert!(!visible_to(&owner, &Some("other".to_string())));
        assert!(!visible_to(&owner, &None));
    }
}
