use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::ApiState;
use crate::channel::{ChannelRegistry, Topic, TopicEvent};
use crate::models::{LocationSample, TripTrackingStatus};

/// Client subscription message
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ClientMessage {
    /// Subscribe to topics on a trip; replaces any previous subscription set
    Subscribe {
        trip_id: String,
        topics: Vec<TopicRequest>,
    },
    /// Drop every subscription on this connection
    UnsubscribeAll,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "topic")]
#[serde(rename_all = "snake_case")]
enum TopicRequest {
    /// One subject's live location
    SubjectLocation { subject_id: String },
    /// Every tracked subject on the trip, delivered as full snapshots
    Locations,
    /// The trip's tracking-status record
    Status,
}

/// Server message sent to clients
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ServerMessage {
    /// Initial connection acknowledgment
    Connected { message: String },
    /// A single subject's location changed
    Location { sample: LocationSample },
    /// Snapshot of every tracked subject on the trip
    Locations {
        trip_id: String,
        samples: Vec<LocationSample>,
    },
    /// The trip's status record changed
    Status { status: TripTrackingStatus },
    /// Error message
    Error { message: String },
}

/// WebSocket endpoint for live trip updates
pub async fn ws_trips(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ApiState) {
    let (mut sender, mut receiver) = socket.split();

    // Each connection owns its registry, so its subscriptions die with it.
    let registry = ChannelRegistry::new(state.store.clone());
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let connected = ServerMessage::Connected {
        message: "Connected to trip updates. Send a subscribe message with trip_id and topics."
            .to_string(),
    };
    let _ = out_tx.send(connected);

    // Forward everything the topic handlers produce to the socket.
    let forward_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize ws message"),
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Subscribe { trip_id, topics }) => {
                    registry.unsubscribe_all();
                    for topic in topics {
                        open_topic(&registry, &out_tx, &trip_id, topic);
                    }
                    send_snapshot(&state, &out_tx, &trip_id).await;
                }
                Ok(ClientMessage::UnsubscribeAll) => {
                    registry.unsubscribe_all();
                }
                Err(e) => {
                    debug!(error = %e, "unparseable ws client message");
                    let _ = out_tx.send(ServerMessage::Error {
                        message: format!("Invalid message: {e}"),
                    });
                }
            },
            Ok(Message::Ping(_)) => {
                // Axum handles pong automatically
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Cleanup
    registry.unsubscribe_all();
    forward_task.abort();
}

fn open_topic(
    registry: &ChannelRegistry,
    out_tx: &mpsc::UnboundedSender<ServerMessage>,
    trip_id: &str,
    request: TopicRequest,
) {
    let topic = match request {
        TopicRequest::SubjectLocation { subject_id } => Topic::SubjectLocation {
            trip_id: trip_id.to_string(),
            subject_id,
        },
        TopicRequest::Locations => Topic::TripLocations {
            trip_id: trip_id.to_string(),
        },
        TopicRequest::Status => Topic::TripStatus {
            trip_id: trip_id.to_string(),
        },
    };

    let out_tx = out_tx.clone();
    let snapshot_trip = trip_id.to_string();
    registry.subscribe(
        topic,
        Arc::new(move |event| {
            let msg = match event {
                TopicEvent::Location(sample) => ServerMessage::Location { sample },
                TopicEvent::LocationSet(samples) => ServerMessage::Locations {
                    trip_id: snapshot_trip.clone(),
                    samples,
                },
                TopicEvent::Status(status) => ServerMessage::Status { status },
            };
            let _ = out_tx.send(msg);
        }),
    );
}

/// Current state of the trip, sent right after a subscribe so the client
/// does not have to wait for the next change to render.
async fn send_snapshot(
    state: &ApiState,
    out_tx: &mpsc::UnboundedSender<ServerMessage>,
    trip_id: &str,
) {
    match state.store.list_locations(trip_id).await {
        Ok(samples) => {
            let _ = out_tx.send(ServerMessage::Locations {
                trip_id: trip_id.to_string(),
                samples,
            });
        }
        Err(e) => warn!(trip_id, error = %e, "ws snapshot location query failed"),
    }
    match state.store.get_trip_status(trip_id).await {
        Ok(Some(status)) => {
            let _ = out_tx.send(ServerMessage::Status { status });
        }
        Ok(None) => {}
        Err(e) => warn!(trip_id, error = %e, "ws snapshot status query failed"),
    }
}
