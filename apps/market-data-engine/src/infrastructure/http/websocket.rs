//! Price stream endpoint (`GET /ws`).
//!
//! On upgrade the subscriber receives `INITIAL_PRICES`, then every
//! `PRICE_UPDATE` the broadcaster emits. Inbound frames other than close
//! are ignored.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::state::SharedAppState;
use crate::domain::streaming::{PriceMap, PriceMessage};
use crate::infrastructure::broadcast::SubscriberState;

/// `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedAppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedAppState) {
    tracing::debug!(
        state = SubscriberState::Connecting.as_str(),
        "Stream subscriber connecting"
    );

    let initial = match state.prices.prices(state.default_symbols()).await {
        Ok(list) => list.prices,
        Err(e) => {
            tracing::warn!(error = %e, "No initial prices for new subscriber");
            PriceMap::new()
        }
    };

    let subscription = state.hub.subscribe(PriceMessage::InitialPrices(initial));
    let id = subscription.id;
    tracing::info!(
        subscriber = %id,
        state = SubscriberState::Open.as_str(),
        subscribers = state.hub.subscriber_count(),
        "Stream subscriber open"
    );

    let closed = pump(socket, subscription.receiver).await;
    state.hub.deregister(id);

    tracing::info!(subscriber = %id, state = closed.as_str(), "Stream subscriber closed");
}

/// Forward queued messages to the socket until either side ends.
async fn pump(socket: WebSocket, mut queue: mpsc::Receiver<PriceMessage>) -> SubscriberState {
    let (mut sink, mut inbound) = socket.split();

    loop {
        tokio::select! {
            outbound = queue.recv() => {
                // The hub dropped our sender: eviction after a failed send.
                let Some(message) = outbound else {
                    let _ = sink.send(Message::Close(None)).await;
                    return SubscriberState::ClosedError;
                };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode price message");
                        return SubscriberState::ClosedError;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::debug!(error = %e, "Stream send failed");
                    return SubscriberState::ClosedError;
                }
            }
            frame = inbound.next() => match frame {
                Some(Ok(Message::Close(_))) | None => return SubscriberState::ClosedClean,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Stream receive failed");
                    return SubscriberState::ClosedError;
                }
            },
        }
    }
}
