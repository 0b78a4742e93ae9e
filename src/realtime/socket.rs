// src/realtime/socket.rs
//! The `/ws/logs` WebSocket endpoint.
//!
//! Each socket gets three activities: a reader feeding client frames to its [`Connection`], a
//! writer draining the connection's [`Outbound`] queue, and a heartbeat that pings the client every
//! interval. A client that hasn't answered the previous ping by the next tick is disconnected, and
//! so is one whose queue overflows. Whichever way the socket ends, the `Connection` is dropped and
//! its subscriptions are cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_std::future;
use async_std::prelude::{FutureExt, StreamExt};
use async_std::task;
use log::{debug, trace};
use tide_websockets::{Message, WebSocketConnection};

use super::protocol::ServerMessage;
use super::{Connection, Delivery, Outbound, DEFAULT_OUTBOUND_CAPACITY};

/// Default delay between heartbeat pings.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// How long a closing frame may take to reach a client that is being dropped.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Serve one WebSocket client until it disconnects, stops answering pings or falls too far behind.
///
/// # Errors
///
/// Transport errors end the session quietly, so this currently always returns `Ok`.
pub async fn serve(
    delivery: Delivery,
    heartbeat: Duration,
    mut stream: WebSocketConnection,
) -> tide::Result<()> {
    let (outbound, messages, overflow) = Outbound::bounded(DEFAULT_OUTBOUND_CAPACITY);
    let mut connection = Connection::new(delivery, outbound);

    let writer_stream = stream.clone();
    let writer = task::spawn(async move {
        while let Ok(message) = messages.recv().await {
            if let Err(error) = writer_stream.send_json(&message).await {
                debug!("Unable to write to socket: {}", error);
                break;
            }
        }
    });

    let overflowed = async {
        if overflow.recv().await.is_ok() {
            debug!("Closing socket of a client that fell behind");
        }
    };

    let alive = AtomicBool::new(true);
    let pinger = stream.clone();

    let reader = async {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => connection.handle_text(&text).await,
                Ok(Message::Pong(_)) => alive.store(true, Ordering::SeqCst),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(error) => {
                    debug!("Socket read failed: {}", error);
                    break;
                }
            }
        }
    };

    let pings = async {
        loop {
            task::sleep(heartbeat).await;
            if !alive.swap(false, Ordering::SeqCst) {
                debug!("Closing unresponsive socket");
                let _ = pinger.send(Message::Close(None)).await;
                return;
            }
            if pinger.send(Message::Ping(Vec::new())).await.is_err() {
                return;
            }
        }
    };

    reader.race(pings).race(overflowed).await;
    trace!(
        "Socket closed with {} live subscriptions",
        connection.subscription_count()
    );

    let lagging = connection.outbound.overflowed();
    // Cancels every follower, whose callbacks hold the remaining outbound senders.
    drop(connection);
    writer.cancel().await;

    if lagging {
        let notice = ServerMessage::error(None, "too many undelivered messages");
        let _ = future::timeout(CLOSE_GRACE, async {
            let _ = stream.send_json(&notice).await;
            let _ = stream.send(Message::Close(None)).await;
        })
        .await;
    }

    Ok(())
}
