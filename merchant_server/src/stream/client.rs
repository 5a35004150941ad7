//! The websocket driver for the notification stream.
//!
//! This task owns the socket and feeds the [`StreamLifecycle`] state machine; every dial, ping and reconnect
//! decision comes out of the state machine rather than ad-hoc flags. Incoming notification frames are stamped
//! with [`Channel::Stream`] and forwarded into the sink; the consumer on the other end pushes them through the
//! reconciliation engine exactly like webhook deliveries.

use futures::{SinkExt, StreamExt};
use log::*;
use reconciliation_engine::events::{Channel, NotificationEvent};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::{
    config::StreamConfig,
    stream::{
        protocol::{ClientFrame, ServerFrame},
        StreamAction,
        StreamInput,
        StreamLifecycle,
        StreamState,
    },
};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Starts the stream client. The task runs until `shutdown` fires; do not await the handle before then.
pub fn spawn_stream_client(
    config: StreamConfig,
    sink: mpsc::Sender<NotificationEvent>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run(config, sink, shutdown))
}

async fn run(config: StreamConfig, sink: mpsc::Sender<NotificationEvent>, mut shutdown: watch::Receiver<bool>) {
    let mut lifecycle = StreamLifecycle::new();
    // The token travels as a query parameter. Never log the full url.
    let url = format!("{}?token={}", config.url, config.token.reveal());
    lifecycle.handle(StreamInput::ConnectRequested);
    loop {
        info!("📡️ Connecting to notification stream at {}", config.url);
        let connection = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                lifecycle.handle(StreamInput::DisconnectRequested);
                break;
            },
            connection = connect_async(&url) => connection,
        };
        match connection {
            Ok((ws, _)) => {
                if lifecycle.handle(StreamInput::ConnectionEstablished) == StreamAction::Subscribe {
                    run_session(ws, &config, &sink, &mut lifecycle, &mut shutdown).await;
                }
            },
            Err(e) => {
                warn!("📡️ Could not connect to the notification stream: {e}");
                lifecycle.handle(StreamInput::ConnectionLost);
            },
        }
        if lifecycle.state() == StreamState::Stopped {
            break;
        }
        // State is AwaitingReconnect here; the sleep below is the single reconnect timer.
        info!("📡️ Reconnecting to the notification stream in {}s", config.reconnect_delay.as_secs());
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                lifecycle.handle(StreamInput::DisconnectRequested);
                break;
            },
            _ = time::sleep(config.reconnect_delay) => {
                lifecycle.handle(StreamInput::ReconnectDue);
            },
        }
    }
    info!("📡️ Notification stream client stopped");
}

async fn run_session(
    mut ws: WsStream,
    config: &StreamConfig,
    sink: &mpsc::Sender<NotificationEvent>,
    lifecycle: &mut StreamLifecycle,
    shutdown: &mut watch::Receiver<bool>,
) {
    info!("📡️ Notification stream connected");
    if let Err(e) = send_frame(&mut ws, &ClientFrame::subscribe_all()).await {
        warn!("📡️ Could not subscribe to notifications: {e}");
        lifecycle.handle(StreamInput::ConnectionLost);
        return;
    }
    let mut ping = time::interval_at(time::Instant::now() + config.ping_interval, config.ping_interval);
    ping.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                lifecycle.handle(StreamInput::DisconnectRequested);
                let _ = ws.close(None).await;
                return;
            },
            _ = ping.tick() => {
                match lifecycle.handle(StreamInput::PingDue) {
                    StreamAction::SendPing => {
                        if let Err(e) = send_frame(&mut ws, &ClientFrame::Ping).await {
                            warn!("📡️ Could not send keepalive ping: {e}");
                            lifecycle.handle(StreamInput::ConnectionLost);
                            return;
                        }
                    },
                    StreamAction::CloseConnection => {
                        warn!("📡️ No pong received within the keepalive interval. Dropping the connection.");
                        let _ = ws.close(None).await;
                        return;
                    },
                    _ => {},
                }
            },
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => handle_frame(&text, lifecycle, sink).await,
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    },
                    Some(Ok(Message::Close(reason))) => {
                        info!("📡️ The gateway closed the stream: {reason:?}");
                        lifecycle.handle(StreamInput::ConnectionLost);
                        return;
                    },
                    Some(Ok(_)) => {},
                    Some(Err(e)) => {
                        warn!("📡️ Notification stream error: {e}");
                        lifecycle.handle(StreamInput::ConnectionLost);
                        return;
                    },
                    None => {
                        info!("📡️ Notification stream closed");
                        lifecycle.handle(StreamInput::ConnectionLost);
                        return;
                    },
                }
            },
        }
    }
}

async fn handle_frame(text: &str, lifecycle: &mut StreamLifecycle, sink: &mpsc::Sender<NotificationEvent>) {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(ServerFrame::Connected { connection_id }) => {
            info!("📡️ Stream session established ({})", connection_id.as_deref().unwrap_or("no connection id"));
        },
        Ok(ServerFrame::Subscribed { events }) => {
            info!("📡️ Subscribed to events: {}", events.join(", "));
        },
        Ok(ServerFrame::Pong) => {
            lifecycle.handle(StreamInput::PongReceived);
        },
        Ok(ServerFrame::Notification { data, .. }) => {
            debug!("📡️ {} notification for invoice {}", data.event, data.invoice_id);
            let event = data.from_channel(Channel::Stream);
            if sink.send(event).await.is_err() {
                warn!("📡️ The notification consumer has gone away. Dropping event.");
            }
        },
        Ok(ServerFrame::InvoiceStatus { invoice }) => {
            debug!("📡️ Invoice status frame: {invoice}");
        },
        Ok(ServerFrame::Error { message }) => {
            warn!("📡️ The gateway reported a stream error: {message}");
        },
        Ok(ServerFrame::Unknown) => {
            debug!("📡️ Ignoring unknown stream frame: {text}");
        },
        Err(e) => {
            warn!("📡️ Could not parse stream frame ({e}): {text}");
        },
    }
}

async fn send_frame(ws: &mut WsStream, frame: &ClientFrame) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let text = serde_json::to_string(frame)
        .map_err(|e| tokio_tungstenite::tungstenite::Error::Io(std::io::Error::other(e)))?;
    ws.send(Message::Text(text)).await
}
