use super::{ConnectionConfig, Connector, Link, TransportEvent};
use crate::state::{EventSender, SessionEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{connect_async, tungstenite};

pub struct WsConnector;

impl Connector for WsConnector {
    fn name(&self) -> &str {
        "websocket"
    }

    fn open(&self, config: &ConnectionConfig, attempt: u64, events: EventSender) -> Link {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let task = tokio::spawn(run_link(config.clone(), attempt, outbound_rx, events));
        Link::new(outbound_tx, Some(task))
    }
}

fn build_ws_request(
    config: &ConnectionConfig,
) -> Result<tungstenite::http::Request<()>, String> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| format!("Failed to build request: {}", e))?;

    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| format!("Invalid header name '{}': {}", name, e))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| format!("Invalid header value for '{}': {}", name, e))?;
        request.headers_mut().insert(name, value);
    }

    Ok(request)
}

fn emit(events: &EventSender, attempt: u64, event: TransportEvent) {
    let _ = events.send(SessionEvent::Transport { attempt, event });
}

async fn run_link(
    config: ConnectionConfig,
    attempt: u64,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    events: EventSender,
) {
    let request = match build_ws_request(&config) {
        Ok(req) => req,
        Err(e) => {
            log::error!("[transport] {}", e);
            emit(&events, attempt, TransportEvent::Closed { reason: Some(e) });
            return;
        }
    };

    log::debug!("[transport] attempt {} dialing {}", attempt, config.url);
    let ws_stream = match connect_async(request).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            log::warn!("[transport] attempt {} failed to connect: {}", attempt, e);
            emit(
                &events,
                attempt,
                TransportEvent::Closed {
                    reason: Some(e.to_string()),
                },
            );
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    emit(&events, attempt, TransportEvent::Opened);

    let reason = loop {
        tokio::select! {
            out = outbound_rx.recv() => {
                let Some(text) = out else {
                    let _ = ws_tx.close().await;
                    break None;
                };
                if let Err(e) = ws_tx.send(tungstenite::Message::Text(text.into())).await {
                    log::warn!("[transport] send failed: {}", e);
                    break Some(e.to_string());
                }
            }
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        log::warn!("[transport] websocket error: {}", e);
                        break Some(e.to_string());
                    }
                    None => break None,
                };
                match msg {
                    tungstenite::Message::Text(text) => {
                        emit(&events, attempt, TransportEvent::Frame(text.to_string()));
                    }
                    tungstenite::Message::Close(frame) => {
                        break frame.map(|f| format!("{} {}", f.code, f.reason));
                    }
                    _ => continue,
                }
            }
        }
    };

    emit(&events, attempt, TransportEvent::Closed { reason });
}
