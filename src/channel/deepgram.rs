use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::channel::{
    ChannelError, ChannelEvent, ChannelHandle, ChannelState, Outbound, TranscriptionConnector,
    NORMAL_CLOSURE,
};
use super::config::ChannelConfig;
use super::messages::parse_result;
use crate::config::Credential;

/// Streaming connector for the Deepgram `listen` endpoint.
///
/// The credential rides on the upgrade request as an `Authorization: Token`
/// header; the channel config becomes URL query parameters. After the
/// handshake a writer task drains the outbound queue into binary messages
/// and a reader task turns inbound text messages into channel events.
pub struct DeepgramConnector;

#[async_trait]
impl TranscriptionConnector for DeepgramConnector {
    async fn connect(
        &self,
        config: &ChannelConfig,
        credential: &Credential,
    ) -> Result<(ChannelHandle, mpsc::Receiver<ChannelEvent>), ChannelError> {
        let url = config
            .url()
            .map_err(|e| ChannelError::BadEndpoint(e.to_string()))?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::BadEndpoint(e.to_string()))?;

        let auth = HeaderValue::from_str(&format!("Token {}", credential.expose())).map_err(
            |_| ChannelError::Connect("credential contains invalid header characters".to_string()),
        )?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        info!("Connecting to recognition service at {}", url);

        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        info!("Recognition stream open");

        let state = Arc::new(Mutex::new(ChannelState::Open));
        let (mut sink, mut stream) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(64);
        let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(64);

        // Writer: audio frames out, close frame on request.
        let writer_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(command) = outbound_rx.recv().await {
                match command {
                    Outbound::Audio(frame) => {
                        if let Err(e) = sink.send(Message::Binary(frame)).await {
                            warn!("Failed to send audio frame: {}", e);
                            break;
                        }
                    }
                    Outbound::Close => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "recording stopped".into(),
                        };
                        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                            debug!("Failed to send close frame: {}", e);
                        }
                        break;
                    }
                }
            }

            let mut state = writer_state.lock().unwrap();
            if *state != ChannelState::Errored {
                *state = ChannelState::Closed;
            }
            debug!("Writer task stopped");
        });

        // Reader: result envelopes in, close/error surfaced as events.
        let reader_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(raw)) => {
                        if let Some(segment) = parse_result(&raw) {
                            if event_tx.send(ChannelEvent::Segment(segment)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((NORMAL_CLOSURE, String::new()));

                        {
                            let mut state = reader_state.lock().unwrap();
                            *state = if code == NORMAL_CLOSURE {
                                ChannelState::Closed
                            } else {
                                ChannelState::Errored
                            };
                        }

                        let _ = event_tx.send(ChannelEvent::Closed { code, reason }).await;
                        break;
                    }
                    // Server pings and any binary payloads carry no results.
                    Ok(_) => {}
                    Err(e) => {
                        *reader_state.lock().unwrap() = ChannelState::Errored;
                        let _ = event_tx
                            .send(ChannelEvent::Error(format!("Connection error: {e}")))
                            .await;
                        break;
                    }
                }
            }
            debug!("Reader task stopped");
        });

        Ok((ChannelHandle::from_parts(state, outbound_tx), event_rx))
    }
}
