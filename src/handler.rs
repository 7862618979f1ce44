//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, frame
//! decoding, and bidirectional communication with the hub. The read side
//! never touches shared state; it only decodes frames and forwards them.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::error::AppError;
use crate::protocol::{Request, RequestPayload, Response};
use crate::server::HubCommand;
use crate::types::ClientId;

/// Capacity of each connection's outbound queue
const OUTBOUND_BUFFER_SIZE: usize = 32;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, assigns a client id, registers with the
/// hub and runs the reader and writer until either side stops. The hub is
/// always told to unregister the client on the way out.
pub async fn handle_connection(
    stream: TcpStream,
    hub_tx: mpsc::Sender<HubCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (ws_sender, ws_receiver) = ws_stream.split();

    let client_id = ClientId::new();
    info!("Client {} connected from {}", client_id, peer_addr);

    // Channel for hub -> client responses
    let (out_tx, out_rx) = mpsc::channel::<Response>(OUTBOUND_BUFFER_SIZE);
    let connection = Connection::new(client_id, out_tx);

    if hub_tx
        .send(HubCommand::Register {
            connection: connection.clone(),
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - hub closed", client_id);
        return Err(AppError::ChannelSend);
    }

    let read_task = tokio::spawn(read_frames(ws_receiver, connection, hub_tx.clone()));
    let write_task = tokio::spawn(write_responses(ws_sender, out_rx));

    join_first(read_task, write_task, client_id).await;

    let _ = hub_tx.send(HubCommand::Unregister { client_id }).await;

    info!("Client {} disconnected", client_id);

    Ok(())
}

/// Wait for either task to complete and abort the other
///
/// A reader outliving its writer would keep forwarding requests for a client
/// the hub is about to forget.
async fn join_first(
    mut read_task: JoinHandle<()>,
    mut write_task: JoinHandle<()>,
    client_id: ClientId,
) {
    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", client_id);
            write_task.abort();
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", client_id);
            read_task.abort();
        }
    }
}

/// Reader loop: decode frames and hand requests to the hub
///
/// A frame that fails to decode gets a `BAD_REQUEST` reply and reading goes
/// on. The loop ends when the peer closes, the transport errors, the hub is
/// gone, or an error reply can no longer be written.
pub(crate) async fn read_frames<S>(
    mut ws_receiver: S,
    connection: Connection,
    hub_tx: mpsc::Sender<HubCommand>,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let client_id = connection.client_id();

    while let Some(frame) = ws_receiver.next().await {
        let decoded = match frame {
            Ok(Message::Text(text)) => RequestPayload::decode(text.as_bytes()),
            Ok(Message::Binary(data)) => RequestPayload::decode(&data),
            Ok(Message::Close(_)) => {
                debug!("Client {} sent close frame", client_id);
                break;
            }
            Ok(_) => {
                // Ping/pong are answered by tungstenite
                continue;
            }
            Err(e) => {
                warn!("WebSocket error for {}: {}", client_id, e);
                break;
            }
        };

        match decoded {
            Ok(payload) => {
                let request = Request::new(client_id, payload);
                debug!(
                    "Request {} ({}) from {}",
                    request.id,
                    request.payload.opcode().name(),
                    client_id
                );
                if hub_tx.send(HubCommand::Request(request)).await.is_err() {
                    debug!("Hub closed, ending read task for {}", client_id);
                    break;
                }
            }
            Err(e) => {
                warn!("Rejected frame from {}: {}", client_id, e);
                if connection.send(e.into()).await.is_err() {
                    debug!("Cannot report error to {}, closing", client_id);
                    break;
                }
            }
        }
    }

    debug!("Read task ended for {}", client_id);
}

/// Writer loop: serialize queued responses onto the socket
pub(crate) async fn write_responses<S>(mut ws_sender: S, mut out_rx: mpsc::Receiver<Response>)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(response) = out_rx.recv().await {
        match serde_json::to_string(&response) {
            Ok(json) => {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    debug!("WebSocket send failed, ending write task");
                    break;
                }
            }
            Err(e) => {
                error!("Failed to serialize response: {}", e);
                // Continue - don't break on serialization errors
            }
        }
    }
    debug!("Write task ended");

    // Send close frame when done
    let _ = ws_sender.close().await;
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;
    use crate::protocol::{ErrorCode, ResponseType};

    fn text(json: &str) -> Result<Message, tungstenite::Error> {
        Ok(Message::Text(json.to_string().into()))
    }

    fn setup() -> (
        Connection,
        mpsc::Receiver<Response>,
        mpsc::Sender<HubCommand>,
        mpsc::Receiver<HubCommand>,
    ) {
        let (out_tx, out_rx) = mpsc::channel(16);
        let (hub_tx, hub_rx) = mpsc::channel(16);
        (Connection::new(ClientId::new(), out_tx), out_rx, hub_tx, hub_rx)
    }

    #[tokio::test]
    async fn test_valid_frames_are_stamped_and_forwarded() {
        let (connection, _out_rx, hub_tx, mut hub_rx) = setup();
        let client_id = connection.client_id();
        let frames = stream::iter(vec![
            text(r#"{"id":"spoofed","clientId":"spoofed","type":"GET_ROOMS","body":{}}"#),
            text(r#"{"type":"JOIN_CHAT","body":{"roomId":"r1"}}"#),
        ]);

        read_frames(frames, connection, hub_tx).await;

        let mut ids = Vec::new();
        for expected in [
            RequestPayload::GetRooms,
            RequestPayload::JoinChat {
                room_id: "r1".into(),
            },
        ] {
            match hub_rx.recv().await {
                Some(HubCommand::Request(request)) => {
                    assert_eq!(request.client_id, client_id);
                    assert_eq!(request.payload, expected);
                    ids.push(request.id);
                }
                other => panic!("unexpected command: {:?}", other),
            }
        }
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn test_bad_frame_gets_error_and_reading_continues() {
        let (connection, mut out_rx, hub_tx, mut hub_rx) = setup();
        let frames = stream::iter(vec![
            text("{{{"),
            text(r#"{"type":"FLY"}"#),
            text(r#"{"type":"GET_ROOMS"}"#),
        ]);

        read_frames(frames, connection, hub_tx).await;

        for _ in 0..2 {
            let response = out_rx.recv().await.unwrap();
            assert_eq!(response.kind, ResponseType::Error);
            assert_eq!(response.error_code(), Some(ErrorCode::BadRequest));
        }
        assert!(matches!(hub_rx.recv().await, Some(HubCommand::Request(_))));
    }

    #[tokio::test]
    async fn test_unwritable_error_stops_reader() {
        let (connection, out_rx, hub_tx, mut hub_rx) = setup();
        drop(out_rx);
        let frames = stream::iter(vec![text("garbage"), text(r#"{"type":"GET_ROOMS"}"#)]);

        read_frames(frames, connection, hub_tx).await;

        // The valid frame after the failed error write is never forwarded
        assert!(hub_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_frame_stops_reader() {
        let (connection, _out_rx, hub_tx, mut hub_rx) = setup();
        let frames = stream::iter(vec![
            Ok(Message::Close(None)),
            text(r#"{"type":"GET_ROOMS"}"#),
        ]);

        read_frames(frames, connection, hub_tx).await;

        assert!(hub_rx.try_recv().is_err());
    }

    /// Task that runs until aborted; `rx` sees `None` once it is gone
    fn parked() -> (JoinHandle<()>, mpsc::Receiver<()>) {
        let (alive_tx, alive_rx) = mpsc::channel::<()>(1);
        let task = tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await;
        });
        (task, alive_rx)
    }

    #[tokio::test]
    async fn test_finished_writer_aborts_reader() {
        let (read_task, mut reader_alive) = parked();
        let write_task = tokio::spawn(async {});

        join_first(read_task, write_task, ClientId::new()).await;

        assert!(reader_alive.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_finished_reader_aborts_writer() {
        let read_task = tokio::spawn(async {});
        let (write_task, mut writer_alive) = parked();

        join_first(read_task, write_task, ClientId::new()).await;

        assert!(writer_alive.recv().await.is_none());
    }
}
