//! Connection handle
//!
//! The hub's view of one live client: the client id assigned at admission
//! and the outbound queue drained by that connection's writer task.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::protocol::Response;
use crate::types::ClientId;

/// Outbound handle bound 1:1 to a client id
///
/// Cloning shares the same queue. Writes fail once the writer task has
/// stopped, which is how dead peers are detected.
#[derive(Debug, Clone)]
pub struct Connection {
    client_id: ClientId,
    sender: mpsc::Sender<Response>,
}

impl Connection {
    /// Create a new connection handle with the given ID and sender channel
    pub fn new(client_id: ClientId, sender: mpsc::Sender<Response>) -> Self {
        Self { client_id, sender }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Queue a response for this client
    ///
    /// Waits while the queue is full. Returns an error if the writer side
    /// is gone (client disconnected).
    pub async fn send(&self, response: Response) -> Result<(), SendError> {
        self.sender
            .send(response)
            .await
            .map_err(|_| SendError::ConnectionClosed)
    }
}
