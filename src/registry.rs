//! Connection registry: client id -> live outbound handle.

use dashmap::DashMap;

use crate::connection::Connection;
use crate::types::ClientId;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ClientId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, id: ClientId, connection: Connection) {
        self.connections.insert(id, connection);
    }

    pub fn load(&self, id: &ClientId) -> Option<Connection> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    pub fn delete(&self, id: &ClientId) {
        self.connections.remove(id);
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn test_store_load_delete() {
        let registry = ConnectionRegistry::new();
        let id = ClientId::new();
        let (tx, _rx) = mpsc::channel(1);

        registry.store(id, Connection::new(id, tx));
        assert_eq!(registry.load(&id).unwrap().client_id(), id);
        assert_eq!(registry.len(), 1);

        registry.delete(&id);
        assert!(registry.load(&id).is_none());
        assert!(registry.is_empty());
    }
}
