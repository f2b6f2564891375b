//! The agent registry (spec §4.10, §9): a mapping from agent-id to
//! [`AgentRecord`], protected by a reader-writer lock (spec §5's "the
//! registry's map is the only shared mutable map; it uses a
//! reader-writer lock"). Explicitly constructed per proxy-server
//! instance rather than a process-wide singleton, so two concurrent
//! Raido processes in the same test binary never share state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::error::RegistryError;
use crate::record::AgentRecord;

#[derive(Default)]
pub struct Registry {
    agents: RwLock<HashMap<String, Arc<AgentRecord>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record`, returning it back to the caller (spec §4.10
    /// `Add`).
    pub fn add(&self, record: AgentRecord) -> Arc<AgentRecord> {
        let record = Arc::new(record);
        let mut agents = self.agents.write().expect("registry lock poisoned");
        agents.insert(record.id().to_string(), record.clone());
        info!(id = %record.id(), hostname = %record.hostname(), "agent registered");
        record
    }

    pub fn get(&self, id: &str) -> Option<Arc<AgentRecord>> {
        let agents = self.agents.read().expect("registry lock poisoned");
        agents.get(id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<AgentRecord>> {
        let agents = self.agents.read().expect("registry lock poisoned");
        agents.values().cloned().collect()
    }

    /// Close the record (tunnel then transport) and delete it. Idempotent:
    /// removing an unknown id is not an error (spec §4.10 `Remove`).
    pub async fn remove(&self, id: &str) -> Result<(), RegistryError> {
        let record = {
            let mut agents = self.agents.write().expect("registry lock poisoned");
            agents.remove(id)
        };
        match record {
            Some(record) => {
                record.close().await?;
                info!(%id, "agent removed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Close every currently-registered record concurrently, collecting
    /// errors rather than stopping at the first one (spec §4.10
    /// `Cleanup`). Snapshots the id set before iterating so a concurrent
    /// `Add` during cleanup is simply not included, rather than racing
    /// the map itself (spec §9's map-mutation-during-iteration note).
    pub async fn cleanup(&self) -> Vec<RegistryError> {
        let ids: Vec<String> = {
            let agents = self.agents.read().expect("registry lock poisoned");
            agents.keys().cloned().collect()
        };

        let results = futures::future::join_all(ids.iter().map(|id| self.remove(id))).await;

        let errors: Vec<RegistryError> = results.into_iter().filter_map(Result::err).collect();
        if !errors.is_empty() {
            warn!(count = errors.len(), "errors during registry cleanup");
        }
        errors
    }

    pub fn len(&self) -> usize {
        self.agents.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use async_trait::async_trait;
    use raido_relay::BufferPool;
    use raido_transport::{Stream, StreamConnection, TransportError};

    use super::*;

    #[derive(Debug)]
    struct NullConnection;

    #[async_trait]
    impl StreamConnection for NullConnection {
        async fn open_stream(&self) -> Result<Box<dyn Stream>, TransportError> {
            Err(TransportError::ConnectionClosed)
        }

        async fn accept_stream(&self) -> Result<Option<Box<dyn Stream>>, TransportError> {
            Ok(None)
        }

        async fn close_with(&self, _code: u64, _reason: &str) {}

        fn is_closed(&self) -> bool {
            false
        }

        fn remote_address(&self) -> SocketAddr {
            "127.0.0.1:0".parse().unwrap()
        }
    }

    fn test_record(id: &str) -> AgentRecord {
        AgentRecord::new(
            id.to_string(),
            format!("host-{id}"),
            Vec::new(),
            Arc::new(NullConnection),
            BufferPool::default(),
        )
    }

    #[test]
    fn add_then_get() {
        let registry = Registry::new();
        registry.add(test_record("agent1"));
        assert!(registry.get("agent1").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_unknown_is_none() {
        let registry = Registry::new();
        assert!(registry.get("nope").is_none());
    }

    #[tokio::test]
    async fn remove_unknown_is_not_an_error() {
        let registry = Registry::new();
        assert!(registry.remove("nope").await.is_ok());
    }

    #[tokio::test]
    async fn remove_deletes_the_record() {
        let registry = Registry::new();
        registry.add(test_record("agent1"));
        registry.remove("agent1").await.unwrap();
        assert!(registry.get("agent1").is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn list_returns_every_record() {
        let registry = Registry::new();
        registry.add(test_record("agent1"));
        registry.add(test_record("agent2"));
        let ids: Vec<String> = registry.list().iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"agent1".to_string()));
        assert!(ids.contains(&"agent2".to_string()));
    }

    #[tokio::test]
    async fn cleanup_empties_the_registry() {
        let registry = Registry::new();
        registry.add(test_record("agent1"));
        registry.add(test_record("agent2"));
        let errors = registry.cleanup().await;
        assert!(errors.is_empty());
        assert!(registry.is_empty());
    }
}
