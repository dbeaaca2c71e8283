use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::remote::remote_server::RemoteServer;

const INITIAL_CAPACITY: usize = 10;

/// Servers interested in one node, sorted by server key.
#[derive(Debug, Default)]
pub struct RemoteServerList {
    servers: Vec<Arc<RemoteServer>>,
}

impl RemoteServerList {
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn servers(&self) -> &[Arc<RemoteServer>] {
        &self.servers
    }

    pub fn contains(&self, server: &RemoteServer) -> bool {
        self.position(server).is_ok()
    }

    fn position(&self, server: &RemoteServer) -> std::result::Result<usize, usize> {
        self.servers.binary_search_by_key(&server.key(), |s| s.key())
    }

    pub fn insert(&mut self, server: Arc<RemoteServer>) -> Result<()> {
        let at = match self.position(&server) {
            Ok(_) => return Err(EngineError::ExistingKey),
            Err(at) => at,
        };

        if self.servers.len() == self.servers.capacity() {
            let grow = if self.servers.capacity() == 0 { INITIAL_CAPACITY } else { self.servers.capacity() };
            self.servers.try_reserve_exact(grow).map_err(|_| EngineError::AllocateError)?;
        }
        self.servers.insert(at, server);
        Ok(())
    }

    pub fn remove(&mut self, server: &RemoteServer) -> Result<Arc<RemoteServer>> {
        let at = self.position(server).map_err(|_| EngineError::NotFound)?;
        Ok(self.servers.remove(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_by_key_and_unique() {
        let a = Arc::new(RemoteServer::new("A", "alpha"));
        let b = Arc::new(RemoteServer::new("B", "beta"));
        let c = Arc::new(RemoteServer::new("C", "gamma"));

        let mut list = RemoteServerList::default();
        list.insert(c.clone()).unwrap();
        list.insert(a.clone()).unwrap();
        list.insert(b.clone()).unwrap();
        assert_eq!(list.insert(b.clone()), Err(EngineError::ExistingKey));

        let keys: Vec<u64> = list.servers().iter().map(|s| s.key()).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
        assert_eq!(list.servers.capacity(), INITIAL_CAPACITY);

        list.remove(&b).unwrap();
        assert_eq!(list.remove(&b).map(|_| ()), Err(EngineError::NotFound));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_grows_by_doubling() {
        let mut list = RemoteServerList::default();
        for i in 0..11 {
            list.insert(Arc::new(RemoteServer::new(format!("S{}", i), "s"))).unwrap();
        }
        assert_eq!(list.servers.capacity(), INITIAL_CAPACITY * 2);
    }
}
