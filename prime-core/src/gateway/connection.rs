//! WebSocket connection bookkeeping.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_id: Uuid,
    pub authenticated: bool,
    pub user_id: Option<Uuid>,
    pub scopes: Vec<String>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Tracks active WebSocket connections and enforces the configured
/// connection cap (spec §4.12, `max_connections`).
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: HashMap<Uuid, ConnectionInfo>,
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self { connections: HashMap::new(), max_connections }
    }

    /// Register a new connection. Returns `None` if the limit is reached.
    pub fn add_connection(&mut self) -> Option<Uuid> {
        if self.connections.len() >= self.max_connections {
            return None;
        }
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.connections.insert(
            id,
            ConnectionInfo {
                connection_id: id,
                authenticated: false,
                user_id: None,
                scopes: Vec::new(),
                connected_at: now,
                last_activity: now,
            },
        );
        Some(id)
    }

    pub fn remove_connection(&mut self, id: &Uuid) -> bool {
        self.connections.remove(id).is_some()
    }

    pub fn authenticate(&mut self, id: &Uuid, user_id: Uuid, scopes: Vec<String>) -> bool {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.authenticated = true;
            conn.user_id = Some(user_id);
            conn.scopes = scopes;
            conn.last_activity = Utc::now();
            true
        } else {
            false
        }
    }

    pub fn touch(&mut self, id: &Uuid) {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.last_activity = Utc::now();
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<&ConnectionInfo> {
        self.connections.get(id)
    }

    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    pub fn authenticated_count(&self) -> usize {
        self.connections.values().filter(|c| c.authenticated).count()
    }

    pub fn is_authenticated(&self, id: &Uuid) -> bool {
        self.connections.get(id).map(|c| c.authenticated).unwrap_or(false)
    }

    /// Connections whose `last_activity` is older than `idle_timeout_secs`.
    pub fn idle_connections(&self, idle_timeout_secs: u64) -> Vec<Uuid> {
        let cutoff = Utc::now() - chrono::Duration::seconds(idle_timeout_secs as i64);
        self.connections
            .values()
            .filter(|c| c.last_activity < cutoff)
            .map(|c| c.connection_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_connection_respects_limit() {
        let mut mgr = ConnectionManager::new(2);
        assert!(mgr.add_connection().is_some());
        assert!(mgr.add_connection().is_some());
        assert!(mgr.add_connection().is_none());
        assert_eq!(mgr.active_count(), 2);
    }

    #[test]
    fn authenticate_records_user_and_scopes() {
        let mut mgr = ConnectionManager::new(10);
        let id = mgr.add_connection().unwrap();
        let user_id = Uuid::new_v4();
        assert!(mgr.authenticate(&id, user_id, vec!["health.read".to_string()]));
        let info = mgr.get(&id).unwrap();
        assert_eq!(info.user_id, Some(user_id));
        assert_eq!(mgr.authenticated_count(), 1);
    }

    #[test]
    fn remove_connection_drops_entry() {
        let mut mgr = ConnectionManager::new(10);
        let id = mgr.add_connection().unwrap();
        assert!(mgr.remove_connection(&id));
        assert!(!mgr.remove_connection(&id));
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn idle_connections_empty_for_fresh_connection() {
        let mut mgr = ConnectionManager::new(10);
        mgr.add_connection();
        assert!(mgr.idle_connections(45).is_empty());
    }
}
