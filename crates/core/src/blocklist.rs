//! Moderation filter consulted on every entity boundary.

use std::collections::HashSet;

/// Immutable sets of banned servers and identifiers, built from
/// configuration plus the persisted admin ban list.
#[derive(Debug, Default, Clone)]
pub struct Blocklist {
    servers: HashSet<String>,
    ids: HashSet<String>,
}

impl Blocklist {
    pub fn new(servers: Vec<String>, ids: Vec<String>) -> Self {
        Self {
            servers: servers.into_iter().collect(),
            ids: ids.into_iter().collect(),
        }
    }

    /// Extend the identifier set with persisted bans.
    pub fn with_banned_ids<I: IntoIterator<Item = String>>(mut self, ids: I) -> Self {
        self.ids.extend(ids);
        self
    }

    /// True when a Matrix identifier (room id or alias) is banned, either
    /// directly or through its server part.
    pub fn by_id(&self, matrix_id: &str) -> bool {
        if matrix_id.is_empty() {
            return false;
        }
        if self.ids.contains(matrix_id) {
            return true;
        }
        match matrix_id.split_once(':') {
            Some((_, server)) => self.servers.contains(server),
            None => false,
        }
    }

    /// True when a server name is banned.
    pub fn by_server(&self, server: &str) -> bool {
        !server.is_empty() && self.servers.contains(server)
    }

    pub fn len(&self) -> usize {
        self.servers.len() + self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty() && self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocklist() -> Blocklist {
        Blocklist::new(
            vec!["bad.example".to_string()],
            vec!["!evil:good.example".to_string()],
        )
    }

    #[test]
    fn test_by_server() {
        let block = blocklist();
        assert!(block.by_server("bad.example"));
        assert!(!block.by_server("good.example"));
        assert!(!block.by_server(""));
    }

    #[test]
    fn test_by_id_direct() {
        let block = blocklist();
        assert!(block.by_id("!evil:good.example"));
        assert!(!block.by_id("!fine:good.example"));
    }

    #[test]
    fn test_by_id_via_server_part() {
        let block = blocklist();
        assert!(block.by_id("!anything:bad.example"));
        assert!(block.by_id("#alias:bad.example"));
        assert!(!block.by_id(""));
    }

    #[test]
    fn test_with_banned_ids() {
        let block = blocklist().with_banned_ids(vec!["!banned:good.example".to_string()]);
        assert!(block.by_id("!banned:good.example"));
        assert_eq!(block.len(), 3);
    }
}
