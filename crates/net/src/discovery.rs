//! Announcement collection for the join flow: every announcement heard on
//! multicast (or received as a Discover reply) lands here, keyed by game
//! name, ready for a session list UI.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use garter_wire::{AnnouncementList, AnnouncementProto};

/// One advertised session and where to send the Join.
#[derive(Debug, Clone)]
pub struct DiscoveredGame {
    pub game_name: String,
    /// The coordinator's unicast endpoint (the announcement's source).
    pub addr: SocketAddr,
    pub announcement: AnnouncementProto,
    pub last_seen: Instant,
}

/// The set of sessions currently advertised on the LAN.
#[derive(Default)]
pub struct GameBrowser {
    games: HashMap<String, DiscoveredGame>,
}

impl GameBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one announcement list into the table. Later announcements for
    /// the same game name replace earlier ones (the coordinator may have
    /// moved after a failover).
    pub fn observe(&mut self, list: &AnnouncementList, from: SocketAddr, now: Instant) {
        for game in &list.games {
            if game.game_name.is_empty() {
                continue;
            }
            self.games.insert(
                game.game_name.clone(),
                DiscoveredGame {
                    game_name: game.game_name.clone(),
                    addr: from,
                    announcement: game.clone(),
                    last_seen: now,
                },
            );
        }
    }

    pub fn get(&self, game_name: &str) -> Option<&DiscoveredGame> {
        self.games.get(game_name)
    }

    /// All known sessions, sorted by name for stable listings.
    pub fn games(&self) -> Vec<&DiscoveredGame> {
        let mut out: Vec<_> = self.games.values().collect();
        out.sort_by(|a, b| a.game_name.cmp(&b.game_name));
        out
    }

    /// Forget sessions not re-announced within `ttl`.
    pub fn prune(&mut self, now: Instant, ttl: Duration) {
        self.games
            .retain(|_, g| now.duration_since(g.last_seen) < ttl);
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement(name: &str, can_join: Option<bool>) -> AnnouncementList {
        AnnouncementList {
            games: vec![AnnouncementProto {
                players: Vec::new(),
                config: None,
                can_join,
                game_name: name.to_string(),
            }],
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 5], port))
    }

    #[test]
    fn announcements_are_keyed_by_game_name() {
        let mut browser = GameBrowser::new();
        let now = Instant::now();
        browser.observe(&announcement("alpha", None), addr(1000), now);
        browser.observe(&announcement("beta", None), addr(2000), now);
        browser.observe(&announcement("alpha", Some(false)), addr(3000), now);

        let games = browser.games();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].game_name, "alpha");
        // Latest announcement for a name wins, endpoint included.
        assert_eq!(games[0].addr, addr(3000));
        assert!(!games[0].announcement.joinable());
        assert_eq!(games[1].game_name, "beta");
    }

    #[test]
    fn unnamed_games_are_ignored() {
        let mut browser = GameBrowser::new();
        browser.observe(&announcement("", None), addr(1000), Instant::now());
        assert!(browser.is_empty());
    }

    #[test]
    fn prune_forgets_stale_sessions() {
        let mut browser = GameBrowser::new();
        let t0 = Instant::now();
        browser.observe(&announcement("alpha", None), addr(1000), t0);
        browser.observe(
            &announcement("beta", None),
            addr(2000),
            t0 + Duration::from_secs(4),
        );

        browser.prune(t0 + Duration::from_secs(5), Duration::from_secs(3));

        assert!(browser.get("alpha").is_none());
        assert!(browser.get("beta").is_some());
    }
}
