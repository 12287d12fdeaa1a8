//! The threaded shell around [`NodeCore`].
//!
//! One mutex owns the core. The receive loops, the dispatcher and every
//! periodic timer take the lock only long enough to run a handler, then send
//! the returned effects with the lock released. Shutdown is a single atomic
//! flag that every loop polls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::debug;

use garter_net::{DiscoveredGame, GameBrowser, NetError, Transport};
use garter_sim::{Direction, GameConfig, GameState, NodeRole, PlayerId};
use garter_wire::{Body, Discover, GameMessage};

use crate::config::{ConfigError, JoinOptions, SessionOptions};
use crate::core::{Effect, NodeCore, NodeEvent};
use crate::{ANNOUNCE_INTERVAL, liveness_timeout, ping_idle, retransmit_interval, tick_interval};

/// Granularity at which sleeping loops notice shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to spawn node thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A running session node. Dropping it (or calling [`Node::shutdown`]) stops
/// every activity and closes the sockets.
pub struct Node {
    core: Arc<Mutex<NodeCore>>,
    transport: Arc<Transport>,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    event_tx: Sender<NodeEvent>,
    event_rx: Receiver<NodeEvent>,
}

impl Node {
    /// Found a session and start coordinating it.
    pub fn host(opts: SessionOptions) -> Result<Self, NodeError> {
        opts.validate()?;
        let transport = Transport::bind()?;
        let core = NodeCore::host(opts, transport.local_addr(), rand::random(), Instant::now());
        Self::start(core, transport, Vec::new())
    }

    /// Join a discovered session as a player or viewer.
    pub fn join(opts: JoinOptions, game: &DiscoveredGame) -> Result<Self, NodeError> {
        opts.validate()?;
        let transport = Transport::bind()?;
        let config: GameConfig = game
            .announcement
            .config
            .map(Into::into)
            .unwrap_or_default();
        // Every timer cadence derives from the announced config; refuse to
        // run on out-of-range values.
        crate::config::validate_config(&config)?;
        let (core, initial) = NodeCore::join(
            opts,
            game.game_name.clone(),
            game.addr,
            config,
            transport.local_addr(),
            rand::random(),
            Instant::now(),
        );
        Self::start(core, transport, initial)
    }

    fn start(core: NodeCore, transport: Transport, initial: Vec<Effect>) -> Result<Self, NodeError> {
        let config = *core.config();
        let transport = Arc::new(transport);
        let running = Arc::new(AtomicBool::new(true));
        let (event_tx, event_rx) = channel::unbounded();
        let (inbound_tx, inbound_rx) = channel::unbounded();
        let core = Arc::new(Mutex::new(core));

        apply_effects(&transport, &event_tx, initial);

        let mut threads = transport.spawn_receivers(Arc::clone(&running), inbound_tx)?;

        // Dispatcher: datagrams in, effects out.
        {
            let running = Arc::clone(&running);
            let core = Arc::clone(&core);
            let transport = Arc::clone(&transport);
            let event_tx = event_tx.clone();
            let handle = std::thread::Builder::new()
                .name("garter-dispatch".into())
                .spawn(move || {
                    while running.load(Ordering::Relaxed) {
                        match inbound_rx.recv_timeout(SHUTDOWN_POLL) {
                            Ok(inbound) => {
                                let effects =
                                    core.lock().handle(inbound.msg, inbound.from, Instant::now());
                                apply_effects(&transport, &event_tx, effects);
                            }
                            Err(RecvTimeoutError::Timeout) => continue,
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                })
                .map_err(NodeError::Spawn)?;
            threads.push(handle);
        }

        // Periodic activities. All of them run on every node; the core
        // no-ops the ones that do not match its current role, which is what
        // lets a promoted deputy pick up announcing and ticking without any
        // thread surgery.
        let timers: [(&str, Duration, fn(&mut NodeCore, Instant) -> Vec<Effect>); 5] = [
            ("garter-tick", tick_interval(&config), NodeCore::on_tick),
            ("garter-announce", ANNOUNCE_INTERVAL, NodeCore::on_announce),
            (
                "garter-retransmit",
                retransmit_interval(&config),
                NodeCore::on_retransmit,
            ),
            ("garter-ping", ping_idle(&config), NodeCore::on_ping),
            (
                "garter-liveness",
                liveness_timeout(&config),
                NodeCore::on_liveness,
            ),
        ];
        for (name, period, handler) in timers {
            let running = Arc::clone(&running);
            let core = Arc::clone(&core);
            let transport = Arc::clone(&transport);
            let event_tx = event_tx.clone();
            let handle = std::thread::Builder::new()
                .name(name.into())
                .spawn(move || {
                    while sleep_while_running(&running, period) {
                        let effects = handler(&mut core.lock(), Instant::now());
                        apply_effects(&transport, &event_tx, effects);
                    }
                })
                .map_err(NodeError::Spawn)?;
            threads.push(handle);
        }

        Ok(Self {
            core,
            transport,
            running,
            threads,
            event_tx,
            event_rx,
        })
    }

    /// The stream of user-facing events (snapshots included).
    pub fn events(&self) -> &Receiver<NodeEvent> {
        &self.event_rx
    }

    /// Feed a local direction input.
    pub fn steer(&self, direction: Direction) {
        let effects = self.core.lock().steer(direction, Instant::now());
        apply_effects(&self.transport, &self.event_tx, effects);
    }

    /// Clone of the latest snapshot.
    pub fn state(&self) -> GameState {
        self.core.lock().state().clone()
    }

    pub fn role(&self) -> NodeRole {
        self.core.lock().role()
    }

    pub fn config(&self) -> GameConfig {
        *self.core.lock().config()
    }

    pub fn self_id(&self) -> PlayerId {
        self.core.lock().self_id()
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.transport.local_addr()
    }

    fn stop_threads(&mut self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }
        debug!("node shutting down");
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }

    /// Stop every activity and release the sockets.
    pub fn shutdown(mut self) {
        self.stop_threads();
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop_threads();
    }
}

/// Sleep `period` in shutdown-sized slices. Returns false once the node is
/// stopping.
fn sleep_while_running(running: &AtomicBool, period: Duration) -> bool {
    let deadline = Instant::now() + period;
    loop {
        if !running.load(Ordering::Relaxed) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(SHUTDOWN_POLL));
    }
}

fn apply_effects(transport: &Transport, events: &Sender<NodeEvent>, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Unicast(msg, to) => transport.send_unicast(&msg, to),
            Effect::Multicast(msg) => transport.send_multicast(&msg),
            Effect::Event(event) => {
                // Nobody listening is fine; the session does not care.
                let _ = events.send(event);
            }
        }
    }
}

/// One-shot LAN browse: probe the multicast group and collect announcements
/// for `window`.
pub fn discover(window: Duration) -> Result<Vec<DiscoveredGame>, NodeError> {
    let transport = Transport::bind()?;
    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = channel::unbounded();
    let receivers = transport.spawn_receivers(Arc::clone(&running), tx)?;

    let probe = GameMessage {
        msg_seq: 1,
        sender_id: None,
        receiver_id: None,
        body: Some(Body::Discover(Discover {})),
    };
    transport.send_multicast(&probe);

    let mut browser = GameBrowser::new();
    let deadline = Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match rx.recv_timeout(remaining) {
            Ok(inbound) => {
                if let Some(Body::Announcement(list)) = &inbound.msg.body {
                    browser.observe(list, inbound.from, Instant::now());
                }
            }
            Err(_) => break,
        }
    }

    running.store(false, Ordering::Relaxed);
    for handle in receivers {
        let _ = handle.join();
    }
    Ok(browser.games().into_iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use garter_sim::PlayerType;
    use garter_wire::{AnnouncementProto, GameConfigProto};

    fn test_config() -> GameConfig {
        GameConfig {
            width: 20,
            height: 20,
            food_static: 1,
            state_delay_ms: 100,
        }
    }

    /// Two real nodes over loopback UDP: join, get an id, see a snapshot
    /// with both players.
    #[test]
    fn host_and_join_end_to_end() {
        let host = Node::host(SessionOptions {
            game_name: "itest".into(),
            player_name: "alice".into(),
            player_type: PlayerType::Human,
            config: test_config(),
        })
        .unwrap();

        let game = DiscoveredGame {
            game_name: "itest".into(),
            addr: host.local_addr(),
            announcement: AnnouncementProto {
                players: Vec::new(),
                config: Some(GameConfigProto::from(test_config())),
                can_join: Some(true),
                game_name: "itest".into(),
            },
            last_seen: Instant::now(),
        };
        let peer = Node::join(
            JoinOptions {
                player_name: "bob".into(),
                player_type: PlayerType::Human,
                as_viewer: false,
            },
            &game,
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut joined_id = None;
        let mut saw_full_snapshot = false;
        while Instant::now() < deadline {
            match peer.events().recv_timeout(Duration::from_millis(200)) {
                Ok(NodeEvent::Joined { player_id }) => joined_id = Some(player_id),
                Ok(NodeEvent::Snapshot(state)) => {
                    if state.players.len() == 2 && state.snakes.len() == 2 {
                        saw_full_snapshot = true;
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => {}
            }
        }

        assert_eq!(joined_id, Some(2));
        assert!(saw_full_snapshot, "never saw a snapshot with both players");
        assert_eq!(peer.self_id(), 2);

        peer.shutdown();
        host.shutdown();
    }
}
