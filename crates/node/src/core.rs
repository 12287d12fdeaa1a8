//! The sans-I/O protocol core.
//!
//! [`NodeCore`] is the whole node behind a single mutex: role, membership,
//! steer queue, reliable-overlay books and the latest snapshot. It never
//! touches a socket or a clock; the runtime feeds it inbound datagrams and
//! timer firings (with an explicit `now`) and sends whatever [`Effect`]s
//! come back after releasing the lock. That split keeps every protocol rule
//! in one place and lets the tests drive crash/failover scenarios with
//! nothing but function calls.

use std::collections::HashMap;
use std::mem;
use std::net::SocketAddr;
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use garter_net::ReliableQueue;
use garter_sim::{
    Direction, Engine, GameConfig, GameState, NodeRole, Player, PlayerId, PlayerType,
};
use garter_wire::{
    self as wire, Ack, AnnouncementList, AnnouncementProto, Body, ErrorMsg, GameMessage,
    GameStateProto, Join, Ping, RoleChange, State, Steer,
};

use crate::config::{JoinOptions, SessionOptions};
use crate::{liveness_timeout, ping_idle, retransmit_interval};

/// Refusal text for a join with no room on the grid.
pub const NO_SPACE: &str = "no available space";

// ============================================================================
// Effects & Events
// ============================================================================

/// What the core wants done after a handler ran. The runtime applies these
/// outside the lock.
#[derive(Debug)]
pub enum Effect {
    Unicast(GameMessage, SocketAddr),
    Multicast(GameMessage),
    Event(NodeEvent),
}

/// User-facing happenings, delivered to the UI adapter.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A fresh snapshot: the coordinator's own tick output, or a newly
    /// applied State message on a peer.
    Snapshot(Box<GameState>),
    /// Our join was acked with this id.
    Joined { player_id: PlayerId },
    /// The coordinator refused our join.
    JoinRefused { reason: String },
    /// Our snake is gone; a viewer transition has been requested.
    SnakeDied,
    BecameDeputy,
    BecameCoordinator,
    BecameViewer,
    /// The coordinator dropped a silent peer.
    PeerEvicted { player_id: PlayerId },
    /// The coordinator is gone and no deputy is known to take over.
    SessionLost,
}

/// How a node came to be coordinator.
enum Takeover {
    /// The coordinator went silent; we were deputy.
    CoordinatorDead,
    /// The coordinator handed over explicitly (its snake died).
    Handover,
}

// ============================================================================
// NodeCore
// ============================================================================

pub struct NodeCore {
    role: NodeRole,
    /// 0 until the coordinator assigned us one (the coordinator itself is 1).
    self_id: PlayerId,
    player_name: String,
    player_type: PlayerType,
    game_name: String,
    config: GameConfig,
    engine: Engine,
    /// Latest snapshot; authoritative on the coordinator, replica elsewhere.
    state: GameState,
    local_addr: SocketAddr,
    coordinator_addr: Option<SocketAddr>,
    queue: ReliableQueue,
    /// Latest pending steer per player, drained each tick.
    steers: HashMap<PlayerId, Direction>,
    /// Coordinator liveness book: last inbound anything per player.
    last_recv: HashMap<PlayerId, Instant>,
    /// Peer side: last inbound anything from the coordinator.
    last_coord_msg: Option<Instant>,
    /// Outbound idle tracking per endpoint, for the ping filler.
    last_send: HashMap<SocketAddr, Instant>,
    /// Never reused, never decremented.
    next_player_id: PlayerId,
    /// Sequence of our own pending Join, so its ack can be recognized.
    join_seq: Option<i64>,
    /// Viewer transition requested; we stay steerable-looking until a
    /// snapshot confirms the role.
    pending_viewer: bool,
    /// We have observed our own alive snake at least once.
    seen_own_snake: bool,
    session_lost: bool,
}

impl NodeCore {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Found a session: become COORDINATOR with player id 1 and a freshly
    /// spawned snake.
    pub fn host(opts: SessionOptions, local_addr: SocketAddr, seed: u64, now: Instant) -> Self {
        let config = opts.config;
        let mut engine = Engine::new(config, seed);
        let mut state = GameState {
            state_order: 1,
            snakes: Vec::new(),
            foods: Vec::new(),
            players: vec![Player {
                id: 1,
                name: opts.player_name.clone(),
                role: NodeRole::Coordinator,
                kind: opts.player_type,
                score: 0,
                ip: Some(local_addr.ip()),
                port: Some(local_addr.port()),
            }],
        };
        if engine.spawn_snake(&mut state, 1).is_none() {
            // Cannot happen on an empty grid within the validated ranges.
            warn!("no room for the founding snake");
        }
        info!(game = %opts.game_name, %local_addr, "session created");
        Self {
            role: NodeRole::Coordinator,
            self_id: 1,
            player_name: opts.player_name,
            player_type: opts.player_type,
            game_name: opts.game_name,
            config,
            engine,
            state,
            local_addr,
            coordinator_addr: None,
            queue: ReliableQueue::new(),
            steers: HashMap::new(),
            last_recv: HashMap::new(),
            last_coord_msg: None,
            last_send: HashMap::new(),
            next_player_id: 2,
            join_seq: None,
            pending_viewer: false,
            seen_own_snake: true,
            session_lost: false,
        }
    }

    /// Join an advertised session. Returns the core plus the initial Join
    /// send.
    pub fn join(
        opts: JoinOptions,
        game_name: String,
        coordinator: SocketAddr,
        config: GameConfig,
        local_addr: SocketAddr,
        seed: u64,
        now: Instant,
    ) -> (Self, Vec<Effect>) {
        let role = if opts.as_viewer {
            NodeRole::Viewer
        } else {
            NodeRole::Normal
        };
        let mut core = Self {
            role,
            self_id: 0,
            player_name: opts.player_name,
            player_type: opts.player_type,
            game_name,
            config,
            engine: Engine::new(config, seed),
            state: GameState::default(),
            local_addr,
            coordinator_addr: Some(coordinator),
            queue: ReliableQueue::new(),
            steers: HashMap::new(),
            last_recv: HashMap::new(),
            last_coord_msg: Some(now),
            last_send: HashMap::new(),
            next_player_id: 0,
            join_seq: None,
            pending_viewer: false,
            seen_own_snake: false,
            session_lost: false,
        };
        let mut out = Vec::new();
        let join = Body::Join(Join {
            player_type: wire::PlayerType::from(core.player_type) as i32,
            player_name: core.player_name.clone(),
            game_name: core.game_name.clone(),
            requested_role: wire::NodeRole::from(role) as i32,
        });
        let seq = core.push_unicast(&mut out, join, coordinator, None, now);
        core.join_seq = Some(seq);
        info!(game = %core.game_name, %coordinator, "joining session");
        (core, out)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn self_id(&self) -> PlayerId {
        self.self_id
    }

    pub fn game_name(&self) -> &str {
        &self.game_name
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    // ------------------------------------------------------------------
    // Outbound plumbing
    // ------------------------------------------------------------------

    fn sender_id_field(&self) -> Option<i32> {
        (self.self_id != 0).then_some(self.self_id)
    }

    /// Allocate a sequence, track reliable kinds, stamp the idle clock and
    /// queue the send. Returns the sequence used.
    fn push_unicast(
        &mut self,
        out: &mut Vec<Effect>,
        body: Body,
        to: SocketAddr,
        receiver: Option<PlayerId>,
        now: Instant,
    ) -> i64 {
        let msg = GameMessage {
            msg_seq: self.queue.allocate_seq(),
            sender_id: self.sender_id_field(),
            receiver_id: receiver,
            body: Some(body),
        };
        let seq = msg.msg_seq;
        if msg.is_reliable() {
            self.queue.track(msg.clone(), to, now);
        }
        self.last_send.insert(to, now);
        out.push(Effect::Unicast(msg, to));
        seq
    }

    fn push_multicast(&mut self, out: &mut Vec<Effect>, body: Body) {
        let msg = GameMessage {
            msg_seq: self.queue.allocate_seq(),
            sender_id: self.sender_id_field(),
            receiver_id: None,
            body: Some(body),
        };
        out.push(Effect::Multicast(msg));
    }

    /// Ack a reliable message: echo its seq, never allocate one, never track.
    fn push_ack(
        &mut self,
        out: &mut Vec<Effect>,
        acked: &GameMessage,
        receiver: Option<PlayerId>,
        to: SocketAddr,
        now: Instant,
    ) {
        let ack = GameMessage {
            msg_seq: acked.msg_seq,
            sender_id: self.sender_id_field(),
            receiver_id: receiver.or(acked.sender_id),
            body: Some(Body::Ack(Ack {})),
        };
        self.last_send.insert(to, now);
        out.push(Effect::Unicast(ack, to));
    }

    fn announcement(&mut self) -> AnnouncementProto {
        AnnouncementProto {
            players: self.state.players.iter().map(Into::into).collect(),
            config: Some(self.config.into()),
            can_join: Some(self.engine.can_join(&self.state)),
            game_name: self.game_name.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    /// Resolve who a datagram is from: trust the claimed sender id when the
    /// table knows it, fall back to the source address.
    fn resolve_sender(&self, msg: &GameMessage, from: SocketAddr) -> Option<PlayerId> {
        if let Some(id) = msg.sender_id
            && id != 0
            && self.state.player(id).is_some()
        {
            return Some(id);
        }
        self.state
            .players
            .iter()
            .find(|p| p.endpoint() == Some(from))
            .map(|p| p.id)
    }

    /// Handle one inbound datagram.
    pub fn handle(&mut self, msg: GameMessage, from: SocketAddr, now: Instant) -> Vec<Effect> {
        let mut out = Vec::new();
        let sender = self.resolve_sender(&msg, from);
        if let Some(pid) = sender {
            self.last_recv.insert(pid, now);
        }
        if self.coordinator_addr == Some(from) {
            self.last_coord_msg = Some(now);
        }
        // A known sender, or the endpoint we currently call coordinator, may
        // be acked; reliable traffic from anyone else is the unknown-sender
        // case and is ignored wholesale.
        let trusted = sender.is_some() || self.coordinator_addr == Some(from);

        let Some(body) = msg.body.clone() else {
            trace!(%from, "datagram without body");
            return out;
        };
        match body {
            Body::Ack(_) => self.on_ack(&msg, &mut out),
            Body::Join(join) => self.on_join(&msg, join, from, now, &mut out),
            Body::Ping(_) => {
                if trusted {
                    self.push_ack(&mut out, &msg, sender, from, now);
                }
            }
            Body::Steer(steer) => {
                if let Some(pid) = sender {
                    self.push_ack(&mut out, &msg, sender, from, now);
                    self.on_steer(steer, pid);
                } else {
                    debug!(%from, "steer from unknown sender ignored");
                }
            }
            Body::State(state) => {
                if trusted {
                    self.push_ack(&mut out, &msg, sender, from, now);
                    self.on_state(state, from, now, &mut out);
                } else {
                    debug!(%from, "state from unknown sender ignored");
                }
            }
            Body::Error(err) => {
                if trusted {
                    self.push_ack(&mut out, &msg, sender, from, now);
                    self.on_error(err, &mut out);
                }
            }
            Body::RoleChange(rc) => {
                if trusted {
                    self.push_ack(&mut out, &msg, sender, from, now);
                    self.on_role_change(rc, sender, from, now, &mut out);
                } else {
                    debug!(%from, "role change from unknown sender ignored");
                }
            }
            Body::Discover(_) => {
                if self.role == NodeRole::Coordinator {
                    let announcement = self.announcement();
                    self.push_unicast(
                        &mut out,
                        Body::Announcement(AnnouncementList {
                            games: vec![announcement],
                        }),
                        from,
                        None,
                        now,
                    );
                }
            }
            Body::Announcement(_) => {
                // Session lists matter before a core exists (the browser in
                // the runtime handles that); inside a session they are noise.
                trace!(%from, "announcement ignored");
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    fn on_ack(&mut self, msg: &GameMessage, out: &mut Vec<Effect>) {
        self.queue.ack(msg.msg_seq);
        if self.join_seq == Some(msg.msg_seq) {
            let assigned = msg.receiver_id.unwrap_or(0);
            if assigned != 0 {
                self.join_seq = None;
                self.self_id = assigned;
                info!(player_id = assigned, "join accepted");
                out.push(Effect::Event(NodeEvent::Joined {
                    player_id: assigned,
                }));
            }
        }
    }

    fn on_join(
        &mut self,
        msg: &GameMessage,
        join: Join,
        from: SocketAddr,
        now: Instant,
        out: &mut Vec<Effect>,
    ) {
        if self.role != NodeRole::Coordinator {
            debug!(%from, "join ignored: not coordinator");
            return;
        }
        if join.game_name != self.game_name {
            debug!(%from, game = %join.game_name, "join for another session ignored");
            return;
        }

        // A retransmitted Join must not mint a second player.
        if let Some(existing) = self
            .state
            .players
            .iter()
            .find(|p| p.endpoint() == Some(from))
            .map(|p| p.id)
        {
            self.push_ack(out, msg, Some(existing), from, now);
            return;
        }

        let as_viewer = matches!(
            wire::NodeRole::try_from(join.requested_role),
            Ok(wire::NodeRole::Viewer)
        );
        if !as_viewer && !self.engine.can_join(&self.state) {
            debug!(%from, "join refused: {NO_SPACE}");
            self.push_unicast(
                out,
                Body::Error(ErrorMsg {
                    error_message: NO_SPACE.to_string(),
                }),
                from,
                msg.sender_id,
                now,
            );
            return;
        }

        let id = self.next_player_id;
        self.next_player_id += 1;
        let kind = wire::PlayerType::try_from(join.player_type)
            .map(Into::into)
            .unwrap_or(PlayerType::Human);
        self.state.players.push(Player {
            id,
            name: join.player_name,
            role: if as_viewer {
                NodeRole::Viewer
            } else {
                NodeRole::Normal
            },
            kind,
            score: 0,
            ip: Some(from.ip()),
            port: Some(from.port()),
        });
        self.last_recv.insert(id, now);
        if !as_viewer && self.engine.spawn_snake(&mut self.state, id).is_none() {
            // can_join said yes just above; keep the player as a viewer if
            // the grid filled up in between (cannot happen single-threaded,
            // but never leave a playing member without a snake).
            if let Some(p) = self.state.player_mut(id) {
                p.role = NodeRole::Viewer;
            }
        }
        info!(player_id = id, %from, viewer = as_viewer, "player joined");

        // The ack's receiver id doubles as the id assignment.
        self.push_ack(out, msg, Some(id), from, now);
        self.elect_deputy(now, out);
    }

    fn on_steer(&mut self, steer: Steer, pid: PlayerId) {
        if self.role != NodeRole::Coordinator {
            return;
        }
        let Ok(direction) = wire::Direction::try_from(steer.direction) else {
            debug!(player_id = pid, raw = steer.direction, "unknown direction");
            return;
        };
        let eligible = self
            .state
            .player(pid)
            .is_some_and(|p| p.role != NodeRole::Viewer)
            && self.state.snake(pid).is_some_and(|s| s.is_alive());
        if eligible {
            // Latest steer wins; reversal is rejected at tick time.
            self.steers.insert(pid, direction.into());
        }
    }

    fn on_state(&mut self, state: State, from: SocketAddr, now: Instant, out: &mut Vec<Effect>) {
        if self.role == NodeRole::Coordinator {
            warn!(%from, "another node is broadcasting state; ignoring");
            return;
        }
        let Some(proto) = state.state else {
            debug!(%from, "state message without payload");
            return;
        };
        let new_state: GameState = match proto.try_into() {
            Ok(s) => s,
            Err(err) => {
                warn!(%from, err, "dropping undecodable snapshot");
                return;
            }
        };
        if new_state.state_order <= self.state.state_order {
            trace!(
                stale = new_state.state_order,
                have = self.state.state_order,
                "stale snapshot dropped"
            );
            return;
        }
        self.state = new_state;
        self.coordinator_addr = Some(from);
        self.session_lost = false;

        self.sync_role_from_table(out);
        self.check_own_snake(now, out);
        out.push(Effect::Event(NodeEvent::Snapshot(Box::new(
            self.state.clone(),
        ))));
    }

    /// Adopt role changes the coordinator published in the table.
    fn sync_role_from_table(&mut self, out: &mut Vec<Effect>) {
        if self.self_id == 0 || self.role == NodeRole::Coordinator {
            return;
        }
        let Some(published) = self.state.player(self.self_id).map(|p| p.role) else {
            return;
        };
        if published == self.role {
            return;
        }
        match published {
            NodeRole::Deputy if self.role == NodeRole::Normal => {
                self.role = NodeRole::Deputy;
                out.push(Effect::Event(NodeEvent::BecameDeputy));
            }
            NodeRole::Viewer => {
                self.role = NodeRole::Viewer;
                self.pending_viewer = false;
                out.push(Effect::Event(NodeEvent::BecameViewer));
            }
            _ => {}
        }
    }

    /// Peer-side death watch: once our snake stops being alive, ask to
    /// become a viewer; the role flips when a snapshot confirms it.
    fn check_own_snake(&mut self, now: Instant, out: &mut Vec<Effect>) {
        if self.self_id == 0 {
            return;
        }
        let own_alive = self
            .state
            .snake(self.self_id)
            .is_some_and(|s| s.is_alive());
        if own_alive {
            self.seen_own_snake = true;
            return;
        }
        if !self.seen_own_snake
            || self.pending_viewer
            || !matches!(self.role, NodeRole::Normal | NodeRole::Deputy)
        {
            return;
        }
        self.pending_viewer = true;
        info!("own snake died; requesting viewer role");
        out.push(Effect::Event(NodeEvent::SnakeDied));
        if let Some(coordinator) = self.coordinator_addr {
            let body = Body::RoleChange(RoleChange {
                sender_role: Some(wire::NodeRole::from(self.role) as i32),
                receiver_role: Some(wire::NodeRole::Viewer as i32),
            });
            self.push_unicast(out, body, coordinator, None, now);
        }
    }

    fn on_error(&mut self, err: ErrorMsg, out: &mut Vec<Effect>) {
        if self.self_id == 0
            && let Some(seq) = self.join_seq.take()
        {
            // Stop retransmitting the refused Join.
            self.queue.ack(seq);
            warn!(reason = %err.error_message, "join refused");
            out.push(Effect::Event(NodeEvent::JoinRefused {
                reason: err.error_message,
            }));
            return;
        }
        warn!(reason = %err.error_message, "error from peer");
    }

    fn on_role_change(
        &mut self,
        rc: RoleChange,
        sender: Option<PlayerId>,
        from: SocketAddr,
        now: Instant,
        out: &mut Vec<Effect>,
    ) {
        let sender_role = rc
            .sender_role
            .and_then(|r| wire::NodeRole::try_from(r).ok());
        let receiver_role = rc
            .receiver_role
            .and_then(|r| wire::NodeRole::try_from(r).ok());

        match (sender_role, receiver_role) {
            // The coordinator appointed us deputy.
            (Some(wire::NodeRole::Coordinator), Some(wire::NodeRole::Deputy)) => {
                if self.role == NodeRole::Normal {
                    self.role = NodeRole::Deputy;
                    self.coordinator_addr = Some(from);
                    if let Some(me) = self.state.player_mut(self.self_id) {
                        me.role = NodeRole::Deputy;
                    }
                    info!("appointed deputy");
                    out.push(Effect::Event(NodeEvent::BecameDeputy));
                }
            }
            // The coordinator handed the session to us (we are its deputy).
            (Some(wire::NodeRole::Coordinator), Some(wire::NodeRole::Coordinator)) => {
                if self.role != NodeRole::Viewer {
                    self.promote(Takeover::Handover, now, out);
                }
            }
            // A deputy announces it took over.
            (Some(wire::NodeRole::Deputy), Some(wire::NodeRole::Coordinator)) => {
                if self.role == NodeRole::Coordinator {
                    // Someone superseded us; single-coordinator wins over
                    // pride. Step aside as a viewer.
                    warn!(%from, "superseded by a promoted deputy");
                    self.role = NodeRole::Viewer;
                    if let Some(me) = self.state.player_mut(self.self_id) {
                        me.role = NodeRole::Viewer;
                    }
                    out.push(Effect::Event(NodeEvent::BecameViewer));
                }
                self.coordinator_addr = Some(from);
                self.last_coord_msg = Some(now);
                self.session_lost = false;
                if let Some(pid) = sender
                    && let Some(p) = self.state.player_mut(pid)
                {
                    p.role = NodeRole::Coordinator;
                }
            }
            // A player asks to retire (its snake died, or it quit playing).
            (_, Some(wire::NodeRole::Viewer)) => {
                if self.role != NodeRole::Coordinator {
                    return;
                }
                let Some(pid) = sender else {
                    return;
                };
                let was_deputy = self
                    .state
                    .player(pid)
                    .is_some_and(|p| p.role == NodeRole::Deputy);
                if let Some(p) = self.state.player_mut(pid) {
                    p.role = NodeRole::Viewer;
                }
                self.state.make_zombie(pid);
                self.steers.remove(&pid);
                info!(player_id = pid, "player retired to viewer");
                if was_deputy {
                    self.elect_deputy(now, out);
                }
            }
            _ => debug!(?sender_role, ?receiver_role, "unrecognized role change"),
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Coordinator tick: drain steers, advance the simulation, broadcast the
    /// frozen snapshot reliably to every member (viewers included, so they
    /// can watch).
    pub fn on_tick(&mut self, now: Instant) -> Vec<Effect> {
        let mut out = Vec::new();
        if self.role != NodeRole::Coordinator {
            return out;
        }
        let steers = mem::take(&mut self.steers);
        self.engine.tick(&mut self.state, &steers);

        let own_alive = self
            .state
            .snake(self.self_id)
            .is_some_and(|s| s.is_alive());
        if self.seen_own_snake && !own_alive {
            self.seen_own_snake = false;
            out.push(Effect::Event(NodeEvent::SnakeDied));
            self.hand_over(now, &mut out);
        }

        let snapshot = GameStateProto::from(&self.state);
        let targets: Vec<(PlayerId, SocketAddr)> = self
            .state
            .players
            .iter()
            .filter(|p| p.id != self.self_id)
            .filter_map(|p| Some((p.id, p.endpoint()?)))
            .collect();
        for (pid, ep) in targets {
            self.push_unicast(
                &mut out,
                Body::State(State {
                    state: Some(snapshot.clone()),
                }),
                ep,
                Some(pid),
                now,
            );
        }
        out.push(Effect::Event(NodeEvent::Snapshot(Box::new(
            self.state.clone(),
        ))));
        out
    }

    /// The coordinator's own snake died: promote the deputy explicitly and
    /// retire. With no deputy the session stays up (joins are still served)
    /// and we simply play on without a snake.
    fn hand_over(&mut self, now: Instant, out: &mut Vec<Effect>) {
        let Some((deputy_id, deputy_ep)) = self
            .state
            .deputy()
            .and_then(|p| Some((p.id, p.endpoint()?)))
        else {
            info!("snake died but no deputy exists; staying coordinator");
            return;
        };
        info!(deputy = deputy_id, "handing session over");
        if let Some(p) = self.state.player_mut(deputy_id) {
            p.role = NodeRole::Coordinator;
        }
        if let Some(me) = self.state.player_mut(self.self_id) {
            me.role = NodeRole::Viewer;
        }
        self.role = NodeRole::Viewer;
        self.coordinator_addr = Some(deputy_ep);
        self.last_coord_msg = Some(now);
        let body = Body::RoleChange(RoleChange {
            sender_role: Some(wire::NodeRole::Coordinator as i32),
            receiver_role: Some(wire::NodeRole::Coordinator as i32),
        });
        self.push_unicast(out, body, deputy_ep, Some(deputy_id), now);
        out.push(Effect::Event(NodeEvent::BecameViewer));
    }

    /// Once per second on the coordinator: advertise the session.
    pub fn on_announce(&mut self, _now: Instant) -> Vec<Effect> {
        let mut out = Vec::new();
        if self.role != NodeRole::Coordinator {
            return out;
        }
        let announcement = self.announcement();
        self.push_multicast(
            &mut out,
            Body::Announcement(AnnouncementList {
                games: vec![announcement],
            }),
        );
        out
    }

    /// Re-send every unacked message older than a tenth of the tick period,
    /// original sequence numbers intact.
    pub fn on_retransmit(&mut self, now: Instant) -> Vec<Effect> {
        let mut out = Vec::new();
        for (msg, to) in self.queue.due(now, retransmit_interval(&self.config)) {
            trace!(seq = msg.msg_seq, %to, "retransmit");
            self.last_send.insert(to, now);
            out.push(Effect::Unicast(msg, to));
        }
        out
    }

    /// Ping every endpoint we have been silent towards, so liveness can
    /// always be inferred from traffic.
    pub fn on_ping(&mut self, now: Instant) -> Vec<Effect> {
        let mut out = Vec::new();
        let idle = ping_idle(&self.config);
        let targets: Vec<(Option<PlayerId>, SocketAddr)> = if self.role == NodeRole::Coordinator {
            self.state
                .players
                .iter()
                .filter(|p| p.id != self.self_id)
                .filter_map(|p| Some((Some(p.id), p.endpoint()?)))
                .collect()
        } else if self.self_id != 0 && !self.session_lost {
            self.coordinator_addr.map(|ep| (None, ep)).into_iter().collect()
        } else {
            Vec::new()
        };
        for (pid, ep) in targets {
            let quiet = self
                .last_send
                .get(&ep)
                .is_none_or(|last| now.duration_since(*last) >= idle);
            if quiet {
                self.push_unicast(&mut out, Body::Ping(Ping {}), ep, pid, now);
            }
        }
        out
    }

    /// Liveness sweep. On the coordinator: evict silent peers. On everyone
    /// else: detect coordinator loss and fail over.
    pub fn on_liveness(&mut self, now: Instant) -> Vec<Effect> {
        let mut out = Vec::new();
        let timeout = liveness_timeout(&self.config);
        if self.role == NodeRole::Coordinator {
            let stale: Vec<PlayerId> = self
                .state
                .players
                .iter()
                .filter(|p| p.id != self.self_id && p.role != NodeRole::Viewer)
                .filter(|p| {
                    self.last_recv
                        .get(&p.id)
                        .is_none_or(|last| now.duration_since(*last) >= timeout)
                })
                .map(|p| p.id)
                .collect();
            for pid in stale {
                self.evict(pid, now, &mut out);
            }
            // Reliable sends to endpoints that never became members (e.g. a
            // refused joiner) must not retransmit forever.
            let members: Vec<SocketAddr> = self
                .state
                .players
                .iter()
                .filter_map(Player::endpoint)
                .collect();
            self.queue.retain_addresses(|to| members.contains(&to));
            return out;
        }

        // Peer side: nothing to watch before the first snapshot.
        if self.state.state_order == 0 || self.session_lost {
            return out;
        }
        let lost = self
            .last_coord_msg
            .is_none_or(|last| now.duration_since(last) >= timeout);
        if !lost {
            return out;
        }
        if self.role == NodeRole::Deputy {
            self.promote(Takeover::CoordinatorDead, now, &mut out);
        } else {
            self.retarget_to_deputy(now, &mut out);
        }
        out
    }

    fn evict(&mut self, pid: PlayerId, now: Instant, out: &mut Vec<Effect>) {
        let Some(player) = self.state.remove_player(pid) else {
            return;
        };
        self.engine.remove_snake(&mut self.state, pid);
        self.steers.remove(&pid);
        self.last_recv.remove(&pid);
        if let Some(ep) = player.endpoint() {
            self.queue.drop_addressed_to(ep);
            self.last_send.remove(&ep);
        }
        info!(player_id = pid, role = ?player.role, "peer timed out");
        out.push(Effect::Event(NodeEvent::PeerEvicted { player_id: pid }));
        if player.role == NodeRole::Deputy {
            self.elect_deputy(now, out);
        }
    }

    /// NORMAL/VIEWER failover: point the session at the deputy recorded in
    /// the last snapshot and move pending traffic over.
    fn retarget_to_deputy(&mut self, now: Instant, out: &mut Vec<Effect>) {
        let deputy_ep = self
            .state
            .deputy()
            .filter(|p| p.id != self.self_id)
            .and_then(Player::endpoint);
        let Some(new) = deputy_ep else {
            warn!("coordinator lost and no deputy known");
            self.session_lost = true;
            self.queue.clear();
            out.push(Effect::Event(NodeEvent::SessionLost));
            return;
        };
        if let Some(old) = self.coordinator_addr
            && old != new
        {
            let moved = self.queue.retarget(old, new);
            debug!(%old, %new, moved, "retargeting to deputy");
        }
        self.coordinator_addr = Some(new);
        self.last_coord_msg = Some(now);
    }

    /// Become coordinator: adopt the latest observed snapshot as-is
    /// (`state_order` keeps counting, no renumbering), clean up the old
    /// coordinator, re-elect a deputy and tell the survivors.
    fn promote(&mut self, takeover: Takeover, now: Instant, out: &mut Vec<Effect>) {
        if self.role == NodeRole::Coordinator {
            return;
        }
        info!(state_order = self.state.state_order, "promoting to coordinator");
        self.role = NodeRole::Coordinator;
        self.coordinator_addr = None;
        self.last_coord_msg = None;
        self.session_lost = false;
        if self.state.player(self.self_id).is_none() {
            // Promoted before ever seeing ourselves in a snapshot; make a
            // self record so the table stays coherent.
            self.state.players.push(Player {
                id: self.self_id,
                name: self.player_name.clone(),
                role: NodeRole::Coordinator,
                kind: self.player_type,
                score: 0,
                ip: Some(self.local_addr.ip()),
                port: Some(self.local_addr.port()),
            });
        }

        match takeover {
            Takeover::CoordinatorDead => {
                let old = self
                    .state
                    .players
                    .iter()
                    .find(|p| p.role == NodeRole::Coordinator && p.id != self.self_id)
                    .map(|p| p.id);
                if let Some(pid) = old {
                    self.evict(pid, now, out);
                }
            }
            Takeover::Handover => {
                // The old coordinator retired; keep it around as a viewer.
                if let Some(p) = self
                    .state
                    .players
                    .iter_mut()
                    .find(|p| p.role == NodeRole::Coordinator && p.id != self.self_id)
                {
                    p.role = NodeRole::Viewer;
                }
            }
        }

        if let Some(me) = self.state.player_mut(self.self_id) {
            me.role = NodeRole::Coordinator;
        }
        self.seen_own_snake = self
            .state
            .snake(self.self_id)
            .is_some_and(|s| s.is_alive());

        // Fresh grace period for everyone who survived.
        let survivors: Vec<PlayerId> = self
            .state
            .players
            .iter()
            .filter(|p| p.id != self.self_id)
            .map(|p| p.id)
            .collect();
        for pid in &survivors {
            self.last_recv.insert(*pid, now);
        }

        self.elect_deputy(now, out);

        let targets: Vec<(PlayerId, SocketAddr)> = self
            .state
            .players
            .iter()
            .filter(|p| p.id != self.self_id)
            .filter_map(|p| Some((p.id, p.endpoint()?)))
            .collect();
        for (pid, ep) in targets {
            let body = Body::RoleChange(RoleChange {
                sender_role: Some(wire::NodeRole::Deputy as i32),
                receiver_role: Some(wire::NodeRole::Coordinator as i32),
            });
            self.push_unicast(out, body, ep, Some(pid), now);
        }
        out.push(Effect::Event(NodeEvent::BecameCoordinator));
    }

    /// Ensure there is a deputy whenever a NORMAL player exists: first
    /// NORMAL in insertion order wins.
    fn elect_deputy(&mut self, now: Instant, out: &mut Vec<Effect>) {
        if self.role != NodeRole::Coordinator || self.state.deputy().is_some() {
            return;
        }
        let candidate = self
            .state
            .players
            .iter()
            .find(|p| p.role == NodeRole::Normal && p.id != self.self_id)
            .and_then(|p| Some((p.id, p.endpoint()?)));
        let Some((pid, ep)) = candidate else {
            return;
        };
        if let Some(p) = self.state.player_mut(pid) {
            p.role = NodeRole::Deputy;
        }
        info!(player_id = pid, "deputy elected");
        let body = Body::RoleChange(RoleChange {
            sender_role: Some(wire::NodeRole::Coordinator as i32),
            receiver_role: Some(wire::NodeRole::Deputy as i32),
        });
        self.push_unicast(out, body, ep, Some(pid), now);
    }

    // ------------------------------------------------------------------
    // Local input
    // ------------------------------------------------------------------

    /// A direction input from the local UI.
    pub fn steer(&mut self, direction: Direction, now: Instant) -> Vec<Effect> {
        let mut out = Vec::new();
        match self.role {
            NodeRole::Coordinator => {
                if self.state.snake(self.self_id).is_some_and(|s| s.is_alive()) {
                    self.steers.insert(self.self_id, direction);
                }
            }
            NodeRole::Normal | NodeRole::Deputy => {
                if self.self_id != 0
                    && !self.pending_viewer
                    && let Some(coordinator) = self.coordinator_addr
                {
                    let body = Body::Steer(Steer {
                        direction: wire::Direction::from(direction) as i32,
                    });
                    self.push_unicast(&mut out, body, coordinator, None, now);
                }
            }
            NodeRole::Viewer => {}
        }
        out
    }
}

// ============================================================================
// Tests
// ============================================================================
