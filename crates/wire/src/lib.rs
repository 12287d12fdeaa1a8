//! Garter Wire Protocol Types
//!
//! This crate defines the Protobuf datagram format shared by every node on
//! the LAN. Tag ids are frozen: changing one strands every peer running an
//! older build, so new fields get new tags and unknown tags are skipped on
//! decode (prost does this natively, which is what keeps the format
//! forward-compatible).
//!
//! # Message Categories
//!
//! - **Reliable** (acked, retransmitted): Ping, Steer, State, Join, Error,
//!   RoleChange
//! - **Fire-and-forget**: Announcement, Discover, Ack
//!
//! Every datagram is one [`GameMessage`] envelope: a per-sender `msg_seq`,
//! optional sender/receiver ids, and exactly one body.

#![deny(unsafe_code)]

use std::net::{Ipv4Addr, SocketAddrV4};

use prost::{Enumeration, Message, Oneof};

// ============================================================================
// Wire Constants
// ============================================================================

/// IPv4 multicast group for announcements and discovery probes.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 192, 0, 4);

/// Port the multicast group listens on.
pub const MULTICAST_PORT: u16 = 9192;

/// Hard cap on an encoded datagram.
pub const MAX_DATAGRAM: usize = 4096;

/// The full multicast endpoint.
pub const fn multicast_endpoint() -> SocketAddrV4 {
    SocketAddrV4::new(MULTICAST_GROUP, MULTICAST_PORT)
}

// ============================================================================
// Enumerations
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Enumeration)]
#[repr(i32)]
pub enum Direction {
    Up = 1,
    Down = 2,
    Left = 3,
    Right = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Enumeration)]
#[repr(i32)]
pub enum NodeRole {
    Normal = 0,
    Coordinator = 1,
    Deputy = 2,
    Viewer = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Enumeration)]
#[repr(i32)]
pub enum PlayerType {
    Human = 0,
    Robot = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Enumeration)]
#[repr(i32)]
pub enum SnakeState {
    Alive = 0,
    Zombie = 1,
}

// ============================================================================
// State-Carrying Types
// ============================================================================

/// A grid cell.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct CoordProto {
    #[prost(int32, tag = "1")]
    pub x: i32,
    #[prost(int32, tag = "2")]
    pub y: i32,
}

/// A snake: head first, every cell listed explicitly.
#[derive(Clone, PartialEq, Message)]
pub struct SnakeProto {
    #[prost(int32, tag = "1")]
    pub player_id: i32,
    #[prost(message, repeated, tag = "2")]
    pub cells: Vec<CoordProto>,
    #[prost(enumeration = "SnakeState", tag = "3")]
    pub state: i32,
    #[prost(enumeration = "Direction", tag = "4")]
    pub head_direction: i32,
}

/// One row of the player table. `ip_address`/`port` are absent for the
/// sender's own record (a node does not necessarily know how others see it).
#[derive(Clone, PartialEq, Message)]
pub struct PlayerProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int32, tag = "2")]
    pub id: i32,
    #[prost(string, optional, tag = "3")]
    pub ip_address: Option<String>,
    #[prost(int32, optional, tag = "4")]
    pub port: Option<i32>,
    #[prost(enumeration = "NodeRole", tag = "5")]
    pub role: i32,
    #[prost(enumeration = "PlayerType", tag = "6")]
    pub kind: i32,
    #[prost(int32, tag = "7")]
    pub score: i32,
}

/// Immutable session parameters.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct GameConfigProto {
    #[prost(int32, tag = "1")]
    pub width: i32,
    #[prost(int32, tag = "2")]
    pub height: i32,
    #[prost(int32, tag = "3")]
    pub food_static: i32,
    #[prost(int32, tag = "5")]
    pub state_delay_ms: i32,
}

/// A full snapshot, labelled by `state_order`.
#[derive(Clone, PartialEq, Message)]
pub struct GameStateProto {
    #[prost(int32, tag = "1")]
    pub state_order: i32,
    #[prost(message, repeated, tag = "2")]
    pub snakes: Vec<SnakeProto>,
    #[prost(message, repeated, tag = "3")]
    pub foods: Vec<CoordProto>,
    #[prost(message, repeated, tag = "4")]
    pub players: Vec<PlayerProto>,
}

/// One advertised session, as carried on multicast and in Discover replies.
#[derive(Clone, PartialEq, Message)]
pub struct AnnouncementProto {
    #[prost(message, repeated, tag = "1")]
    pub players: Vec<PlayerProto>,
    #[prost(message, optional, tag = "2")]
    pub config: Option<GameConfigProto>,
    /// Absent means joinable (distinguishable from an explicit `false`).
    #[prost(bool, optional, tag = "3")]
    pub can_join: Option<bool>,
    #[prost(string, tag = "4")]
    pub game_name: String,
}

impl AnnouncementProto {
    pub fn joinable(&self) -> bool {
        self.can_join.unwrap_or(true)
    }
}

// ============================================================================
// Message Bodies
// ============================================================================

/// Liveness probe; carries nothing beyond the envelope.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct Ping {}

/// A direction input for the sender's snake.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct Steer {
    #[prost(enumeration = "Direction", tag = "1")]
    pub direction: i32,
}

/// Acknowledges the reliable message whose seq the envelope echoes. For a
/// Join ack the envelope's `receiver_id` doubles as the assigned player id.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct Ack {}

/// Snapshot broadcast from the coordinator.
#[derive(Clone, PartialEq, Message)]
pub struct State {
    #[prost(message, optional, tag = "1")]
    pub state: Option<GameStateProto>,
}

/// Sessions known to the sender. Multicast once per second by the
/// coordinator and unicast in reply to a Discover.
#[derive(Clone, PartialEq, Message)]
pub struct AnnouncementList {
    #[prost(message, repeated, tag = "1")]
    pub games: Vec<AnnouncementProto>,
}

/// Request to enter the named session.
#[derive(Clone, PartialEq, Message)]
pub struct Join {
    #[prost(enumeration = "PlayerType", tag = "1")]
    pub player_type: i32,
    #[prost(string, tag = "3")]
    pub player_name: String,
    #[prost(string, tag = "4")]
    pub game_name: String,
    #[prost(enumeration = "NodeRole", tag = "5")]
    pub requested_role: i32,
}

/// Human-readable refusal, e.g. a join with no room left.
#[derive(Clone, PartialEq, Message)]
pub struct ErrorMsg {
    #[prost(string, tag = "1")]
    pub error_message: String,
}

/// Role negotiation; see the node crate for the recognized patterns.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct RoleChange {
    #[prost(enumeration = "NodeRole", optional, tag = "1")]
    pub sender_role: Option<i32>,
    #[prost(enumeration = "NodeRole", optional, tag = "2")]
    pub receiver_role: Option<i32>,
}

/// Asks coordinators on the LAN to reply with an announcement.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct Discover {}

// ============================================================================
// Envelope
// ============================================================================

/// The one-per-datagram envelope.
#[derive(Clone, PartialEq, Message)]
pub struct GameMessage {
    /// Monotonic per sender, starting at 1. An Ack echoes the seq it
    /// acknowledges instead of consuming a fresh one.
    #[prost(int64, tag = "1")]
    pub msg_seq: i64,
    /// Absent until the sender has been assigned an id.
    #[prost(int32, optional, tag = "10")]
    pub sender_id: Option<i32>,
    /// Absent when the sender does not know who it is talking to.
    #[prost(int32, optional, tag = "11")]
    pub receiver_id: Option<i32>,
    #[prost(oneof = "Body", tags = "2, 3, 4, 5, 6, 7, 8, 9, 12")]
    pub body: Option<Body>,
}

/// The message union. Tag ids are frozen.
#[derive(Clone, PartialEq, Oneof)]
pub enum Body {
    #[prost(message, tag = "2")]
    Ping(Ping),
    #[prost(message, tag = "3")]
    Steer(Steer),
    #[prost(message, tag = "4")]
    Ack(Ack),
    #[prost(message, tag = "5")]
    State(State),
    #[prost(message, tag = "6")]
    Announcement(AnnouncementList),
    #[prost(message, tag = "7")]
    Join(Join),
    #[prost(message, tag = "8")]
    Error(ErrorMsg),
    #[prost(message, tag = "9")]
    RoleChange(RoleChange),
    #[prost(message, tag = "12")]
    Discover(Discover),
}

impl Body {
    /// Reliable kinds are acked by the receiver and retransmitted by the
    /// sender until acked or the peer is evicted.
    pub fn is_reliable(&self) -> bool {
        matches!(
            self,
            Self::Ping(_)
                | Self::Steer(_)
                | Self::State(_)
                | Self::Join(_)
                | Self::Error(_)
                | Self::RoleChange(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping(_) => "ping",
            Self::Steer(_) => "steer",
            Self::Ack(_) => "ack",
            Self::State(_) => "state",
            Self::Announcement(_) => "announcement",
            Self::Join(_) => "join",
            Self::Error(_) => "error",
            Self::RoleChange(_) => "role_change",
            Self::Discover(_) => "discover",
        }
    }
}

impl GameMessage {
    pub fn is_reliable(&self) -> bool {
        self.body.as_ref().is_some_and(Body::is_reliable)
    }
}

// ============================================================================
// Datagram Codec
// ============================================================================

/// Codec failures. Always local: a bad frame is dropped and logged, never
/// fatal.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] prost::DecodeError),
    #[error("datagram too large: {len} bytes (cap 4096)")]
    Oversized { len: usize },
}

/// Encode one envelope into a datagram, enforcing [`MAX_DATAGRAM`].
pub fn encode_datagram(msg: &GameMessage) -> Result<Vec<u8>, WireError> {
    let buf = msg.encode_to_vec();
    if buf.len() > MAX_DATAGRAM {
        return Err(WireError::Oversized { len: buf.len() });
    }
    Ok(buf)
}

/// Decode one datagram. Unknown fields are skipped; anything else wrong with
/// the bytes is a malformed-frame error.
pub fn decode_datagram(bytes: &[u8]) -> Result<GameMessage, WireError> {
    Ok(GameMessage::decode(bytes)?)
}

// ============================================================================
// Conversions: wire <-> simulation
// ============================================================================

impl From<garter_sim::Coord> for CoordProto {
    fn from(c: garter_sim::Coord) -> Self {
        Self { x: c.x, y: c.y }
    }
}

impl From<CoordProto> for garter_sim::Coord {
    fn from(c: CoordProto) -> Self {
        Self { x: c.x, y: c.y }
    }
}

impl From<garter_sim::Direction> for Direction {
    fn from(d: garter_sim::Direction) -> Self {
        match d {
            garter_sim::Direction::Up => Self::Up,
            garter_sim::Direction::Down => Self::Down,
            garter_sim::Direction::Left => Self::Left,
            garter_sim::Direction::Right => Self::Right,
        }
    }
}

impl From<Direction> for garter_sim::Direction {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Up => Self::Up,
            Direction::Down => Self::Down,
            Direction::Left => Self::Left,
            Direction::Right => Self::Right,
        }
    }
}

impl From<garter_sim::NodeRole> for NodeRole {
    fn from(r: garter_sim::NodeRole) -> Self {
        match r {
            garter_sim::NodeRole::Normal => Self::Normal,
            garter_sim::NodeRole::Coordinator => Self::Coordinator,
            garter_sim::NodeRole::Deputy => Self::Deputy,
            garter_sim::NodeRole::Viewer => Self::Viewer,
        }
    }
}

impl From<NodeRole> for garter_sim::NodeRole {
    fn from(r: NodeRole) -> Self {
        match r {
            NodeRole::Normal => Self::Normal,
            NodeRole::Coordinator => Self::Coordinator,
            NodeRole::Deputy => Self::Deputy,
            NodeRole::Viewer => Self::Viewer,
        }
    }
}

impl From<garter_sim::PlayerType> for PlayerType {
    fn from(t: garter_sim::PlayerType) -> Self {
        match t {
            garter_sim::PlayerType::Human => Self::Human,
            garter_sim::PlayerType::Robot => Self::Robot,
        }
    }
}

impl From<PlayerType> for garter_sim::PlayerType {
    fn from(t: PlayerType) -> Self {
        match t {
            PlayerType::Human => Self::Human,
            PlayerType::Robot => Self::Robot,
        }
    }
}

impl From<garter_sim::SnakeState> for SnakeState {
    fn from(s: garter_sim::SnakeState) -> Self {
        match s {
            garter_sim::SnakeState::Alive => Self::Alive,
            garter_sim::SnakeState::Zombie => Self::Zombie,
        }
    }
}

impl From<SnakeState> for garter_sim::SnakeState {
    fn from(s: SnakeState) -> Self {
        match s {
            SnakeState::Alive => Self::Alive,
            SnakeState::Zombie => Self::Zombie,
        }
    }
}

impl From<garter_sim::GameConfig> for GameConfigProto {
    fn from(c: garter_sim::GameConfig) -> Self {
        Self {
            width: c.width,
            height: c.height,
            food_static: c.food_static,
            state_delay_ms: c.state_delay_ms,
        }
    }
}

impl From<GameConfigProto> for garter_sim::GameConfig {
    fn from(c: GameConfigProto) -> Self {
        Self {
            width: c.width,
            height: c.height,
            food_static: c.food_static,
            state_delay_ms: c.state_delay_ms,
        }
    }
}

impl From<&garter_sim::Snake> for SnakeProto {
    fn from(s: &garter_sim::Snake) -> Self {
        Self {
            player_id: s.player_id,
            cells: s.cells.iter().copied().map(Into::into).collect(),
            state: SnakeState::from(s.state) as i32,
            head_direction: Direction::from(s.head_direction) as i32,
        }
    }
}

impl TryFrom<SnakeProto> for garter_sim::Snake {
    type Error = &'static str;

    fn try_from(s: SnakeProto) -> Result<Self, Self::Error> {
        if s.cells.is_empty() {
            return Err("snake with no cells");
        }
        let state = SnakeState::try_from(s.state).map_err(|_| "unknown snake state")?;
        let head_direction =
            Direction::try_from(s.head_direction).map_err(|_| "unknown direction")?;
        Ok(Self {
            player_id: s.player_id,
            cells: s.cells.into_iter().map(Into::into).collect(),
            state: state.into(),
            head_direction: head_direction.into(),
        })
    }
}

impl From<&garter_sim::Player> for PlayerProto {
    fn from(p: &garter_sim::Player) -> Self {
        Self {
            name: p.name.clone(),
            id: p.id,
            ip_address: p.ip.map(|ip| ip.to_string()),
            port: p.port.map(i32::from),
            role: NodeRole::from(p.role) as i32,
            kind: PlayerType::from(p.kind) as i32,
            score: p.score,
        }
    }
}

impl TryFrom<PlayerProto> for garter_sim::Player {
    type Error = &'static str;

    fn try_from(p: PlayerProto) -> Result<Self, Self::Error> {
        let role = NodeRole::try_from(p.role).map_err(|_| "unknown role")?;
        let kind = PlayerType::try_from(p.kind).map_err(|_| "unknown player type")?;
        let ip = match p.ip_address {
            Some(s) => Some(s.parse().map_err(|_| "invalid ip address")?),
            None => None,
        };
        let port = match p.port {
            Some(n) => Some(u16::try_from(n).map_err(|_| "port out of range")?),
            None => None,
        };
        Ok(Self {
            id: p.id,
            name: p.name,
            role: role.into(),
            kind: kind.into(),
            score: p.score,
            ip,
            port,
        })
    }
}

impl From<&garter_sim::GameState> for GameStateProto {
    fn from(s: &garter_sim::GameState) -> Self {
        Self {
            state_order: s.state_order,
            snakes: s.snakes.iter().map(Into::into).collect(),
            foods: s.foods.iter().copied().map(Into::into).collect(),
            players: s.players.iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<GameStateProto> for garter_sim::GameState {
    type Error = &'static str;

    fn try_from(s: GameStateProto) -> Result<Self, Self::Error> {
        let snakes: Result<Vec<_>, _> = s.snakes.into_iter().map(TryInto::try_into).collect();
        let players: Result<Vec<_>, _> = s.players.into_iter().map(TryInto::try_into).collect();
        Ok(Self {
            state_order: s.state_order,
            snakes: snakes?,
            foods: s.foods.into_iter().map(Into::into).collect(),
            players: players?,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
