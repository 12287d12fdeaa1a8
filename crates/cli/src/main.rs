//! `garter`: LAN-multiplayer Snake over UDP multicast.
//!
//! Three subcommands: `host` founds a session and coordinates it, `join`
//! enters one advertised on the LAN, `list` prints what is currently
//! advertised. A real interactive UI is a separate concern; this binary
//! renders snapshots as text and (unless told otherwise) steers its snake
//! with a small autopilot, which is enough to exercise every part of the
//! session protocol from a couple of terminals.

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};
use crossbeam::channel::RecvTimeoutError;
use rand::Rng;
use tracing::{info, warn};

use garter_node::{JoinOptions, Node, NodeEvent, SessionOptions, discover};
use garter_sim::{Coord, Direction, GameConfig, GameState, PlayerType, SnakeState, legal_steer};

#[derive(Parser, Debug)]
#[command(name = "garter")]
#[command(about = "LAN-multiplayer Snake over UDP multicast", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a session and coordinate it
    Host {
        /// Session name advertised on the LAN
        #[arg(long, default_value = "garter")]
        game_name: String,
        /// Player name (at most 64 bytes)
        #[arg(long, default_value = "host")]
        name: String,
        /// Grid columns
        #[arg(long, default_value_t = 25)]
        width: i32,
        /// Grid rows
        #[arg(long, default_value_t = 25)]
        height: i32,
        /// Baseline food count
        #[arg(long, default_value_t = 3)]
        food_static: i32,
        /// Tick period in milliseconds
        #[arg(long, default_value_t = 200)]
        state_delay_ms: i32,
        /// Keep the current heading instead of autopiloting
        #[arg(long, default_value_t = false)]
        idle: bool,
        /// Draw the board on every snapshot
        #[arg(long, default_value_t = false)]
        draw: bool,
    },
    /// Join a session advertised on the LAN
    Join {
        /// Player name
        #[arg(long, default_value = "player")]
        name: String,
        /// Session to join; defaults to the first one discovered
        #[arg(long)]
        game_name: Option<String>,
        /// Join as a pure observer (no snake)
        #[arg(long, default_value_t = false)]
        viewer: bool,
        /// Seconds to browse for announcements before giving up
        #[arg(long, default_value_t = 3)]
        browse_secs: u64,
        /// Keep the current heading instead of autopiloting
        #[arg(long, default_value_t = false)]
        idle: bool,
        /// Draw the board on every snapshot
        #[arg(long, default_value_t = false)]
        draw: bool,
    },
    /// List sessions advertised on the LAN
    List {
        /// Seconds to listen for announcements
        #[arg(long, default_value_t = 3)]
        browse_secs: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Args::parse().command {
        Command::Host {
            game_name,
            name,
            width,
            height,
            food_static,
            state_delay_ms,
            idle,
            draw,
        } => {
            let node = Node::host(SessionOptions {
                game_name,
                player_name: name,
                player_type: if idle {
                    PlayerType::Human
                } else {
                    PlayerType::Robot
                },
                config: GameConfig {
                    width,
                    height,
                    food_static,
                    state_delay_ms,
                },
            })?;
            info!(addr = %node.local_addr(), "hosting; ctrl-c to quit");
            run_session(node, !idle, draw)
        }
        Command::Join {
            name,
            game_name,
            viewer,
            browse_secs,
            idle,
            draw,
        } => {
            let games = discover(Duration::from_secs(browse_secs))?;
            let game = match &game_name {
                Some(wanted) => games.iter().find(|g| &g.game_name == wanted),
                None => games.first(),
            };
            let Some(game) = game else {
                anyhow::bail!("no session found on the LAN");
            };
            if !game.announcement.joinable() && !viewer {
                warn!(game = %game.game_name, "session reports no free space");
            }
            info!(game = %game.game_name, addr = %game.addr, "joining");
            let node = Node::join(
                JoinOptions {
                    player_name: name,
                    player_type: if idle || viewer {
                        PlayerType::Human
                    } else {
                        PlayerType::Robot
                    },
                    as_viewer: viewer,
                },
                game,
            )?;
            run_session(node, !idle && !viewer, draw)
        }
        Command::List { browse_secs } => {
            let games = discover(Duration::from_secs(browse_secs))?;
            if games.is_empty() {
                println!("no sessions advertised");
                return Ok(());
            }
            for game in games {
                let config: GameConfig = game
                    .announcement
                    .config
                    .map(Into::into)
                    .unwrap_or_default();
                println!(
                    "{:<24} {:<22} {}x{} players={} can_join={}",
                    game.game_name,
                    game.addr,
                    config.width,
                    config.height,
                    game.announcement.players.len(),
                    game.announcement.joinable(),
                );
            }
            Ok(())
        }
    }
}

/// Pump node events until the session ends: render snapshots, log role
/// changes, feed the autopilot.
fn run_session(node: Node, autopilot: bool, draw: bool) -> Result<()> {
    let mut rng = rand::thread_rng();
    let started = Instant::now();
    loop {
        match node.events().recv_timeout(Duration::from_millis(500)) {
            Ok(NodeEvent::Snapshot(state)) => {
                if autopilot {
                    autopilot_steer(&node, &state, &mut rng);
                }
                if draw {
                    draw_board(&state, &node.config());
                } else if state.state_order % 25 == 0 {
                    log_scores(&state);
                }
            }
            Ok(NodeEvent::Joined { player_id }) => info!(player_id, "joined"),
            Ok(NodeEvent::JoinRefused { reason }) => {
                warn!(%reason, "join refused");
                node.shutdown();
                return Ok(());
            }
            Ok(NodeEvent::SnakeDied) => info!("snake died; watching from now on"),
            Ok(NodeEvent::BecameDeputy) => info!("now deputy"),
            Ok(NodeEvent::BecameCoordinator) => info!("now coordinating the session"),
            Ok(NodeEvent::BecameViewer) => info!("now a viewer"),
            Ok(NodeEvent::PeerEvicted { player_id }) => info!(player_id, "peer evicted"),
            Ok(NodeEvent::SessionLost) => {
                warn!(
                    uptime_secs = started.elapsed().as_secs(),
                    "session lost (coordinator gone, no deputy)"
                );
                node.shutdown();
                return Ok(());
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}

/// Every snapshot, sometimes pick a new legal direction. Dumb on purpose:
/// the point is protocol traffic, not high scores.
fn autopilot_steer(node: &Node, state: &GameState, rng: &mut impl Rng) {
    let id = node.self_id();
    if id == 0 {
        return;
    }
    let Some(snake) = state.snake(id) else {
        return;
    };
    if snake.state != SnakeState::Alive || !rng.gen_bool(0.3) {
        return;
    }
    let dir = match rng.gen_range(0..4) {
        0 => Direction::Up,
        1 => Direction::Down,
        2 => Direction::Left,
        _ => Direction::Right,
    };
    if legal_steer(snake, dir) {
        node.steer(dir);
    }
}

fn log_scores(state: &GameState) {
    let mut scores: Vec<String> = state
        .players
        .iter()
        .map(|p| format!("{}={} ({:?})", p.name, p.score, p.role))
        .collect();
    scores.sort();
    info!(
        state_order = state.state_order,
        scores = %scores.join(", "),
        "scoreboard"
    );
}

fn draw_board(state: &GameState, config: &GameConfig) {
    let mut grid = vec![vec!['.'; config.width as usize]; config.height as usize];
    let mut put = |c: Coord, ch: char| {
        if let Some(cell) = grid
            .get_mut(c.y as usize)
            .and_then(|row| row.get_mut(c.x as usize))
        {
            *cell = ch;
        }
    };
    for food in &state.foods {
        put(*food, '*');
    }
    for snake in &state.snakes {
        let body_char = if snake.state == SnakeState::Alive {
            'o'
        } else {
            'z'
        };
        for cell in snake.body() {
            put(*cell, body_char);
        }
        put(snake.head(), '@');
    }
    let mut frame = String::with_capacity((config.width as usize + 1) * config.height as usize);
    for row in grid {
        frame.extend(row);
        frame.push('\n');
    }
    println!("-- state {} --\n{frame}", state.state_order);
}
