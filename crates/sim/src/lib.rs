//! Garter Simulation Core
//!
//! The deterministic Snake simulation shared by every node role. The
//! coordinator is the only node that advances it; everyone else just renders
//! the snapshots it produces.
//!
//! The simulation MUST NOT:
//! - Perform I/O operations (file, network, etc.)
//! - Read wall-clock time
//! - Use ambient/unseeded randomness
//!
//! All randomness (food placement, corpse-to-food scatter) flows through the
//! `StdRng` owned by [`Engine`], seeded once at session creation, so that two
//! engines built from the same seed and fed the same steers produce identical
//! snapshot streams.

#![deny(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ============================================================================
// Type Aliases
// ============================================================================

/// Per-session participant identifier. The coordinator takes 1; joiners get
/// monotonically increasing ids that are never reused.
pub type PlayerId = i32;

/// Monotonically increasing snapshot label.
pub type StateOrder = i32;

// ============================================================================
// Grid Types
// ============================================================================

/// A 0-indexed cell on the torus grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Head direction of a snake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// The exactly-opposite direction; steering into it is rejected for
    /// snakes of length >= 2.
    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Unit step in grid coordinates. Up is -y, matching screen-row order.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Immutable per-session parameters, fixed by the founding peer and carried
/// in every announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameConfig {
    /// Grid columns, in [10, 100].
    pub width: i32,
    /// Grid rows, in [10, 100].
    pub height: i32,
    /// Baseline food kept on the grid in addition to one per alive snake.
    pub food_static: i32,
    /// Tick period in milliseconds, in [50, 3000].
    pub state_delay_ms: i32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: 25,
            height: 25,
            food_static: 3,
            state_delay_ms: 200,
        }
    }
}

impl GameConfig {
    pub fn cell_count(&self) -> i32 {
        self.width * self.height
    }

    /// Wrap a coordinate onto the torus.
    pub fn wrap(&self, c: Coord) -> Coord {
        Coord {
            x: c.x.rem_euclid(self.width),
            y: c.y.rem_euclid(self.height),
        }
    }

    /// One step from `c` in `dir`, torus-wrapped.
    pub fn step(&self, c: Coord, dir: Direction) -> Coord {
        let (dx, dy) = dir.offset();
        self.wrap(Coord::new(c.x + dx, c.y + dy))
    }
}

// ============================================================================
// Players
// ============================================================================

/// Role of a node within the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// Regular participant steering a snake.
    Normal,
    /// The unique node ticking the simulation and broadcasting snapshots.
    Coordinator,
    /// Standby that takes over when the coordinator goes silent.
    Deputy,
    /// Retired participant; observes snapshots, steers nothing.
    Viewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerType {
    Human,
    Robot,
}

/// An entry in the coordinator-owned player table.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: NodeRole,
    pub kind: PlayerType,
    pub score: i32,
    /// Unicast endpoint; absent for the local player in its own table.
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
}

impl Player {
    pub fn endpoint(&self) -> Option<SocketAddr> {
        Some(SocketAddr::new(self.ip?, self.port?))
    }
}

// ============================================================================
// Snakes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnakeState {
    Alive,
    /// Owner retired; the snake keeps gliding straight until it crashes.
    Zombie,
}

/// A snake on the grid. `cells[0]` is the head; consecutive cells differ by
/// one torus-wrapped step.
#[derive(Debug, Clone, PartialEq)]
pub struct Snake {
    pub player_id: PlayerId,
    pub cells: Vec<Coord>,
    pub state: SnakeState,
    pub head_direction: Direction,
}

impl Snake {
    pub fn head(&self) -> Coord {
        self.cells[0]
    }

    /// Every cell except the head.
    pub fn body(&self) -> &[Coord] {
        &self.cells[1..]
    }

    pub fn is_alive(&self) -> bool {
        self.state == SnakeState::Alive
    }
}

/// Whether `dir` is a legal steer for this snake: anything goes for a 1-cell
/// snake, otherwise the exact reverse of the current heading is rejected.
pub fn legal_steer(snake: &Snake, dir: Direction) -> bool {
    snake.cells.len() < 2 || dir != snake.head_direction.opposite()
}

// ============================================================================
// Game State (snapshot)
// ============================================================================

/// One frozen frame of the session, labelled by `state_order`. The
/// coordinator mutates its working copy through [`Engine`]; everything a peer
/// ever sees is an immutable clone of this.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GameState {
    pub state_order: StateOrder,
    pub snakes: Vec<Snake>,
    pub foods: Vec<Coord>,
    pub players: Vec<Player>,
}

impl GameState {
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn snake(&self, id: PlayerId) -> Option<&Snake> {
        self.snakes.iter().find(|s| s.player_id == id)
    }

    pub fn snake_mut(&mut self, id: PlayerId) -> Option<&mut Snake> {
        self.snakes.iter_mut().find(|s| s.player_id == id)
    }

    pub fn coordinator(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.role == NodeRole::Coordinator)
    }

    pub fn deputy(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.role == NodeRole::Deputy)
    }

    pub fn alive_count(&self) -> usize {
        self.snakes.iter().filter(|s| s.is_alive()).count()
    }

    /// True when any snake or food occupies `c`.
    pub fn occupied(&self, c: Coord) -> bool {
        self.snakes.iter().any(|s| s.cells.contains(&c)) || self.foods.contains(&c)
    }

    /// Remove a player record, returning it. The snake (if any) is untouched;
    /// callers decide between scatter and zombie.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let at = self.players.iter().position(|p| p.id == id)?;
        Some(self.players.remove(at))
    }

    /// Turn the player's snake into a zombie. No-op if there is none.
    pub fn make_zombie(&mut self, id: PlayerId) {
        if let Some(snake) = self.snake_mut(id) {
            snake.state = SnakeState::Zombie;
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Side of the empty square required to admit a new snake.
pub const SPAWN_SQUARE: i32 = 5;

/// The tick engine owned by the coordinator. Holds the immutable session
/// config and the session RNG; all mutation of a [`GameState`] that involves
/// rules or randomness goes through here.
#[derive(Debug, Clone)]
pub struct Engine {
    config: GameConfig,
    rng: StdRng,
}

impl Engine {
    pub fn new(config: GameConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Scan every origin (row-major) for a `SPAWN_SQUARE`-sided square with
    /// no snake cell and no food, torus-wrapped. Returns the origin.
    pub fn find_spawn_square(&self, state: &GameState) -> Option<Coord> {
        let mut taken: HashSet<Coord> = HashSet::new();
        for snake in &state.snakes {
            taken.extend(snake.cells.iter().copied());
        }
        taken.extend(state.foods.iter().copied());

        for oy in 0..self.config.height {
            for ox in 0..self.config.width {
                let origin = Coord::new(ox, oy);
                if self.square_is_free(&taken, origin) {
                    return Some(origin);
                }
            }
        }
        None
    }

    fn square_is_free(&self, taken: &HashSet<Coord>, origin: Coord) -> bool {
        for dy in 0..SPAWN_SQUARE {
            for dx in 0..SPAWN_SQUARE {
                let c = self.config.wrap(Coord::new(origin.x + dx, origin.y + dy));
                if taken.contains(&c) {
                    return false;
                }
            }
        }
        true
    }

    /// Whether a join with a snake can currently be admitted.
    pub fn can_join(&self, state: &GameState) -> bool {
        self.find_spawn_square(state).is_some()
    }

    /// Place a fresh 1-cell snake for `player_id` at the center of the first
    /// free square, heading right. Returns the spawn cell, or `None` when no
    /// free square exists (the join must be refused).
    pub fn spawn_snake(&mut self, state: &mut GameState, player_id: PlayerId) -> Option<Coord> {
        let origin = self.find_spawn_square(state)?;
        let center = self
            .config
            .wrap(Coord::new(origin.x + SPAWN_SQUARE / 2, origin.y + SPAWN_SQUARE / 2));
        state.snakes.push(Snake {
            player_id,
            cells: vec![center],
            state: SnakeState::Alive,
            head_direction: Direction::Right,
        });
        Some(center)
    }

    /// Advance one tick: apply steers, move every snake one step, resolve
    /// food and collisions, scatter corpses, replenish food, bump
    /// `state_order`.
    pub fn tick(&mut self, state: &mut GameState, steers: &HashMap<PlayerId, Direction>) {
        self.apply_steers(state, steers);
        self.move_and_eat(state);
        let fatalities = collisions(state);
        self.bury(state, &fatalities);
        self.replenish_food(state);
        state.state_order += 1;
    }

    fn apply_steers(&self, state: &mut GameState, steers: &HashMap<PlayerId, Direction>) {
        for snake in state.snakes.iter_mut().filter(|s| s.is_alive()) {
            if let Some(&dir) = steers.get(&snake.player_id) {
                if legal_steer(snake, dir) {
                    snake.head_direction = dir;
                }
            }
        }
    }

    /// Move every snake (zombies included) one step. A snake whose new head
    /// lands on food grows and its owner scores; otherwise the tail is
    /// dropped. Movement is simultaneous: each snake steps exactly once and
    /// collisions are judged afterwards on the post-move grid.
    fn move_and_eat(&mut self, state: &mut GameState) {
        let mut scores: Vec<PlayerId> = Vec::new();
        let config = self.config;
        for snake in &mut state.snakes {
            let new_head = config.step(snake.head(), snake.head_direction);
            snake.cells.insert(0, new_head);
            if let Some(at) = state.foods.iter().position(|&f| f == new_head) {
                state.foods.remove(at);
                if snake.is_alive() {
                    scores.push(snake.player_id);
                }
            } else {
                snake.cells.pop();
            }
        }
        for id in scores {
            if let Some(player) = state.player_mut(id) {
                player.score += 1;
            }
        }
    }

    /// Remove the given snakes, scattering each corpse cell into food with
    /// independent probability 0.5. Cells already holding food or a survivor
    /// are left alone.
    fn bury(&mut self, state: &mut GameState, fatalities: &Fatalities) {
        if fatalities.dead.is_empty() {
            return;
        }
        for id in &fatalities.awards {
            if let Some(player) = state.player_mut(*id) {
                player.score += 1;
            }
        }
        let mut corpses: Vec<Coord> = Vec::new();
        state.snakes.retain(|s| {
            if fatalities.dead.contains(&s.player_id) {
                corpses.extend_from_slice(&s.cells);
                false
            } else {
                true
            }
        });
        for cell in corpses {
            if !state.occupied(cell) && self.rng.gen_bool(0.5) {
                state.foods.push(cell);
            }
        }
    }

    /// Top food up to `food_static + alive snakes`, one uniformly-random
    /// empty cell at a time. Each placement retries at most `width * height`
    /// draws; when the grid is that crowded the shortfall is skipped.
    fn replenish_food(&mut self, state: &mut GameState) {
        let target = self.config.food_static + state.alive_count() as i32;
        while (state.foods.len() as i32) < target {
            match self.random_empty_cell(state) {
                Some(c) => state.foods.push(c),
                None => break,
            }
        }
    }

    fn random_empty_cell(&mut self, state: &GameState) -> Option<Coord> {
        for _ in 0..self.config.cell_count() {
            let c = Coord::new(
                self.rng.gen_range(0..self.config.width),
                self.rng.gen_range(0..self.config.height),
            );
            if !state.occupied(c) {
                return Some(c);
            }
        }
        None
    }

    /// Coordinator-side eviction of a playing peer: drop the snake and
    /// scatter it. The player record itself is membership's business.
    pub fn remove_snake(&mut self, state: &mut GameState, player_id: PlayerId) {
        let fatalities = Fatalities {
            dead: vec![player_id],
            awards: Vec::new(),
        };
        self.bury(state, &fatalities);
    }
}

// ============================================================================
// Collision Resolution
// ============================================================================

struct Fatalities {
    dead: Vec<PlayerId>,
    /// Owners of ALIVE snakes somebody crashed into, one entry per crash.
    awards: Vec<PlayerId>,
}

/// Judge the post-move grid.
///
/// - Two or more heads on one cell: every snake involved dies, nobody scores.
/// - A head on its own body: that snake dies.
/// - A head on another snake's body: the mover dies and the body's owner
///   scores one point, unless the body belongs to a zombie.
fn collisions(state: &GameState) -> Fatalities {
    let mut dead: Vec<PlayerId> = Vec::new();
    let mut awards: Vec<PlayerId> = Vec::new();

    for snake in &state.snakes {
        let head = snake.head();
        let mut fatal = false;

        for other in &state.snakes {
            if other.player_id == snake.player_id {
                if snake.body().contains(&head) {
                    fatal = true;
                }
            } else if other.head() == head {
                // Tie: both die, handled symmetrically when `other` is judged.
                fatal = true;
            } else if other.body().contains(&head) {
                fatal = true;
                if other.is_alive() {
                    awards.push(other.player_id);
                }
            }
        }

        if fatal && !dead.contains(&snake.player_id) {
            dead.push(snake.player_id);
        }
    }

    Fatalities { dead, awards }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GameConfig {
        GameConfig {
            width: 10,
            height: 10,
            food_static: 0,
            state_delay_ms: 200,
        }
    }

    fn snake_at(id: PlayerId, cells: Vec<Coord>, dir: Direction) -> Snake {
        Snake {
            player_id: id,
            cells,
            state: SnakeState::Alive,
            head_direction: dir,
        }
    }

    fn player(id: PlayerId) -> Player {
        Player {
            id,
            name: format!("p{id}"),
            role: NodeRole::Normal,
            kind: PlayerType::Human,
            score: 0,
            ip: None,
            port: None,
        }
    }

    fn state_with(snakes: Vec<Snake>) -> GameState {
        let players = snakes.iter().map(|s| player(s.player_id)).collect();
        GameState {
            state_order: 1,
            snakes,
            foods: Vec::new(),
            players,
        }
    }

    #[test]
    fn step_wraps_on_torus() {
        let config = test_config();
        assert_eq!(
            config.step(Coord::new(9, 0), Direction::Right),
            Coord::new(0, 0)
        );
        assert_eq!(
            config.step(Coord::new(0, 0), Direction::Up),
            Coord::new(0, 9)
        );
        assert_eq!(
            config.step(Coord::new(0, 9), Direction::Down),
            Coord::new(0, 0)
        );
        assert_eq!(
            config.step(Coord::new(0, 0), Direction::Left),
            Coord::new(9, 0)
        );
    }

    #[test]
    fn tick_advances_head_one_cell() {
        let mut engine = Engine::new(test_config(), 7);
        let mut state = state_with(vec![snake_at(
            1,
            vec![Coord::new(4, 4), Coord::new(3, 4), Coord::new(2, 4)],
            Direction::Right,
        )]);

        engine.tick(&mut state, &HashMap::new());

        let snake = state.snake(1).unwrap();
        assert_eq!(snake.head(), Coord::new(5, 4));
        assert_eq!(snake.cells.len(), 3);
        assert_eq!(state.state_order, 2);
    }

    #[test]
    fn reverse_steer_is_dropped_for_long_snake() {
        let mut engine = Engine::new(test_config(), 7);
        let mut state = state_with(vec![snake_at(
            1,
            vec![Coord::new(4, 4), Coord::new(3, 4), Coord::new(2, 4)],
            Direction::Right,
        )]);
        let steers = HashMap::from([(1, Direction::Left)]);

        engine.tick(&mut state, &steers);

        let snake = state.snake(1).unwrap();
        assert_eq!(snake.head_direction, Direction::Right);
        assert_eq!(snake.head(), Coord::new(5, 4));
    }

    #[test]
    fn reverse_steer_is_legal_for_one_cell_snake() {
        let snake = snake_at(1, vec![Coord::new(4, 4)], Direction::Right);
        assert!(legal_steer(&snake, Direction::Left));

        let long = snake_at(1, vec![Coord::new(4, 4), Coord::new(3, 4)], Direction::Right);
        assert!(!legal_steer(&long, Direction::Left));
        assert!(legal_steer(&long, Direction::Up));
    }

    #[test]
    fn eating_food_grows_and_scores() {
        let mut engine = Engine::new(test_config(), 7);
        let mut state = state_with(vec![snake_at(
            1,
            vec![Coord::new(4, 4), Coord::new(3, 4)],
            Direction::Right,
        )]);
        state.foods.push(Coord::new(5, 4));

        engine.tick(&mut state, &HashMap::new());

        let snake = state.snake(1).unwrap();
        assert_eq!(snake.cells.len(), 3);
        assert_eq!(snake.head(), Coord::new(5, 4));
        assert_eq!(state.player(1).unwrap().score, 1);
        assert!(!state.foods.contains(&Coord::new(5, 4)));
    }

    #[test]
    fn self_collision_kills_snake() {
        // A 5-cell hook about to bite its own body.
        let mut engine = Engine::new(test_config(), 7);
        let mut state = state_with(vec![snake_at(
            1,
            vec![
                Coord::new(4, 5),
                Coord::new(4, 4),
                Coord::new(5, 4),
                Coord::new(5, 5),
                Coord::new(5, 6),
            ],
            Direction::Right,
        )]);

        engine.tick(&mut state, &HashMap::new());

        assert!(state.snake(1).is_none());
    }

    #[test]
    fn head_to_head_kills_both_without_award() {
        let mut engine = Engine::new(test_config(), 7);
        let mut state = state_with(vec![
            snake_at(1, vec![Coord::new(4, 4), Coord::new(3, 4)], Direction::Right),
            snake_at(2, vec![Coord::new(6, 4), Coord::new(7, 4)], Direction::Left),
        ]);

        engine.tick(&mut state, &HashMap::new());

        assert!(state.snakes.is_empty());
        assert_eq!(state.player(1).unwrap().score, 0);
        assert_eq!(state.player(2).unwrap().score, 0);
    }

    #[test]
    fn head_into_body_kills_mover_and_awards_owner() {
        let mut engine = Engine::new(test_config(), 7);
        let mut state = state_with(vec![
            snake_at(1, vec![Coord::new(4, 5), Coord::new(4, 6)], Direction::Up),
            snake_at(
                2,
                vec![Coord::new(3, 3), Coord::new(4, 3), Coord::new(4, 4), Coord::new(4, 5)],
                Direction::Left,
            ),
        ]);
        // After moving, snake 1's head lands on (4,4), inside snake 2's body.

        engine.tick(&mut state, &HashMap::new());

        assert!(state.snake(1).is_none());
        assert!(state.snake(2).is_some());
        assert_eq!(state.player(2).unwrap().score, 1);
    }

    #[test]
    fn crashing_into_zombie_body_awards_nothing() {
        let mut engine = Engine::new(test_config(), 7);
        let mut zombie = snake_at(
            2,
            vec![Coord::new(3, 3), Coord::new(4, 3), Coord::new(4, 4), Coord::new(4, 5)],
            Direction::Left,
        );
        zombie.state = SnakeState::Zombie;
        let mut state = state_with(vec![
            snake_at(1, vec![Coord::new(4, 5), Coord::new(4, 6)], Direction::Up),
            zombie,
        ]);

        engine.tick(&mut state, &HashMap::new());

        assert!(state.snake(1).is_none());
        assert_eq!(state.player(2).unwrap().score, 0);
    }

    #[test]
    fn zombie_keeps_moving_and_ignores_steers() {
        let mut engine = Engine::new(test_config(), 7);
        let mut zombie = snake_at(1, vec![Coord::new(4, 4), Coord::new(3, 4)], Direction::Right);
        zombie.state = SnakeState::Zombie;
        let mut state = state_with(vec![zombie]);
        let steers = HashMap::from([(1, Direction::Up)]);

        engine.tick(&mut state, &steers);

        let snake = state.snake(1).unwrap();
        assert_eq!(snake.head_direction, Direction::Right);
        assert_eq!(snake.head(), Coord::new(5, 4));
    }

    #[test]
    fn food_is_replenished_to_floor() {
        let config = GameConfig {
            food_static: 3,
            ..test_config()
        };
        let mut engine = Engine::new(config, 7);
        let mut state = state_with(vec![snake_at(
            1,
            vec![Coord::new(4, 4), Coord::new(3, 4)],
            Direction::Right,
        )]);

        engine.tick(&mut state, &HashMap::new());

        // floor = food_static + one alive snake
        assert_eq!(state.foods.len(), 4);
        for food in &state.foods {
            assert!(!state.snakes.iter().any(|s| s.cells.contains(food)));
        }
    }

    #[test]
    fn scatter_is_deterministic_for_a_seed() {
        let run = || {
            let mut engine = Engine::new(test_config(), 42);
            let mut state = state_with(vec![
                snake_at(1, vec![Coord::new(4, 5), Coord::new(4, 6), Coord::new(4, 7)], Direction::Up),
                snake_at(
                    2,
                    vec![Coord::new(3, 3), Coord::new(4, 3), Coord::new(4, 4), Coord::new(4, 5)],
                    Direction::Left,
                ),
            ]);
            engine.tick(&mut state, &HashMap::new());
            state
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn spawn_goes_to_center_of_first_free_square() {
        let mut engine = Engine::new(test_config(), 7);
        let mut state = state_with(vec![]);

        let cell = engine.spawn_snake(&mut state, 1).unwrap();

        assert_eq!(cell, Coord::new(2, 2));
        let snake = state.snake(1).unwrap();
        assert_eq!(snake.cells, vec![Coord::new(2, 2)]);
        assert_eq!(snake.head_direction, Direction::Right);
        assert!(snake.is_alive());
    }

    #[test]
    fn spawn_fails_when_no_free_square_exists() {
        let mut engine = Engine::new(test_config(), 7);
        let mut state = state_with(vec![]);
        // A food lattice with 4-cell spacing leaves no empty 5x5 square.
        for y in (0..10).step_by(4) {
            for x in (0..10).step_by(4) {
                state.foods.push(Coord::new(x, y));
            }
        }

        assert!(!engine.can_join(&state));
        assert!(engine.spawn_snake(&mut state, 1).is_none());
    }

    #[test]
    fn spawn_avoids_occupied_squares() {
        let mut engine = Engine::new(test_config(), 7);
        let mut state = state_with(vec![]);
        state.foods.push(Coord::new(2, 2));

        let cell = engine.spawn_snake(&mut state, 1).unwrap();

        assert_ne!(cell, Coord::new(2, 2));
        assert!(!state.foods.contains(&cell));
    }

    #[test]
    fn remove_snake_scatters_roughly_half_the_cells() {
        let config = GameConfig {
            width: 100,
            height: 100,
            food_static: 0,
            state_delay_ms: 200,
        };
        let mut engine = Engine::new(config, 9);
        let cells: Vec<Coord> = (0..100).map(|x| Coord::new(x, 50)).collect();
        let mut state = state_with(vec![snake_at(1, cells, Direction::Right)]);

        engine.remove_snake(&mut state, 1);

        assert!(state.snake(1).is_none());
        // Binomial(100, 0.5): well within [20, 80] for any reasonable seed.
        assert!(state.foods.len() >= 20 && state.foods.len() <= 80);
        for food in &state.foods {
            assert_eq!(food.y, 50);
        }
    }

    #[test]
    fn make_zombie_keeps_player_and_snake() {
        let mut state = state_with(vec![snake_at(
            1,
            vec![Coord::new(4, 4), Coord::new(3, 4)],
            Direction::Right,
        )]);

        state.make_zombie(1);

        assert_eq!(state.snake(1).unwrap().state, SnakeState::Zombie);
        assert!(state.player(1).is_some());
    }
}
