//! Validation for the options a node is created with.

use garter_sim::{GameConfig, PlayerType};

/// Longest accepted player name, in bytes.
pub const MAX_NAME_BYTES: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("width {0} out of range [10, 100]")]
    Width(i32),
    #[error("height {0} out of range [10, 100]")]
    Height(i32),
    #[error("food_static {found} out of range [0, {max}]")]
    FoodStatic { found: i32, max: i32 },
    #[error("state_delay_ms {0} out of range [50, 3000]")]
    StateDelay(i32),
    #[error("player name must be non-empty and at most 64 bytes")]
    PlayerName,
    #[error("game name must be non-empty")]
    GameName,
}

/// Check the accepted ranges on a session config.
pub fn validate_config(config: &GameConfig) -> Result<(), ConfigError> {
    if !(10..=100).contains(&config.width) {
        return Err(ConfigError::Width(config.width));
    }
    if !(10..=100).contains(&config.height) {
        return Err(ConfigError::Height(config.height));
    }
    let max_food = config.width * config.height / 2;
    if !(0..=max_food).contains(&config.food_static) {
        return Err(ConfigError::FoodStatic {
            found: config.food_static,
            max: max_food,
        });
    }
    if !(50..=3000).contains(&config.state_delay_ms) {
        return Err(ConfigError::StateDelay(config.state_delay_ms));
    }
    Ok(())
}

pub fn validate_player_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.len() > MAX_NAME_BYTES {
        return Err(ConfigError::PlayerName);
    }
    Ok(())
}

/// Options for founding a session (the node starts as COORDINATOR).
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub game_name: String,
    pub player_name: String,
    pub player_type: PlayerType,
    pub config: GameConfig,
}

impl SessionOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.game_name.is_empty() {
            return Err(ConfigError::GameName);
        }
        validate_player_name(&self.player_name)?;
        validate_config(&self.config)
    }
}

/// Options for joining an advertised session.
#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub player_name: String,
    pub player_type: PlayerType,
    /// Join as a pure observer: no snake, never deputy.
    pub as_viewer: bool,
}

impl JoinOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_player_name(&self.player_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GameConfig::default()).is_ok());
    }

    #[test]
    fn out_of_range_fields_are_rejected() {
        let base = GameConfig::default();
        assert!(validate_config(&GameConfig { width: 9, ..base }).is_err());
        assert!(validate_config(&GameConfig { width: 101, ..base }).is_err());
        assert!(validate_config(&GameConfig { height: 101, ..base }).is_err());
        assert!(validate_config(&GameConfig { food_static: -1, ..base }).is_err());
        assert!(
            validate_config(&GameConfig {
                food_static: 25 * 25 / 2 + 1,
                ..base
            })
            .is_err()
        );
        assert!(
            validate_config(&GameConfig {
                state_delay_ms: 49,
                ..base
            })
            .is_err()
        );
        assert!(
            validate_config(&GameConfig {
                state_delay_ms: 3001,
                ..base
            })
            .is_err()
        );
    }

    #[test]
    fn player_name_limits() {
        assert!(validate_player_name("alice").is_ok());
        assert!(validate_player_name("").is_err());
        assert!(validate_player_name(&"x".repeat(64)).is_ok());
        assert!(validate_player_name(&"x".repeat(65)).is_err());
    }
}
