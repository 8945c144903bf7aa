// Loop timing, topics, and the motor layout loaded at startup
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::motor::{
    BindingConfig, CanBus, CascadeGains, Direction, FeedbackSource, LoopSet, MotorInitConfig,
    MotorType, OuterLoop,
};
use crate::pid::PidConfig;

// Control loop frequency
pub const LOOP_HZ: u64 = 1000;
// Highest loop rate the microsecond tick period can express
pub const MAX_LOOP_HZ: u64 = 1_000_000;

// Telemetry is published every N control ticks
pub const TELEMETRY_EVERY: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_MOTOR: &str = "gearmotor/cmd/motor"; // commands
pub const TOPIC_FEEDBACK: &str = "gearmotor/feedback"; // externally published values
pub const TOPIC_STATE_MOTORS: &str = "gearmotor/state/motors"; // telemetry
pub const TOPIC_HEALTH: &str = "gearmotor/state/health"; // health status

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid motor configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Motor layout file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub motors: Vec<MotorInitConfig>,
}

impl RuntimeConfig {
    /// Load a JSON layout file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Layout used when no file is given: four chassis wheels in speed mode
    /// on CAN1 and a yaw gimbal motor on CAN2 tracking an external angle
    pub fn demo() -> Self {
        let wheel = |esc_id: u8, direction: Direction| MotorInitConfig {
            motor_type: MotorType::M3508,
            binding: BindingConfig::for_esc(MotorType::M3508, CanBus::Can1, esc_id),
            gains: CascadeGains {
                current: PidConfig::default(),
                speed: PidConfig::new(10.0, 0.5, 0.0, 16384.0),
                angle: PidConfig::default(),
            },
            outer_loop: OuterLoop::Speed,
            loops: LoopSet::SPEED,
            direction,
            angle_feedback: FeedbackSource::Motor,
            speed_feedback: FeedbackSource::Motor,
            external_angle: None,
            external_speed: None,
        };

        let yaw = MotorInitConfig {
            motor_type: MotorType::Gm6020,
            binding: BindingConfig::for_esc(MotorType::Gm6020, CanBus::Can2, 1),
            gains: CascadeGains {
                current: PidConfig::default(),
                speed: PidConfig::new(40.0, 1.0, 0.0, 20000.0),
                angle: PidConfig::new(8.0, 0.0, 0.5, 300.0),
            },
            outer_loop: OuterLoop::Angle,
            loops: LoopSet::ANGLE | LoopSet::SPEED,
            direction: Direction::Normal,
            angle_feedback: FeedbackSource::External,
            speed_feedback: FeedbackSource::Motor,
            external_angle: Some("gimbal/yaw".to_string()),
            external_speed: None,
        };

        Self {
            motors: vec![
                wheel(1, Direction::Normal),
                wheel(2, Direction::Reversed),
                wheel(3, Direction::Normal),
                wheel(4, Direction::Reversed),
                yaw,
            ],
        }
    }
}
