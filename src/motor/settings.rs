// Per-motor loop topology, feedback routing and static init configuration

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::bus::BindingConfig;
use crate::pid::PidConfig;

/// Motor families on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorType {
    Gm6020,
    M3508,
    M2006,
}

/// A single control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlLoop {
    Speed,
    Angle,
    Current,
}

/// Which loop, if any, is the outermost stage of the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OuterLoop {
    #[default]
    None,
    Speed,
    Angle,
}

bitflags! {
    /// Set of enabled loops, independently combinable
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(from = "Vec<ControlLoop>", into = "Vec<ControlLoop>")]
    pub struct LoopSet: u8 {
        const SPEED = 0b001;
        const ANGLE = 0b010;
        const CURRENT = 0b100;
    }
}

impl Default for LoopSet {
    fn default() -> Self {
        LoopSet::empty()
    }
}

impl From<ControlLoop> for LoopSet {
    fn from(control_loop: ControlLoop) -> Self {
        match control_loop {
            ControlLoop::Speed => LoopSet::SPEED,
            ControlLoop::Angle => LoopSet::ANGLE,
            ControlLoop::Current => LoopSet::CURRENT,
        }
    }
}

impl From<Vec<ControlLoop>> for LoopSet {
    fn from(loops: Vec<ControlLoop>) -> Self {
        loops.into_iter().map(LoopSet::from).collect()
    }
}

impl From<LoopSet> for Vec<ControlLoop> {
    fn from(set: LoopSet) -> Self {
        [ControlLoop::Speed, ControlLoop::Angle, ControlLoop::Current]
            .into_iter()
            .filter(|&control_loop| set.contains(control_loop.into()))
            .collect()
    }
}

/// Origin of the measurement used by a control stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    /// The motor's own encoder
    #[default]
    Motor,
    /// A value published by another subsystem
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Normal,
    Reversed,
}

/// Two-state enable machine, changed only by explicit stop/enable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnableState {
    #[default]
    Stopped,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotorSettings {
    pub outer_loop: OuterLoop,
    pub loops: LoopSet,
    pub angle_feedback: FeedbackSource,
    pub speed_feedback: FeedbackSource,
    pub direction: Direction,
    pub enable: EnableState,
}

/// Gains for the three stages of one motor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadeGains {
    #[serde(default)]
    pub current: PidConfig,
    #[serde(default)]
    pub speed: PidConfig,
    #[serde(default)]
    pub angle: PidConfig,
}

/// Static configuration supplied once when a motor is initialised
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorInitConfig {
    pub motor_type: MotorType,
    pub binding: BindingConfig,
    #[serde(default)]
    pub gains: CascadeGains,
    #[serde(default)]
    pub outer_loop: OuterLoop,
    #[serde(default)]
    pub loops: LoopSet,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub angle_feedback: FeedbackSource,
    #[serde(default)]
    pub speed_feedback: FeedbackSource,
    /// Name of the externally published angle value, if any
    #[serde(default)]
    pub external_angle: Option<String>,
    /// Name of the externally published speed value, if any
    #[serde(default)]
    pub external_speed: Option<String>,
}

impl MotorInitConfig {
    /// Settings a freshly initialised motor starts with (always enabled)
    pub fn settings(&self) -> MotorSettings {
        MotorSettings {
            outer_loop: self.outer_loop,
            loops: self.loops,
            angle_feedback: self.angle_feedback,
            speed_feedback: self.speed_feedback,
            direction: self.direction,
            enable: EnableState::Enabled,
        }
    }
}
