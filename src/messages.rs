// Message types exchanged with higher-level control

use serde::{Deserialize, Serialize};

use crate::motor::{
    ControlLoop, EnableState, FeedbackSource, LoopSet, MotorInstance, MotorType, OuterLoop,
};

// Command from higher-level control -> runtime
// Tagged by "op" so one topic carries every kind of request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MotorCommand {
    SetTarget {
        motor: usize,
        value: f32,
    },
    SetOuterLoop {
        motor: usize,
        outer_loop: OuterLoop,
    },
    SetLoops {
        motor: usize,
        loops: LoopSet,
    },
    SetFeedbackSource {
        motor: usize,
        control_loop: ControlLoop,
        source: FeedbackSource,
    },
    Stop {
        motor: usize,
    },
    Enable {
        motor: usize,
    },
    StopAll,
    EnableAll,
}

// Value published by another subsystem, routed to motors by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalFeedback {
    pub name: String,
    pub value: f32,
}

/// Telemetry for one motor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorState {
    pub index: usize,
    pub motor_type: MotorType,
    pub ecd: u16,
    pub total_angle: f32,
    pub speed: f32,
    pub current: f32,
    pub temperature: u8,
    pub enabled: bool,
    pub command: i16,
}

impl MotorState {
    pub fn new(index: usize, motor: &MotorInstance) -> Self {
        let measure = motor.measure();
        Self {
            index,
            motor_type: motor.motor_type(),
            ecd: measure.ecd,
            total_angle: measure.total_angle,
            speed: measure.speed,
            current: measure.current,
            temperature: measure.temperature,
            enabled: motor.settings().enable == EnableState::Enabled,
            command: motor.last_command(),
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_json() {
        let cmd: MotorCommand =
            serde_json::from_str(r#"{"op": "set_target", "motor": 2, "value": 1.5}"#).unwrap();
        assert_eq!(
            cmd,
            MotorCommand::SetTarget {
                motor: 2,
                value: 1.5
            }
        );

        let cmd: MotorCommand = serde_json::from_str(
            r#"{"op": "set_feedback_source", "motor": 0, "control_loop": "angle", "source": "external"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            MotorCommand::SetFeedbackSource {
                motor: 0,
                control_loop: ControlLoop::Angle,
                source: FeedbackSource::External
            }
        );

        let cmd: MotorCommand =
            serde_json::from_str(r#"{"op": "set_loops", "motor": 1, "loops": ["speed", "current"]}"#)
                .unwrap();
        assert_eq!(
            cmd,
            MotorCommand::SetLoops {
                motor: 1,
                loops: LoopSet::SPEED | LoopSet::CURRENT
            }
        );

        let cmd: MotorCommand = serde_json::from_str(r#"{"op": "stop_all"}"#).unwrap();
        assert_eq!(cmd, MotorCommand::StopAll);
    }

    #[test]
    fn test_health_json() {
        let json = serde_json::to_string(&RuntimeHealth::CmdStale).unwrap();
        assert_eq!(json, r#""cmd_stale""#);
    }
}
