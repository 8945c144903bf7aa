// One registered motor: measurement, settings and its three PID stages

use super::bus::{BindingConfig, BindingHandle};
use super::feedback::FeedbackReader;
use super::frame::SlotRef;
use super::measure::{DecodeError, MotorMeasurement};
use super::settings::{
    ControlLoop, Direction, EnableState, FeedbackSource, LoopSet, MotorInitConfig, MotorSettings,
    MotorType, OuterLoop,
};
use crate::pid::Pid;

/// Cascade PID state plus the setpoint it tracks
#[derive(Debug, Clone)]
pub struct MotorController {
    pub current: Pid,
    pub speed: Pid,
    pub angle: Pid,
    /// Setpoint from the higher-level controller
    pub set: f32,
    pub external_angle: Option<FeedbackReader>,
    pub external_speed: Option<FeedbackReader>,
}

impl MotorController {
    fn reset(&mut self) {
        self.current.reset();
        self.speed.reset();
        self.angle.reset();
    }
}

#[derive(Debug, Clone)]
pub struct MotorInstance {
    motor_type: MotorType,
    measure: MotorMeasurement,
    settings: MotorSettings,
    controller: MotorController,
    binding: BindingHandle,
    binding_config: BindingConfig,
    output: SlotRef,
    last_command: i16,
}

impl MotorInstance {
    /// Build an enabled motor from its static configuration
    ///
    /// `output` must already be claimed in the transmit group set.
    pub fn new(config: &MotorInitConfig, binding: BindingHandle, output: SlotRef) -> Self {
        Self {
            motor_type: config.motor_type,
            measure: MotorMeasurement::default(),
            settings: config.settings(),
            controller: MotorController {
                current: Pid::new(&config.gains.current),
                speed: Pid::new(&config.gains.speed),
                angle: Pid::new(&config.gains.angle),
                set: 0.0,
                external_angle: None,
                external_speed: None,
            },
            binding,
            binding_config: config.binding,
            output,
            last_command: 0,
        }
    }

    pub fn with_external_angle(mut self, reader: FeedbackReader) -> Self {
        self.controller.external_angle = Some(reader);
        self
    }

    pub fn with_external_speed(mut self, reader: FeedbackReader) -> Self {
        self.controller.external_speed = Some(reader);
        self
    }

    pub fn motor_type(&self) -> MotorType {
        self.motor_type
    }

    /// Snapshot of the latest measurement
    pub fn measure(&self) -> MotorMeasurement {
        self.measure
    }

    pub fn settings(&self) -> &MotorSettings {
        &self.settings
    }

    pub fn controller(&self) -> &MotorController {
        &self.controller
    }

    pub(crate) fn controller_mut(&mut self) -> &mut MotorController {
        &mut self.controller
    }

    pub fn binding(&self) -> BindingHandle {
        self.binding
    }

    pub fn binding_config(&self) -> &BindingConfig {
        &self.binding_config
    }

    pub fn output(&self) -> SlotRef {
        self.output
    }

    /// Command written for this motor in the most recent tick
    pub fn last_command(&self) -> i16 {
        self.last_command
    }

    pub(crate) fn set_last_command(&mut self, command: i16) {
        self.last_command = command;
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enable == EnableState::Enabled
    }

    /// Decode a feedback payload into this motor's measurement
    pub fn decode(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
        self.measure.decode(payload)
    }

    pub fn set_target(&mut self, set: f32) {
        self.controller.set = set;
    }

    pub fn set_outer_loop(&mut self, outer_loop: OuterLoop) {
        self.settings.outer_loop = outer_loop;
    }

    pub fn set_loops(&mut self, loops: LoopSet) {
        self.settings.loops = loops;
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.settings.direction = direction;
    }

    /// Route the angle or speed stage to a feedback source
    ///
    /// The current stage always uses the motor's own sensor, so it is ignored.
    pub fn set_feedback_source(&mut self, control_loop: ControlLoop, source: FeedbackSource) {
        match control_loop {
            ControlLoop::Angle => self.settings.angle_feedback = source,
            ControlLoop::Speed => self.settings.speed_feedback = source,
            ControlLoop::Current => {}
        }
    }

    /// Force a zero command; PID stages are skipped while stopped
    pub fn stop(&mut self) {
        self.settings.enable = EnableState::Stopped;
    }

    /// Resume control with fresh PID state
    pub fn enable(&mut self) {
        if self.settings.enable == EnableState::Stopped {
            self.controller.reset();
        }
        self.settings.enable = EnableState::Enabled;
    }
}
