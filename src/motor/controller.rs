// Per-tick cascade control over every registered motor
//
// Stage selection per motor:
//   angle   - outer loop is Angle and the angle bit is set
//   speed   - speed bit set and outer loop is Angle or Speed
//   current - current bit set
// Each stage's output becomes the next stage's setpoint.

use tracing::debug;

use super::feedback::FeedbackReader;
use super::frame::TxGroupSet;
use super::instance::MotorInstance;
use super::registry::MotorRegistry;
use super::settings::{ControlLoop, Direction, EnableState, FeedbackSource, LoopSet, OuterLoop};

/// Stages that ran for one motor, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTrace {
    stages: [ControlLoop; 3],
    len: usize,
}

impl Default for StageTrace {
    fn default() -> Self {
        Self {
            stages: [ControlLoop::Current; 3],
            len: 0,
        }
    }
}

impl StageTrace {
    fn push(&mut self, stage: ControlLoop) {
        self.stages[self.len] = stage;
        self.len += 1;
    }

    pub fn as_slice(&self) -> &[ControlLoop] {
        &self.stages[..self.len]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeOutput {
    pub command: i16,
    pub stages: StageTrace,
}

/// Run the enabled PID stages of one motor and return its command
///
/// A stopped motor skips every stage and yields zero.
pub fn cascade(motor: &mut MotorInstance) -> CascadeOutput {
    let measure = motor.measure();
    let settings = *motor.settings();
    let mut stages = StageTrace::default();

    if settings.enable == EnableState::Stopped {
        return CascadeOutput { command: 0, stages };
    }

    let controller = motor.controller_mut();
    let mut set = controller.set;
    if settings.direction == Direction::Reversed {
        set = -set;
    }

    if settings.outer_loop == OuterLoop::Angle && settings.loops.contains(LoopSet::ANGLE) {
        let angle = select_feedback(
            settings.angle_feedback,
            controller.external_angle.as_ref(),
            measure.total_angle,
        );
        set = controller.angle.calculate(set, angle);
        stages.push(ControlLoop::Angle);
    }

    if settings.loops.contains(LoopSet::SPEED)
        && matches!(settings.outer_loop, OuterLoop::Angle | OuterLoop::Speed)
    {
        let speed = select_feedback(
            settings.speed_feedback,
            controller.external_speed.as_ref(),
            measure.speed,
        );
        set = controller.speed.calculate(set, speed);
        stages.push(ControlLoop::Speed);
    }

    if settings.loops.contains(LoopSet::CURRENT) {
        set = controller.current.calculate(set, measure.current);
        stages.push(ControlLoop::Current);
    }

    CascadeOutput {
        command: to_command(set),
        stages,
    }
}

/// Compute and write every motor's command, in registration order
///
/// Each iteration writes its own motor's slot before moving on, so the
/// buffers hold one consistent set of commands when the tick returns.
pub fn run_control_tick(registry: &mut MotorRegistry, groups: &mut TxGroupSet) {
    for (_, motor) in registry.iter_mut() {
        let output = cascade(motor);
        let at = motor.output();

        if motor.is_enabled() {
            groups.write_command(at, output.command);
        } else {
            groups.zero_slot(at);
        }
        motor.set_last_command(output.command);
    }
}

fn select_feedback(source: FeedbackSource, external: Option<&FeedbackReader>, own: f32) -> f32 {
    match source {
        FeedbackSource::Motor => own,
        FeedbackSource::External => match external.and_then(FeedbackReader::latest) {
            Some(value) => value,
            None => {
                debug!("External feedback unavailable, using motor sensor");
                own
            }
        },
    }
}

/// Truncate toward zero, saturating at the i16 range (NaN maps to 0)
fn to_command(value: f32) -> i16 {
    value as i16
}
