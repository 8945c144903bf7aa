// Simulated CAN transport
//
// Stands in for the hardware bus when no adapter is attached: every bound
// motor is a first-order velocity plant driven by its slot in the group
// frames, and reports back with a standard 8-byte feedback frame.

use std::collections::VecDeque;

use tracing::debug;

use crate::motor::bus::{BindingConfig, BindingHandle, BusError, BusTransport, CanBus, FRAME_LEN};
use crate::motor::frame::{GROUP_LAYOUT, GROUP_SLOTS};
use crate::motor::measure::ECD_RANGE;

/// Steady-state rpm per unit of command
const RPM_PER_COMMAND: f32 = 0.55;
/// Velocity time constant in seconds
const TIME_CONSTANT: f32 = 0.05;
const AMBIENT_TEMPERATURE: u8 = 30;

#[derive(Debug, Clone)]
struct SimMotor {
    binding: BindingConfig,
    command: i16,
    rpm: f32,
    // position in encoder counts, kept fractional between steps
    position: f32,
}

impl SimMotor {
    fn step(&mut self, dt: f32) {
        let target = self.command as f32 * RPM_PER_COMMAND;
        let k = (dt / TIME_CONSTANT).min(1.0);
        self.rpm += (target - self.rpm) * k;

        let counts = self.rpm / 60.0 * ECD_RANGE as f32 * dt;
        self.position = (self.position + counts).rem_euclid(ECD_RANGE as f32);
    }

    fn feedback(&self) -> [u8; FRAME_LEN] {
        let ecd = (self.position as u16).min(ECD_RANGE - 1).to_be_bytes();
        let rpm = (self.rpm as i16).to_be_bytes();
        let current = self.command.to_be_bytes();
        [
            ecd[0],
            ecd[1],
            rpm[0],
            rpm[1],
            current[0],
            current[1],
            AMBIENT_TEMPERATURE,
            0,
        ]
    }
}

#[derive(Debug, Default)]
pub struct SimBus {
    motors: Vec<SimMotor>,
    pending: VecDeque<(BindingHandle, [u8; FRAME_LEN])>,
    sent: usize,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance every plant by `dt` seconds and queue one feedback frame each
    pub fn step(&mut self, dt: f32) {
        for (index, motor) in self.motors.iter_mut().enumerate() {
            motor.step(dt);
            self.pending.push_back((BindingHandle(index), motor.feedback()));
        }
    }

    /// Feedback frames produced since the last drain
    pub fn drain_feedback(&mut self) -> impl Iterator<Item = (BindingHandle, [u8; FRAME_LEN])> + '_ {
        self.pending.drain(..)
    }

    /// Group frames accepted so far
    pub fn frames_sent(&self) -> usize {
        self.sent
    }

    pub fn command_of(&self, binding: BindingHandle) -> Option<i16> {
        self.motors.get(binding.0).map(|motor| motor.command)
    }
}

impl BusTransport for SimBus {
    fn register_binding(&mut self, config: &BindingConfig) -> BindingHandle {
        self.motors.push(SimMotor {
            binding: *config,
            command: 0,
            rpm: 0.0,
            position: 0.0,
        });
        BindingHandle(self.motors.len() - 1)
    }

    fn transmit(
        &mut self,
        bus: CanBus,
        frame_id: u16,
        payload: &[u8; FRAME_LEN],
    ) -> Result<(), BusError> {
        let layout = GROUP_LAYOUT
            .iter()
            .copied()
            .find(|layout| layout.frame_id == frame_id)
            .ok_or_else(|| BusError::Transmit {
                bus,
                frame_id,
                reason: "not a command group frame".to_string(),
            })?;

        for motor in self.motors.iter_mut().filter(|m| m.binding.bus == bus) {
            let offset = motor.binding.tx_id as i32 - layout.base_id as i32;
            if (0..GROUP_SLOTS as i32).contains(&offset) {
                let at = 2 * offset as usize;
                motor.command = i16::from_be_bytes([payload[at], payload[at + 1]]);
            }
        }

        debug!("SIM {:?} 0x{:03X} {:02X?}", bus, frame_id, payload);
        self.sent += 1;
        Ok(())
    }
}
