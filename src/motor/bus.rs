// Bus transport boundary
//
// The physical CAN transport lives outside this crate. It hands out binding
// handles for each motor and receives finished group frames after every tick.

use serde::{Deserialize, Serialize};

use super::settings::MotorType;

/// Payload length of a classic CAN data frame
pub const FRAME_LEN: usize = 8;

/// Physical CAN bus a motor is wired to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanBus {
    Can1,
    Can2,
}

impl CanBus {
    pub const ALL: [CanBus; 2] = [CanBus::Can1, CanBus::Can2];
}

/// Static bus wiring for one motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingConfig {
    pub bus: CanBus,
    /// Identifier that selects the motor's slot in its command group
    pub tx_id: u16,
    /// Identifier of the motor's feedback frames
    pub rx_id: u16,
}

impl BindingConfig {
    /// Standard wiring for an ESC with the given dial id (1-based)
    ///
    /// M3508/M2006 report on 0x200 + id, GM6020 on 0x204 + id. The command
    /// slot follows the feedback identifier.
    pub fn for_esc(motor_type: MotorType, bus: CanBus, esc_id: u8) -> Self {
        let id = match motor_type {
            MotorType::M3508 | MotorType::M2006 => 0x200 + esc_id as u16,
            MotorType::Gm6020 => 0x204 + esc_id as u16,
        };
        Self {
            bus,
            tx_id: id,
            rx_id: id,
        }
    }
}

/// Opaque association handed out by the transport for one motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingHandle(pub usize);

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Transmit on {bus:?} frame 0x{frame_id:03X} failed: {reason}")]
    Transmit {
        bus: CanBus,
        frame_id: u16,
        reason: String,
    },
}

/// The transport collaborator
pub trait BusTransport {
    /// Register a motor's wiring and get back a handle the transport will
    /// use when delivering its feedback frames
    fn register_binding(&mut self, config: &BindingConfig) -> BindingHandle;

    /// Send one group frame
    fn transmit(
        &mut self,
        bus: CanBus,
        frame_id: u16,
        payload: &[u8; FRAME_LEN],
    ) -> Result<(), BusError>;
}
