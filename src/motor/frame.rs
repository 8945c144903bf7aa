// Outbound command frames
//
// Commands are batched per bus address range: every group frame carries up to
// four big-endian i16 commands, slot = tx_id - base_id.
// [cmd0_hi, cmd0_lo, cmd1_hi, cmd1_lo, cmd2_hi, cmd2_lo, cmd3_hi, cmd3_lo]

use tracing::warn;

use super::bus::{BusError, BusTransport, CanBus, FRAME_LEN};

/// Motor slots per group frame (2 bytes each)
pub const GROUP_SLOTS: usize = FRAME_LEN / 2;

/// Command frame id and the first motor id it addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupLayout {
    pub frame_id: u16,
    pub base_id: u16,
}

/// Address ranges shared by every bus
pub const GROUP_LAYOUT: [GroupLayout; 3] = [
    GroupLayout {
        frame_id: 0x200,
        base_id: 0x201,
    },
    GroupLayout {
        frame_id: 0x1FF,
        base_id: 0x205,
    },
    GroupLayout {
        frame_id: 0x2FF,
        base_id: 0x209,
    },
];

pub const GROUP_COUNT: usize = GROUP_LAYOUT.len() * CanBus::ALL.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Transmit id 0x{tx_id:03X} on {bus:?} has no slot in any command group")]
    SlotOutOfRange { bus: CanBus, tx_id: u16 },

    #[error("Slot for transmit id 0x{tx_id:03X} on {bus:?} is already taken")]
    SlotInUse { bus: CanBus, tx_id: u16 },
}

/// Slot index that has been checked against the group capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotIndex(usize);

impl SlotIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

/// One group buffer
#[derive(Debug, Clone)]
pub struct TxGroup {
    bus: CanBus,
    layout: GroupLayout,
    buf: [u8; FRAME_LEN],
    occupied: [bool; GROUP_SLOTS],
}

impl TxGroup {
    pub fn new(bus: CanBus, layout: GroupLayout) -> Self {
        Self {
            bus,
            layout,
            buf: [0; FRAME_LEN],
            occupied: [false; GROUP_SLOTS],
        }
    }

    pub fn bus(&self) -> CanBus {
        self.bus
    }

    pub fn frame_id(&self) -> u16 {
        self.layout.frame_id
    }

    /// Validate `tx_id - base_id` against the buffer capacity
    pub fn slot_for(&self, tx_id: u16) -> Result<SlotIndex, FrameError> {
        let offset = tx_id as i32 - self.layout.base_id as i32;
        if (0..GROUP_SLOTS as i32).contains(&offset) {
            Ok(SlotIndex(offset as usize))
        } else {
            Err(FrameError::SlotOutOfRange {
                bus: self.bus,
                tx_id,
            })
        }
    }

    pub fn write_command(&mut self, slot: SlotIndex, command: i16) {
        let at = 2 * slot.0;
        self.buf[at..at + 2].copy_from_slice(&command.to_be_bytes());
    }

    pub fn zero_slot(&mut self, slot: SlotIndex) {
        self.write_command(slot, 0);
    }

    pub fn command(&self, slot: SlotIndex) -> i16 {
        let at = 2 * slot.0;
        i16::from_be_bytes([self.buf[at], self.buf[at + 1]])
    }

    pub fn payload(&self) -> &[u8; FRAME_LEN] {
        &self.buf
    }

    /// Whether any registered motor writes into this group
    pub fn is_active(&self) -> bool {
        self.occupied.iter().any(|&taken| taken)
    }
}

/// Where a motor's command goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    pub group: usize,
    pub slot: SlotIndex,
}

/// All group buffers of all buses
#[derive(Debug, Clone)]
pub struct TxGroupSet {
    groups: [TxGroup; GROUP_COUNT],
}

impl Default for TxGroupSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TxGroupSet {
    pub fn new() -> Self {
        let groups = std::array::from_fn(|i| {
            let bus = CanBus::ALL[i / GROUP_LAYOUT.len()];
            TxGroup::new(bus, GROUP_LAYOUT[i % GROUP_LAYOUT.len()])
        });
        Self { groups }
    }

    /// Find the group and slot for a transmit id without claiming it
    pub fn resolve(&self, bus: CanBus, tx_id: u16) -> Result<SlotRef, FrameError> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, group)| group.bus == bus)
            .find_map(|(index, group)| {
                group.slot_for(tx_id).ok().map(|slot| SlotRef { group: index, slot })
            })
            .ok_or(FrameError::SlotOutOfRange { bus, tx_id })
    }

    /// Resolve and reserve a slot for one motor
    pub fn claim(&mut self, bus: CanBus, tx_id: u16) -> Result<SlotRef, FrameError> {
        let at = self.resolve(bus, tx_id)?;
        let taken = &mut self.groups[at.group].occupied[at.slot.0];
        if *taken {
            return Err(FrameError::SlotInUse { bus, tx_id });
        }
        *taken = true;
        Ok(at)
    }

    pub fn write_command(&mut self, at: SlotRef, command: i16) {
        self.groups[at.group].write_command(at.slot, command);
    }

    pub fn zero_slot(&mut self, at: SlotRef) {
        self.groups[at.group].zero_slot(at.slot);
    }

    pub fn command(&self, at: SlotRef) -> i16 {
        self.groups[at.group].command(at.slot)
    }

    pub fn group(&self, index: usize) -> &TxGroup {
        &self.groups[index]
    }

    /// Groups with at least one registered motor
    pub fn active(&self) -> impl Iterator<Item = &TxGroup> {
        self.groups.iter().filter(|group| group.is_active())
    }

    /// Hand every active group frame to the transport
    ///
    /// All frames are attempted; the first failure is returned.
    pub fn flush<T: BusTransport>(&self, transport: &mut T) -> Result<usize, BusError> {
        let mut sent = 0;
        let mut first_err = None;

        for group in self.active() {
            match transport.transmit(group.bus, group.frame_id(), group.payload()) {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!("Failed to send group 0x{:03X}: {}", group.frame_id(), e);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(sent),
        }
    }
}
