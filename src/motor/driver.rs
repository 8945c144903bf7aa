// High-level motor bank
//
// Owns the registry, the transmit groups and the transport, and exposes the
// API used by higher-level control: init, setpoints, loop routing,
// stop/enable, the control tick and the flush to the bus.

use tracing::{debug, info, warn};

use super::bus::{BindingHandle, BusError, BusTransport};
use super::controller;
use super::feedback::FeedbackChannels;
use super::frame::{FrameError, TxGroupSet};
use super::instance::MotorInstance;
use super::measure::MotorMeasurement;
use super::registry::{MotorHandle, MotorRegistry, RegistryError, MOTOR_CAPACITY};
use super::settings::{ControlLoop, FeedbackSource, LoopSet, MotorInitConfig, OuterLoop};
use crate::messages::MotorState;

#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("No motor registered at index {0}")]
    UnknownMotor(usize),
}

pub type Result<T> = std::result::Result<T, MotorError>;

/// Every motor on the controller plus the transport they share
pub struct MotorBank<T: BusTransport> {
    transport: T,
    registry: MotorRegistry,
    groups: TxGroupSet,
    feedback: FeedbackChannels,
}

impl<T: BusTransport> MotorBank<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            registry: MotorRegistry::new(),
            groups: TxGroupSet::new(),
            feedback: FeedbackChannels::new(),
        }
    }

    /// Create and register a motor; it starts enabled
    ///
    /// Capacity and slot problems are reported here, never during a tick.
    pub fn init(&mut self, config: &MotorInitConfig) -> Result<MotorHandle> {
        if self.registry.is_full() {
            return Err(RegistryError::RegistryFull {
                capacity: MOTOR_CAPACITY,
            }
            .into());
        }

        let binding = config.binding;
        let output = self.groups.claim(binding.bus, binding.tx_id)?;
        let handle = self.transport.register_binding(&binding);

        let mut instance = MotorInstance::new(config, handle, output);
        if let Some(name) = &config.external_angle {
            instance = instance.with_external_angle(self.feedback.reader(name));
        }
        if let Some(name) = &config.external_speed {
            instance = instance.with_external_speed(self.feedback.reader(name));
        }

        let motor = self.registry.register(instance)?;
        info!(
            "Motor {} ({:?}) registered on {:?} tx 0x{:03X}",
            motor.index(),
            config.motor_type,
            binding.bus,
            binding.tx_id
        );
        Ok(motor)
    }

    fn motor_mut(&mut self, handle: MotorHandle) -> Result<&mut MotorInstance> {
        self.registry
            .get_mut(handle)
            .ok_or(MotorError::UnknownMotor(handle.index()))
    }

    /// Handle for a registration index
    pub fn handle(&self, index: usize) -> Result<MotorHandle> {
        self.registry
            .handle(index)
            .ok_or(MotorError::UnknownMotor(index))
    }

    pub fn set_target(&mut self, handle: MotorHandle, value: f32) -> Result<()> {
        self.motor_mut(handle)?.set_target(value);
        Ok(())
    }

    pub fn set_outer_loop(&mut self, handle: MotorHandle, outer_loop: OuterLoop) -> Result<()> {
        debug!("Motor {} outer loop -> {:?}", handle.index(), outer_loop);
        self.motor_mut(handle)?.set_outer_loop(outer_loop);
        Ok(())
    }

    pub fn set_loops(&mut self, handle: MotorHandle, loops: LoopSet) -> Result<()> {
        self.motor_mut(handle)?.set_loops(loops);
        Ok(())
    }

    pub fn set_feedback_source(
        &mut self,
        handle: MotorHandle,
        control_loop: ControlLoop,
        source: FeedbackSource,
    ) -> Result<()> {
        debug!(
            "Motor {} {:?} feedback -> {:?}",
            handle.index(),
            control_loop,
            source
        );
        self.motor_mut(handle)?
            .set_feedback_source(control_loop, source);
        Ok(())
    }

    pub fn stop(&mut self, handle: MotorHandle) -> Result<()> {
        info!("Stopping motor {}", handle.index());
        self.motor_mut(handle)?.stop();
        Ok(())
    }

    pub fn enable(&mut self, handle: MotorHandle) -> Result<()> {
        info!("Enabling motor {}", handle.index());
        self.motor_mut(handle)?.enable();
        Ok(())
    }

    pub fn stop_all(&mut self) {
        info!("Stopping all motors");
        for (_, motor) in self.registry.iter_mut() {
            motor.stop();
        }
    }

    pub fn enable_all(&mut self) {
        info!("Enabling all motors");
        for (_, motor) in self.registry.iter_mut() {
            motor.enable();
        }
    }

    /// Feedback frame delivered by the transport
    ///
    /// Malformed frames are dropped and the previous measurement kept.
    pub fn on_frame_received(&mut self, binding: BindingHandle, payload: &[u8]) {
        let Some(handle) = self.registry.find_by_binding(binding) else {
            debug!("Frame for unknown binding {:?} ignored", binding);
            return;
        };
        if let Some(motor) = self.registry.get_mut(handle) {
            if let Err(e) = motor.decode(payload) {
                warn!("Motor {}: dropped feedback frame: {}", handle.index(), e);
            }
        }
    }

    /// Compute every motor's command into the transmit groups
    pub fn run_control_tick(&mut self) {
        controller::run_control_tick(&mut self.registry, &mut self.groups);
    }

    /// Send the group frames produced by the last tick
    pub fn flush(&mut self) -> std::result::Result<usize, BusError> {
        self.groups.flush(&mut self.transport)
    }

    /// Update an externally published value by name
    pub fn publish_feedback(&self, name: &str, value: f32) -> bool {
        self.feedback.publish(name, value)
    }

    pub fn measurement(&self, handle: MotorHandle) -> Option<MotorMeasurement> {
        self.registry.get(handle).map(MotorInstance::measure)
    }

    pub fn motor(&self, handle: MotorHandle) -> Option<&MotorInstance> {
        self.registry.get(handle)
    }

    pub fn count(&self) -> usize {
        self.registry.count()
    }

    pub fn groups(&self) -> &TxGroupSet {
        &self.groups
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Telemetry snapshot of every motor
    pub fn states(&self) -> Vec<MotorState> {
        self.registry
            .iter()
            .map(|(handle, motor)| MotorState::new(handle.index(), motor))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::bus::{BindingConfig, CanBus, FRAME_LEN};
    use crate::motor::settings::{CascadeGains, Direction, MotorType};
    use crate::pid::PidConfig;

    #[derive(Default)]
    struct Loopback {
        bindings: Vec<BindingConfig>,
        frames: Vec<(CanBus, u16, [u8; FRAME_LEN])>,
    }

    impl BusTransport for Loopback {
        fn register_binding(&mut self, config: &BindingConfig) -> BindingHandle {
            self.bindings.push(*config);
            BindingHandle(100 + self.bindings.len())
        }

        fn transmit(
            &mut self,
            bus: CanBus,
            frame_id: u16,
            payload: &[u8; FRAME_LEN],
        ) -> std::result::Result<(), BusError> {
            self.frames.push((bus, frame_id, *payload));
            Ok(())
        }
    }

    fn config(bus: CanBus, esc_id: u8) -> MotorInitConfig {
        MotorInitConfig {
            motor_type: MotorType::M3508,
            binding: BindingConfig::for_esc(MotorType::M3508, bus, esc_id),
            gains: CascadeGains {
                current: PidConfig::new(1.0, 0.0, 0.0, 1000.0),
                speed: PidConfig::new(2.0, 0.0, 0.0, 5000.0),
                angle: PidConfig::default(),
            },
            outer_loop: OuterLoop::None,
            loops: LoopSet::CURRENT,
            direction: Direction::Normal,
            angle_feedback: FeedbackSource::Motor,
            speed_feedback: FeedbackSource::Motor,
            external_angle: None,
            external_speed: None,
        }
    }

    #[test]
    fn test_init_registers_binding_and_enables() {
        let mut bank = MotorBank::new(Loopback::default());
        let handle = bank.init(&config(CanBus::Can1, 1)).unwrap();

        assert_eq!(handle.index(), 0);
        assert_eq!(bank.count(), 1);
        assert_eq!(bank.transport().bindings.len(), 1);
        let motor = bank.motor(handle).unwrap();
        assert!(motor.is_enabled());
        assert_eq!(motor.binding(), BindingHandle(101));
    }

    #[test]
    fn test_init_rejects_unmapped_tx_id() {
        let mut bank = MotorBank::new(Loopback::default());
        let mut cfg = config(CanBus::Can1, 1);
        cfg.binding.tx_id = 0x20F;

        let err = bank.init(&cfg).unwrap_err();
        assert!(matches!(
            err,
            MotorError::Frame(FrameError::SlotOutOfRange { tx_id: 0x20F, .. })
        ));
        assert_eq!(bank.count(), 0);
        assert!(bank.transport().bindings.is_empty());
    }

    #[test]
    fn test_init_rejects_thirteenth_motor() {
        let mut bank = MotorBank::new(Loopback::default());
        for n in 0..12u8 {
            let bus = CanBus::ALL[(n % 2) as usize];
            bank.init(&config(bus, n / 2 + 1)).unwrap();
        }
        let err = bank.init(&config(CanBus::Can1, 8)).unwrap_err();
        assert!(matches!(
            err,
            MotorError::Registry(RegistryError::RegistryFull { capacity: 12 })
        ));
        assert_eq!(bank.transport().bindings.len(), 12);
    }

    #[test]
    fn test_feedback_tick_flush() {
        let mut bank = MotorBank::new(Loopback::default());
        let a = bank.init(&config(CanBus::Can1, 1)).unwrap();
        let b = bank.init(&config(CanBus::Can2, 6)).unwrap();

        let binding = bank.motor(a).unwrap().binding();
        bank.on_frame_received(binding, &[0x10, 0x00, 0, 0, 0x00, 0xC8, 40, 0]);
        let measure = bank.measurement(a).unwrap();
        assert_eq!(measure.ecd, 0x1000);
        assert_eq!(measure.temperature, 40);
        // 0.95 * 200
        assert!((measure.current - 190.0).abs() < 1e-3);

        bank.set_target(a, 300.0).unwrap();
        bank.set_target(b, -50.0).unwrap();
        bank.run_control_tick();
        assert_eq!(bank.flush().unwrap(), 2);

        let frames = &bank.transport().frames;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].0, CanBus::Can1);
        assert_eq!(frames[0].1, 0x200);
        // 300 - 190 = 110
        assert_eq!(frames[0].2[..2], [0x00, 0x6E]);
        assert_eq!(frames[1].0, CanBus::Can2);
        assert_eq!(frames[1].1, 0x1FF);
        assert_eq!(frames[1].2[2..4], (-50i16).to_be_bytes());
    }

    #[test]
    fn test_short_frame_is_absorbed() {
        let mut bank = MotorBank::new(Loopback::default());
        let a = bank.init(&config(CanBus::Can1, 1)).unwrap();
        let binding = bank.motor(a).unwrap().binding();

        bank.on_frame_received(binding, &[0x01, 0x00, 0, 0, 0, 0, 20]);
        let before = bank.measurement(a).unwrap();
        bank.on_frame_received(binding, &[0x02, 0x00]);
        assert_eq!(bank.measurement(a).unwrap(), before);

        // unknown bindings are ignored too
        bank.on_frame_received(BindingHandle(999), &[0; 8]);
    }

    #[test]
    fn test_stop_and_enable_all() {
        let mut bank = MotorBank::new(Loopback::default());
        let a = bank.init(&config(CanBus::Can1, 1)).unwrap();
        let b = bank.init(&config(CanBus::Can1, 2)).unwrap();
        bank.set_target(a, 100.0).unwrap();
        bank.set_target(b, 200.0).unwrap();

        bank.stop_all();
        bank.run_control_tick();
        assert_eq!(bank.groups().group(0).payload(), &[0; FRAME_LEN]);

        bank.enable(b).unwrap();
        bank.run_control_tick();
        assert_eq!(bank.groups().group(0).payload()[..4], [0, 0, 0x00, 0xC8]);

        bank.enable_all();
        bank.run_control_tick();
        assert_eq!(bank.groups().group(0).payload()[..2], [0x00, 0x64]);
    }

    #[test]
    fn test_routing_changes() {
        let mut bank = MotorBank::new(Loopback::default());
        let mut cfg = config(CanBus::Can1, 1);
        cfg.external_speed = Some("chassis/wheel0".to_string());
        let a = bank.init(&cfg).unwrap();

        bank.set_loops(a, LoopSet::SPEED).unwrap();
        bank.set_outer_loop(a, OuterLoop::Speed).unwrap();
        bank.set_feedback_source(a, ControlLoop::Speed, FeedbackSource::External)
            .unwrap();
        assert!(bank.publish_feedback("chassis/wheel0", 20.0));

        bank.set_target(a, 50.0).unwrap();
        bank.run_control_tick();
        // 2 * (50 - 20)
        assert_eq!(bank.motor(a).unwrap().last_command(), 60);

        assert!(matches!(
            bank.handle(5),
            Err(MotorError::UnknownMotor(5))
        ));
    }

    #[test]
    fn test_states_snapshot() {
        let mut bank = MotorBank::new(Loopback::default());
        bank.init(&config(CanBus::Can1, 1)).unwrap();
        bank.init(&config(CanBus::Can1, 2)).unwrap();

        let states = bank.states();
        assert_eq!(states.len(), 2);
        assert_eq!(states[1].index, 1);
        assert!(states[0].enabled);
    }
}
