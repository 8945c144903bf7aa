// Motor control core for geared BLDC motors on CAN
//
// Provides:
// - Feedback decoding with multi-turn unwrap and smoothing
// - Fixed-capacity motor registry
// - Cascade (angle -> speed -> current) control per tick
// - Grouped command frame encoding
// - High-level motor bank API

pub mod bus;
pub mod controller;
mod driver;
pub mod feedback;
pub mod frame;
mod instance;
pub mod measure;
pub mod registry;
pub mod settings;

pub use bus::{BindingConfig, BindingHandle, BusError, BusTransport, CanBus};
pub use driver::{MotorBank, MotorError};
pub use feedback::{FeedbackChannels, FeedbackPublisher, FeedbackReader};
pub use frame::{FrameError, TxGroupSet};
pub use instance::{MotorController, MotorInstance};
pub use measure::{DecodeError, MotorMeasurement};
pub use registry::{MotorHandle, MotorRegistry, RegistryError, MOTOR_CAPACITY};
pub use settings::{
    CascadeGains, ControlLoop, Direction, EnableState, FeedbackSource, LoopSet, MotorInitConfig,
    MotorSettings, MotorType, OuterLoop,
};
