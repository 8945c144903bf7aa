//! Closed-loop control core for geared BLDC motors on a shared CAN bus.
//!
//! | Module | Purpose |
//! | ------ | ------- |
//! | [`pid`] | PID primitive used by every cascade stage |
//! | [`motor`] | Feedback decoding, registry, cascade control, command frames |
//! | [`sim`] | Simulated transport with a first-order plant per motor |
//! | [`runtime`] | Tick loop, watchdog and zenoh plumbing |
//! | [`config`] | Loop timing, topics and the motor layout file |
//! | [`messages`] | Commands, external feedback and telemetry messages |

pub mod config;
pub mod messages;
pub mod motor;
pub mod pid;
pub mod runtime;
pub mod sim;
