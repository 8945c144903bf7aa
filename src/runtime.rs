// Control tick loop with watchdog
// Note: the watchdog stops every motor if higher-level control goes quiet for
// longer than CMD_TIMEOUT; motors only come back through an explicit enable

use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{
    RuntimeConfig, CMD_TIMEOUT, MAX_LOOP_HZ, TELEMETRY_EVERY, TOPIC_CMD_MOTOR, TOPIC_FEEDBACK,
    TOPIC_HEALTH, TOPIC_STATE_MOTORS,
};
use crate::messages::{ExternalFeedback, MotorCommand, MotorState, RuntimeHealth};
use crate::motor::{MotorBank, MotorError};
use crate::sim::SimBus;

/// Options for one runtime session
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: RuntimeConfig,
    pub loop_hz: u64,
    /// Stop after this many ticks, run forever when `None`
    pub max_ticks: Option<u64>,
}

pub struct Runtime {
    bank: MotorBank<SimBus>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
    ticks: u64,
}

impl Runtime {
    pub fn new(config: &RuntimeConfig) -> Result<Self, MotorError> {
        let mut bank = MotorBank::new(SimBus::new());
        for motor in &config.motors {
            bank.init(motor)?;
        }
        info!("{} motors initialised", bank.count());

        Ok(Self {
            bank,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            ticks: 0,
        })
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn bank(&self) -> &MotorBank<SimBus> {
        &self.bank
    }

    /// Apply a command from higher-level control
    fn on_command(&mut self, cmd: MotorCommand, now: Instant) {
        debug!("Received command: {:?}", &cmd);
        self.cmd_received_at = now;
        self.health = RuntimeHealth::Ok;

        if let Err(e) = self.apply(cmd) {
            warn!("Command rejected: {}", e);
        }
    }

    fn apply(&mut self, cmd: MotorCommand) -> Result<(), MotorError> {
        let bank = &mut self.bank;
        match cmd {
            MotorCommand::SetTarget { motor, value } => bank.set_target(bank.handle(motor)?, value),
            MotorCommand::SetOuterLoop { motor, outer_loop } => {
                bank.set_outer_loop(bank.handle(motor)?, outer_loop)
            }
            MotorCommand::SetLoops { motor, loops } => bank.set_loops(bank.handle(motor)?, loops),
            MotorCommand::SetFeedbackSource {
                motor,
                control_loop,
                source,
            } => bank.set_feedback_source(bank.handle(motor)?, control_loop, source),
            MotorCommand::Stop { motor } => bank.stop(bank.handle(motor)?),
            MotorCommand::Enable { motor } => bank.enable(bank.handle(motor)?),
            MotorCommand::StopAll => {
                bank.stop_all();
                Ok(())
            }
            MotorCommand::EnableAll => {
                bank.enable_all();
                Ok(())
            }
        }
    }

    fn on_feedback(&mut self, feedback: ExternalFeedback) {
        if !self.bank.publish_feedback(&feedback.name, feedback.value) {
            debug!("No motor reads external feedback {:?}", feedback.name);
        }
    }

    /// Stop everything once when commands go stale
    fn check_watchdog(&mut self, now: Instant) {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);
        if cmd_age > CMD_TIMEOUT && self.health == RuntimeHealth::Ok {
            warn!("Command stale ({:?} old), stopping motors", cmd_age);
            self.bank.stop_all();
            self.health = RuntimeHealth::CmdStale;
        }
    }

    /// One control period: feedback in, tick, frames out, plant advance
    fn step(&mut self, dt: f32) {
        let frames: Vec<_> = self.bank.transport_mut().drain_feedback().collect();
        for (binding, payload) in frames {
            self.bank.on_frame_received(binding, &payload);
        }

        self.bank.run_control_tick();
        if let Err(e) = self.bank.flush() {
            warn!("Flush failed: {}", e);
        }

        self.bank.transport_mut().step(dt);
        self.ticks += 1;
    }

    fn telemetry_due(&self) -> bool {
        self.ticks % TELEMETRY_EVERY == 0
    }

    fn states(&self) -> Vec<MotorState> {
        self.bank.states()
    }
}

/// Control period for a loop rate, never shorter than a microsecond
pub fn tick_period(loop_hz: u64) -> Duration {
    Duration::from_micros(1_000_000 / loop_hz.clamp(1, MAX_LOOP_HZ))
}

pub async fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut runtime = Runtime::new(&options.config)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_cmd = session.declare_subscriber(TOPIC_CMD_MOTOR).await?;
    let sub_feedback = session.declare_subscriber(TOPIC_FEEDBACK).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE_MOTORS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let period = tick_period(options.loop_hz);
    let dt = period.as_secs_f32();
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        options.loop_hz,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_MOTOR, TOPIC_FEEDBACK);
    info!("Publishing to: {}, {}", TOPIC_STATE_MOTORS, TOPIC_HEALTH);

    loop {
        tick.tick().await;
        let now = Instant::now();

        // 1. Drain all pending commands (non-blocking)
        while let Ok(Some(sample)) = sub_cmd.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<MotorCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd, now),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Latest externally published feedback values
        while let Ok(Some(sample)) = sub_feedback.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ExternalFeedback>(&payload) {
                Ok(feedback) => runtime.on_feedback(feedback),
                Err(e) => warn!("Failed to parse feedback: {}", e),
            }
        }

        // 3. Watchdog, then one control period
        runtime.check_watchdog(now);
        runtime.step(dt);

        // 4. Telemetry and health at a reduced rate
        if runtime.telemetry_due() {
            let state_json = serde_json::to_string(&runtime.states())?;
            pub_state.put(state_json).await?;

            let health_json = serde_json::to_string(&runtime.health())?;
            pub_health.put(health_json).await?;
        }

        if options.max_ticks.is_some_and(|max| runtime.ticks >= max) {
            info!("Stopping after {} ticks", runtime.ticks);
            runtime.bank.stop_all();
            runtime.bank.run_control_tick();
            runtime.bank.flush()?;
            return Ok(());
        }
    }
}
