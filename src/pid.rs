// Generic PID controller used by every cascade stage
//
// One instance per loop per motor; no state is shared between instances.

use serde::{Deserialize, Serialize};

/// Gains and output clamp for one PID stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Symmetric output clamp, output stays within [-maxout, +maxout]
    pub maxout: f32,
}

impl PidConfig {
    pub fn new(kp: f32, ki: f32, kd: f32, maxout: f32) -> Self {
        Self { kp, ki, kd, maxout }
    }
}

/// PID state for one loop
#[derive(Debug, Clone, Default)]
pub struct Pid {
    kp: f32,
    ki: f32,
    kd: f32,
    maxout: f32,

    // Error from the previous call, feeds the derivative term
    err: f32,
    last_measure: f32,

    // Integrator state
    iout: f32,
    output: f32,
}

impl Pid {
    /// Create a controller with zeroed accumulators
    pub fn new(config: &PidConfig) -> Self {
        Self {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
            // a negative clamp would make the range empty, a NaN one would panic
            maxout: if config.maxout.is_finite() {
                config.maxout.abs()
            } else {
                f32::MAX
            },
            ..Self::default()
        }
    }

    /// Clear error history, integrator and last output, keeping the gains
    pub fn reset(&mut self) {
        *self = Self {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
            maxout: self.maxout,
            ..Self::default()
        };
    }

    /// Run one step and return the clamped output
    ///
    /// The integrator only accumulates while the output is not saturated.
    pub fn calculate(&mut self, set: f32, measure: f32) -> f32 {
        let err = set - measure;

        let pout = self.kp * err;
        let dout = self.kd * (err - self.err);
        let iout = self.iout + self.ki * err;

        let unclamped = pout + iout + dout;
        // NaN counts as saturated
        let saturated = !(unclamped >= -self.maxout && unclamped <= self.maxout);
        if !saturated {
            self.iout = iout;
        }

        let out = pout + self.iout + dout;
        // NaN can only come from inf - inf on extreme inputs, hold the last output
        let out = if out.is_nan() {
            self.output
        } else {
            out.clamp(-self.maxout, self.maxout)
        };

        self.err = err;
        self.last_measure = measure;
        self.output = out;

        out
    }

    /// Output of the most recent `calculate` call
    pub fn output(&self) -> f32 {
        self.output
    }

    /// Accumulated integral term
    pub fn integral(&self) -> f32 {
        self.iout
    }

    /// Error seen by the most recent call
    pub fn error(&self) -> f32 {
        self.err
    }

    pub fn last_measure(&self) -> f32 {
        self.last_measure
    }

    pub fn maxout(&self) -> f32 {
        self.maxout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_zeroes_state() {
        let pid = Pid::new(&PidConfig::new(1.5, 0.2, 0.1, 100.0));
        assert_eq!(pid.output(), 0.0);
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.error(), 0.0);
        assert_eq!(pid.maxout(), 100.0);
    }

    #[test]
    fn test_proportional_only() {
        let mut pid = Pid::new(&PidConfig::new(1.0, 0.0, 0.0, 1000.0));
        assert_eq!(pid.calculate(500.0, 0.0), 500.0);
        assert_eq!(pid.calculate(2000.0, 0.0), 1000.0);
        assert_eq!(pid.calculate(-2000.0, 0.0), -1000.0);
    }

    #[test]
    fn test_integral_accumulates() {
        let mut pid = Pid::new(&PidConfig::new(0.0, 0.5, 0.0, 1000.0));
        assert_eq!(pid.calculate(10.0, 0.0), 5.0);
        assert_eq!(pid.calculate(10.0, 0.0), 10.0);
        assert_eq!(pid.calculate(10.0, 0.0), 15.0);
    }

    #[test]
    fn test_integral_frozen_while_saturated() {
        let mut pid = Pid::new(&PidConfig::new(1.0, 1.0, 0.0, 100.0));
        // 90 + 90 > 100, so the integrator must not take the step
        assert_eq!(pid.calculate(90.0, 0.0), 90.0);
        assert_eq!(pid.integral(), 0.0);

        // Small error stays inside the clamp and integrates again
        pid.calculate(10.0, 0.0);
        assert_eq!(pid.integral(), 10.0);
    }

    #[test]
    fn test_derivative_uses_error_delta() {
        let mut pid = Pid::new(&PidConfig::new(0.0, 0.0, 2.0, 1000.0));
        assert_eq!(pid.calculate(10.0, 0.0), 20.0);
        // Same error again, derivative term vanishes
        assert_eq!(pid.calculate(10.0, 0.0), 0.0);
        assert_eq!(pid.calculate(4.0, 0.0), -12.0);
        assert_eq!(pid.last_measure(), 0.0);
    }

    #[test]
    fn test_output_always_within_clamp() {
        let configs = [
            PidConfig::new(1.0, 0.0, 0.0, 1000.0),
            PidConfig::new(20.0, 3.0, 8.0, 16384.0),
            PidConfig::new(0.01, 0.5, 0.0, 5.0),
            PidConfig::new(1e6, 1e6, 1e6, 30000.0),
        ];
        let inputs = [
            0.0,
            1.0,
            -1.0,
            123.4,
            -8191.0,
            1e9,
            -1e9,
            f32::MAX,
            f32::MIN,
        ];

        for config in &configs {
            let mut pid = Pid::new(config);
            for &set in &inputs {
                for &measure in &inputs {
                    let out = pid.calculate(set, measure);
                    assert!(
                        out >= -config.maxout && out <= config.maxout,
                        "output {} escaped clamp {} for set={} measure={}",
                        out,
                        config.maxout,
                        set,
                        measure
                    );
                }
            }
        }
    }

    #[test]
    fn test_instances_are_independent() {
        let config = PidConfig::new(1.0, 1.0, 0.0, 1000.0);
        let mut a = Pid::new(&config);
        let mut b = Pid::new(&config);
        a.calculate(50.0, 0.0);
        a.calculate(50.0, 0.0);
        assert_eq!(a.integral(), 100.0);

        assert_eq!(b.calculate(50.0, 0.0), 100.0);
        assert_eq!(b.integral(), 50.0);
    }

    #[test]
    fn test_reset_keeps_gains() {
        let mut pid = Pid::new(&PidConfig::new(2.0, 1.0, 0.0, 1000.0));
        pid.calculate(10.0, 0.0);
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.output(), 0.0);
        assert_eq!(pid.calculate(10.0, 0.0), 30.0);
    }

    #[test]
    fn test_non_finite_maxout_does_not_panic() {
        let mut pid = Pid::new(&PidConfig::new(1.0, 0.0, 0.0, f32::NAN));
        assert_eq!(pid.maxout(), f32::MAX);
        assert_eq!(pid.calculate(1.0, 0.0), 1.0);

        let mut pid = Pid::new(&PidConfig::new(1.0, 0.0, 0.0, f32::NEG_INFINITY));
        assert_eq!(pid.calculate(-5.0, 0.0), -5.0);
    }
}
