// Feedback decoding: raw bus payload -> calibrated motor measurement
//
// Payload layout (big-endian):
// [angle_hi, angle_lo, speed_hi, speed_lo, current_hi, current_lo, temperature, ...]

use serde::Serialize;

/// Encoder counts per mechanical revolution (13-bit)
pub const ECD_RANGE: u16 = 8192;
const ECD_MASK: u16 = ECD_RANGE - 1;
/// Jumps larger than half a revolution between two frames are treated as wraps
const ECD_HALF_RANGE: i32 = ECD_RANGE as i32 / 2;

pub const ECD_TO_DEG: f32 = 360.0 / ECD_RANGE as f32;

/// Weight of the previous value in the exponential smoothing
pub const SPEED_SMOOTH_COEF: f32 = 0.05;
pub const CURRENT_SMOOTH_COEF: f32 = 0.05;

/// Minimum feedback payload length
pub const FEEDBACK_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Feedback payload too short: {len} bytes, need {}", FEEDBACK_LEN)]
    ShortPayload { len: usize },
}

/// Measurement state of one motor, only ever replaced as a whole by `decode`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MotorMeasurement {
    /// Raw encoder reading, 0..=8191
    pub ecd: u16,
    pub last_ecd: u16,
    /// Signed count of encoder wraps
    pub revolutions: i32,
    /// Single-turn angle in degrees
    pub angle_single: f32,
    /// Smoothed velocity in the motor's native unit (rpm)
    pub speed: f32,
    /// Smoothed current in raw units
    pub current: f32,
    pub temperature: u8,
    /// Multi-turn angle in degrees
    pub total_angle: f32,
    /// Single-turn angle seen in the first frame after power-up
    pub init_angle: f32,
    #[serde(skip)]
    initialized: bool,
}

impl MotorMeasurement {
    /// Whether at least one frame has been decoded
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Decode one feedback payload
    ///
    /// The updated state is built as a copy and committed in one assignment,
    /// so a short payload leaves the measurement untouched.
    pub fn decode(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
        if payload.len() < FEEDBACK_LEN {
            return Err(DecodeError::ShortPayload { len: payload.len() });
        }

        let ecd = u16::from_be_bytes([payload[0], payload[1]]) & ECD_MASK;
        let raw_speed = i16::from_be_bytes([payload[2], payload[3]]) as f32;
        let raw_current = i16::from_be_bytes([payload[4], payload[5]]) as f32;

        let mut next = *self;

        // The first frame has no predecessor to unwrap against
        if self.initialized {
            next.last_ecd = self.ecd;
        } else {
            next.last_ecd = ecd;
            next.init_angle = ecd as f32 * ECD_TO_DEG;
            next.initialized = true;
        }
        next.ecd = ecd;

        let delta = ecd as i32 - next.last_ecd as i32;
        if delta < -ECD_HALF_RANGE {
            next.revolutions += 1;
        } else if delta > ECD_HALF_RANGE {
            next.revolutions -= 1;
        }

        next.angle_single = ecd as f32 * ECD_TO_DEG;
        next.total_angle = next.revolutions as f32 * 360.0 + next.angle_single;

        next.speed = smooth(raw_speed, self.speed, SPEED_SMOOTH_COEF);
        next.current = smooth(raw_current, self.current, CURRENT_SMOOTH_COEF);
        next.temperature = payload[6];

        *self = next;
        Ok(())
    }
}

/// `(1 - alpha) * raw + alpha * prev`, written so that `raw == prev` is a fixed point
fn smooth(raw: f32, prev: f32, alpha: f32) -> f32 {
    prev + (1.0 - alpha) * (raw - prev)
}
