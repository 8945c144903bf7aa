// Externally published feedback values
//
// Another subsystem (an IMU, a gimbal estimator) owns the value and publishes
// it; the motor only holds a read-only, non-owning reader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// Write side of a published value, owned by the producing subsystem
#[derive(Debug, Clone)]
pub struct FeedbackPublisher {
    value: Arc<AtomicU32>,
}

impl FeedbackPublisher {
    pub fn new(initial: f32) -> Self {
        Self {
            value: Arc::new(AtomicU32::new(initial.to_bits())),
        }
    }

    pub fn publish(&self, value: f32) {
        self.value.store(value.to_bits(), Ordering::Release);
    }

    pub fn reader(&self) -> FeedbackReader {
        FeedbackReader {
            value: Arc::downgrade(&self.value),
        }
    }
}

/// Read side handed to a motor controller
#[derive(Debug, Clone, Default)]
pub struct FeedbackReader {
    value: Weak<AtomicU32>,
}

impl FeedbackReader {
    /// Latest published value, `None` once every publisher is gone
    pub fn latest(&self) -> Option<f32> {
        self.value
            .upgrade()
            .map(|value| f32::from_bits(value.load(Ordering::Acquire)))
    }
}

/// Named published values, keyed by the names used in motor configuration
#[derive(Debug, Default)]
pub struct FeedbackChannels {
    channels: HashMap<String, FeedbackPublisher>,
}

impl FeedbackChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publisher for `name`, created at 0.0 on first use
    pub fn publisher(&mut self, name: &str) -> FeedbackPublisher {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| FeedbackPublisher::new(0.0))
            .clone()
    }

    pub fn reader(&mut self, name: &str) -> FeedbackReader {
        self.publisher(name).reader()
    }

    /// Publish to an existing channel, returns false for unknown names
    pub fn publish(&self, name: &str, value: f32) -> bool {
        match self.channels.get(name) {
            Some(publisher) => {
                publisher.publish(value);
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_sees_latest_value() {
        let publisher = FeedbackPublisher::new(1.5);
        let reader = publisher.reader();
        assert_eq!(reader.latest(), Some(1.5));

        publisher.publish(-42.25);
        assert_eq!(reader.latest(), Some(-42.25));
    }

    #[test]
    fn test_reader_does_not_keep_value_alive() {
        let publisher = FeedbackPublisher::new(3.0);
        let reader = publisher.reader();
        drop(publisher);
        assert_eq!(reader.latest(), None);
        assert_eq!(FeedbackReader::default().latest(), None);
    }

    #[test]
    fn test_channels_are_separate() {
        let mut channels = FeedbackChannels::new();
        let yaw = channels.reader("gimbal/yaw");
        let pitch = channels.reader("gimbal/pitch");

        assert!(channels.publish("gimbal/yaw", 90.0));
        assert!(!channels.publish("unknown", 1.0));

        assert_eq!(yaw.latest(), Some(90.0));
        assert_eq!(pitch.latest(), Some(0.0));
        assert_eq!(channels.names().count(), 2);
    }
}
