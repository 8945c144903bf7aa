// Fixed-capacity motor registry
//
// Motors are kept in registration order and never removed. The backing
// storage is allocated once at construction and never grows.

use super::bus::BindingHandle;
use super::instance::MotorInstance;

/// Maximum number of motors on one controller
pub const MOTOR_CAPACITY: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Motor registry full ({capacity} motors)")]
    RegistryFull { capacity: usize },
}

/// Index of a registered motor, stable for the life of the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotorHandle(usize);

impl MotorHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct MotorRegistry {
    motors: Vec<MotorInstance>,
}

impl Default for MotorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MotorRegistry {
    pub fn new() -> Self {
        Self {
            motors: Vec::with_capacity(MOTOR_CAPACITY),
        }
    }

    pub fn register(&mut self, instance: MotorInstance) -> Result<MotorHandle, RegistryError> {
        if self.is_full() {
            return Err(RegistryError::RegistryFull {
                capacity: MOTOR_CAPACITY,
            });
        }
        self.motors.push(instance);
        Ok(MotorHandle(self.motors.len() - 1))
    }

    pub fn count(&self) -> usize {
        self.motors.len()
    }

    pub fn is_full(&self) -> bool {
        self.motors.len() >= MOTOR_CAPACITY
    }

    /// Handle for a registration index, if that many motors exist
    pub fn handle(&self, index: usize) -> Option<MotorHandle> {
        (index < self.motors.len()).then_some(MotorHandle(index))
    }

    pub fn get(&self, handle: MotorHandle) -> Option<&MotorInstance> {
        self.motors.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: MotorHandle) -> Option<&mut MotorInstance> {
        self.motors.get_mut(handle.0)
    }

    /// Motors in registration order
    pub fn iter(&self) -> impl Iterator<Item = (MotorHandle, &MotorInstance)> {
        self.motors
            .iter()
            .enumerate()
            .map(|(index, motor)| (MotorHandle(index), motor))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (MotorHandle, &mut MotorInstance)> {
        self.motors
            .iter_mut()
            .enumerate()
            .map(|(index, motor)| (MotorHandle(index), motor))
    }

    /// Motor whose feedback arrives on `binding`
    pub fn find_by_binding(&self, binding: BindingHandle) -> Option<MotorHandle> {
        self.motors
            .iter()
            .position(|motor| motor.binding() == binding)
            .map(MotorHandle)
    }
}
