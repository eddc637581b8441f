use thiserror::Error;

/// Rejected sensor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("No enable pins configured")]
    NoSensors,

    #[error("Enable pin {0} is listed more than once")]
    DuplicatePin(u32),

    #[error("Field of view {0} out of range, must be 4 to 16")]
    FovOutOfRange(u16),

    #[error("Invalid timing budget {budget_ms} ms. Must be one of: {valid:?}")]
    InvalidTimingBudget {
        budget_ms: u16,
        valid: &'static [u16],
    },

    #[error("Timing budget ({budget_ms} ms) must be less than the read cycle ({cycle_ms} ms)")]
    BudgetExceedsCycle { budget_ms: u16, cycle_ms: u16 },

    #[error("{count} sensors starting at {base:#04x} overflow the 7-bit address space")]
    AddressOverflow { base: u8, count: usize },

    #[error("Address {0:#04x} is reserved")]
    ReservedAddress(u8),

    #[error("Sensor {slot} would take the factory address while later sensors still use it")]
    FactoryAddressClash { slot: usize },

    #[error("Expected {expected} {what}, got {got}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Bring-up failure. The sequence stops at the first faulting slot and
/// later slots are left held in reset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("Failed to switch enable line for sensor {slot}: {cause}")]
    EnableLine { slot: usize, cause: String },

    #[error("Failed to initialize sensor {slot}: {cause}")]
    SensorInitFailed { slot: usize, cause: String },

    #[error("Failed to {step} on sensor {slot}: {cause}")]
    Configure {
        slot: usize,
        step: &'static str,
        cause: String,
    },
}

impl InitError {
    /// Slot that stopped the bring-up.
    pub fn slot(&self) -> usize {
        match self {
            InitError::EnableLine { slot, .. }
            | InitError::SensorInitFailed { slot, .. }
            | InitError::Configure { slot, .. } => *slot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// A sensor did not finish within its timeout. The whole batch is discarded.
    #[error("Sensor {slot} timed out")]
    Timeout { slot: usize },

    #[error("I2C error on sensor {slot}: {cause}")]
    Bus { slot: usize, cause: String },

    #[error("Invalid sensor index {slot}, have {count} sensors")]
    InvalidSlot { slot: usize, count: usize },

    #[error("Sensors have not been initialized")]
    NotInitialized,

    #[error("Output buffer holds {got} readings, need {expected}")]
    BufferSize { expected: usize, got: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("Sensors must be initialized before streaming")]
    NotInitialized,

    #[error("Sensor array mutex poisoned")]
    Poisoned,

    #[error("Failed to spawn sensor thread: {0}")]
    Spawn(String),
}

/// Failure opening the Linux devices behind a sensor array.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("Failed to open I2C bus: {0}")]
    I2c(String),

    #[error("Failed to access GPIO chip: {0}")]
    Gpio(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
