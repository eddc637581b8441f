use std::time::Duration;

use crate::driver::DistanceMode;
use crate::error::ConfigError;

/// Address the first sensor is moved to. Later sensors count up from here.
pub const BASE_ADDRESS: u8 = 0x2A;

/// Field of view width and height, in SPADs. The sensor accepts 4 to 16.
/// Larger is more sensitive and less precise, smaller is the opposite.
pub const FOV: u16 = 16;
pub const MIN_FOV: u16 = 4;
pub const MAX_FOV: u16 = 16;

/// Time between the start of consecutive batched reads. Also used as the
/// I2C timeout handed to each sensor.
pub const READ_CYCLE_MS: u16 = 40;

/// Time a sensor may spend producing one measurement.
pub const TIMING_BUDGET_MS: u16 = 33;

/// Power-on stabilisation after releasing an enable line.
pub const SETTLE_DELAY_MS: u16 = 10;

/// Enable line for each slot. Driving a line low holds that sensor in reset.
pub const ENABLE_PINS: [u32; 3] = [13, 2, 3];

/// Valid timing budget values in milliseconds
pub const VALID_TIMING_BUDGETS: &[u16] = &[15, 20, 33, 50, 100, 200, 500];

/// Address every sensor answers on after power-up or reset.
pub const FACTORY_ADDRESS: u8 = vl53l1x_uld::DEFAULT_ADDRESS;

const MAX_I2C_ADDRESS: usize = 0x7F;

/// 0x00-0x07 and 0x78-0x7F are reserved on an I2C bus.
const USABLE_ADDRESSES: core::ops::RangeInclusive<u8> = 0x08..=0x77;

/// Static configuration shared by every sensor on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    pub base_address: u8,
    pub fov: u16,
    pub distance_mode: DistanceMode,
    pub read_cycle_ms: u16,
    pub timing_budget_ms: u16,
    pub settle_delay_ms: u16,
    /// One entry per slot, in bring-up order.
    pub enable_pins: Vec<u32>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            base_address: BASE_ADDRESS,
            fov: FOV,
            distance_mode: DistanceMode::Long,
            read_cycle_ms: READ_CYCLE_MS,
            timing_budget_ms: TIMING_BUDGET_MS,
            settle_delay_ms: SETTLE_DELAY_MS,
            enable_pins: ENABLE_PINS.to_vec(),
        }
    }
}

/// One sensor position: its enable line and the address it is given during bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub index: usize,
    pub enable_pin: u32,
    pub address: u8,
}

impl SensorConfig {
    /// Default configuration with a different set of enable lines.
    pub fn with_enable_pins(pins: impl Into<Vec<u32>>) -> Self {
        SensorConfig {
            enable_pins: pins.into(),
            ..Default::default()
        }
    }

    pub fn sensor_count(&self) -> usize {
        self.enable_pins.len()
    }

    pub fn read_cycle(&self) -> Duration {
        Duration::from_millis(self.read_cycle_ms.into())
    }

    pub fn timing_budget(&self) -> Duration {
        Duration::from_millis(self.timing_budget_ms.into())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms.into())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enable_pins.is_empty() {
            return Err(ConfigError::NoSensors);
        }

        let count = self.enable_pins.len();
        if self.base_address as usize + count - 1 > MAX_I2C_ADDRESS {
            return Err(ConfigError::AddressOverflow {
                base: self.base_address,
                count,
            });
        }

        for slot in self.slots() {
            if !USABLE_ADDRESSES.contains(&slot.address) {
                return Err(ConfigError::ReservedAddress(slot.address));
            }
            // Would collide with the next sensor while it is still unaddressed
            if slot.address == FACTORY_ADDRESS && slot.index + 1 < count {
                return Err(ConfigError::FactoryAddressClash { slot: slot.index });
            }
        }

        for (i, pin) in self.enable_pins.iter().enumerate() {
            if self.enable_pins[..i].contains(pin) {
                return Err(ConfigError::DuplicatePin(*pin));
            }
        }

        if !(MIN_FOV..=MAX_FOV).contains(&self.fov) {
            return Err(ConfigError::FovOutOfRange(self.fov));
        }

        if !VALID_TIMING_BUDGETS.contains(&self.timing_budget_ms) {
            return Err(ConfigError::InvalidTimingBudget {
                budget_ms: self.timing_budget_ms,
                valid: VALID_TIMING_BUDGETS,
            });
        }

        // 15ms is only available in short distance mode
        if self.timing_budget_ms == 15 && self.distance_mode == DistanceMode::Long {
            return Err(ConfigError::InvalidTimingBudget {
                budget_ms: self.timing_budget_ms,
                valid: &VALID_TIMING_BUDGETS[1..],
            });
        }

        if self.timing_budget_ms >= self.read_cycle_ms {
            return Err(ConfigError::BudgetExceedsCycle {
                budget_ms: self.timing_budget_ms,
                cycle_ms: self.read_cycle_ms,
            });
        }

        Ok(())
    }

    /// The slot table, index order. Call after `validate`.
    pub fn slots(&self) -> Vec<Slot> {
        self.enable_pins
            .iter()
            .enumerate()
            .map(|(index, &enable_pin)| Slot {
                index,
                enable_pin,
                address: self.base_address + index as u8,
            })
            .collect()
    }
}
