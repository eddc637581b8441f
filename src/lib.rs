//! Several VL53L1X time-of-flight sensors on one I2C bus.
//!
//! Every sensor powers up on the same default address. Each one has its own
//! shutdown (XSHUT) line, so [`TofArray::init_sensors`] holds them all in
//! reset, then enables them one at a time and moves each to
//! `base_address + slot` before enabling the next.
//!
//! After that, [`TofArray::read_all`] triggers every sensor and collects one
//! reading each after a single shared wait, and [`TofArray::read_one`] polls
//! a single sensor until it has data or runs out of time.
//!
//! ```rust,no_run
//! use tof_array::{linux, SensorConfig};
//!
//! let mut array = linux::open(1, linux::DEFAULT_GPIO_CHIP, SensorConfig::default())?;
//! array.init_sensors()?;
//!
//! let mut distances = [0u16; 3];
//! array.read_all(&mut distances)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod enable;
pub mod error;
pub mod linux;
pub mod streaming;
pub mod vl53l1x;

#[cfg(feature = "python")]
mod python;

#[cfg(test)]
mod sim;

pub use clock::{Clock, MonotonicClock};
pub use config::{SensorConfig, Slot};
pub use coordinator::{Reading, TofArray};
pub use driver::{DistanceMode, RangingDriver};
pub use enable::{EnableLine, GpioEnableLine, PushPullEnable};
pub use error::{ConfigError, InitError, OpenError, ReadError, StreamError};
pub use streaming::{Batch, BatchResult, BatchStream};
pub use vl53l1x::Vl53l1xDriver;
