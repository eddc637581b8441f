use core::fmt::Debug;

use log::{debug, trace, warn};

use crate::clock::Clock;
use crate::config::{SensorConfig, Slot};
use crate::driver::RangingDriver;
use crate::enable::EnableLine;
use crate::error::{ConfigError, InitError, ReadError};

/// Result of a single-sensor poll.
///
/// A distance of zero usually means the measurement failed or the target
/// was out of range, even when `timed_out` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub distance_mm: u16,
    /// The poll gave up before the sensor reported data.
    pub timed_out: bool,
}

impl Reading {
    pub fn is_suspect(&self) -> bool {
        self.timed_out || self.distance_mm == 0
    }
}

/// Owns every sensor on one I2C bus along with their enable lines.
///
/// All sensors power up on the same default address, so they are brought up
/// one at a time by [`TofArray::init_sensors`] and each is moved to
/// `base_address + slot` before the next is enabled.
pub struct TofArray<D, P, C> {
    config: SensorConfig,
    slots: Vec<Slot>,
    drivers: Vec<D>,
    lines: Vec<P>,
    clock: C,
    initialized: bool,
}

fn bus_error<E: Debug>(slot: usize) -> impl FnOnce(E) -> ReadError {
    move |e| ReadError::Bus {
        slot,
        cause: format!("{:?}", e),
    }
}

fn configure_error<E: Debug>(slot: usize, step: &'static str) -> impl FnOnce(E) -> InitError {
    move |e| InitError::Configure {
        slot,
        step,
        cause: format!("{:?}", e),
    }
}

impl<D, P, C> TofArray<D, P, C>
where
    D: RangingDriver,
    P: EnableLine,
    C: Clock,
{
    /// `drivers` and `lines` are in slot order, one of each per enable pin in
    /// `config`. Nothing touches the hardware until `init_sensors`.
    pub fn new(
        config: SensorConfig,
        drivers: Vec<D>,
        lines: Vec<P>,
        clock: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let count = config.sensor_count();
        if drivers.len() != count {
            return Err(ConfigError::CountMismatch {
                what: "drivers",
                expected: count,
                got: drivers.len(),
            });
        }
        if lines.len() != count {
            return Err(ConfigError::CountMismatch {
                what: "enable lines",
                expected: count,
                got: lines.len(),
            });
        }

        Ok(TofArray {
            slots: config.slots(),
            config,
            drivers,
            lines,
            clock,
            initialized: false,
        })
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn sensor_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Power up and address every sensor in slot order.
    ///
    /// Stops at the first sensor that fails. Sensors before it stay enabled
    /// on their new addresses, sensors after it stay held in reset. Run the
    /// whole sequence again to retry.
    pub fn init_sensors(&mut self) -> Result<(), InitError> {
        self.initialized = false;

        // Nothing may answer on the default address until its turn. Held in
        // reset, a device also forgets any address an earlier bring-up gave it.
        for (slot, (line, driver)) in self.lines.iter_mut().zip(&mut self.drivers).enumerate() {
            line.hold_low().map_err(|e| InitError::EnableLine {
                slot,
                cause: format!("{:?}", e),
            })?;
            driver
                .reset_address()
                .map_err(configure_error(slot, "reset address"))?;
        }

        for slot in 0..self.slots.len() {
            self.bring_up(slot)?;
        }

        debug!("{} sensors initialized", self.slots.len());
        self.initialized = true;
        Ok(())
    }

    fn bring_up(&mut self, slot: usize) -> Result<(), InitError> {
        let address = self.slots[slot].address;
        let config = &self.config;
        let driver = &mut self.drivers[slot];

        self.lines[slot]
            .release()
            .map_err(|e| InitError::EnableLine {
                slot,
                cause: format!("{:?}", e),
            })?;
        self.clock.sleep(config.settle_delay());

        driver.set_timeout(config.read_cycle_ms);
        driver.init().map_err(|e| InitError::SensorInitFailed {
            slot,
            cause: format!("{:?}", e),
        })?;

        driver
            .set_address(address)
            .map_err(configure_error(slot, "set address"))?;
        driver
            .set_roi_size(config.fov, config.fov)
            .map_err(configure_error(slot, "set ROI"))?;
        driver
            .set_distance_mode(config.distance_mode)
            .map_err(configure_error(slot, "set distance mode"))?;
        driver
            .set_timing_budget(config.timing_budget_ms)
            .map_err(configure_error(slot, "set timing budget"))?;

        debug!("sensor {} up at {:#04x}", slot, address);
        Ok(())
    }

    /// Read every sensor into `out`, in slot order.
    ///
    /// All sensors are triggered back to back and given one shared read
    /// cycle to finish. If any sensor timed out the batch fails and `out`
    /// is left untouched.
    pub fn read_all(&mut self, out: &mut [u16]) -> Result<(), ReadError> {
        if !self.initialized {
            return Err(ReadError::NotInitialized);
        }
        if out.len() != self.drivers.len() {
            return Err(ReadError::BufferSize {
                expected: self.drivers.len(),
                got: out.len(),
            });
        }

        for (slot, driver) in self.drivers.iter_mut().enumerate() {
            trace!("trigger sensor {}", slot);
            driver.trigger_read(false).map_err(bus_error(slot))?;
        }

        self.clock.sleep(self.config.read_cycle());

        let mut staged = vec![0; self.drivers.len()];
        for (slot, driver) in self.drivers.iter_mut().enumerate() {
            if driver.has_timed_out().map_err(bus_error(slot))? {
                warn!("sensor {} timed out, dropping batch", slot);
                return Err(ReadError::Timeout { slot });
            }
            staged[slot] = driver.read(false).map_err(bus_error(slot))?;
        }

        out.copy_from_slice(&staged);
        Ok(())
    }

    pub fn read_all_vec(&mut self) -> Result<Vec<u16>, ReadError> {
        let mut out = vec![0; self.drivers.len()];
        self.read_all(&mut out)?;
        Ok(out)
    }

    /// Read one sensor, spinning until it has data or gives up.
    ///
    /// The value is returned even when the sensor timed out, so a timeout
    /// cannot be told apart from a genuine reading here. Use
    /// [`TofArray::poll_one`] when that matters.
    pub fn read_one(&mut self, slot: usize) -> Result<u16, ReadError> {
        self.poll_one(slot).map(|reading| reading.distance_mm)
    }

    /// Like [`TofArray::read_one`] but reports whether the poll timed out.
    ///
    /// The spin ends when the sensor has data, when it reports a timeout, or
    /// once the timing budget has elapsed on the coordinator's clock.
    pub fn poll_one(&mut self, slot: usize) -> Result<Reading, ReadError> {
        if !self.initialized {
            return Err(ReadError::NotInitialized);
        }
        let count = self.drivers.len();
        let driver = self
            .drivers
            .get_mut(slot)
            .ok_or(ReadError::InvalidSlot { slot, count })?;
        let bound = self.config.timing_budget();

        driver.trigger_read(false).map_err(bus_error(slot))?;
        let start = self.clock.now();

        let timed_out = loop {
            if driver.is_data_ready().map_err(bus_error(slot))? {
                break false;
            }
            if driver.has_timed_out().map_err(bus_error(slot))? {
                break true;
            }
            if self.clock.now().saturating_sub(start) >= bound {
                break true;
            }
        };

        let distance_mm = driver.read(false).map_err(bus_error(slot))?;
        if timed_out {
            warn!("sensor {} timed out after {:?}", slot, self.clock.now().saturating_sub(start));
        }
        Ok(Reading {
            distance_mm,
            timed_out,
        })
    }
}
