use core::fmt::Debug;
use std::time::{Duration, Instant};

use log::trace;
use thiserror::Error;
use vl53l1x_uld::comm::{Read, Write};
use vl53l1x_uld::roi::ROI;
use vl53l1x_uld::{IOVoltage, VL53L1X};

use crate::driver::{DistanceMode, RangingDriver};

/// Model id reported by a VL53L1X.
const SENSOR_ID: u16 = 0xEACC;

#[derive(Debug, Error)]
pub enum Vl53l1xError<E: Debug> {
    #[error("{0:?}")]
    Uld(vl53l1x_uld::Error<E>),

    #[error("Unexpected sensor id {0:#06x}")]
    UnexpectedSensorId(u16),

    #[error("Failed to reopen I2C bus: {0}")]
    Connect(String),
}

impl<E: Debug> From<vl53l1x_uld::Error<E>> for Vl53l1xError<E> {
    fn from(e: vl53l1x_uld::Error<E>) -> Self {
        Vl53l1xError::Uld(e)
    }
}

/// Single-shot ranging on top of the ULD's continuous ranging API.
///
/// A trigger starts ranging, a read takes the distance, clears the interrupt
/// and stops ranging again. The timeout is tracked here since the ULD has no
/// notion of one.
///
/// The ULD keeps the device address itself, so after the device is reset the
/// bus handle is reopened through `connect` to talk to the factory address.
pub struct Vl53l1xDriver<I2C>
where
    I2C: Read + Write,
{
    sensor: VL53L1X<I2C>,
    connect: Box<dyn FnMut() -> Result<I2C, String> + Send>,
    io_voltage: IOVoltage,
    timeout: Duration,
    started: Option<Instant>,
    timed_out: bool,
}

impl<I2C, E> Vl53l1xDriver<I2C>
where
    E: Debug,
    I2C: Read<Error = E> + Write<Error = E>,
{
    /// Driver for a device still on the factory default address. `connect`
    /// opens a handle on the bus and is called again on every address reset.
    pub fn open<F>(mut connect: F) -> Result<Self, String>
    where
        F: FnMut() -> Result<I2C, String> + Send + 'static,
    {
        let i2c = connect()?;
        Ok(Vl53l1xDriver {
            sensor: VL53L1X::new(i2c, vl53l1x_uld::DEFAULT_ADDRESS),
            connect: Box::new(connect),
            io_voltage: IOVoltage::Volt2_8,
            timeout: Duration::ZERO,
            started: None,
            timed_out: false,
        })
    }

    pub fn io_voltage(mut self, voltage_2v8: bool) -> Self {
        self.io_voltage = if voltage_2v8 {
            IOVoltage::Volt2_8
        } else {
            IOVoltage::Volt1_8
        };
        self
    }

    fn expired(&self) -> bool {
        match self.started {
            Some(started) => self.timeout > Duration::ZERO && started.elapsed() >= self.timeout,
            None => false,
        }
    }

    /// Spin until data is ready or the timeout runs out.
    fn wait_ready(&mut self) -> Result<(), Vl53l1xError<E>> {
        while !self.sensor.is_data_ready()? {
            if self.expired() {
                self.timed_out = true;
                return Ok(());
            }
        }
        Ok(())
    }
}

impl<I2C, E> RangingDriver for Vl53l1xDriver<I2C>
where
    E: Debug,
    I2C: Read<Error = E> + Write<Error = E>,
{
    type Error = Vl53l1xError<E>;

    fn set_timeout(&mut self, timeout_ms: u16) {
        self.timeout = Duration::from_millis(timeout_ms.into());
    }

    fn init(&mut self) -> Result<(), Self::Error> {
        let id = self.sensor.get_sensor_id()?;
        if id != SENSOR_ID {
            return Err(Vl53l1xError::UnexpectedSensorId(id));
        }
        self.sensor.init(self.io_voltage)?;
        Ok(())
    }

    fn set_address(&mut self, address: u8) -> Result<(), Self::Error> {
        self.sensor.set_address(address)?;
        Ok(())
    }

    fn reset_address(&mut self) -> Result<(), Self::Error> {
        let i2c = (self.connect)().map_err(Vl53l1xError::Connect)?;
        self.sensor = VL53L1X::new(i2c, vl53l1x_uld::DEFAULT_ADDRESS);
        self.started = None;
        self.timed_out = false;
        Ok(())
    }

    fn set_roi_size(&mut self, width: u16, height: u16) -> Result<(), Self::Error> {
        self.sensor.set_roi(ROI { width, height })?;
        Ok(())
    }

    fn set_distance_mode(&mut self, mode: DistanceMode) -> Result<(), Self::Error> {
        let mode = match mode {
            DistanceMode::Short => vl53l1x_uld::DistanceMode::Short,
            DistanceMode::Long => vl53l1x_uld::DistanceMode::Long,
        };
        self.sensor.set_distance_mode(mode)?;
        Ok(())
    }

    fn set_timing_budget(&mut self, budget_ms: u16) -> Result<(), Self::Error> {
        self.sensor.set_timing_budget_ms(budget_ms)?;
        Ok(())
    }

    fn trigger_read(&mut self, blocking: bool) -> Result<(), Self::Error> {
        if self.started.is_some() {
            // Previous measurement was never collected
            self.sensor.stop_ranging()?;
        }
        self.sensor.clear_interrupt()?;
        self.sensor.start_ranging()?;
        self.started = Some(Instant::now());
        self.timed_out = false;
        trace!("ranging started");

        if blocking {
            self.wait_ready()?;
        }
        Ok(())
    }

    fn is_data_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.sensor.is_data_ready()?)
    }

    fn has_timed_out(&mut self) -> Result<bool, Self::Error> {
        if self.timed_out {
            return Ok(true);
        }
        if self.expired() && !self.sensor.is_data_ready()? {
            self.timed_out = true;
        }
        Ok(self.timed_out)
    }

    fn read(&mut self, blocking: bool) -> Result<u16, Self::Error> {
        if blocking {
            self.wait_ready()?;
        }

        let distance = self.sensor.get_distance()?;

        // Clear the interrupt and go back to standby until the next trigger
        self.sensor.clear_interrupt()?;
        self.sensor.stop_ranging()?;
        self.started = None;
        Ok(distance)
    }
}
