use linux_embedded_hal::I2cdev;

use crate::clock::MonotonicClock;
use crate::config::SensorConfig;
use crate::coordinator::TofArray;
use crate::enable::GpioEnableLine;
use crate::error::OpenError;
use crate::vl53l1x::Vl53l1xDriver;

pub const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";

pub type LinuxTofArray = TofArray<Vl53l1xDriver<I2cdev>, GpioEnableLine, MonotonicClock>;

/// Open `/dev/i2c-{bus}` once per sensor, reopened on each bring-up, and one
/// enable line per configured pin on `chip`. Every driver starts on the factory default address.
pub fn open(bus: u8, chip: &str, config: SensorConfig) -> Result<LinuxTofArray, OpenError> {
    config.validate()?;

    let path = format!("/dev/i2c-{}", bus);
    let drivers = config
        .enable_pins
        .iter()
        .map(|_| {
            let path = path.clone();
            Vl53l1xDriver::open(move || {
                I2cdev::new(&path).map_err(|e| format!("{}: {}", path, e))
            })
            .map_err(OpenError::I2c)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let lines = GpioEnableLine::open_all(chip, &config.enable_pins)?;

    Ok(TofArray::new(config, drivers, lines, MonotonicClock)?)
}
