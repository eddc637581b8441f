use core::fmt::Debug;
use std::io;
use std::sync::Arc;

use embedded_hal::digital::v2::OutputPin;
use gpiod::{Chip, Input, Lines, Options, Output};

/// Shutdown (XSHUT) control for one sensor.
pub trait EnableLine {
    type Error: Debug;

    /// Hold the sensor in reset. It does not answer on the bus while held.
    fn hold_low(&mut self) -> Result<(), Self::Error>;

    /// Let the sensor power up.
    fn release(&mut self) -> Result<(), Self::Error>;
}

enum LineRequest {
    Idle,
    Low(Lines<Output>),
    Floating(Lines<Input>),
}

/// Enable line on a Linux GPIO character device.
///
/// Held low as an output, released by switching the line to an input and
/// letting the sensor's pull-up enable it.
pub struct GpioEnableLine {
    chip: Arc<Chip>,
    offset: u32,
    request: LineRequest,
}

impl GpioEnableLine {
    pub fn new(chip: Arc<Chip>, offset: u32) -> Self {
        GpioEnableLine {
            chip,
            offset,
            request: LineRequest::Idle,
        }
    }

    /// One line per pin offset, all on the same chip.
    pub fn open_all(chip: &str, pins: &[u32]) -> io::Result<Vec<Self>> {
        let chip = Arc::new(Chip::new(chip)?);
        Ok(pins
            .iter()
            .map(|&pin| GpioEnableLine::new(Arc::clone(&chip), pin))
            .collect())
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn is_released(&self) -> bool {
        matches!(self.request, LineRequest::Floating(_))
    }
}

impl EnableLine for GpioEnableLine {
    type Error = io::Error;

    fn hold_low(&mut self) -> Result<(), Self::Error> {
        // The kernel refuses a second request for a line we still hold
        self.request = LineRequest::Idle;
        let opts = Options::output([self.offset]).values([false]);
        self.request = LineRequest::Low(self.chip.request_lines(opts)?);
        Ok(())
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.request = LineRequest::Idle;
        let opts = Options::input([self.offset]);
        self.request = LineRequest::Floating(self.chip.request_lines(opts)?);
        Ok(())
    }
}

/// Enable line on a push-pull output, for boards without a pull-up on XSHUT.
/// Released means driven high.
pub struct PushPullEnable<P> {
    pin: P,
}

impl<P: OutputPin> PushPullEnable<P> {
    pub fn new(pin: P) -> Self {
        PushPullEnable { pin }
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P> EnableLine for PushPullEnable<P>
where
    P: OutputPin,
    P::Error: Debug,
{
    type Error = P::Error;

    fn hold_low(&mut self) -> Result<(), Self::Error> {
        self.pin.set_low()
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.pin.set_high()
    }
}
