use core::fmt::Debug;

/// Ranging mode. Short tops out around 1.3 m with better ambient immunity,
/// Long reaches about 4 m in the dark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMode {
    Short,
    Long,
}

/// Per-device operations the bus coordinator needs from a distance sensor
/// driver. One value is created per slot and owned by the coordinator.
///
/// A fresh device answers on the factory default address; `set_address`
/// moves it so that other devices can be enabled afterwards.
pub trait RangingDriver {
    type Error: Debug;

    /// Timeout applied to blocking waits and reported by `has_timed_out`.
    fn set_timeout(&mut self, timeout_ms: u16);

    fn init(&mut self) -> Result<(), Self::Error>;

    fn set_address(&mut self, address: u8) -> Result<(), Self::Error>;

    /// The device was held in reset and is back on its factory address.
    /// Address it there until the next `set_address`. No bus traffic.
    fn reset_address(&mut self) -> Result<(), Self::Error>;

    fn set_roi_size(&mut self, width: u16, height: u16) -> Result<(), Self::Error>;

    fn set_distance_mode(&mut self, mode: DistanceMode) -> Result<(), Self::Error>;

    fn set_timing_budget(&mut self, budget_ms: u16) -> Result<(), Self::Error>;

    /// Start a single measurement. With `blocking` set this waits until the
    /// measurement completes or the timeout expires.
    fn trigger_read(&mut self, blocking: bool) -> Result<(), Self::Error>;

    fn is_data_ready(&mut self) -> Result<bool, Self::Error>;

    /// True once the measurement started by the last trigger has run past
    /// the timeout without producing data.
    fn has_timed_out(&mut self) -> Result<bool, Self::Error>;

    /// Distance in millimetres from the last measurement.
    fn read(&mut self, blocking: bool) -> Result<u16, Self::Error>;
}
