//! Simulated sensors, enable lines and clock sharing one event journal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::config::{SensorConfig, FACTORY_ADDRESS};
use crate::coordinator::TofArray;
use crate::driver::{DistanceMode, RangingDriver};
use crate::enable::EnableLine;

/// Bus time spent on one status register read.
pub const POLL_COST: Duration = Duration::from_micros(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    LineLow(usize),
    LineReleased(usize),
    ResetAddress(usize),
    Sleep(Duration),
    SetTimeout(usize, u16),
    Init(usize),
    SetAddress(usize, u8),
    SetRoi(usize, u16, u16),
    SetDistanceMode(usize, DistanceMode),
    SetTimingBudget(usize, u16),
    Trigger(usize),
    Read(usize),
}

impl Event {
    /// Slot a driver event put on the bus. Line, clock and address reset
    /// events are `None`.
    pub fn driver_slot(&self) -> Option<usize> {
        match *self {
            Event::SetTimeout(i, _)
            | Event::Init(i)
            | Event::SetAddress(i, _)
            | Event::SetRoi(i, _, _)
            | Event::SetDistanceMode(i, _)
            | Event::SetTimingBudget(i, _)
            | Event::Trigger(i)
            | Event::Read(i) => Some(i),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimFault(pub &'static str);

/// Driver operation a `SimDriver` can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    ResetAddress,
    Init,
    SetAddress,
    SetRoi,
    SetDistanceMode,
    SetTimingBudget,
    Trigger,
    Read,
}

/// What the physical sensor behind a slot is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Device {
    powered: bool,
    address: u8,
}

impl Default for Device {
    fn default() -> Self {
        Device {
            powered: false,
            address: FACTORY_ADDRESS,
        }
    }
}

#[derive(Clone, Default)]
pub struct Bench {
    journal: Arc<Mutex<Vec<Event>>>,
    time: Arc<Mutex<Duration>>,
    devices: Arc<Mutex<HashMap<usize, Device>>>,
}

pub type SimArray = TofArray<SimDriver, SimLine, SimClock>;

impl Bench {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.journal.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.journal.lock().unwrap().clear();
    }

    pub fn now(&self) -> Duration {
        *self.time.lock().unwrap()
    }

    fn record(&self, event: Event) {
        self.journal.lock().unwrap().push(event);
    }

    fn advance(&self, by: Duration) {
        *self.time.lock().unwrap() += by;
    }

    fn device(&self, slot: usize) -> Device {
        self.devices.lock().unwrap().get(&slot).copied().unwrap_or_default()
    }

    fn update_device(&self, slot: usize, f: impl FnOnce(&mut Device)) {
        f(self.devices.lock().unwrap().entry(slot).or_default());
    }

    /// Address the sensor in `slot` currently answers on.
    pub fn device_address(&self, slot: usize) -> u8 {
        self.device(slot).address
    }

    pub fn clock(&self) -> SimClock {
        SimClock {
            bench: self.clone(),
        }
    }

    pub fn line(&self, slot: usize) -> SimLine {
        SimLine {
            slot,
            bench: self.clone(),
            fail: false,
        }
    }

    /// A healthy sensor reading `distance` mm after 20 ms.
    pub fn driver(&self, slot: usize, distance: u16) -> SimDriver {
        SimDriver {
            slot,
            bench: self.clone(),
            distance,
            ready_after: Some(Duration::from_millis(20)),
            fail_on: None,
            address: FACTORY_ADDRESS,
            timeout: Duration::ZERO,
            triggered_at: None,
            last: 0,
        }
    }

    /// Array over `config` with one healthy driver per slot reading
    /// `100 * (slot + 1)` mm.
    pub fn array(&self, config: SensorConfig) -> SimArray {
        let drivers = (0..config.sensor_count())
            .map(|i| self.driver(i, 100 * (i as u16 + 1)))
            .collect();
        self.array_with(config, drivers)
    }

    pub fn array_with(&self, config: SensorConfig, drivers: Vec<SimDriver>) -> SimArray {
        let lines = (0..drivers.len()).map(|i| self.line(i)).collect();
        TofArray::new(config, drivers, lines, self.clock()).unwrap()
    }
}

pub struct SimClock {
    bench: Bench,
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        self.bench.now()
    }

    fn sleep(&mut self, duration: Duration) {
        self.bench.record(Event::Sleep(duration));
        self.bench.advance(duration);
    }
}

pub struct SimLine {
    slot: usize,
    bench: Bench,
    pub fail: bool,
}

impl EnableLine for SimLine {
    type Error = SimFault;

    /// Holding XSHUT low powers the sensor down, which also drops any
    /// address it was given.
    fn hold_low(&mut self) -> Result<(), SimFault> {
        if self.fail {
            return Err(SimFault("line busy"));
        }
        self.bench.record(Event::LineLow(self.slot));
        self.bench.update_device(self.slot, |d| *d = Device::default());
        Ok(())
    }

    fn release(&mut self) -> Result<(), SimFault> {
        if self.fail {
            return Err(SimFault("line busy"));
        }
        self.bench.record(Event::LineReleased(self.slot));
        self.bench.update_device(self.slot, |d| d.powered = true);
        Ok(())
    }
}

pub struct SimDriver {
    slot: usize,
    bench: Bench,
    pub distance: u16,
    /// `None` for a sensor that never finishes a measurement.
    pub ready_after: Option<Duration>,
    pub fail_on: Option<Op>,
    /// Address this driver talks to.
    pub address: u8,
    pub timeout: Duration,
    triggered_at: Option<Duration>,
    last: u16,
}

impl SimDriver {
    pub fn never_ready(mut self) -> Self {
        self.ready_after = None;
        self
    }

    pub fn failing(mut self, op: Op) -> Self {
        self.fail_on = Some(op);
        self
    }

    pub fn failing_init(self) -> Self {
        self.failing(Op::Init)
    }

    fn fault(&self, op: Op) -> Result<(), SimFault> {
        if self.fail_on == Some(op) {
            return Err(SimFault("injected fault"));
        }
        Ok(())
    }

    /// A bus transaction only succeeds if a powered sensor answers on the
    /// address this driver uses.
    fn transact(&self, op: Op) -> Result<(), SimFault> {
        self.fault(op)?;
        let device = self.bench.device(self.slot);
        if !device.powered || device.address != self.address {
            return Err(SimFault("nack"));
        }
        Ok(())
    }

    fn ready(&self) -> bool {
        match (self.triggered_at, self.ready_after) {
            (Some(at), Some(after)) => self.bench.now() - at >= after,
            _ => false,
        }
    }
}

impl RangingDriver for SimDriver {
    type Error = SimFault;

    fn set_timeout(&mut self, timeout_ms: u16) {
        self.bench.record(Event::SetTimeout(self.slot, timeout_ms));
        self.timeout = Duration::from_millis(timeout_ms.into());
    }

    fn init(&mut self) -> Result<(), SimFault> {
        self.bench.record(Event::Init(self.slot));
        self.transact(Op::Init)
    }

    fn set_address(&mut self, address: u8) -> Result<(), SimFault> {
        self.bench.record(Event::SetAddress(self.slot, address));
        self.transact(Op::SetAddress)?;
        self.bench.update_device(self.slot, |d| d.address = address);
        self.address = address;
        Ok(())
    }

    fn reset_address(&mut self) -> Result<(), SimFault> {
        self.bench.record(Event::ResetAddress(self.slot));
        self.fault(Op::ResetAddress)?;
        self.address = FACTORY_ADDRESS;
        self.triggered_at = None;
        Ok(())
    }

    fn set_roi_size(&mut self, width: u16, height: u16) -> Result<(), SimFault> {
        self.bench.record(Event::SetRoi(self.slot, width, height));
        self.transact(Op::SetRoi)
    }

    fn set_distance_mode(&mut self, mode: DistanceMode) -> Result<(), SimFault> {
        self.bench.record(Event::SetDistanceMode(self.slot, mode));
        self.transact(Op::SetDistanceMode)
    }

    fn set_timing_budget(&mut self, budget_ms: u16) -> Result<(), SimFault> {
        self.bench.record(Event::SetTimingBudget(self.slot, budget_ms));
        self.transact(Op::SetTimingBudget)
    }

    fn trigger_read(&mut self, _blocking: bool) -> Result<(), SimFault> {
        self.bench.record(Event::Trigger(self.slot));
        self.transact(Op::Trigger)?;
        self.triggered_at = Some(self.bench.now());
        Ok(())
    }

    fn is_data_ready(&mut self) -> Result<bool, SimFault> {
        self.bench.advance(POLL_COST);
        Ok(self.ready())
    }

    fn has_timed_out(&mut self) -> Result<bool, SimFault> {
        self.bench.advance(POLL_COST);
        let expired = match self.triggered_at {
            Some(at) => self.timeout > Duration::ZERO && self.bench.now() - at >= self.timeout,
            None => false,
        };
        Ok(expired && !self.ready())
    }

    fn read(&mut self, _blocking: bool) -> Result<u16, SimFault> {
        self.bench.record(Event::Read(self.slot));
        self.transact(Op::Read)?;
        if self.ready() {
            self.last = self.distance;
        }
        self.triggered_at = None;
        Ok(self.last)
    }
}
