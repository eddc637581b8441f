use std::sync::{Arc, Mutex, MutexGuard};

use pyo3::create_exception;
use pyo3::exceptions::{PyException, PyIOError, PyOverflowError, PyValueError};
use pyo3::prelude::*;

use crate::config::SensorConfig;
use crate::driver::DistanceMode;
use crate::error::{InitError, OpenError, ReadError, StreamError};
use crate::linux::{self, LinuxTofArray, DEFAULT_GPIO_CHIP};
use crate::streaming::{BatchResult, BatchStream, CHANNEL_SIZE};

create_exception!(tof_array, SensorInitError, PyException);
create_exception!(tof_array, SensorReadError, PyException);
create_exception!(tof_array, ThreadError, PyException);

fn open_error(e: OpenError) -> PyErr {
    match e {
        OpenError::Config(e) => PyErr::new::<PyValueError, _>(e.to_string()),
        e => PyErr::new::<PyIOError, _>(e.to_string()),
    }
}

fn init_error(e: InitError) -> PyErr {
    SensorInitError::new_err(e.to_string())
}

fn read_error(e: ReadError) -> PyErr {
    match e {
        ReadError::InvalidSlot { .. } | ReadError::BufferSize { .. } => {
            PyErr::new::<PyValueError, _>(e.to_string())
        }
        ReadError::Bus { .. } => PyErr::new::<PyIOError, _>(e.to_string()),
        e => SensorReadError::new_err(e.to_string()),
    }
}

// The sensor array class
#[pyclass(name = "TofArray")]
#[doc = "Several VL53L1X sensors sharing one I2C bus, told apart by their XSHUT lines.\n\n\
         Call init_sensors() once before reading. A distance of 0 usually means\n\
         the reading failed or the target was out of range."]
struct PyTofArray {
    array: Arc<Mutex<LinuxTofArray>>,
    stream: Option<BatchStream>,
}

impl PyTofArray {
    fn lock(&self) -> PyResult<MutexGuard<'_, LinuxTofArray>> {
        self.array
            .lock()
            .map_err(|_| ThreadError::new_err("Sensor array mutex poisoned"))
    }
}

#[pymethods]
impl PyTofArray {
    #[new]
    #[pyo3(signature = (bus, pins, chip=None, long_range=true, timing_budget_ms=None, fov=None))]
    fn new(
        bus: u8,
        pins: Vec<u32>,
        chip: Option<String>,
        long_range: bool,
        timing_budget_ms: Option<u16>,
        fov: Option<u16>,
    ) -> PyResult<Self> {
        let mut config = SensorConfig::with_enable_pins(pins);
        config.distance_mode = if long_range {
            DistanceMode::Long
        } else {
            DistanceMode::Short
        };
        if let Some(budget) = timing_budget_ms {
            config.timing_budget_ms = budget;
        }
        if let Some(fov) = fov {
            config.fov = fov;
        }

        let array = linux::open(bus, chip.as_deref().unwrap_or(DEFAULT_GPIO_CHIP), config)
            .map_err(open_error)?;
        Ok(PyTofArray {
            array: Arc::new(Mutex::new(array)),
            stream: None,
        })
    }

    fn init_sensors(&self) -> PyResult<()> {
        if self.is_running() {
            return Err(ThreadError::new_err("Stop streaming before re-initializing"));
        }
        self.lock()?.init_sensors().map_err(init_error)
    }

    fn sensor_count(&self) -> PyResult<usize> {
        Ok(self.lock()?.sensor_count())
    }

    /// Addresses assigned to each sensor, in slot order.
    fn addresses(&self) -> PyResult<Vec<u8>> {
        Ok(self.lock()?.slots().iter().map(|s| s.address).collect())
    }

    fn read_all(&self) -> PyResult<Vec<u16>> {
        self.lock()?.read_all_vec().map_err(read_error)
    }

    fn read_one(&self, index: usize) -> PyResult<u16> {
        self.lock()?.read_one(index).map_err(read_error)
    }

    /// Returns (distance, timed_out).
    fn poll_one(&self, index: usize) -> PyResult<(u16, bool)> {
        let reading = self.lock()?.poll_one(index).map_err(read_error)?;
        Ok((reading.distance_mm, reading.timed_out))
    }

    #[pyo3(signature = (capacity=CHANNEL_SIZE))]
    fn start_streaming(&mut self, capacity: usize) -> PyResult<()> {
        // Return early if already streaming
        if self.is_running() {
            return Ok(());
        }

        let stream = BatchStream::start(Arc::clone(&self.array), capacity).map_err(|e| match e {
            StreamError::NotInitialized => SensorInitError::new_err(e.to_string()),
            e => ThreadError::new_err(e.to_string()),
        })?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Next (timestamp, distances) batch, or None once streaming has stopped.
    fn get_reading(&self, py: Python<'_>) -> PyResult<Option<(f64, Vec<u16>)>> {
        let stream = match &self.stream {
            Some(s) => s,
            None => return Err(PyErr::new::<PyIOError, _>("Sensors not streaming".to_string())),
        };

        let result = py.allow_threads(|| stream.recv());

        match result {
            Some(BatchResult::Batch(batch)) => Ok(Some((batch.timestamp, batch.distances))),
            Some(BatchResult::ReadFailed(e)) => Err(read_error(e)),
            Some(BatchResult::ThreadExit(None)) => Ok(None),
            Some(BatchResult::ThreadExit(Some(err))) => {
                if stream.overflowed() {
                    Err(PyErr::new::<PyOverflowError, _>(err))
                } else {
                    Err(ThreadError::new_err(err))
                }
            }
            None => {
                if stream.overflowed() {
                    Err(PyErr::new::<PyOverflowError, _>(
                        "Batch channel overflow".to_string(),
                    ))
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn is_running(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_running())
    }

    fn stop_streaming(&mut self) -> PyResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        Ok(())
    }
}

// Register the module
#[pymodule]
fn tof_array(py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTofArray>()?;
    m.add("SensorInitError", py.get_type::<SensorInitError>())?;
    m.add("SensorReadError", py.get_type::<SensorReadError>())?;
    m.add("ThreadError", py.get_type::<ThreadError>())?;
    Ok(())
}
