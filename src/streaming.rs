use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, warn};
use thread_priority::{ThreadBuilder, ThreadPriority};

use crate::clock::{monotime, Clock};
use crate::coordinator::TofArray;
use crate::driver::RangingDriver;
use crate::enable::EnableLine;
use crate::error::{ReadError, StreamError};

/// Channel for batches and errors. Expected to need only a little space
/// provided the consumer can keep up.  Otherwise needs space for as many
/// batches as can be produced while the consumer is busy.
pub const CHANNEL_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Monotonic seconds, taken once the batch was collected.
    pub timestamp: f64,
    pub distances: Vec<u16>,
}

// Message types for the channel
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResult {
    Batch(Batch),
    /// A batch failed. Timeouts are not fatal, the worker carries on.
    ReadFailed(ReadError),
    /// Normal (`None`) or unexpected exit of the worker.
    ThreadExit(Option<String>),
}

/// Runs batched reads on a dedicated high priority thread, one per read cycle.
///
/// The array is shared behind a mutex which stands in for the physical bus:
/// anything else reading the array in the meantime waits its turn.
pub struct BatchStream {
    receiver: Receiver<BatchResult>,
    sender: Sender<BatchResult>,
    thread_handle: Option<thread::JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
    overflow_flag: Arc<AtomicBool>,
}

impl BatchStream {
    pub fn start<D, P, C>(
        array: Arc<Mutex<TofArray<D, P, C>>>,
        capacity: usize,
    ) -> Result<Self, StreamError>
    where
        D: RangingDriver + Send + 'static,
        P: EnableLine + Send + 'static,
        C: Clock + Send + 'static,
    {
        {
            let array = array.lock().map_err(|_| StreamError::Poisoned)?;
            if !array.is_initialized() {
                return Err(StreamError::NotInitialized);
            }
        }

        let (sender, receiver) = bounded(capacity);
        let is_running = Arc::new(AtomicBool::new(true));
        let overflow_flag = Arc::new(AtomicBool::new(false));

        let thread_is_running = Arc::clone(&is_running);
        let thread_overflow = Arc::clone(&overflow_flag);
        let thread_sender = sender.clone();
        let thread = ThreadBuilder::default()
            .name("tof_array_thread".to_string())
            .priority(ThreadPriority::Max)
            .spawn(move |priority| {
                if let Err(e) = priority {
                    warn!("could not raise batch thread priority: {:?}", e);
                }
                if let Err(e) =
                    batch_loop(array, &thread_is_running, &thread_overflow, &thread_sender)
                {
                    let _ = thread_sender.try_send(BatchResult::ThreadExit(Some(e)));
                }

                // Always mark as not running when thread exits
                thread_is_running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| StreamError::Spawn(e.to_string()))?;

        Ok(BatchStream {
            receiver,
            sender,
            thread_handle: Some(thread),
            is_running,
            overflow_flag,
        })
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn overflowed(&self) -> bool {
        self.overflow_flag.load(Ordering::Relaxed)
    }

    /// Next message, blocking. `None` once the worker is gone and the
    /// channel is drained.
    pub fn recv(&self) -> Option<BatchResult> {
        if !self.is_running() && self.receiver.is_empty() {
            return None;
        }
        // The stream holds a sender itself, so poll rather than block forever
        loop {
            match self.receiver.recv_timeout(std::time::Duration::from_millis(50)) {
                Ok(result) => return Some(result),
                Err(RecvTimeoutError::Timeout) if self.is_running() => continue,
                Err(_) => return self.receiver.try_recv().ok(),
            }
        }
    }

    pub fn try_recv(&self) -> Option<BatchResult> {
        self.receiver.try_recv().ok()
    }

    /// Signal the worker to stop and wait for it.
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);

        // Try to send a normal exit message
        let _ = self.sender.try_send(BatchResult::ThreadExit(None));

        if let Some(handle) = self.thread_handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for BatchStream {
    fn drop(&mut self) {
        self.stop();
    }
}

// Worker function for the batch thread
fn batch_loop<D, P, C>(
    array: Arc<Mutex<TofArray<D, P, C>>>,
    is_running: &AtomicBool,
    overflow_flag: &AtomicBool,
    sender: &Sender<BatchResult>,
) -> Result<(), String>
where
    D: RangingDriver,
    P: EnableLine,
    C: Clock,
{
    while is_running.load(Ordering::Relaxed) {
        // The read itself waits out the read cycle, holding the bus
        let result = {
            let mut array = array
                .lock()
                .map_err(|_| "Sensor array mutex poisoned".to_string())?;
            array.read_all_vec()
        };

        let message = match result {
            Ok(distances) => BatchResult::Batch(Batch {
                timestamp: monotime(),
                distances,
            }),
            Err(e @ ReadError::Timeout { .. }) => BatchResult::ReadFailed(e),
            Err(e) => {
                // Bus fault, not worth retrying
                let _ = sender.try_send(BatchResult::ReadFailed(e.clone()));
                return Err(e.to_string());
            }
        };

        match sender.try_send(message) {
            Ok(_) => {}
            Err(TrySendError::Full(_)) => {
                overflow_flag.store(true, Ordering::SeqCst);
                return Err("Batch channel overflow".to_string());
            }
            Err(TrySendError::Disconnected(_)) => return Ok(()),
        }
    }

    debug!("batch thread stopping");
    let _ = sender.try_send(BatchResult::ThreadExit(None));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorConfig;
    use crate::sim::Bench;

    fn shared(bench: &Bench) -> Arc<Mutex<crate::sim::SimArray>> {
        let mut array = bench.array(SensorConfig::default());
        array.init_sensors().unwrap();
        Arc::new(Mutex::new(array))
    }

    #[test]
    fn streams_batches_until_stopped() {
        let bench = Bench::new();
        let mut stream = BatchStream::start(shared(&bench), CHANNEL_SIZE).unwrap();

        match stream.recv() {
            Some(BatchResult::Batch(batch)) => assert_eq!(batch.distances, vec![100, 200, 300]),
            other => panic!("unexpected {:?}", other),
        }

        stream.stop();
        assert!(!stream.is_running());
    }

    #[test]
    fn refuses_uninitialized_array() {
        let bench = Bench::new();
        let array = Arc::new(Mutex::new(bench.array(SensorConfig::default())));
        assert!(matches!(
            BatchStream::start(array, CHANNEL_SIZE),
            Err(StreamError::NotInitialized)
        ));
    }

    #[test]
    fn overflow_stops_worker() {
        let bench = Bench::new();
        let stream = BatchStream::start(shared(&bench), 1).unwrap();

        // Simulated reads take no wall time, so the channel fills at once
        while stream.is_running() {
            thread::yield_now();
        }
        assert!(stream.overflowed());
        assert!(matches!(stream.try_recv(), Some(BatchResult::Batch(_))));
    }

    #[test]
    fn timeouts_are_forwarded() {
        let bench = Bench::new();
        let drivers = vec![bench.driver(0, 5).never_ready()];
        let mut array = bench.array_with(SensorConfig::with_enable_pins(vec![2]), drivers);
        array.init_sensors().unwrap();
        let mut stream = BatchStream::start(Arc::new(Mutex::new(array)), CHANNEL_SIZE).unwrap();

        assert_eq!(
            stream.recv(),
            Some(BatchResult::ReadFailed(ReadError::Timeout { slot: 0 }))
        );
        stream.stop();
    }
}
