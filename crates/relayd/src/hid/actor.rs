//! Device actor
//!
//! One dedicated thread per bridging session owns the open device handle
//! and runs its read/write loop. The thread is the only context that ever
//! touches the device, matching the exclusive-handle semantics of the host
//! HID API; the async side talks to it through a pair of channels.

use crate::hid::{DeviceError, DeviceHandle};
use async_channel::{Receiver, Sender, TryRecvError};
use protocol::REPORT_SIZE;
use std::time::Duration;
use tracing::{debug, error, trace};

/// Poll timeout for device reads. Short enough that a newly queued write
/// request is picked up promptly.
pub const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Run the device loop until the write channel closes or a device I/O
/// error occurs.
///
/// Each iteration first checks for a pending write request without
/// blocking; a pending record is written to the device, and a write failure
/// is fatal. With no write pending, a bounded-timeout read polls the
/// device; data is forwarded on `reads`, a timeout just repeats the loop,
/// and any other read error is fatal. The handle is released on every exit
/// path when `device` drops.
pub fn run_device_loop<D: DeviceHandle>(
    mut device: D,
    writes: Receiver<Vec<u8>>,
    reads: Sender<Vec<u8>>,
) -> Result<(), DeviceError> {
    loop {
        match writes.try_recv() {
            Ok(report) => {
                device.write_report(&report)?;
                trace!(len = report.len(), "report written to device");
            }
            Err(TryRecvError::Closed) => {
                debug!("write channel closed, stopping device actor");
                return Ok(());
            }
            Err(TryRecvError::Empty) => {
                let mut buf = [0u8; REPORT_SIZE];
                let n = device.read_report_timeout(&mut buf, READ_TIMEOUT)?;
                if n > 0 {
                    trace!(len = n, "report read from device");
                    if reads.send_blocking(buf[..n].to_vec()).is_err() {
                        // Forwarding sink is gone: the session is winding
                        // down, stop cleanly.
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Spawn the device actor on its own named OS thread.
///
/// The read-forward sender moves into the thread, so the channel closes
/// when the actor exits for any reason; downstream consumers observe that
/// as end-of-stream.
pub fn spawn_device_actor<D: DeviceHandle>(
    device: D,
    writes: Receiver<Vec<u8>>,
    reads: Sender<Vec<u8>>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("hid-actor".to_string())
        .spawn(move || {
            if let Err(e) = run_device_loop(device, writes, reads) {
                error!("device actor terminated: {e}");
            }
        })
        .expect("failed to spawn device actor thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted in-memory device for driving the loop.
    struct ScriptedDevice {
        /// Reports the device will produce, in order.
        to_read: VecDeque<Vec<u8>>,
        /// Reports written to the device, observable from the test.
        written: Arc<Mutex<Vec<Vec<u8>>>>,
        /// Fail the next write.
        fail_write: bool,
        /// Fail the next read.
        fail_read: bool,
        dropped: Arc<AtomicBool>,
    }

    impl ScriptedDevice {
        fn new() -> Self {
            Self {
                to_read: VecDeque::new(),
                written: Arc::new(Mutex::new(Vec::new())),
                fail_write: false,
                fail_read: false,
                dropped: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl Drop for ScriptedDevice {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    impl DeviceHandle for ScriptedDevice {
        fn write_report(&mut self, data: &[u8]) -> Result<usize, DeviceError> {
            if self.fail_write {
                return Err(DeviceError::Write("scripted write failure".to_string()));
            }
            self.written.lock().unwrap().push(data.to_vec());
            Ok(data.len())
        }

        fn read_report_timeout(
            &mut self,
            buf: &mut [u8],
            _timeout: Duration,
        ) -> Result<usize, DeviceError> {
            if self.fail_read {
                return Err(DeviceError::Read("scripted read failure".to_string()));
            }
            match self.to_read.pop_front() {
                Some(report) => {
                    buf[..report.len()].copy_from_slice(&report);
                    Ok(report.len())
                }
                None => Ok(0), // timeout
            }
        }
    }

    #[test]
    fn closed_write_channel_stops_the_loop() {
        let device = ScriptedDevice::new();
        let (write_tx, write_rx) = async_channel::bounded::<Vec<u8>>(4);
        let (read_tx, _read_rx) = async_channel::bounded(4);

        write_tx.close();
        let result = run_device_loop(device, write_rx, read_tx);
        assert!(result.is_ok());
    }

    #[test]
    fn pending_writes_reach_the_device_in_order() {
        let device = ScriptedDevice::new();
        let written = device.written.clone();
        let (write_tx, write_rx) = async_channel::bounded(4);
        let (read_tx, _read_rx) = async_channel::bounded(4);

        write_tx.send_blocking(vec![0x00, 0x01, 0x02]).unwrap();
        write_tx.send_blocking(vec![0x00, 0x03]).unwrap();
        write_tx.close();

        // The loop drains both queued writes before it observes the close.
        run_device_loop(device, write_rx, read_tx).unwrap();

        let written = written.lock().unwrap();
        assert_eq!(*written, vec![vec![0x00, 0x01, 0x02], vec![0x00, 0x03]]);
    }

    #[test]
    fn device_reads_are_forwarded_in_order() {
        let mut device = ScriptedDevice::new();
        device.to_read.push_back(vec![0xAA; 64]);
        device.to_read.push_back(vec![0xBB; 64]);
        let (write_tx, write_rx) = async_channel::bounded::<Vec<u8>>(4);
        let (read_tx, read_rx) = async_channel::bounded(4);

        let handle = std::thread::spawn(move || run_device_loop(device, write_rx, read_tx));

        assert_eq!(read_rx.recv_blocking().unwrap(), vec![0xAA; 64]);
        assert_eq!(read_rx.recv_blocking().unwrap(), vec![0xBB; 64]);

        write_tx.close();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn write_failure_is_fatal() {
        let mut device = ScriptedDevice::new();
        device.fail_write = true;
        let (write_tx, write_rx) = async_channel::bounded(4);
        let (read_tx, _read_rx) = async_channel::bounded(4);

        write_tx.send_blocking(vec![0x00; 65]).unwrap();
        let result = run_device_loop(device, write_rx, read_tx);
        assert!(matches!(result, Err(DeviceError::Write(_))));
    }

    #[test]
    fn read_failure_is_fatal_and_releases_the_handle() {
        let mut device = ScriptedDevice::new();
        device.fail_read = true;
        let dropped = device.dropped.clone();
        let (_write_tx, write_rx) = async_channel::bounded::<Vec<u8>>(4);
        let (read_tx, _read_rx) = async_channel::bounded::<Vec<u8>>(4);

        let result = run_device_loop(device, write_rx, read_tx);
        assert!(matches!(result, Err(DeviceError::Read(_))));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn dead_forward_sink_stops_the_loop_cleanly() {
        let mut device = ScriptedDevice::new();
        device.to_read.push_back(vec![0x42; 64]);
        let (_write_tx, write_rx) = async_channel::bounded::<Vec<u8>>(4);
        let (read_tx, read_rx) = async_channel::bounded::<Vec<u8>>(4);
        drop(read_rx);

        let result = run_device_loop(device, write_rx, read_tx);
        assert!(result.is_ok());
    }
}
