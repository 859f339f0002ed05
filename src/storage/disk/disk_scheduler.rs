use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::trace;

use crate::common::{Result, StrataError, DISK_REQUEST_QUEUE_DEPTH};

use super::DiskManager;

/// A disk I/O request. Buffers are owned, so a request can outlive the
/// caller's stack frame without any unsafe aliasing.
pub enum DiskRequest {
    Read {
        page_no: u32,
        reply: Sender<Result<Bytes>>,
    },
    Write {
        page_no: u32,
        data: Bytes,
        reply: Sender<Result<()>>,
    },
}

/// DiskScheduler manages a background worker thread that processes disk I/O requests.
/// Callers block on a per-request reply channel; I/O errors come back unchanged.
pub struct DiskScheduler {
    /// The disk manager for actual I/O operations
    disk_manager: Arc<DiskManager>,
    /// Channel sender for queuing requests
    request_sender: Sender<DiskRequest>,
    /// Flag to signal shutdown
    shutdown: Arc<AtomicBool>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler with the given DiskManager.
    /// Spawns a background worker thread to process requests.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(DISK_REQUEST_QUEUE_DEPTH);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm_clone = Arc::clone(&disk_manager);
        let shutdown_clone = Arc::clone(&shutdown);

        let worker_handle = thread::spawn(move || {
            Self::start_worker_thread(dm_clone, receiver, shutdown_clone);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a request for the background worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| StrataError::DiskScheduler(format!("Failed to schedule request: {}", e)))
    }

    /// Reads a page and waits for the result.
    pub fn read_page(&self, page_no: u32) -> Result<Bytes> {
        let (reply, rx) = bounded(1);
        self.schedule(DiskRequest::Read { page_no, reply })?;
        rx.recv().map_err(|e| {
            StrataError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?
    }

    /// Writes a page and waits for completion.
    pub fn write_page(&self, page_no: u32, data: Bytes) -> Result<()> {
        let (reply, rx) = bounded(1);
        self.schedule(DiskRequest::Write {
            page_no,
            data,
            reply,
        })?;
        rx.recv().map_err(|e| {
            StrataError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?
    }

    /// The background worker thread function.
    /// Processes requests from the queue until shutdown is signaled.
    fn start_worker_thread(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain remaining requests before exiting
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process_request(&disk_manager, request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read { page_no, reply } => {
                let mut buf = BytesMut::zeroed(disk_manager.page_size());
                let result = disk_manager
                    .read_page(page_no, &mut buf)
                    .map(|()| buf.freeze());
                trace!(page_no, ok = result.is_ok(), "disk read");
                let _ = reply.send(result);
            }
            DiskRequest::Write {
                page_no,
                data,
                reply,
            } => {
                let result = disk_manager.write_page(page_no, &data);
                trace!(page_no, ok = result.is_ok(), "disk write");
                let _ = reply.send(result);
            }
        }
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const PAGE: usize = 256;

    #[test]
    fn test_disk_scheduler_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path(), PAGE).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_no = scheduler.disk_manager().allocate_page().unwrap();

        let mut write_data = vec![0u8; PAGE];
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler
            .write_page(page_no, Bytes::from(write_data.clone()))
            .unwrap();

        let read_data = scheduler.read_page(page_no).unwrap();
        assert_eq!(&read_data[..], &write_data[..]);
    }

    #[test]
    fn test_disk_scheduler_multiple_requests() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path(), PAGE).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page1 = scheduler.disk_manager().allocate_page().unwrap();
        let page2 = scheduler.disk_manager().allocate_page().unwrap();

        scheduler
            .write_page(page1, Bytes::from(vec![1u8; PAGE]))
            .unwrap();
        scheduler
            .write_page(page2, Bytes::from(vec![2u8; PAGE]))
            .unwrap();

        assert_eq!(scheduler.read_page(page1).unwrap()[0], 1);
        assert_eq!(scheduler.read_page(page2).unwrap()[0], 2);
        assert_eq!(scheduler.disk_manager().num_reads(), 2);
    }

    #[test]
    fn test_requests_from_many_threads() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path(), PAGE).unwrap());
        let scheduler = Arc::new(DiskScheduler::new(dm));

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let scheduler = scheduler.clone();
                thread::spawn(move || {
                    scheduler
                        .write_page(u32::from(i), Bytes::from(vec![i; PAGE]))
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for i in 0..8u8 {
            assert_eq!(scheduler.read_page(u32::from(i)).unwrap()[PAGE - 1], i);
        }
        assert_eq!(scheduler.disk_manager().num_pages(), 8);
    }
}
