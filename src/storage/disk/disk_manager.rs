use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::Result;

/// DiskManager is responsible for reading and writing pages to/from disk.
/// It manages a single table file of fixed-size pages and tracks how many
/// pages the file holds.
pub struct DiskManager {
    /// The backing file
    file: Mutex<File>,
    /// Path to the backing file
    path: PathBuf,
    /// Page size this file was opened with
    page_size: usize,
    /// Number of pages currently allocated
    num_pages: AtomicU32,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens the file at `path` with pages of `page_size` bytes.
    /// Creates the file if it doesn't exist.
    pub fn new<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / page_size as u64) as u32;

        Ok(Self {
            file: Mutex::new(file),
            path: path.as_ref().to_path_buf(),
            page_size,
            num_pages: AtomicU32::new(num_pages),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads page `page_no` into `data`, which must be exactly one page long.
    /// Bytes past the end of the file read as zeros.
    pub fn read_page(&self, page_no: u32, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), self.page_size, "Buffer must be one page");

        let offset = u64::from(page_no) * self.page_size as u64;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < data.len() {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data[filled..].fill(0);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes one page worth of `data` at page `page_no`.
    pub fn write_page(&self, page_no: u32, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), self.page_size, "Buffer must be one page");

        let offset = u64::from(page_no) * self.page_size as u64;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_pages.fetch_max(page_no + 1, Ordering::SeqCst);
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Appends a zero-initialized page and returns its page number.
    pub fn allocate_page(&self) -> Result<u32> {
        let page_no = self.num_pages.fetch_add(1, Ordering::SeqCst);

        let zeros = vec![0u8; self.page_size];
        self.write_page(page_no, &zeros)?;

        Ok(page_no)
    }

    /// Returns the number of pages currently allocated.
    pub fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::SeqCst)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of disk reads performed.
    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of disk writes performed.
    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns the path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes any buffered writes to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let file = self.file.get_mut();
        let _ = file.sync_all();
    }
}
