// storage/src/file/mod.rs

use crate::device::{FileDevice, StorageDevice};
use crate::page::{HeapPage, PAGE_SIZE};
use crate::record::Record;
use crate::{GrainError, Result};
use log::{debug, trace};
use std::io;
use std::path::Path;

/// The file-wide header stored in the first bytes of the file.
///
/// Pages follow immediately after, so page `k` lives at byte offset
/// `FileHeader::SIZE + k * PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    num_pages: i32,       // allocated pages in the file
    next_page_idx: i32,   // high-water mark for page-id allocation
    first_free_page: i32, // head of the free-page list, -1 if empty
}

impl FileHeader {
    pub const SIZE: usize = 12;

    fn new() -> Self {
        Self {
            num_pages: 0,
            next_page_idx: 0,
            first_free_page: -1,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.num_pages < 0 || self.next_page_idx < self.num_pages || self.first_free_page < -1 {
            return Err(GrainError::CorruptHeader);
        }
        Ok(())
    }

    fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.num_pages.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.next_page_idx.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.first_free_page.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(GrainError::CorruptHeader);
        }

        let header = Self {
            num_pages: i32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            next_page_idx: i32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            first_free_page: i32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        };

        header.validate()?;
        Ok(header)
    }

    pub fn num_pages(&self) -> i32 {
        self.num_pages
    }

    pub fn next_page_idx(&self) -> i32 {
        self.next_page_idx
    }

    pub fn first_free_page(&self) -> i32 {
        self.first_free_page
    }
}

/// Durable address of a record: the page it lives on and its slot index.
///
/// Stable across scans and across close/reopen for as long as the record is
/// not deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordId {
    pub page_id: i32,
    pub slot_idx: i32,
}

impl RecordId {
    /// The cursor seed for a fresh scan. [`HeapFile::scan_next`] advances
    /// from `slot_idx + 1`, so the seed sits one slot before `(0, 0)`.
    pub fn scan_start() -> Self {
        Self {
            page_id: 0,
            slot_idx: -1,
        }
    }
}

/// A heap file: a sequence of slotted pages behind a [`FileHeader`].
///
/// The handle exclusively owns the underlying device and the in-core copy of
/// the header; every mutating operation persists header changes before it
/// returns success. Single-threaded by contract. There is no journaling: an
/// I/O error mid-mutation can leave the page and file headers inconsistent,
/// and callers should reopen and revalidate after any I/O error.
#[derive(Debug)]
pub struct HeapFile<D: StorageDevice = FileDevice> {
    device: D,
    header: FileHeader,
}

impl HeapFile<FileDevice> {
    /// Create (or truncate) a heap file on disk and write a fresh header.
    pub fn create(path: &Path) -> Result<Self> {
        let device = FileDevice::create(path)?;
        debug!("created heap file at {}", path.display());
        Self::create_on(device)
    }

    /// Open an existing heap file on disk and validate its header.
    pub fn open(path: &Path) -> Result<Self> {
        let device = FileDevice::open(path)?;
        debug!("opened heap file at {}", path.display());
        Self::open_on(device)
    }
}

impl<D: StorageDevice> HeapFile<D> {
    /// Initialize a fresh heap file on `device`.
    ///
    /// On failure the device is dropped, releasing its resources.
    pub fn create_on(device: D) -> Result<Self> {
        let mut file = Self {
            device,
            header: FileHeader::new(),
        };
        file.write_file_header()?;
        Ok(file)
    }

    /// Read and validate the header from an existing device.
    pub fn open_on(mut device: D) -> Result<Self> {
        device.seek_to(0)?;

        let mut buf = [0u8; FileHeader::SIZE];
        match device.read_exact(&mut buf) {
            Ok(()) => {}
            // A file too short to hold a header is corrupt, not a transport error.
            Err(GrainError::FileReadFailed(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(GrainError::CorruptHeader);
            }
            Err(e) => return Err(e),
        }

        let header = FileHeader::from_bytes(&buf)?;
        Ok(Self { device, header })
    }

    /// Flush and release the handle.
    pub fn close(mut self) -> Result<()> {
        self.device.flush()
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn num_pages(&self) -> i32 {
        self.header.num_pages
    }

    pub fn next_page_idx(&self) -> i32 {
        self.header.next_page_idx
    }

    pub fn first_free_page(&self) -> i32 {
        self.header.first_free_page
    }

    fn write_file_header(&mut self) -> Result<()> {
        self.device.seek_to(0)?;
        self.device.write_all(&self.header.to_bytes())?;
        self.device.flush()
    }

    fn seek_to_page(&mut self, page_id: i32) -> Result<()> {
        let offset = FileHeader::SIZE as i64 + page_id as i64 * PAGE_SIZE as i64;
        let offset = u64::try_from(offset).map_err(|_| {
            GrainError::FileSeekFailed(io::Error::new(
                io::ErrorKind::InvalidInput,
                "negative page offset",
            ))
        })?;
        self.device.seek_to(offset)
    }

    /// Read page `page_id` into a fresh buffer.
    pub fn read_page(&mut self, page_id: i32) -> Result<HeapPage> {
        if page_id < 0 || page_id >= self.header.num_pages {
            return Err(GrainError::InvalidPageId(page_id));
        }

        self.seek_to_page(page_id)?;
        let mut buffer = [0u8; PAGE_SIZE];
        self.device.read_exact(&mut buffer)?;
        Ok(HeapPage::from_bytes(&buffer))
    }

    /// Write a page back to the offset derived from its own `page_id`.
    ///
    /// The id is not checked against `num_pages`; callers must not hand in a
    /// forged page buffer.
    pub fn write_page(&mut self, page: &HeapPage) -> Result<()> {
        self.seek_to_page(page.header().page_id)?;
        self.device.write_all(page.as_bytes())?;
        self.device.flush()
    }

    /// Allocate a fresh page at the page-id high-water mark and link it onto
    /// the free-page list.
    pub fn alloc_page(&mut self) -> Result<i32> {
        let new_page_id = self.header.next_page_idx;
        self.header.next_page_idx += 1;

        let mut page = HeapPage::new(new_page_id);
        page.header_mut().next_free_page = self.header.first_free_page;
        self.header.first_free_page = new_page_id;

        self.write_page(&page)?;
        self.header.num_pages += 1;
        self.write_file_header()?;

        debug!("allocated page {new_page_id}");
        Ok(new_page_id)
    }

    /// Insert a record into the first page with room, allocating a new page
    /// when the free-page list is empty. Returns the record's address.
    pub fn insert(&mut self, record: &Record) -> Result<RecordId> {
        let page_id = if self.header.first_free_page != -1 {
            self.header.first_free_page
        } else {
            self.alloc_page()?
        };
        let mut page = self.read_page(page_id)?;

        // The picked page has room, so this cannot report the page as full.
        let slot_idx = page.insert_record(record)?;

        if !page.has_free_space() {
            trace!("page {page_id} is full, unlinking from free-page list");
            self.header.first_free_page = page.header().next_free_page;
            page.header_mut().next_free_page = -1;
            self.write_file_header()?;
        }

        self.write_page(&page)?;
        Ok(RecordId { page_id, slot_idx })
    }

    /// Advance the cursor to the next live record after `rid` and return it,
    /// or `Ok(None)` once every page is exhausted.
    ///
    /// Seed a fresh scan with [`RecordId::scan_start`]; the cursor resumes at
    /// `(rid.page_id, rid.slot_idx + 1)` and is updated in place on a hit.
    pub fn scan_next(&mut self, rid: &mut RecordId) -> Result<Option<Record>> {
        let mut curr_page = rid.page_id;
        let mut next_slot = rid.slot_idx + 1;

        while curr_page < self.header.num_pages {
            let page = self.read_page(curr_page)?;

            while next_slot < page.header().next_slot_idx {
                if let Some(record) = page.get_record(next_slot) {
                    rid.page_id = curr_page;
                    rid.slot_idx = next_slot;
                    return Ok(Some(record));
                }
                next_slot += 1;
            }

            curr_page += 1;
            next_slot = 0;
        }

        Ok(None)
    }

    /// Iterate over every live record in the file in `(page_id, slot_idx)`
    /// order.
    pub fn scan(&mut self) -> Scan<'_, D> {
        Scan {
            file: self,
            rid: RecordId::scan_start(),
            done: false,
        }
    }

    /// Replace the mutable fields of the record at `rid`; its `id` field is
    /// preserved.
    pub fn update(&mut self, rid: RecordId, record: &Record) -> Result<()> {
        let mut page = self.read_page(rid.page_id)?;
        page.update_record(rid.slot_idx, record)?;
        self.write_page(&page)
    }

    /// Delete the record at `rid`. A page that was full regains room and is
    /// linked back onto the free-page list.
    pub fn delete(&mut self, rid: RecordId) -> Result<()> {
        let mut page = self.read_page(rid.page_id)?;
        let was_full = !page.has_free_space();

        page.delete_record(rid.slot_idx)?;

        if was_full {
            trace!("page {} regained space, linking onto free-page list", rid.page_id);
            page.header_mut().next_free_page = self.header.first_free_page;
            self.header.first_free_page = rid.page_id;
            self.write_file_header()?;
        }

        self.write_page(&page)
    }
}

/// Cursor-owning iterator returned by [`HeapFile::scan`].
pub struct Scan<'a, D: StorageDevice> {
    file: &'a mut HeapFile<D>,
    rid: RecordId,
    done: bool,
}

impl<D: StorageDevice> Iterator for Scan<'_, D> {
    type Item = Result<(RecordId, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.file.scan_next(&mut self.rid) {
            Ok(Some(record)) => Some(Ok((self.rid, record))),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
