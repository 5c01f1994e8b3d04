use crate::record::{Record, RECORD_SIZE};
use crate::{GrainError, Result};

pub const PAGE_SIZE: usize = 8192;

/// Sentinel terminating the intrusive free-slot list.
pub const FREE_SLOT_END: i32 = -1;

// The FreeSlot overlay stores its link in the first bytes of a deleted slot.
const _: () = assert!(RECORD_SIZE >= 4);

#[repr(C)] // Ensure consistent memory layout
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub page_id: i32,         // 4 bytes - this page's index in the file
    pub num_slots: i32,       // 4 bytes - live (non-deleted) records
    pub next_slot_idx: i32,   // 4 bytes - high-water mark, never decreases
    pub first_free_slot: i32, // 4 bytes - head of the free-slot list
    pub next_free_page: i32,  // 4 bytes - file-level free-page list link
}

/// Maximum number of record slots a page body can hold.
pub const MAX_SLOTS: usize = (PAGE_SIZE - std::mem::size_of::<PageHeader>()) / RECORD_SIZE;

/// A slotted page for fixed-length records.
///
/// The page is pure data: it owns one `PAGE_SIZE` buffer, does no I/O, and
/// keeps deleted slots on an intrusive free-slot list threaded through the
/// slot bytes themselves. `next_free_page` in the header is owned by the
/// file layer; the page only initializes it.
#[repr(C, align(8))]
pub struct HeapPage {
    data: [u8; PAGE_SIZE], // The actual 8KB block
}

impl HeapPage {
    const HEADER_SIZE: usize = std::mem::size_of::<PageHeader>();

    pub fn new(page_id: i32) -> Self {
        let mut page = Self {
            data: [0; PAGE_SIZE],
        };

        *page.header_mut() = PageHeader {
            page_id,
            num_slots: 0,
            next_slot_idx: 0,
            first_free_slot: FREE_SLOT_END,
            next_free_page: -1,
        };
        page
    }

    pub fn from_bytes(bytes: &[u8; PAGE_SIZE]) -> Self {
        Self { data: *bytes }
    }

    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn header(&self) -> &PageHeader {
        unsafe {
            // SAFETY:
            // - `self.data` is a [u8; PAGE_SIZE] array and PageHeader
            //   (five i32 fields, #[repr(C)], 20 bytes) fits in it
            // - HeapPage is #[repr(C, align(8))], so `self.data` starts at
            //   the struct address and satisfies PageHeader's 4-byte alignment
            // - every bit pattern is a valid PageHeader (all-integer POD)
            // - the returned reference borrows &self, preventing aliasing
            &*(self.data.as_ptr() as *const PageHeader)
        }
    }

    pub fn header_mut(&mut self) -> &mut PageHeader {
        unsafe {
            // SAFETY:
            // - same layout and alignment argument as `header`
            // - exclusive access through &mut self, so no aliasing
            &mut *(self.data.as_mut_ptr() as *mut PageHeader)
        }
    }

    fn slot_in_range(&self, slot_idx: i32) -> bool {
        slot_idx >= 0 && slot_idx < self.header().next_slot_idx
    }

    fn slot_offset(slot_idx: i32) -> usize {
        Self::HEADER_SIZE + slot_idx as usize * RECORD_SIZE
    }

    fn invalid_slot(&self, slot_idx: i32) -> GrainError {
        GrainError::InvalidSlot {
            page_id: self.header().page_id,
            slot_idx,
        }
    }

    /// The raw bytes of slot `slot_idx`, or `None` if the index is outside
    /// `[0, next_slot_idx)`.
    ///
    /// Deleted slots are still in range here: this is the primitive used to
    /// walk the free-slot list. Use [`HeapPage::get_record`] to read live
    /// records only.
    pub fn get_slot(&self, slot_idx: i32) -> Option<&[u8]> {
        if !self.slot_in_range(slot_idx) {
            return None;
        }
        let offset = Self::slot_offset(slot_idx);
        Some(&self.data[offset..offset + RECORD_SIZE])
    }

    // FreeSlot overlay: a deleted slot carries the index of the next free
    // slot in its first 4 bytes; the remaining bytes are unspecified.
    fn free_slot_link(&self, slot_idx: i32) -> Option<i32> {
        let slot = self.get_slot(slot_idx)?;
        Some(i32::from_le_bytes(slot[..4].try_into().unwrap()))
    }

    fn set_free_slot_link(&mut self, slot_idx: i32, next_free_slot: i32) {
        let offset = Self::slot_offset(slot_idx);
        self.data[offset..offset + 4].copy_from_slice(&next_free_slot.to_le_bytes());
    }

    pub fn has_free_space(&self) -> bool {
        self.header().first_free_slot != FREE_SLOT_END
            || self.header().next_slot_idx < MAX_SLOTS as i32
    }

    /// O(n) walk of the free-slot list. Out-of-range indices are never on
    /// the list, so they report `false`.
    pub fn is_in_free_list(&self, slot_idx: i32) -> bool {
        let mut curr = self.header().first_free_slot;
        while curr != FREE_SLOT_END {
            if curr == slot_idx {
                return true;
            }
            match self.free_slot_link(curr) {
                Some(next) => curr = next,
                None => return false,
            }
        }
        false
    }

    /// Insert a record, preferring a recycled slot from the free-slot list
    /// over extending the high-water mark.
    pub fn insert_record(&mut self, record: &Record) -> Result<i32> {
        if self.header().first_free_slot == FREE_SLOT_END
            && self.header().next_slot_idx >= MAX_SLOTS as i32
        {
            return Err(GrainError::PageFull(self.header().page_id));
        }

        let slot_idx = if self.header().first_free_slot != FREE_SLOT_END {
            let idx = self.header().first_free_slot;
            let next = self.free_slot_link(idx).ok_or_else(|| self.invalid_slot(idx))?;
            self.header_mut().first_free_slot = next;
            idx
        } else {
            let idx = self.header().next_slot_idx;
            self.header_mut().next_slot_idx += 1;
            idx
        };

        let offset = Self::slot_offset(slot_idx);
        record.write_to(&mut self.data[offset..offset + RECORD_SIZE]);
        self.header_mut().num_slots += 1;
        Ok(slot_idx)
    }

    /// Delete the record at `slot_idx`, pushing the slot onto the free-slot
    /// list. The high-water mark never decreases.
    pub fn delete_record(&mut self, slot_idx: i32) -> Result<()> {
        if !self.slot_in_range(slot_idx) || self.is_in_free_list(slot_idx) {
            return Err(self.invalid_slot(slot_idx));
        }

        let head = self.header().first_free_slot;
        self.set_free_slot_link(slot_idx, head);
        self.header_mut().first_free_slot = slot_idx;
        self.header_mut().num_slots -= 1;
        Ok(())
    }

    /// Replace the mutable fields (`name`, `email`, `age`) of the record at
    /// `slot_idx`. `id` is the record's identity and is never changed.
    pub fn update_record(&mut self, slot_idx: i32, new_record: &Record) -> Result<()> {
        if !self.slot_in_range(slot_idx) {
            return Err(self.invalid_slot(slot_idx));
        }

        let mut record = self
            .get_record(slot_idx)
            .ok_or_else(|| self.invalid_slot(slot_idx))?;
        record.name = new_record.name;
        record.email = new_record.email;
        record.age = new_record.age;

        let offset = Self::slot_offset(slot_idx);
        record.write_to(&mut self.data[offset..offset + RECORD_SIZE]);
        Ok(())
    }

    /// The record at `slot_idx`, or `None` if the index is out of range or
    /// the slot has been deleted.
    pub fn get_record(&self, slot_idx: i32) -> Option<Record> {
        if !self.slot_in_range(slot_idx) || self.is_in_free_list(slot_idx) {
            return None;
        }
        self.get_slot(slot_idx).map(Record::from_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_record(id: i32) -> Record {
        Record::new(id, &format!("User{id}"), 20 + id, &format!("user{id}@test.com"))
    }

    fn free_list_slots(page: &HeapPage) -> Vec<i32> {
        let mut slots = Vec::new();
        let mut curr = page.header().first_free_slot;
        while curr != FREE_SLOT_END {
            slots.push(curr);
            curr = page.free_slot_link(curr).unwrap();
        }
        slots
    }

    #[test]
    fn test_header_size() {
        assert_eq!(HeapPage::HEADER_SIZE, 20);
        assert_eq!(std::mem::size_of::<PageHeader>(), 20);
    }

    #[test]
    fn test_max_slots() {
        assert_eq!(MAX_SLOTS, (PAGE_SIZE - 20) / RECORD_SIZE);
        assert_eq!(MAX_SLOTS, 127);
    }

    #[test]
    fn test_page_initialization() {
        let page = HeapPage::new(42);
        let header = page.header();

        assert_eq!(header.page_id, 42);
        assert_eq!(header.num_slots, 0);
        assert_eq!(header.next_slot_idx, 0);
        assert_eq!(header.first_free_slot, FREE_SLOT_END);
        assert_eq!(header.next_free_page, -1);
    }

    #[test]
    fn test_insert_records() {
        let mut page = HeapPage::new(0);

        let rec = Record::new(1, "Alice", 25, "alice@test.com");
        let slot = page.insert_record(&rec).unwrap();
        assert_eq!(slot, 0);

        let retrieved = page.get_record(slot).unwrap();
        assert_eq!(retrieved.id, 1);
        assert_eq!(retrieved.age, 25);
        assert_eq!(retrieved.name(), "Alice");
        assert_eq!(retrieved.email(), "alice@test.com");
        assert_eq!(page.header().num_slots, 1);

        for i in 1..5 {
            let slot = page.insert_record(&sample_record(i)).unwrap();
            assert_eq!(slot, i);
        }
        assert_eq!(page.header().num_slots, 5);
    }

    #[test]
    fn test_insert_page_full() {
        let mut page = HeapPage::new(0);

        for i in 0..MAX_SLOTS as i32 {
            let slot = page.insert_record(&sample_record(i)).unwrap();
            assert_eq!(slot, i);
        }
        assert_eq!(page.header().num_slots, MAX_SLOTS as i32);

        let err = page.insert_record(&sample_record(999)).unwrap_err();
        assert!(matches!(err, GrainError::PageFull(0)));
    }

    #[test]
    fn test_delete_records() {
        let mut page = HeapPage::new(5);

        for i in 0..5 {
            page.insert_record(&sample_record(i)).unwrap();
        }

        page.delete_record(2).unwrap();
        assert_eq!(page.header().num_slots, 4);
        assert!(page.get_record(2).is_none());

        page.delete_record(4).unwrap();
        assert_eq!(page.header().num_slots, 3);

        page.delete_record(0).unwrap();
        assert_eq!(page.header().num_slots, 2);

        // High-water mark is untouched by deletes
        assert_eq!(page.header().next_slot_idx, 5);
    }

    #[test]
    fn test_delete_invalid_slot() {
        let mut page = HeapPage::new(2);

        assert!(matches!(
            page.delete_record(5),
            Err(GrainError::InvalidSlot { page_id: 2, slot_idx: 5 })
        ));
        assert!(page.delete_record(-1).is_err());
        assert!(page.delete_record(100).is_err());
    }

    #[test]
    fn test_double_delete() {
        let mut page = HeapPage::new(11);
        page.insert_record(&Record::new(1, "Alice", 25, "alice@test.com"))
            .unwrap();

        page.delete_record(0).unwrap();
        assert!(matches!(
            page.delete_record(0),
            Err(GrainError::InvalidSlot { page_id: 11, slot_idx: 0 })
        ));
    }

    #[test]
    fn test_update_record() {
        let mut page = HeapPage::new(3);
        page.insert_record(&Record::new(1, "Alice", 25, "alice@test.com"))
            .unwrap();

        let new_rec = Record::new(2, "Bob", 30, "bob@test.com");
        page.update_record(0, &new_rec).unwrap();

        let updated = page.get_record(0).unwrap();
        assert_eq!(updated.age, 30);
        assert_eq!(updated.name(), "Bob");
        assert_eq!(updated.email(), "bob@test.com");
    }

    #[test]
    fn test_update_preserves_id() {
        let mut page = HeapPage::new(0);
        page.insert_record(&Record::new(7, "Alice", 25, "alice@test.com"))
            .unwrap();

        page.update_record(0, &Record::new(99, "Bob", 30, "bob@test.com"))
            .unwrap();

        assert_eq!(page.get_record(0).unwrap().id, 7);
    }

    #[test]
    fn test_update_invalid_slot() {
        let mut page = HeapPage::new(0);
        let rec = Record::new(1, "Test", 25, "test@test.com");
        page.insert_record(&rec).unwrap();

        assert!(page.update_record(5, &rec).is_err());
        assert!(page.update_record(-1, &rec).is_err());

        // Freed slots cannot be updated
        page.delete_record(0).unwrap();
        assert!(matches!(
            page.update_record(0, &rec),
            Err(GrainError::InvalidSlot { page_id: 0, slot_idx: 0 })
        ));
    }

    #[test]
    fn test_free_list_linked_list() {
        let mut page = HeapPage::new(0);

        for i in 0..5 {
            page.insert_record(&sample_record(i)).unwrap();
        }

        page.delete_record(2).unwrap();
        assert_eq!(page.header().first_free_slot, 2);
        assert_eq!(page.free_slot_link(2).unwrap(), FREE_SLOT_END);

        page.delete_record(4).unwrap();
        assert_eq!(page.header().first_free_slot, 4);
        assert_eq!(page.free_slot_link(4).unwrap(), 2);

        page.delete_record(0).unwrap();
        assert_eq!(page.header().first_free_slot, 0);
        assert_eq!(page.free_slot_link(0).unwrap(), 4);

        assert!(page.is_in_free_list(0));
        assert!(page.is_in_free_list(2));
        assert!(page.is_in_free_list(4));
        assert!(!page.is_in_free_list(1));
        assert!(!page.is_in_free_list(3));
        assert_eq!(page.header().num_slots, 2);

        // LIFO recycling pops the most recently freed slot first
        let slot = page.insert_record(&sample_record(100)).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(page.header().first_free_slot, 4);
        assert!(!page.is_in_free_list(0));
        assert_eq!(page.header().num_slots, 3);

        let slot = page.insert_record(&sample_record(101)).unwrap();
        assert_eq!(slot, 4);
        assert_eq!(page.header().first_free_slot, 2);
        assert_eq!(page.header().num_slots, 4);

        let slot = page.insert_record(&sample_record(102)).unwrap();
        assert_eq!(slot, 2);
        assert_eq!(page.header().first_free_slot, FREE_SLOT_END);
        assert_eq!(page.header().num_slots, 5);
    }

    #[test]
    fn test_get_record_missing() {
        let mut page = HeapPage::new(0);
        page.insert_record(&Record::new(1, "Alice", 25, "alice@test.com"))
            .unwrap();
        page.delete_record(0).unwrap();

        assert!(page.get_record(0).is_none());
        assert!(page.get_record(5).is_none());
        assert!(page.get_record(-1).is_none());
    }

    #[test]
    fn test_get_slot_allows_freed_slots() {
        let mut page = HeapPage::new(0);
        page.insert_record(&sample_record(0)).unwrap();
        page.delete_record(0).unwrap();

        // get_slot is the free-list walking primitive; freed slots stay in range
        assert!(page.get_slot(0).is_some());
        assert!(page.get_slot(1).is_none());
        assert!(page.get_slot(-1).is_none());
    }

    #[test]
    fn test_has_free_space() {
        let mut page = HeapPage::new(0);
        assert!(page.has_free_space());

        for i in 0..MAX_SLOTS as i32 {
            page.insert_record(&sample_record(i)).unwrap();
        }
        assert!(!page.has_free_space());

        page.delete_record(0).unwrap();
        assert!(page.has_free_space());
    }

    #[test]
    fn test_page_round_trip_bytes() {
        let mut page = HeapPage::new(9);
        for i in 0..8 {
            page.insert_record(&sample_record(i)).unwrap();
        }
        page.delete_record(3).unwrap();

        let copy = HeapPage::from_bytes(page.as_bytes());
        assert_eq!(copy.as_bytes(), page.as_bytes());
        assert_eq!(copy.header().first_free_slot, 3);
        assert_eq!(copy.get_record(4).unwrap().id, 4);
    }

    #[test]
    fn test_page_alignment() {
        assert_eq!(std::mem::align_of::<HeapPage>(), 8);
        assert_eq!(std::mem::size_of::<HeapPage>(), PAGE_SIZE);
    }

    proptest! {
        /// Slot accounting holds after any insert/delete sequence:
        /// num_slots = next_slot_idx - |free-slot list|, the list has no
        /// duplicates, and every entry is below the high-water mark.
        #[test]
        fn prop_page_accounting(ops in prop::collection::vec(
            (any::<bool>(), 0..MAX_SLOTS as i32),
            0..300,
        )) {
            let mut page = HeapPage::new(0);

            for (is_insert, slot_idx) in ops {
                if is_insert {
                    let _ = page.insert_record(&sample_record(slot_idx));
                } else {
                    let _ = page.delete_record(slot_idx);
                }

                let free = free_list_slots(&page);
                let header = page.header();

                prop_assert_eq!(header.num_slots, header.next_slot_idx - free.len() as i32);
                prop_assert!(header.next_slot_idx <= MAX_SLOTS as i32);
                prop_assert!(free.iter().all(|&s| s >= 0 && s < header.next_slot_idx));

                let mut dedup = free.clone();
                dedup.sort_unstable();
                dedup.dedup();
                prop_assert_eq!(dedup.len(), free.len());
            }
        }
    }
}
