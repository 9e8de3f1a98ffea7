use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId};
use crate::storage::PAGE_SIZE;
use crate::transaction::TransactionId;
use byteorder::{ByteOrder, LittleEndian};

// Header structure (8 bytes)
const HEADER_SIZE: usize = 8;
const TUPLE_COUNT_OFFSET: usize = 0;
const FREE_SPACE_POINTER_OFFSET: usize = 2;

// Slot size (4 bytes: 2 for offset, 2 for length), growing down from the page end
const SLOT_SIZE: usize = 4;

/// Largest tuple that fits on an empty page.
pub const MAX_TUPLE_SIZE: usize = PAGE_SIZE - HEADER_SIZE - SLOT_SIZE;

/// Slotted page of variable-length tuples.
///
/// Tuple bytes grow up from the header and the slot array grows down from
/// the end of the page. A deleted slot is zeroed and never reused.
#[derive(Debug, Clone)]
pub struct HeapPage {
    id: PageId,
    data: Box<[u8; PAGE_SIZE]>,
    dirtier: Option<TransactionId>,
    before: Box<[u8; PAGE_SIZE]>,
}

impl HeapPage {
    pub fn empty(id: PageId) -> Self {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        LittleEndian::write_u16(
            &mut data[FREE_SPACE_POINTER_OFFSET..],
            HEADER_SIZE as u16,
        );
        Self {
            id,
            before: data.clone(),
            data,
            dirtier: None,
        }
    }

    /// Rebuilds a page from its on-disk bytes. An all-zero buffer is a valid empty page.
    pub fn from_bytes(id: PageId, bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() != PAGE_SIZE {
            return Err(StorageError::Corrupt(format!(
                "page {} has {} bytes, expected {}",
                id,
                bytes.len(),
                PAGE_SIZE
            )));
        }

        let mut data = Box::new([0u8; PAGE_SIZE]);
        data.copy_from_slice(bytes);

        let tuple_count = LittleEndian::read_u16(&data[TUPLE_COUNT_OFFSET..]) as usize;
        let mut free_space_pointer =
            LittleEndian::read_u16(&data[FREE_SPACE_POINTER_OFFSET..]) as usize;
        if free_space_pointer == 0 && tuple_count == 0 {
            free_space_pointer = HEADER_SIZE;
            LittleEndian::write_u16(
                &mut data[FREE_SPACE_POINTER_OFFSET..],
                free_space_pointer as u16,
            );
        }

        if free_space_pointer < HEADER_SIZE
            || free_space_pointer + tuple_count * SLOT_SIZE > PAGE_SIZE
        {
            return Err(StorageError::Corrupt(format!(
                "page {}: {} slots with free space pointer {}",
                id, tuple_count, free_space_pointer
            )));
        }

        Ok(Self {
            id,
            before: data.clone(),
            data,
            dirtier: None,
        })
    }

    pub fn insert_tuple(&mut self, tuple_data: &[u8]) -> StorageResult<u16> {
        let required = tuple_data.len() + SLOT_SIZE;
        let available = self.free_space();
        if required > available {
            return Err(StorageError::PageFull {
                required,
                available,
            });
        }

        let slot_id = self.slot_count();
        let tuple_offset = self.free_space_pointer();
        let tuple_end = tuple_offset + tuple_data.len();
        self.data[tuple_offset..tuple_end].copy_from_slice(tuple_data);
        self.set_free_space_pointer(tuple_end);

        let slot_offset = Self::slot_offset(slot_id);
        LittleEndian::write_u16(&mut self.data[slot_offset..], tuple_offset as u16);
        LittleEndian::write_u16(&mut self.data[slot_offset + 2..], tuple_data.len() as u16);
        self.set_slot_count(slot_id + 1);

        Ok(slot_id)
    }

    pub fn tuple(&self, slot_id: u16) -> StorageResult<&[u8]> {
        let (offset, length) = self.slot(slot_id)?;
        if offset == 0 {
            return Err(StorageError::TupleNotFound {
                page: self.id,
                slot_id,
            });
        }
        if offset + length > PAGE_SIZE {
            return Err(StorageError::Corrupt(format!(
                "page {} slot {} points past the page end",
                self.id, slot_id
            )));
        }
        Ok(&self.data[offset..offset + length])
    }

    pub fn delete_tuple(&mut self, slot_id: u16) -> StorageResult<()> {
        let (offset, _) = self.slot(slot_id)?;
        if offset == 0 {
            return Err(StorageError::TupleNotFound {
                page: self.id,
                slot_id,
            });
        }

        let slot_offset = Self::slot_offset(slot_id);
        self.data[slot_offset..slot_offset + SLOT_SIZE].fill(0);
        Ok(())
    }

    /// Live tuples in slot order.
    pub fn tuples(&self) -> impl Iterator<Item = (u16, &[u8])> + '_ {
        (0..self.slot_count()).filter_map(move |slot_id| {
            self.tuple(slot_id).ok().map(|data| (slot_id, data))
        })
    }

    /// Number of slots ever allocated, deleted ones included.
    pub fn slot_count(&self) -> u16 {
        LittleEndian::read_u16(&self.data[TUPLE_COUNT_OFFSET..])
    }

    pub fn free_space(&self) -> usize {
        let slot_array_start = PAGE_SIZE - self.slot_count() as usize * SLOT_SIZE;
        slot_array_start.saturating_sub(self.free_space_pointer())
    }

    pub fn has_room_for(&self, tuple_len: usize) -> bool {
        self.free_space() >= tuple_len + SLOT_SIZE
    }

    fn slot(&self, slot_id: u16) -> StorageResult<(usize, usize)> {
        let slot_count = self.slot_count();
        if slot_id >= slot_count {
            return Err(StorageError::InvalidSlotId {
                slot_id,
                max_slot: slot_count.saturating_sub(1),
            });
        }
        let slot_offset = Self::slot_offset(slot_id);
        let offset = LittleEndian::read_u16(&self.data[slot_offset..]) as usize;
        let length = LittleEndian::read_u16(&self.data[slot_offset + 2..]) as usize;
        Ok((offset, length))
    }

    fn slot_offset(slot_id: u16) -> usize {
        PAGE_SIZE - (slot_id as usize + 1) * SLOT_SIZE
    }

    fn free_space_pointer(&self) -> usize {
        LittleEndian::read_u16(&self.data[FREE_SPACE_POINTER_OFFSET..]) as usize
    }

    fn set_free_space_pointer(&mut self, pointer: usize) {
        LittleEndian::write_u16(&mut self.data[FREE_SPACE_POINTER_OFFSET..], pointer as u16);
    }

    fn set_slot_count(&mut self, count: u16) {
        LittleEndian::write_u16(&mut self.data[TUPLE_COUNT_OFFSET..], count);
    }
}

impl Page for HeapPage {
    fn id(&self) -> PageId {
        self.id
    }

    fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    fn mark_dirty(&mut self, dirty: bool, txn: TransactionId) {
        self.dirtier = if dirty { Some(txn) } else { None };
    }

    fn before_image(&self) -> Self {
        Self {
            id: self.id,
            data: self.before.clone(),
            dirtier: None,
            before: self.before.clone(),
        }
    }

    fn set_before_image(&mut self) {
        self.before.copy_from_slice(&self.data[..]);
    }

    fn page_data(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::TableId;
    use anyhow::Result;

    fn page_id(page_no: u32) -> PageId {
        PageId::new(TableId(1), page_no)
    }

    #[test]
    fn test_empty_page() {
        let page = HeapPage::empty(page_id(0));

        assert_eq!(page.id(), page_id(0));
        assert_eq!(page.slot_count(), 0);
        assert_eq!(page.free_space(), PAGE_SIZE - HEADER_SIZE);
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_insert_and_get_tuple() -> Result<()> {
        let mut page = HeapPage::empty(page_id(1));

        let slot1 = page.insert_tuple(b"Hello, World!")?;
        let slot2 = page.insert_tuple(b"Second tuple")?;
        assert_eq!((slot1, slot2), (0, 1));

        assert_eq!(page.tuple(slot1)?, b"Hello, World!");
        assert_eq!(page.tuple(slot2)?, b"Second tuple");
        assert_eq!(page.tuples().count(), 2);

        Ok(())
    }

    #[test]
    fn test_delete_tuple() -> Result<()> {
        let mut page = HeapPage::empty(page_id(1));
        let keep = page.insert_tuple(b"keep")?;
        let gone = page.insert_tuple(b"gone")?;

        page.delete_tuple(gone)?;

        assert!(matches!(
            page.tuple(gone),
            Err(StorageError::TupleNotFound { slot_id: 1, .. })
        ));
        assert!(page.delete_tuple(gone).is_err());
        let live: Vec<_> = page.tuples().collect();
        assert_eq!(live, vec![(keep, &b"keep"[..])]);

        Ok(())
    }

    #[test]
    fn test_page_full() -> Result<()> {
        let mut page = HeapPage::empty(page_id(1));
        let large_tuple = vec![0xAA; 1000];

        let mut count = 0;
        while page.has_room_for(large_tuple.len()) {
            page.insert_tuple(&large_tuple)?;
            count += 1;
        }

        assert_eq!(count, 4);
        assert!(matches!(
            page.insert_tuple(&large_tuple),
            Err(StorageError::PageFull { required: 1004, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_slot_id() {
        let page = HeapPage::empty(page_id(1));
        assert!(matches!(
            page.tuple(0),
            Err(StorageError::InvalidSlotId { slot_id: 0, .. })
        ));
    }

    #[test]
    fn test_bytes_round_trip_and_zero_page() -> Result<()> {
        let mut page = HeapPage::empty(page_id(9));
        page.insert_tuple(b"Persistent data")?;

        let restored = HeapPage::from_bytes(page_id(9), &page.page_data())?;
        assert_eq!(restored.tuple(0)?, b"Persistent data");

        let zeroed = HeapPage::from_bytes(page_id(10), &[0u8; PAGE_SIZE])?;
        assert_eq!(zeroed.slot_count(), 0);
        assert_eq!(zeroed.free_space(), PAGE_SIZE - HEADER_SIZE);

        assert!(matches!(
            HeapPage::from_bytes(page_id(11), &[0u8; 12]),
            Err(StorageError::Corrupt(_))
        ));
        Ok(())
    }

    #[test]
    fn test_corrupt_header() {
        let mut bytes = vec![0u8; PAGE_SIZE];
        LittleEndian::write_u16(&mut bytes[TUPLE_COUNT_OFFSET..], 2000);
        LittleEndian::write_u16(&mut bytes[FREE_SPACE_POINTER_OFFSET..], 100);

        assert!(matches!(
            HeapPage::from_bytes(page_id(1), &bytes),
            Err(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn test_before_image_tracks_baseline() -> Result<()> {
        let txn = TransactionId(5);
        let mut page = HeapPage::empty(page_id(2));
        page.insert_tuple(b"committed")?;
        page.set_before_image();

        page.insert_tuple(b"uncommitted")?;
        page.mark_dirty(true, txn);
        assert_eq!(page.dirtier(), Some(txn));

        let before = page.before_image();
        assert!(!before.is_dirty());
        assert_eq!(before.tuples().count(), 1);
        assert_eq!(before.tuple(0)?, b"committed");

        page.mark_dirty(false, txn);
        assert_eq!(page.dirtier(), None);
        Ok(())
    }
}
