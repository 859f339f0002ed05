use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::common::{PageId, RecordId, Result, SlotId, StrataError};
use crate::transaction::TransactionId;
use crate::tuple::{Schema, Tuple};

/// A slotted heap page holding fixed-width tuples of a single schema.
///
/// ## Page Layout
///
/// ```text
/// +----------------+--------+--------+-----+--------+---------+
/// | slot bitmap    | slot 0 | slot 1 | ... | slot N | padding |
/// +----------------+--------+--------+-----+--------+---------+
///  ceil(N/8) bytes   tuple_size bytes each            zeros
/// ```
///
/// Bit `i % 8` of header byte `i / 8` is set when slot `i` is occupied.
/// Empty slots are stored as zeros and the trailing padding fills the page
/// out to exactly `page_size` bytes. The slot count is the largest `N`
/// with `N * (tuple_size * 8 + 1) <= page_size * 8`, capped at
/// [`MAX_SLOTS_PER_PAGE`]; the extra space on such huge pages is padding.
///
/// Besides its tuples a page remembers which transaction dirtied it and a
/// before-image: the encoded bytes as of load time or the last flush.
#[derive(Debug, Clone)]
pub struct HeapPage {
    page_id: PageId,
    schema: Arc<Schema>,
    page_size: usize,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirty: Option<TransactionId>,
    before_image: Bytes,
}

/// Slot ids are 16 bits wide, which bounds the slots of any page.
pub const MAX_SLOTS_PER_PAGE: usize = u16::MAX as usize + 1;

/// Number of tuple slots on a page of `page_size` bytes.
pub fn slots_per_page(page_size: usize, tuple_size: usize) -> usize {
    ((page_size * 8) / (tuple_size * 8 + 1)).min(MAX_SLOTS_PER_PAGE)
}

fn slot_id(slot: usize) -> SlotId {
    debug_assert!(slot < MAX_SLOTS_PER_PAGE);
    SlotId::new(slot as u16)
}

/// Number of bitmap bytes for a page of `page_size` bytes.
pub fn header_size(page_size: usize, tuple_size: usize) -> usize {
    slots_per_page(page_size, tuple_size).div_ceil(8)
}

impl HeapPage {
    /// Decodes a page from its on-disk image. The decoded bytes become the
    /// page's before-image.
    pub fn decode(
        page_id: PageId,
        schema: Arc<Schema>,
        data: &[u8],
        page_size: usize,
    ) -> Result<Self> {
        if data.len() != page_size {
            return Err(StrataError::CorruptPage {
                page_id,
                reason: format!("expected {} bytes, got {}", page_size, data.len()),
            });
        }

        let tuple_size = schema.tuple_size();
        let num_slots = slots_per_page(page_size, tuple_size);
        let header_len = header_size(page_size, tuple_size);
        let header = data[..header_len].to_vec();

        let mut tuples = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if !bit_is_set(&header, slot) {
                tuples.push(None);
                continue;
            }
            let offset = header_len + slot * tuple_size;
            let mut raw = &data[offset..offset + tuple_size];
            let mut tuple = Tuple::decode(schema.clone(), &mut raw).ok_or_else(|| {
                StrataError::CorruptPage {
                    page_id,
                    reason: format!("undecodable tuple in slot {}", slot),
                }
            })?;
            tuple.set_record_id(Some(RecordId::new(page_id, slot_id(slot))));
            tuples.push(Some(tuple));
        }

        Ok(Self {
            page_id,
            schema,
            page_size,
            header,
            tuples,
            dirty: None,
            before_image: Bytes::copy_from_slice(data),
        })
    }

    /// Bytes of a freshly allocated, empty page.
    pub fn empty_page_data(page_size: usize) -> Bytes {
        Bytes::from(vec![0u8; page_size])
    }

    /// Encodes the page to exactly `page_size` bytes.
    pub fn page_data(&self) -> Bytes {
        let tuple_size = self.schema.tuple_size();
        let mut buf = BytesMut::with_capacity(self.page_size);
        buf.put_slice(&self.header);

        for slot in &self.tuples {
            let start = buf.len();
            match slot {
                // Stored tuples were checked to conform on insert or decode.
                Some(tuple) if tuple.encode(&mut buf).is_some() => {}
                _ => {
                    buf.truncate(start);
                    buf.put_bytes(0, tuple_size);
                }
            }
        }

        buf.put_bytes(0, self.page_size - buf.len());
        buf.freeze()
    }

    pub fn id(&self) -> PageId {
        self.page_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Total number of slots on this page.
    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        self.tuples.iter().filter(|t| t.is_none()).count()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.tuples.len() && bit_is_set(&self.header, slot)
    }

    /// Returns the tuple stored in `slot_id`, if any.
    pub fn tuple_at(&self, slot_id: SlotId) -> Option<&Tuple> {
        self.tuples.get(slot_id.as_usize()).and_then(Option::as_ref)
    }

    /// Iterates over the stored tuples in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.tuples.iter().flatten()
    }

    /// Stores `tuple` in the lowest free slot and returns its new location.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> Result<RecordId> {
        if **tuple.schema() != *self.schema || !tuple.conforms() {
            return Err(StrataError::SchemaMismatch(self.page_id));
        }

        let slot = self
            .tuples
            .iter()
            .position(Option::is_none)
            .ok_or(StrataError::PageFull(self.page_id))?;

        let record_id = RecordId::new(self.page_id, slot_id(slot));
        tuple.set_record_id(Some(record_id));
        set_bit(&mut self.header, slot, true);
        self.tuples[slot] = Some(tuple);
        Ok(record_id)
    }

    /// Removes the tuple stored at `tuple`'s location.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let record_id = tuple.record_id().ok_or(StrataError::MissingRecordId)?;
        let slot = record_id.slot_id.as_usize();
        if record_id.page_id != self.page_id || slot >= self.tuples.len() {
            return Err(StrataError::TupleNotOnPage {
                record_id,
                page_id: self.page_id,
            });
        }
        if !self.is_slot_used(slot) {
            return Err(StrataError::SlotAlreadyEmpty {
                page_id: self.page_id,
                slot_id: record_id.slot_id,
            });
        }

        set_bit(&mut self.header, slot, false);
        self.tuples[slot] = None;
        Ok(())
    }

    /// Records `txn` as the transaction that dirtied this page.
    pub fn mark_dirty(&mut self, txn: TransactionId) {
        self.dirty = Some(txn);
    }

    pub fn mark_clean(&mut self) {
        self.dirty = None;
    }

    /// Returns the transaction that dirtied this page, if it is dirty.
    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirty
    }

    /// Reconstructs the page as of the last snapshot.
    pub fn before_image(&self) -> Result<HeapPage> {
        HeapPage::decode(
            self.page_id,
            self.schema.clone(),
            &self.before_image,
            self.page_size,
        )
    }

    /// Snapshots the current contents as the new before-image.
    pub fn set_before_image(&mut self) {
        self.before_image = self.page_data();
    }
}

fn bit_is_set(header: &[u8], slot: usize) -> bool {
    (header[slot / 8] >> (slot % 8)) & 1 == 1
}

fn set_bit(header: &mut [u8], slot: usize, used: bool) {
    let mask = 1u8 << (slot % 8);
    if used {
        header[slot / 8] |= mask;
    } else {
        header[slot / 8] &= !mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TableId;
    use crate::tuple::{DataType, Value};

    const PAGE: usize = 4096;

    fn schema() -> Arc<Schema> {
        Schema::builder()
            .column("id", DataType::Integer)
            .column("name", DataType::VarChar(14))
            .build_arc()
    }

    fn pid(n: u32) -> PageId {
        PageId::new(TableId::new(3), n)
    }

    fn row(schema: &Arc<Schema>, id: i32, name: &str) -> Tuple {
        Tuple::new(schema.clone(), vec![Value::Integer(id), Value::from(name)])
    }

    fn empty_page() -> HeapPage {
        HeapPage::decode(pid(0), schema(), &HeapPage::empty_page_data(PAGE), PAGE).unwrap()
    }

    #[test]
    fn test_geometry() {
        // 20-byte tuples: 32768 / 161 = 203 slots, 26 header bytes.
        assert_eq!(schema().tuple_size(), 20);
        assert_eq!(slots_per_page(PAGE, 20), 203);
        assert_eq!(header_size(PAGE, 20), 26);
        assert!(26 + 203 * 20 <= PAGE);

        assert_eq!(slots_per_page(PAGE, 8), 504);
        assert_eq!(header_size(PAGE, 8), 63);
    }

    #[test]
    fn test_empty_page() {
        let page = empty_page();
        assert_eq!(page.num_slots(), 203);
        assert_eq!(page.num_empty_slots(), 203);
        assert_eq!(page.iter().count(), 0);
        assert!(page.is_dirty().is_none());
        assert_eq!(&page.page_data()[..], &HeapPage::empty_page_data(PAGE)[..]);
    }

    #[test]
    fn test_insert_takes_lowest_free_slot() {
        let schema = schema();
        let mut page = empty_page();

        let a = page.insert_tuple(row(&schema, 1, "a")).unwrap();
        let b = page.insert_tuple(row(&schema, 2, "b")).unwrap();
        assert_eq!(a.slot_id, SlotId::new(0));
        assert_eq!(b.slot_id, SlotId::new(1));

        let stored = page.tuple_at(SlotId::new(0)).unwrap().clone();
        page.delete_tuple(&stored).unwrap();
        assert!(!page.is_slot_used(0));

        let c = page.insert_tuple(row(&schema, 3, "c")).unwrap();
        assert_eq!(c.slot_id, SlotId::new(0));
        assert_eq!(page.tuple_at(SlotId::new(0)).unwrap().record_id(), Some(c));
    }

    #[test]
    fn test_page_full() {
        let schema = schema();
        let mut page = empty_page();
        for i in 0..203 {
            page.insert_tuple(row(&schema, i, "x")).unwrap();
        }
        assert_eq!(page.num_empty_slots(), 0);
        assert!(matches!(
            page.insert_tuple(row(&schema, 999, "x")),
            Err(StrataError::PageFull(p)) if p == pid(0)
        ));
    }

    #[test]
    fn test_schema_mismatch() {
        let mut page = empty_page();
        let other = Schema::builder()
            .column("id", DataType::Integer)
            .column("label", DataType::VarChar(14))
            .build_arc();
        let tuple = Tuple::new(other, vec![Value::Integer(1), Value::from("a")]);
        assert!(matches!(
            page.insert_tuple(tuple),
            Err(StrataError::SchemaMismatch(_))
        ));

        let too_long = row(&schema(), 1, "this name is too long");
        assert!(matches!(
            page.insert_tuple(too_long),
            Err(StrataError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_delete_errors() {
        let schema = schema();
        let mut page = empty_page();

        assert!(matches!(
            page.delete_tuple(&row(&schema, 1, "a")),
            Err(StrataError::MissingRecordId)
        ));

        let mut foreign = row(&schema, 1, "a");
        foreign.set_record_id(Some(RecordId::new(pid(7), SlotId::new(0))));
        assert!(matches!(
            page.delete_tuple(&foreign),
            Err(StrataError::TupleNotOnPage { .. })
        ));

        let rid = page.insert_tuple(row(&schema, 1, "a")).unwrap();
        let stored = page.tuple_at(rid.slot_id).unwrap().clone();
        page.delete_tuple(&stored).unwrap();
        assert!(matches!(
            page.delete_tuple(&stored),
            Err(StrataError::SlotAlreadyEmpty { .. })
        ));
    }

    #[test]
    fn test_encode_decode_preserves_slots() {
        let schema = schema();
        let mut page = empty_page();
        for i in 0..10 {
            page.insert_tuple(row(&schema, i, &format!("n{}", i))).unwrap();
        }
        for slot in [2u16, 5, 9] {
            let t = page.tuple_at(SlotId::new(slot)).unwrap().clone();
            page.delete_tuple(&t).unwrap();
        }

        let data = page.page_data();
        assert_eq!(data.len(), PAGE);

        let decoded = HeapPage::decode(pid(0), schema, &data, PAGE).unwrap();
        assert_eq!(decoded.num_empty_slots(), page.num_empty_slots());
        for slot in 0..page.num_slots() {
            assert_eq!(decoded.is_slot_used(slot), page.is_slot_used(slot));
            let id = SlotId::new(slot as u16);
            assert_eq!(decoded.tuple_at(id), page.tuple_at(id));
            if let Some(t) = decoded.tuple_at(id) {
                assert_eq!(t.record_id(), Some(RecordId::new(pid(0), id)));
            }
        }
        assert_eq!(decoded.page_data(), data);
    }

    #[test]
    fn test_bitmap_is_lsb_first() {
        let schema = schema();
        let mut page = empty_page();
        for i in 0..3 {
            page.insert_tuple(row(&schema, i, "")).unwrap();
        }
        assert_eq!(page.page_data()[0], 0b0000_0111);
    }

    #[test]
    fn test_wrong_length_is_corrupt() {
        let err = HeapPage::decode(pid(0), schema(), &[0u8; 100], PAGE).unwrap_err();
        assert!(matches!(err, StrataError::CorruptPage { .. }));
    }

    #[test]
    fn test_before_image() {
        let schema = schema();
        let mut page = empty_page();
        page.insert_tuple(row(&schema, 1, "kept")).unwrap();
        page.mark_dirty(TransactionId::from_raw(4));
        assert_eq!(page.is_dirty(), Some(TransactionId::from_raw(4)));

        // Before-image still reflects the page as loaded.
        assert_eq!(page.before_image().unwrap().iter().count(), 0);

        page.set_before_image();
        page.mark_clean();
        page.insert_tuple(row(&schema, 2, "later")).unwrap();

        let before = page.before_image().unwrap();
        let names: Vec<_> = before.iter().map(|t| t.value(1).unwrap().clone()).collect();
        assert_eq!(names, vec![Value::from("kept")]);
        assert!(page.is_dirty().is_none());
    }

    #[test]
    fn test_slot_count_capped_on_huge_pages() {
        const HUGE: usize = 100_000;
        let schema = Schema::builder()
            .column("flag", DataType::Boolean)
            .build_arc();
        assert_eq!(slots_per_page(HUGE, 1), MAX_SLOTS_PER_PAGE);
        assert_eq!(header_size(HUGE, 1), MAX_SLOTS_PER_PAGE / 8);

        // Every slot occupied, so the last one must keep its own id.
        let mut data = vec![0u8; HUGE];
        let header_len = header_size(HUGE, 1);
        data[..header_len].fill(0xFF);
        data[header_len..header_len + MAX_SLOTS_PER_PAGE].fill(1);

        let page = HeapPage::decode(pid(0), schema, &data, HUGE).unwrap();
        assert_eq!(page.num_slots(), MAX_SLOTS_PER_PAGE);
        assert_eq!(page.iter().count(), MAX_SLOTS_PER_PAGE);
        let last = page.tuple_at(SlotId::new(u16::MAX)).unwrap();
        assert_eq!(
            last.record_id(),
            Some(RecordId::new(pid(0), SlotId::new(u16::MAX)))
        );
        assert_eq!(page.page_data().as_ref(), &data[..]);
    }
}
