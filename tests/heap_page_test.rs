//! Integration tests for the heap page format

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata::common::{PageId, SlotId, StrataError, TableId, DEFAULT_PAGE_SIZE};
use strata::storage::page::{header_size, slots_per_page, HeapPage};
use strata::tuple::{DataType, Schema, Tuple, Value};

fn schema() -> Arc<Schema> {
    // 4 + 8 + 8 = 20 bytes
    Schema::builder()
        .column("id", DataType::Integer)
        .column("amount", DataType::BigInt)
        .column("score", DataType::Double)
        .build_arc()
}

fn pid() -> PageId {
    PageId::new(TableId::new(7), 3)
}

fn row(schema: &Arc<Schema>, i: i32) -> Tuple {
    Tuple::new(
        schema.clone(),
        vec![
            Value::Integer(i),
            Value::BigInt(i as i64 * 1_000_000_007),
            Value::Double(i as f64 / 4.0),
        ],
    )
}

fn empty_page(schema: &Arc<Schema>) -> HeapPage {
    HeapPage::decode(
        pid(),
        schema.clone(),
        &HeapPage::empty_page_data(DEFAULT_PAGE_SIZE),
        DEFAULT_PAGE_SIZE,
    )
    .unwrap()
}

fn assert_same_page(a: &HeapPage, b: &HeapPage) {
    assert_eq!(a.num_slots(), b.num_slots());
    for slot in 0..a.num_slots() {
        let id = SlotId::new(slot as u16);
        assert_eq!(a.is_slot_used(slot), b.is_slot_used(slot), "slot {}", slot);
        assert_eq!(a.tuple_at(id), b.tuple_at(id), "slot {}", slot);
        assert_eq!(
            a.tuple_at(id).and_then(Tuple::record_id),
            b.tuple_at(id).and_then(Tuple::record_id)
        );
    }
}

#[test]
fn test_twenty_byte_tuples_fill_page() {
    let schema = schema();
    assert_eq!(schema.tuple_size(), 20);
    assert_eq!(slots_per_page(DEFAULT_PAGE_SIZE, 20), 203);
    assert_eq!(header_size(DEFAULT_PAGE_SIZE, 20), 26);

    let mut page = empty_page(&schema);
    for i in 0..203 {
        let rid = page.insert_tuple(row(&schema, i)).unwrap();
        assert_eq!(rid.slot_id, SlotId::new(i as u16));
        assert_eq!(rid.page_id, pid());
    }
    assert!(matches!(
        page.insert_tuple(row(&schema, 203)),
        Err(StrataError::PageFull(_))
    ));

    // Every slot bit is set, the 5 spare bits of the last header byte are not.
    let data = page.page_data();
    assert_eq!(data.len(), DEFAULT_PAGE_SIZE);
    assert!(data[..25].iter().all(|&b| b == 0xFF));
    assert_eq!(data[25], 0b0000_0111);
}

#[test]
fn test_round_trip_after_random_changes() {
    let schema = schema();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut page = empty_page(&schema);

    for step in 0..2_000 {
        let occupied: Vec<Tuple> = page.iter().cloned().collect();
        if occupied.is_empty() || (rng.gen_bool(0.6) && page.num_empty_slots() > 0) {
            page.insert_tuple(row(&schema, step)).unwrap();
        } else {
            let victim = &occupied[rng.gen_range(0..occupied.len())];
            page.delete_tuple(victim).unwrap();
        }

        if step % 97 == 0 {
            let decoded =
                HeapPage::decode(pid(), schema.clone(), &page.page_data(), DEFAULT_PAGE_SIZE)
                    .unwrap();
            assert_same_page(&page, &decoded);
            assert_eq!(decoded.page_data(), page.page_data());
        }
    }
}

#[test]
fn test_empty_slots_are_zero_on_disk() {
    let schema = schema();
    let mut page = empty_page(&schema);
    for i in 0..3 {
        page.insert_tuple(row(&schema, i + 1)).unwrap();
    }
    let middle = page.tuple_at(SlotId::new(1)).unwrap().clone();
    page.delete_tuple(&middle).unwrap();

    let data = page.page_data();
    let header = header_size(DEFAULT_PAGE_SIZE, 20);
    assert_eq!(data[0], 0b0000_0101);
    assert!(data[header + 20..header + 40].iter().all(|&b| b == 0));
    assert!(data[header + 60..].iter().all(|&b| b == 0));
}

#[test]
fn test_before_image_tracks_snapshots() {
    let schema = schema();
    let mut page = empty_page(&schema);

    page.insert_tuple(row(&schema, 1)).unwrap();
    assert_eq!(page.before_image().unwrap().iter().count(), 0);

    page.set_before_image();
    let snapshot = page.before_image().unwrap();
    assert_same_page(&snapshot, &page);

    page.insert_tuple(row(&schema, 2)).unwrap();
    assert_eq!(page.before_image().unwrap().iter().count(), 1);
}
