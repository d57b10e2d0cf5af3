//! Lazy memory view: caching, coalescing, invalidation.

mod common;

use common::FakeDevice;
use gpspod_device::memory::{CHUNK_SIZE, MAX_READ};
use gpspod_device::{DeviceError, GpsPod, MemoryView, Session};
use gpspod_pmem::REGION_SIZE;

fn patterned_image() -> Vec<u8> {
    (0..REGION_SIZE).map(|i| (i * 7 % 253) as u8).collect()
}

#[test]
fn exact_slice_is_returned() {
    let image = patterned_image();
    let expected = image[0x12345..0x12421].to_vec();
    let mut session = Session::new(FakeDevice::new(image));
    let mut view = MemoryView::new();
    let data = view.read(&mut session, 0x12345, 0xDC).expect("read");
    assert_eq!(data, expected);
}

#[test]
fn contiguous_chunks_coalesce_into_one_command() {
    let mut session = Session::new(FakeDevice::new(patterned_image()));
    let mut view = MemoryView::new();
    view.read(&mut session, 0, 4 * CHUNK_SIZE).expect("read");
    assert_eq!(session.transport_mut().read_memory_commands, 1);
}

#[test]
fn cached_ranges_issue_no_commands() {
    let mut session = Session::new(FakeDevice::new(patterned_image()));
    let mut view = MemoryView::new();
    let first = view.read(&mut session, 0x1000, 0x800).expect("read");
    let commands = session.transport_mut().read_memory_commands;

    let again = view.read(&mut session, 0x1000, 0x800).expect("reread");
    let inner = view.read(&mut session, 0x1100, 0x100).expect("subset");
    assert_eq!(session.transport_mut().read_memory_commands, commands);
    assert_eq!(first, again);
    assert_eq!(inner, first[0x100..0x200].to_vec());
}

#[test]
fn only_missing_chunks_are_fetched() {
    let mut session = Session::new(FakeDevice::new(patterned_image()));
    let mut view = MemoryView::new();
    view.read(&mut session, 2 * CHUNK_SIZE, CHUNK_SIZE).expect("middle");
    assert_eq!(session.transport_mut().read_memory_commands, 1);

    // Covers the cached middle chunk: two separate fetches for the gaps.
    view.read(&mut session, 0, 5 * CHUNK_SIZE).expect("spanning");
    assert_eq!(session.transport_mut().read_memory_commands, 3);
}

#[test]
fn large_reads_split_at_the_per_command_cap() {
    let mut session = Session::new(FakeDevice::new(patterned_image()));
    let mut view = MemoryView::new();
    view.read(&mut session, 0, MAX_READ + 4 * CHUNK_SIZE).expect("read");
    assert_eq!(session.transport_mut().read_memory_commands, 2);
}

#[test]
fn out_of_region_reads_are_usage_errors() {
    let mut session = Session::new(FakeDevice::new(patterned_image()));
    let mut view = MemoryView::new();
    let err = view
        .read(&mut session, REGION_SIZE - 4, 8)
        .expect_err("crosses the end");
    assert!(matches!(err, DeviceError::OutOfRange { .. }));
    assert_eq!(err.kind(), "usage");
}

#[test]
fn setting_writes_invalidate_overlapping_chunks() {
    let mut pod = GpsPod::new(Session::new(FakeDevice::new(patterned_image())));

    let before = pod.read(0x2000, 0x40).expect("read");
    pod.write_setting(0x10, &[0xEE; 4]).expect("write");
    let after = pod.read(0x2000, 0x40).expect("reread");

    assert_eq!(&before[..0x10], &after[..0x10]);
    assert_eq!(&after[0x10..0x14], &[0xEE; 4]);
}
