//! Command-layer behaviour against the scripted device.

mod common;

use common::FakeDevice;
use gpspod_device::{DeviceError, Session};
use gpspod_pmem::REGION_SIZE;

fn blank_image() -> Vec<u8> {
    vec![0u8; REGION_SIZE as usize]
}

#[test]
fn device_info() {
    let mut session = Session::new(FakeDevice::new(blank_image()));
    let info = session.device_info().expect("device info");
    assert_eq!(info.model, "GpsPod");
    assert_eq!(info.serial, "8761994617001000");
    assert_eq!(info.fw(), "1.6.39.0");
    assert_eq!(info.hw(), "66.2.0.0");
    assert_eq!(info.bsl(), "1.4.3.0");
}

#[test]
fn device_status() {
    let mut session = Session::new(FakeDevice::new(blank_image()));
    let status = session.device_status().expect("status");
    assert_eq!(status.charge, 93);
    assert_eq!(status.to_string(), "Charge: 93%");
}

#[test]
fn read_memory_roundtrip() {
    let mut image = blank_image();
    for (i, byte) in image[0x1000..0x1200].iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    let expected = image[0x1000..0x1200].to_vec();

    let mut session = Session::new(FakeDevice::new(image));
    let data = session.read_memory(0x1000, 0x200).expect("read");
    assert_eq!(data, expected);
}

#[test]
fn corrupted_reply_packet_retries_once_and_succeeds() {
    let mut image = blank_image();
    image[0x800..0x8A0].fill(0xA5);
    let mut device = FakeDevice::new(image);
    device.corrupt_next_reply = true;

    let mut session = Session::new(device);
    let data = session.read_memory(0x800, 0x200).expect("read survives retry");
    assert_eq!(&data[..0xA0], &[0xA5; 0xA0][..]);
    // Two ReadMemory commands reached the device: the corrupted attempt and
    // the retry.
    assert_eq!(session.transport_mut().read_memory_commands, 2);
}

#[test]
fn sequence_mismatch_poisons_the_session() {
    let mut device = FakeDevice::new(blank_image());
    device.wrong_seq_next_reply = true;

    let mut session = Session::new(device);
    let err = session.device_status().expect_err("desync");
    assert!(matches!(err, DeviceError::Desync));
    assert_eq!(err.kind(), "packet");

    // Every later command fails without touching the wire.
    let err = session.device_status().expect_err("still desynced");
    assert!(matches!(err, DeviceError::Desync));
}

#[test]
fn settings_roundtrip() {
    let mut session = Session::new(FakeDevice::new(blank_image()));
    session.write_setting(0x1A, &[0x01, 0x3C]).expect("write");
    let blob = session.read_settings().expect("read settings");
    assert_eq!(blob.len(), 0x800);
    assert_eq!(&blob[0x1A..0x1C], &[0x01, 0x3C]);
}

#[test]
fn list_files_pages_until_empty() {
    let mut session = Session::new(FakeDevice::new(blank_image()));
    let files = session.list_files().expect("list");
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name, "BBPMEM.DAT");
    assert_eq!(files[0].size, 3_750_000);

    // The cursor reset after the empty page; a second listing works too.
    let again = session.list_files().expect("list again");
    assert_eq!(again.len(), 2);
}

#[test]
fn set_time_acks() {
    let mut session = Session::new(FakeDevice::new(blank_image()));
    session
        .set_time(gpspod_protocol::TimeOfDay {
            year: 2016,
            month: 10,
            day: 25,
            hour: 10,
            minute: 35,
            ms: 42_000,
        })
        .expect("set time");
}
