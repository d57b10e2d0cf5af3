//! Record a live-style session, then replay it offline.

mod common;

use common::FakeDevice;
use gpspod_device::{DeviceError, RecordingTransport, ReplayLog, ReplayTransport, Session};
use gpspod_pmem::REGION_SIZE;

fn recorded_session() -> String {
    let mut image = vec![0u8; REGION_SIZE as usize];
    image[0x4000..0x4100].fill(0x5A);

    let sink: std::sync::Arc<std::sync::Mutex<Vec<u8>>> = Default::default();

    struct SharedSink(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
    impl std::io::Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("sink lock").extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let recorder =
        RecordingTransport::from_writer(FakeDevice::new(image), Box::new(SharedSink(sink.clone())));
    let mut session = Session::new(recorder);
    let info = session.device_info().expect("info");
    assert_eq!(info.model, "GpsPod");
    let data = session.read_memory(0x4000, 0x200).expect("read");
    assert_eq!(&data[..0x100], &[0x5A; 0x100][..]);
    drop(session);

    let bytes = sink.lock().expect("sink lock").clone();
    String::from_utf8(bytes).expect("utf-8 log")
}

#[test]
fn recorded_exchange_replays_identically() {
    let text = recorded_session();
    let log = ReplayLog::parse(&text).expect("parse recording");

    let mut session = Session::new(ReplayTransport::new(log));
    let info = session.device_info().expect("replayed info");
    assert_eq!(info.model, "GpsPod");
    assert_eq!(info.serial, "8761994617001000");
    assert_eq!(info.fw(), "1.6.39.0");

    let data = session.read_memory(0x4000, 0x200).expect("replayed read");
    assert_eq!(&data[..0x100], &[0x5A; 0x100][..]);
    assert!(session.transport_mut().exhausted());
}

#[test]
fn replay_rejects_divergent_commands() {
    let text = recorded_session();
    let log = ReplayLog::parse(&text).expect("parse recording");

    let mut session = Session::new(ReplayTransport::new(log));
    // The recording starts with DeviceInfo; asking for status diverges.
    let err = session.device_status().expect_err("divergence");
    assert!(matches!(err, DeviceError::ReplayMismatch { .. }));
}

#[test]
fn recording_format_renders_stably() {
    let text = recorded_session();
    let log = ReplayLog::parse(&text).expect("parse");
    assert_eq!(log.render(), text);
    for line in text.lines() {
        assert!(line.starts_with("> ") || line.starts_with("< "));
    }
}

#[test]
fn recordings_survive_the_filesystem() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.log");

    {
        let recorder =
            RecordingTransport::create(FakeDevice::new(vec![0u8; REGION_SIZE as usize]), &path)
                .expect("create recording");
        let mut session = Session::new(recorder);
        session.device_info().expect("info");
    }

    let log = ReplayLog::load(&path).expect("load recording");
    let mut session = Session::new(ReplayTransport::new(log));
    assert_eq!(session.device_info().expect("replay").model, "GpsPod");
}

#[test]
fn write_through_recorder_reaches_the_device() {
    let image = vec![0u8; REGION_SIZE as usize];
    let recorder = RecordingTransport::from_writer(FakeDevice::new(image), Box::new(Vec::new()));
    let mut session = Session::new(recorder);
    session.write_setting(0, &[1, 2, 3]).expect("write");
    let blob = session.read_settings().expect("read");
    assert_eq!(&blob[..3], &[1, 2, 3]);
    let device = session.into_transport().into_inner();
    assert_eq!(&device.settings[..3], &[1, 2, 3]);
}
