//! End to end: decode tracks straight off the (scripted) device.

mod common;

use common::FakeDevice;
use gpspod_device::{GpsPod, Session};
use gpspod_pmem::records::{
    FieldCode, GpsBase, GpsSmall, PeriodicLayout, PeriodicValues, TrackHeader,
};
use gpspod_pmem::synth::{ImageBuilder, TrackBuilder};
use gpspod_pmem::tracks::read_tracks;

fn image_with_one_track() -> Vec<u8> {
    let layout = PeriodicLayout {
        period: 1,
        fields: vec![FieldCode::HeartRate, FieldCode::Distance],
    };
    let mut builder = TrackBuilder::new(TrackHeader {
        year: 2016,
        month: 10,
        day: 26,
        hour: 20,
        minute: 11,
        second: 6,
        interval: 1,
        duration: 3427,
        distance: 36_073,
        samples: 0,
    })
    .periodic_header(&layout)
    .gps_base(&GpsBase {
        latitude: 520_000_000,
        longitude: 50_000_000,
        ehpe: 200,
        altitude: 5,
        satellites: 8,
        speed: 0,
    });
    for i in 0..25u32 {
        builder = builder
            .periodic_sample(
                &layout,
                &PeriodicValues {
                    heartrate: Some(140),
                    distance: Some(i * 10),
                    ..Default::default()
                },
            )
            .gps_small(&GpsSmall {
                dlat: 30,
                dlon: 30,
                speed: 300,
            });
    }
    ImageBuilder::new().track_records(builder.finish()).build()
}

#[test]
fn tracks_decode_through_the_lazy_view() {
    let mut pod = GpsPod::new(Session::new(FakeDevice::new(image_with_one_track())));
    let decoded = read_tracks(&mut pod).expect("decode over device");

    assert!(decoded.warnings.is_empty(), "{:?}", decoded.warnings);
    assert_eq!(decoded.tracks.len(), 1);
    let track = &decoded.tracks[0];
    assert_eq!(
        track.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
        "2016-10-26 20:11:06"
    );
    assert_eq!(track.samples.len(), 51);
    assert_eq!(track.samples.len() as u32, track.declared_samples);
    assert_eq!(track.distance, 36_073);

    // Only the chunks backing the headers and the track chain were pulled,
    // nowhere near the 0x3C0000-byte region.
    let commands = pod.session().transport_mut().read_memory_commands;
    assert!(commands > 0);
    assert!(commands < 32, "fetched too much: {commands} commands");
}

#[test]
fn repeated_decoding_hits_the_cache() {
    let mut pod = GpsPod::new(Session::new(FakeDevice::new(image_with_one_track())));
    read_tracks(&mut pod).expect("first decode");
    let commands = pod.session().transport_mut().read_memory_commands;
    read_tracks(&mut pod).expect("second decode");
    assert_eq!(
        pod.session().transport_mut().read_memory_commands,
        commands,
        "second decode must be served from cache"
    );
}
