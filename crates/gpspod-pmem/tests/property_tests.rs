//! Property-based tests for the record reader and track decoder.

use gpspod_pmem::records::RecordReader;
use gpspod_pmem::synth::{frame_record, ImageBuilder};
use gpspod_pmem::{block, decode_tracks, TRACK_BLOCK_OFFSET};
use proptest::prelude::*;

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    /// The reader consumes exactly its input, or stops with an error whose
    /// offset lies strictly inside it.
    #[test]
    fn prop_reader_terminates(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let mut reader = RecordReader::new(&data);
        loop {
            match reader.next_record() {
                Ok(Some(_)) => {
                    prop_assert!(reader.pos() <= data.len());
                }
                Ok(None) => {
                    prop_assert_eq!(reader.pos(), data.len());
                    break;
                }
                Err(error) => {
                    let offset = error.offset().expect("framing errors carry offsets");
                    prop_assert!((offset as usize) < data.len());
                    break;
                }
            }
        }
    }

    /// Well-framed records always read back with the same tag and payload.
    #[test]
    fn prop_framed_records_roundtrip(
        records in proptest::collection::vec(
            (any::<u8>(), proptest::collection::vec(any::<u8>(), 0..64)),
            1..32,
        )
    ) {
        let buf: Vec<u8> = records
            .iter()
            .flat_map(|(tag, payload)| frame_record(*tag, payload))
            .collect();
        let mut reader = RecordReader::new(&buf);
        for (tag, payload) in &records {
            let raw = reader.next_record().expect("frame").expect("record");
            prop_assert_eq!(raw.tag, *tag);
            prop_assert_eq!(raw.payload, payload.as_slice());
        }
        prop_assert!(reader.next_record().expect("end").is_none());
    }

    /// Arbitrary record soup never panics the track decoder, and any
    /// warnings carry offsets within the region.
    #[test]
    fn prop_track_decoder_is_total(
        records in proptest::collection::vec(
            (0u8..12, proptest::collection::vec(any::<u8>(), 0..32)),
            0..24,
        )
    ) {
        let framed: Vec<Vec<u8>> = records
            .iter()
            .map(|(tag, payload)| frame_record(*tag, payload))
            .collect();
        let image = ImageBuilder::new().track_records(framed).build();
        let mut region = image.as_slice();
        let stream = block::read_chain(&mut region, TRACK_BLOCK_OFFSET).expect("chain");
        let decoded = decode_tracks(&stream);
        for warning in &decoded.warnings {
            prop_assert!((warning.offset as usize) < image.len());
        }
    }
}
