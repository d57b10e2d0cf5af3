//! Track assembly over the track chain's record stream.

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, warn};

use crate::block::ChainStream;
use crate::records::{PeriodicLayout, RawRecord, Record, RecordReader};
use crate::{PmemError, PmemResult, Region, TRACK_BLOCK_OFFSET};

/// A decoded geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPosition {
    fn from_raw(lat: i32, lon: i32) -> Self {
        Self {
            latitude: f64::from(lat) * 1e-7,
            longitude: f64::from(lon) * 1e-7,
        }
    }
}

/// One decoded sample. Periodic samples carry the periodic fields; GPS
/// samples carry a position and fix quality. Both land in
/// [`Track::samples`] in stream order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackSample {
    pub time: Option<NaiveDateTime>,
    pub position: Option<GeoPosition>,
    /// Metres, from the GPS fix.
    pub altitude: Option<i16>,
    /// Estimated horizontal position error, cm.
    pub ehpe: Option<u16>,
    pub satellites: Option<u8>,
    /// Ground speed, cm/s.
    pub speed: Option<u16>,
    pub heartrate: Option<u8>,
    /// Cumulative metres.
    pub distance: Option<u32>,
    pub cadence: Option<u8>,
    /// 0.1 degrees Celsius.
    pub temperature: Option<i16>,
}

/// A lap marker with the position the track had reached when it fired.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackLap {
    pub event: u8,
    pub time: Option<NaiveDateTime>,
    /// Seconds since track start.
    pub duration: u32,
    /// Metres since track start.
    pub distance: u32,
    pub position: Option<GeoPosition>,
}

/// A recorded activity, bounded by TrackHeader records in the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub start_time: NaiveDateTime,
    /// Seconds, as declared by the header.
    pub duration: u32,
    /// Metres, as declared by the header.
    pub distance: u32,
    /// Sample period in seconds; the periodic header's declared period once
    /// one has been seen, the track header's interval before that.
    pub interval: u16,
    /// Sample count declared by the header.
    pub declared_samples: u32,
    pub samples: Vec<TrackSample>,
    pub laps: Vec<TrackLap>,
    /// Set when decoding stopped before the track's natural end.
    pub truncated: bool,
}

impl Track {
    /// One-line listing, matching the `tracks` command output.
    pub fn summary(&self, index: usize) -> String {
        format!(
            "{index}: {} distance: {} samples: {} interval: {}{}",
            self.start_time.format("%Y-%m-%d %H:%M:%S"),
            self.distance,
            self.declared_samples,
            self.interval,
            if self.truncated { " (truncated)" } else { "" },
        )
    }
}

/// A non-fatal problem encountered while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeWarning {
    /// Absolute region offset of the failure.
    pub offset: u32,
    pub message: String,
}

impl std::fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at {:#x}: {}", self.offset, self.message)
    }
}

/// Everything recovered from the track chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedTracks {
    pub tracks: Vec<Track>,
    pub warnings: Vec<DecodeWarning>,
}

struct OpenTrack {
    track: Track,
    layout: Option<PeriodicLayout>,
    /// Wall-clock base for periodic timestamps.
    time_ref: NaiveDateTime,
    /// Periodic samples seen since `time_ref`.
    since_ref: u32,
    /// Running timestamp, advanced by periodic samples and time references.
    clock: NaiveDateTime,
    /// Raw 1e-7 degree running fix; deltas accumulate into it.
    fix: Option<(i32, i32)>,
}

impl OpenTrack {
    fn new(start_time: NaiveDateTime, header: &crate::records::TrackHeader) -> Self {
        Self {
            track: Track {
                start_time,
                duration: header.duration,
                distance: header.distance,
                interval: header.interval,
                declared_samples: header.samples,
                samples: Vec::new(),
                laps: Vec::new(),
                truncated: false,
            },
            layout: None,
            time_ref: start_time,
            since_ref: 0,
            clock: start_time,
            fix: None,
        }
    }

    fn last_position(&self) -> Option<GeoPosition> {
        self.fix.map(|(lat, lon)| GeoPosition::from_raw(lat, lon))
    }
}

/// Decoder states: between tracks, inside one, or skipping the rest of a
/// track that failed to decode.
enum State {
    BetweenTracks,
    InTrack(OpenTrack),
    /// The current track closed as truncated; ignore records until the next
    /// TrackHeader.
    Skimming,
}

struct Assembler<'s> {
    stream: &'s ChainStream,
    state: State,
    out: DecodedTracks,
}

impl<'s> Assembler<'s> {
    fn new(stream: &'s ChainStream) -> Self {
        Self {
            stream,
            state: State::BetweenTracks,
            out: DecodedTracks::default(),
        }
    }

    fn region_offset(&self, pos: usize) -> u32 {
        self.stream.region_offset(pos).unwrap_or(pos as u32)
    }

    fn warn_at(&mut self, pos: usize, error: &PmemError) {
        let offset = error.offset().map_or_else(
            || self.region_offset(pos),
            |stream_offset| self.region_offset(stream_offset as usize),
        );
        warn!(offset = format_args!("{offset:#x}"), %error, "track decode warning");
        self.out.warnings.push(DecodeWarning {
            offset,
            message: error.to_string(),
        });
    }

    fn close(&mut self, truncated: bool) {
        if let State::InTrack(open) = std::mem::replace(&mut self.state, State::BetweenTracks) {
            let mut track = open.track;
            track.truncated |= truncated;
            debug!(
                start = %track.start_time,
                samples = track.samples.len(),
                truncated = track.truncated,
                "closed track"
            );
            self.out.tracks.push(track);
        }
    }

    fn handle(&mut self, raw: &RawRecord<'_>) -> PmemResult<()> {
        let record = Record::parse(raw)?;

        if let Record::TrackHeader(header) = &record {
            self.close(false);
            match header.start_time(raw.offset as u32) {
                Ok(start_time) => self.state = State::InTrack(OpenTrack::new(start_time, header)),
                Err(error) => {
                    self.warn_at(raw.offset, &error);
                    self.state = State::Skimming;
                }
            }
            return Ok(());
        }

        let mut open = match std::mem::replace(&mut self.state, State::BetweenTracks) {
            State::InTrack(open) => open,
            // Records before the first header (a partially overwritten
            // track) and records after a decode failure are skipped.
            state => {
                self.state = state;
                return Ok(());
            }
        };

        match Self::apply(&mut open, raw, record) {
            Ok(()) => self.state = State::InTrack(open),
            Err(error) => {
                // The track closes as truncated; decoding continues with the
                // next TrackHeader.
                self.warn_at(raw.offset, &error);
                let mut track = open.track;
                track.truncated = true;
                self.out.tracks.push(track);
                self.state = State::Skimming;
            }
        }
        Ok(())
    }

    fn apply(open: &mut OpenTrack, raw: &RawRecord<'_>, record: Record) -> PmemResult<()> {
        match record {
            Record::TrackHeader(_) => {}
            Record::PeriodicHeader(layout) => {
                open.track.interval = layout.period;
                open.layout = Some(layout);
            }
            Record::PeriodicSample(_) => {
                let layout = open.layout.as_ref().ok_or(PmemError::PeriodicWithoutHeader {
                    offset: raw.offset as u32,
                })?;
                let values = layout.decode(raw)?;
                let time = open.time_ref.checked_add_signed(Duration::seconds(
                    i64::from(open.since_ref) * i64::from(layout.period),
                ));
                open.since_ref += 1;
                if let Some(time) = time {
                    open.clock = time;
                }
                open.track.samples.push(TrackSample {
                    time,
                    heartrate: values.heartrate,
                    speed: values.speed,
                    altitude: values.altitude,
                    distance: values.distance,
                    cadence: values.cadence,
                    temperature: values.temperature,
                    ..TrackSample::default()
                });
            }
            Record::TimeReference(reference) => {
                let time = reference.datetime(raw.offset as u32)?;
                open.time_ref = time;
                open.since_ref = 0;
                open.clock = time;
            }
            Record::GpsBase(base) => {
                open.fix = Some((base.latitude, base.longitude));
                open.track.samples.push(TrackSample {
                    time: Some(open.clock),
                    position: open.last_position(),
                    altitude: Some(base.altitude),
                    ehpe: Some(base.ehpe),
                    satellites: Some(base.satellites),
                    speed: Some(base.speed),
                    ..TrackSample::default()
                });
            }
            Record::GpsSmall(delta) => {
                let (lat, lon) = open.fix.ok_or(PmemError::DeltaWithoutBase {
                    offset: raw.offset as u32,
                })?;
                open.fix = Some((
                    lat.wrapping_add(i32::from(delta.dlat)),
                    lon.wrapping_add(i32::from(delta.dlon)),
                ));
                open.track.samples.push(TrackSample {
                    time: Some(open.clock),
                    position: open.last_position(),
                    speed: Some(delta.speed),
                    ..TrackSample::default()
                });
            }
            Record::GpsLarge(delta) => {
                let (lat, lon) = open.fix.ok_or(PmemError::DeltaWithoutBase {
                    offset: raw.offset as u32,
                })?;
                open.fix = Some((lat.wrapping_add(delta.dlat), lon.wrapping_add(delta.dlon)));
                open.track.samples.push(TrackSample {
                    time: Some(open.clock),
                    position: open.last_position(),
                    ehpe: Some(delta.ehpe),
                    speed: Some(delta.speed),
                    ..TrackSample::default()
                });
            }
            Record::Lap(lap) => {
                let time = lap.datetime(raw.offset as u32).ok();
                let position = open.last_position();
                open.track.laps.push(TrackLap {
                    event: lap.event,
                    time,
                    duration: lap.duration,
                    distance: lap.distance,
                    position,
                });
            }
            Record::Pause => {}
        }
        Ok(())
    }

    fn run(mut self) -> DecodedTracks {
        let stream = self.stream;
        if let Some(warning) = &stream.warning {
            self.out.warnings.push(DecodeWarning {
                offset: warning.offset,
                message: warning.reason.clone(),
            });
        }

        let mut reader = RecordReader::new(&stream.bytes);
        loop {
            match reader.next_record() {
                Ok(Some(raw)) => {
                    if let Err(error) = self.handle(&raw) {
                        // Unknown tag: lengths past this record cannot be
                        // trusted, stop decoding the stream entirely.
                        self.warn_at(raw.offset, &error);
                        self.close(true);
                        break;
                    }
                }
                Ok(None) => {
                    // A chain that broke mid-walk ends record-aligned, but
                    // whatever track was open is still missing its tail.
                    self.close(self.stream.warning.is_some());
                    break;
                }
                Err(error) => {
                    self.warn_at(reader.pos(), &error);
                    self.close(true);
                    break;
                }
            }
        }
        self.out
    }
}

/// Decode the track chain's stream into tracks.
pub fn decode_tracks(stream: &ChainStream) -> DecodedTracks {
    Assembler::new(stream).run()
}

/// Convenience: walk the track chain of `region` and decode it.
pub fn read_tracks<R: Region>(region: &mut R) -> PmemResult<DecodedTracks> {
    let stream = crate::block::read_chain(region, TRACK_BLOCK_OFFSET)?;
    Ok(decode_tracks(&stream))
}

/// An entry of the internal event log, kept opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Absolute region offset of the entry.
    pub offset: u32,
    pub tag: u8,
    pub payload: Vec<u8>,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#08x} tag {:#04x}:", self.offset, self.tag)?;
        for byte in &self.payload {
            write!(f, " {byte:02X}")?;
        }
        let text: String = self
            .payload
            .iter()
            .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { '.' })
            .collect();
        write!(f, "  |{text}|")
    }
}

/// Decode the event-log chain's stream into opaque entries. The device's
/// diagnostics format is not otherwise interpreted by this client.
pub fn decode_log_entries(stream: &ChainStream) -> (Vec<LogEntry>, Vec<DecodeWarning>) {
    let mut entries = Vec::new();
    let mut warnings: Vec<DecodeWarning> = stream
        .warning
        .iter()
        .map(|w| DecodeWarning {
            offset: w.offset,
            message: w.reason.clone(),
        })
        .collect();

    let mut reader = RecordReader::new(&stream.bytes);
    loop {
        match reader.next_record() {
            Ok(Some(raw)) => entries.push(LogEntry {
                offset: stream.region_offset(raw.offset).unwrap_or(raw.offset as u32),
                tag: raw.tag,
                payload: raw.payload.to_vec(),
            }),
            Ok(None) => break,
            Err(error) => {
                warnings.push(DecodeWarning {
                    offset: stream
                        .region_offset(reader.pos())
                        .unwrap_or(reader.pos() as u32),
                    message: error.to_string(),
                });
                break;
            }
        }
    }
    (entries, warnings)
}
