//! Tagged sample records inside the chain streams.
//!
//! Every record is framed as a `u16` length followed by that many bytes: a
//! one-byte tag and a kind-specific fixed-length payload. The reader is a
//! plain tag-dispatched cursor; periodic samples can only be decoded against
//! the field layout declared by the most recent [`PeriodicLayout`], so their
//! payload is kept raw here and interpreted by the track assembler.

use chrono::{NaiveDate, NaiveDateTime};

use crate::{PmemError, PmemResult};

pub const TAG_TRACK_HEADER: u8 = 0x01;
pub const TAG_PERIODIC_HEADER: u8 = 0x02;
pub const TAG_PERIODIC_SAMPLE: u8 = 0x03;
pub const TAG_TIME_REFERENCE: u8 = 0x04;
pub const TAG_GPS_BASE: u8 = 0x05;
pub const TAG_GPS_SMALL: u8 = 0x06;
pub const TAG_GPS_LARGE: u8 = 0x07;
pub const TAG_LAP: u8 = 0x08;
pub const TAG_PAUSE: u8 = 0x09;

/// One framed record, not yet interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    /// Position of the record's length field within the stream.
    pub offset: usize,
    pub tag: u8,
    pub payload: &'a [u8],
}

/// Cursor over a chain stream yielding framed records.
///
/// Consumes the input exactly, or stops with an error carrying an offset
/// strictly inside it.
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current cursor position within the stream.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Next framed record, or `None` at a clean end of input.
    pub fn next_record(&mut self) -> PmemResult<Option<RawRecord<'a>>> {
        if self.pos == self.data.len() {
            return Ok(None);
        }
        let start = self.pos;
        let truncated = PmemError::TruncatedRecord {
            offset: start as u32,
        };
        if self.data.len() - start < 2 {
            return Err(truncated);
        }
        let length = u16::from_le_bytes([self.data[start], self.data[start + 1]]) as usize;
        if length == 0 || self.data.len() - start - 2 < length {
            return Err(truncated);
        }
        let tag = self.data[start + 2];
        let payload = &self.data[start + 3..start + 2 + length];
        self.pos = start + 2 + length;
        Ok(Some(RawRecord {
            offset: start,
            tag,
            payload,
        }))
    }
}

fn expect_len(raw: &RawRecord<'_>, expected: usize) -> PmemResult<()> {
    if raw.payload.len() != expected {
        return Err(PmemError::RecordLength {
            offset: raw.offset as u32,
            expected,
            actual: raw.payload.len(),
        });
    }
    Ok(())
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Sign-extend a little-endian 24-bit field.
fn read_i24(bytes: &[u8], at: usize) -> i32 {
    let raw = u32::from(bytes[at]) | u32::from(bytes[at + 1]) << 8 | u32::from(bytes[at + 2]) << 16;
    ((raw << 8) as i32) >> 8
}

fn push_i24(out: &mut Vec<u8>, value: i32) {
    let raw = (value as u32) & 0x00FF_FFFF;
    out.push(raw as u8);
    out.push((raw >> 8) as u8);
    out.push((raw >> 16) as u8);
}

fn wallclock(
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    offset: u32,
) -> PmemResult<NaiveDateTime> {
    NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
        .and_then(|d| d.and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second)))
        .ok_or(PmemError::BadTimestamp { offset })
}

/// Start-of-track marker carrying the recording's summary metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackHeader {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Declared logging interval in seconds.
    pub interval: u16,
    /// Recording duration in seconds.
    pub duration: u32,
    /// Total distance in metres.
    pub distance: u32,
    /// Number of sample records in the track.
    pub samples: u32,
}

impl TrackHeader {
    pub const PAYLOAD_LEN: usize = 21;

    pub fn parse(raw: &RawRecord<'_>) -> PmemResult<Self> {
        expect_len(raw, Self::PAYLOAD_LEN)?;
        let p = raw.payload;
        Ok(Self {
            year: read_u16(p, 0),
            month: p[2],
            day: p[3],
            hour: p[4],
            minute: p[5],
            second: p[6],
            interval: read_u16(p, 7),
            duration: read_u32(p, 9),
            distance: read_u32(p, 13),
            samples: read_u32(p, 17),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::PAYLOAD_LEN);
        out.extend_from_slice(&self.year.to_le_bytes());
        out.extend_from_slice(&[self.month, self.day, self.hour, self.minute, self.second]);
        out.extend_from_slice(&self.interval.to_le_bytes());
        out.extend_from_slice(&self.duration.to_le_bytes());
        out.extend_from_slice(&self.distance.to_le_bytes());
        out.extend_from_slice(&self.samples.to_le_bytes());
        out
    }

    pub fn start_time(&self, offset: u32) -> PmemResult<NaiveDateTime> {
        wallclock(
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            offset,
        )
    }
}

/// Fields a periodic sample may carry. The widths are fixed per code; a
/// header declaring a different width is undecodable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCode {
    HeartRate,
    Speed,
    Altitude,
    Distance,
    Cadence,
    Temperature,
}

impl FieldCode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::HeartRate),
            0x02 => Some(Self::Speed),
            0x03 => Some(Self::Altitude),
            0x04 => Some(Self::Distance),
            0x05 => Some(Self::Cadence),
            0x06 => Some(Self::Temperature),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::HeartRate => 0x01,
            Self::Speed => 0x02,
            Self::Altitude => 0x03,
            Self::Distance => 0x04,
            Self::Cadence => 0x05,
            Self::Temperature => 0x06,
        }
    }

    pub fn width(self) -> u8 {
        match self {
            Self::HeartRate | Self::Cadence => 1,
            Self::Speed | Self::Altitude | Self::Temperature => 2,
            Self::Distance => 4,
        }
    }
}

/// Declared layout of subsequent periodic samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodicLayout {
    /// Sample period in seconds.
    pub period: u16,
    pub fields: Vec<FieldCode>,
}

/// Values decoded from one periodic sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodicValues {
    pub heartrate: Option<u8>,
    /// cm/s.
    pub speed: Option<u16>,
    /// Metres, signed.
    pub altitude: Option<i16>,
    /// Cumulative metres.
    pub distance: Option<u32>,
    pub cadence: Option<u8>,
    /// 0.1 degrees Celsius, signed.
    pub temperature: Option<i16>,
}

impl PeriodicLayout {
    pub fn parse(raw: &RawRecord<'_>) -> PmemResult<Self> {
        let p = raw.payload;
        let offset = raw.offset as u32;
        if p.len() < 3 {
            return Err(PmemError::RecordLength {
                offset,
                expected: 3,
                actual: p.len(),
            });
        }
        let period = read_u16(p, 0);
        let count = p[2] as usize;
        expect_len(raw, 3 + count * 2)?;
        let mut fields = Vec::with_capacity(count);
        for i in 0..count {
            let code = p[3 + i * 2];
            let size = p[4 + i * 2];
            let field = FieldCode::from_code(code)
                .ok_or(PmemError::UnknownFieldCode { code, offset })?;
            if size != field.width() {
                return Err(PmemError::FieldWidth {
                    code,
                    offset,
                    size,
                    expected: field.width(),
                });
            }
            fields.push(field);
        }
        Ok(Self { period, fields })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.fields.len() * 2);
        out.extend_from_slice(&self.period.to_le_bytes());
        out.push(self.fields.len() as u8);
        for field in &self.fields {
            out.push(field.code());
            out.push(field.width());
        }
        out
    }

    /// Total payload length of one sample under this layout.
    pub fn sample_len(&self) -> usize {
        self.fields.iter().map(|f| usize::from(f.width())).sum()
    }

    /// Decode a periodic sample payload against this layout.
    pub fn decode(&self, raw: &RawRecord<'_>) -> PmemResult<PeriodicValues> {
        expect_len(raw, self.sample_len())?;
        let p = raw.payload;
        let mut values = PeriodicValues::default();
        let mut at = 0usize;
        for field in &self.fields {
            match field {
                FieldCode::HeartRate => values.heartrate = Some(p[at]),
                FieldCode::Speed => values.speed = Some(read_u16(p, at)),
                FieldCode::Altitude => values.altitude = Some(read_u16(p, at) as i16),
                FieldCode::Distance => values.distance = Some(read_u32(p, at)),
                FieldCode::Cadence => values.cadence = Some(p[at]),
                FieldCode::Temperature => values.temperature = Some(read_u16(p, at) as i16),
            }
            at += usize::from(field.width());
        }
        Ok(values)
    }

    /// Encode sample values under this layout (fixtures and tooling).
    pub fn encode_sample(&self, values: &PeriodicValues) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.sample_len());
        for field in &self.fields {
            match field {
                FieldCode::HeartRate => out.push(values.heartrate.unwrap_or_default()),
                FieldCode::Speed => {
                    out.extend_from_slice(&values.speed.unwrap_or_default().to_le_bytes())
                }
                FieldCode::Altitude => out
                    .extend_from_slice(&(values.altitude.unwrap_or_default() as u16).to_le_bytes()),
                FieldCode::Distance => {
                    out.extend_from_slice(&values.distance.unwrap_or_default().to_le_bytes())
                }
                FieldCode::Cadence => out.push(values.cadence.unwrap_or_default()),
                FieldCode::Temperature => out.extend_from_slice(
                    &(values.temperature.unwrap_or_default() as u16).to_le_bytes(),
                ),
            }
        }
        out
    }
}

/// Wall-clock base; subsequent sample timestamps are relative to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeReference {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub ms: u16,
}

impl TimeReference {
    pub const PAYLOAD_LEN: usize = 9;

    pub fn parse(raw: &RawRecord<'_>) -> PmemResult<Self> {
        expect_len(raw, Self::PAYLOAD_LEN)?;
        let p = raw.payload;
        Ok(Self {
            year: read_u16(p, 0),
            month: p[2],
            day: p[3],
            hour: p[4],
            minute: p[5],
            second: p[6],
            ms: read_u16(p, 7),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::PAYLOAD_LEN);
        out.extend_from_slice(&self.year.to_le_bytes());
        out.extend_from_slice(&[self.month, self.day, self.hour, self.minute, self.second]);
        out.extend_from_slice(&self.ms.to_le_bytes());
        out
    }

    pub fn datetime(&self, offset: u32) -> PmemResult<NaiveDateTime> {
        wallclock(
            self.year, self.month, self.day, self.hour, self.minute, self.second, offset,
        )
    }
}

/// Absolute GPS fix; establishes the base for subsequent deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsBase {
    /// 1e-7 degrees.
    pub latitude: i32,
    /// 1e-7 degrees.
    pub longitude: i32,
    /// Estimated horizontal position error, cm.
    pub ehpe: u16,
    /// Metres.
    pub altitude: i16,
    pub satellites: u8,
    /// Ground speed, cm/s.
    pub speed: u16,
}

impl GpsBase {
    pub const PAYLOAD_LEN: usize = 15;

    pub fn parse(raw: &RawRecord<'_>) -> PmemResult<Self> {
        expect_len(raw, Self::PAYLOAD_LEN)?;
        let p = raw.payload;
        Ok(Self {
            latitude: read_u32(p, 0) as i32,
            longitude: read_u32(p, 4) as i32,
            ehpe: read_u16(p, 8),
            altitude: read_u16(p, 10) as i16,
            satellites: p[12],
            speed: read_u16(p, 13),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::PAYLOAD_LEN);
        out.extend_from_slice(&self.latitude.to_le_bytes());
        out.extend_from_slice(&self.longitude.to_le_bytes());
        out.extend_from_slice(&self.ehpe.to_le_bytes());
        out.extend_from_slice(&(self.altitude as u16).to_le_bytes());
        out.push(self.satellites);
        out.extend_from_slice(&self.speed.to_le_bytes());
        out
    }
}

/// Small GPS delta: signed 16-bit lat/lon deltas against the running fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsSmall {
    pub dlat: i16,
    pub dlon: i16,
    /// Ground speed, cm/s.
    pub speed: u16,
}

impl GpsSmall {
    pub const PAYLOAD_LEN: usize = 6;

    pub fn parse(raw: &RawRecord<'_>) -> PmemResult<Self> {
        expect_len(raw, Self::PAYLOAD_LEN)?;
        let p = raw.payload;
        Ok(Self {
            dlat: read_u16(p, 0) as i16,
            dlon: read_u16(p, 2) as i16,
            speed: read_u16(p, 4),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::PAYLOAD_LEN);
        out.extend_from_slice(&(self.dlat as u16).to_le_bytes());
        out.extend_from_slice(&(self.dlon as u16).to_le_bytes());
        out.extend_from_slice(&self.speed.to_le_bytes());
        out
    }
}

/// Large GPS delta: signed 24-bit lat/lon deltas plus EHPE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsLarge {
    /// Sign-extended from 24 bits.
    pub dlat: i32,
    /// Sign-extended from 24 bits.
    pub dlon: i32,
    /// cm.
    pub ehpe: u16,
    /// Ground speed, cm/s.
    pub speed: u16,
}

impl GpsLarge {
    pub const PAYLOAD_LEN: usize = 10;

    pub fn parse(raw: &RawRecord<'_>) -> PmemResult<Self> {
        expect_len(raw, Self::PAYLOAD_LEN)?;
        let p = raw.payload;
        Ok(Self {
            dlat: read_i24(p, 0),
            dlon: read_i24(p, 3),
            ehpe: read_u16(p, 6),
            speed: read_u16(p, 8),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::PAYLOAD_LEN);
        push_i24(&mut out, self.dlat);
        push_i24(&mut out, self.dlon);
        out.extend_from_slice(&self.ehpe.to_le_bytes());
        out.extend_from_slice(&self.speed.to_le_bytes());
        out
    }
}

/// Lap marker. Event 1 is a manual lap (button press); other values come
/// from autolap and are preserved as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lap {
    pub event: u8,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Seconds since track start.
    pub duration: u32,
    /// Metres since track start.
    pub distance: u32,
}

impl Lap {
    pub const PAYLOAD_LEN: usize = 16;

    pub fn parse(raw: &RawRecord<'_>) -> PmemResult<Self> {
        expect_len(raw, Self::PAYLOAD_LEN)?;
        let p = raw.payload;
        Ok(Self {
            event: p[0],
            year: read_u16(p, 1),
            month: p[3],
            day: p[4],
            hour: p[5],
            minute: p[6],
            second: p[7],
            duration: read_u32(p, 8),
            distance: read_u32(p, 12),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::PAYLOAD_LEN);
        out.push(self.event);
        out.extend_from_slice(&self.year.to_le_bytes());
        out.extend_from_slice(&[self.month, self.day, self.hour, self.minute, self.second]);
        out.extend_from_slice(&self.duration.to_le_bytes());
        out.extend_from_slice(&self.distance.to_le_bytes());
        out
    }

    pub fn datetime(&self, offset: u32) -> PmemResult<NaiveDateTime> {
        wallclock(
            self.year, self.month, self.day, self.hour, self.minute, self.second, offset,
        )
    }
}

/// One interpreted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    TrackHeader(TrackHeader),
    PeriodicHeader(PeriodicLayout),
    /// Raw payload; interpreted against the current [`PeriodicLayout`].
    PeriodicSample(Vec<u8>),
    TimeReference(TimeReference),
    GpsBase(GpsBase),
    GpsSmall(GpsSmall),
    GpsLarge(GpsLarge),
    Lap(Lap),
    Pause,
}

impl Record {
    /// Interpret a framed record. Unknown tags are decode errors: record
    /// lengths are not trustworthy past an unknown kind, so the caller must
    /// not resynchronise.
    pub fn parse(raw: &RawRecord<'_>) -> PmemResult<Self> {
        match raw.tag {
            TAG_TRACK_HEADER => Ok(Self::TrackHeader(TrackHeader::parse(raw)?)),
            TAG_PERIODIC_HEADER => Ok(Self::PeriodicHeader(PeriodicLayout::parse(raw)?)),
            TAG_PERIODIC_SAMPLE => Ok(Self::PeriodicSample(raw.payload.to_vec())),
            TAG_TIME_REFERENCE => Ok(Self::TimeReference(TimeReference::parse(raw)?)),
            TAG_GPS_BASE => Ok(Self::GpsBase(GpsBase::parse(raw)?)),
            TAG_GPS_SMALL => Ok(Self::GpsSmall(GpsSmall::parse(raw)?)),
            TAG_GPS_LARGE => Ok(Self::GpsLarge(GpsLarge::parse(raw)?)),
            TAG_LAP => Ok(Self::Lap(Lap::parse(raw)?)),
            TAG_PAUSE => {
                expect_len(raw, 0)?;
                Ok(Self::Pause)
            }
            tag => Err(PmemError::UnknownTag {
                tag,
                offset: raw.offset as u32,
            }),
        }
    }
}
