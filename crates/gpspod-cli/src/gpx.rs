//! GPX 1.1 output for decoded tracks.

use anyhow::Result;
use chrono::NaiveDateTime;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use gpspod_pmem::tracks::{Track, TrackSample};

const GPX_NS: &str = "http://www.topografix.com/GPX/1/1";
const GPXDATA_NS: &str = "http://www.cluetrust.com/XML/GPXDATA/1/0";
const SCHEMA_LOCATION: &str = "http://www.topografix.com/GPX/1/1 \
http://www.topografix.com/GPX/1/1/gpx.xsd \
http://www.cluetrust.com/XML/GPXDATA/1/0 \
http://www.cluetrust.com/Schemas/gpxdata10.xsd";

#[derive(Debug, Clone, Copy)]
pub struct GpxOptions {
    /// Start a new `<trkseg>` at each lap.
    pub lap_splits_segment: bool,
    /// Emit a `<wpt>` per lap marker.
    pub lap_adds_waypoint: bool,
    /// Emit `<trkpt>` elements; off writes lap events only.
    pub write_points: bool,
}

impl Default for GpxOptions {
    fn default() -> Self {
        Self {
            lap_splits_segment: true,
            lap_adds_waypoint: true,
            write_points: true,
        }
    }
}

type XmlWriter = Writer<Vec<u8>>;

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn iso_time(time: NaiveDateTime) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn point_start(name: &'static str, latitude: f64, longitude: f64) -> BytesStart<'static> {
    let mut start = BytesStart::new(name);
    start.push_attribute(("lat", format!("{latitude:.7}").as_str()));
    start.push_attribute(("lon", format!("{longitude:.7}").as_str()));
    start
}

fn write_point_body(writer: &mut XmlWriter, sample: &TrackSample) -> Result<()> {
    if let Some(altitude) = sample.altitude {
        text_element(writer, "ele", &altitude.to_string())?;
    }
    if let Some(time) = sample.time {
        text_element(writer, "time", &iso_time(time))?;
    }
    if let Some(speed) = sample.speed {
        text_element(writer, "speed", &format!("{:.3}", f64::from(speed) / 100.0))?;
    }
    if let Some(ehpe) = sample.ehpe {
        // EHPE is centimetres; hdop is conventionally metres here.
        text_element(writer, "hdop", &format!("{:.2}", f64::from(ehpe) / 100.0))?;
    }
    if let Some(satellites) = sample.satellites {
        text_element(writer, "sat", &satellites.to_string())?;
    }
    if sample.heartrate.is_some() || sample.distance.is_some() {
        writer.write_event(Event::Start(BytesStart::new("extensions")))?;
        if let Some(heartrate) = sample.heartrate {
            text_element(writer, "gpxdata:hr", &heartrate.to_string())?;
        }
        if let Some(distance) = sample.distance {
            text_element(writer, "gpxdata:distance", &distance.to_string())?;
        }
        writer.write_event(Event::End(BytesEnd::new("extensions")))?;
    }
    Ok(())
}

/// The periodic fields closest in time to each GPS point travel with it, so
/// heart rate and distance show up on the emitted points.
fn consolidated_points(track: &Track) -> Vec<TrackSample> {
    let mut points = Vec::new();
    let mut carried = TrackSample::default();
    for sample in &track.samples {
        if sample.heartrate.is_some()
            || sample.distance.is_some()
            || sample.cadence.is_some()
            || sample.temperature.is_some()
        {
            carried = sample.clone();
        }
        if let Some(position) = sample.position {
            let mut point = sample.clone();
            point.position = Some(position);
            point.heartrate = point.heartrate.or(carried.heartrate);
            point.distance = point.distance.or(carried.distance);
            points.push(point);
        }
    }
    points
}

/// Serialise one track. Returns the document bytes.
pub fn write_gpx(track: &Track, options: &GpxOptions) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut gpx = BytesStart::new("gpx");
    gpx.push_attribute(("creator", "gpspod"));
    gpx.push_attribute(("version", "1.1"));
    gpx.push_attribute(("xmlns", GPX_NS));
    gpx.push_attribute(("xmlns:gpxdata", GPXDATA_NS));
    gpx.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
    gpx.push_attribute(("xsi:schemaLocation", SCHEMA_LOCATION));
    writer.write_event(Event::Start(gpx))?;

    if options.lap_adds_waypoint {
        for (index, lap) in track.laps.iter().enumerate() {
            let Some(position) = lap.position else {
                continue;
            };
            writer.write_event(Event::Start(point_start(
                "wpt",
                position.latitude,
                position.longitude,
            )))?;
            if let Some(time) = lap.time {
                text_element(&mut writer, "time", &iso_time(time))?;
            }
            let name = if lap.event == 1 {
                format!("Manual waypoint {}", index + 1)
            } else {
                format!("Waypoint {}", index + 1)
            };
            text_element(&mut writer, "name", &name)?;
            text_element(
                &mut writer,
                "cmt",
                &format!("Lap at {} m, {} s into the track", lap.distance, lap.duration),
            )?;
            writer.write_event(Event::End(BytesEnd::new("wpt")))?;
        }
    }

    writer.write_event(Event::Start(BytesStart::new("trk")))?;
    text_element(
        &mut writer,
        "name",
        &track.start_time.format("Track %Y-%m-%d %H:%M:%S").to_string(),
    )?;

    if options.write_points {
        let points = consolidated_points(track);
        let lap_times: Vec<NaiveDateTime> =
            track.laps.iter().filter_map(|lap| lap.time).collect();
        let mut next_lap = 0usize;

        writer.write_event(Event::Start(BytesStart::new("trkseg")))?;
        for point in &points {
            if options.lap_splits_segment {
                if let Some(time) = point.time {
                    while next_lap < lap_times.len() && lap_times[next_lap] <= time {
                        writer.write_event(Event::End(BytesEnd::new("trkseg")))?;
                        writer.write_event(Event::Start(BytesStart::new("trkseg")))?;
                        next_lap += 1;
                    }
                }
            }
            let Some(position) = point.position else {
                continue;
            };
            writer.write_event(Event::Start(point_start(
                "trkpt",
                position.latitude,
                position.longitude,
            )))?;
            write_point_body(&mut writer, point)?;
            writer.write_event(Event::End(BytesEnd::new("trkpt")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("trkseg")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("trk")))?;
    writer.write_event(Event::End(BytesEnd::new("gpx")))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gpspod_pmem::tracks::{GeoPosition, TrackLap};

    fn minute(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 10, 26)
            .and_then(|d| d.and_hms_opt(20, 11, second))
            .expect("valid time")
    }

    fn sample(second: u32, lat: f64) -> TrackSample {
        TrackSample {
            time: Some(minute(second)),
            position: Some(GeoPosition {
                latitude: lat,
                longitude: 4.5,
            }),
            altitude: Some(12),
            speed: Some(300),
            ehpe: Some(250),
            ..Default::default()
        }
    }

    fn test_track() -> Track {
        Track {
            start_time: minute(6),
            duration: 60,
            distance: 500,
            interval: 1,
            declared_samples: 3,
            samples: vec![
                TrackSample {
                    time: Some(minute(6)),
                    heartrate: Some(140),
                    distance: Some(10),
                    ..Default::default()
                },
                sample(7, 52.1),
                sample(8, 52.2),
                sample(9, 52.3),
            ],
            laps: vec![TrackLap {
                event: 1,
                time: Some(minute(8)),
                duration: 2,
                distance: 200,
                position: Some(GeoPosition {
                    latitude: 52.2,
                    longitude: 4.5,
                }),
            }],
            truncated: false,
        }
    }

    fn render(options: &GpxOptions) -> String {
        String::from_utf8(write_gpx(&test_track(), options).expect("gpx")).expect("utf-8")
    }

    #[test]
    fn one_trkpt_per_gps_sample() {
        let text = render(&GpxOptions::default());
        assert_eq!(text.matches("<trkpt").count(), 3);
        assert!(text.contains("lat=\"52.1000000\""));
        assert!(text.contains("<time>2016-10-26T20:11:07Z</time>"));
    }

    #[test]
    fn periodic_fields_travel_with_points() {
        let text = render(&GpxOptions::default());
        assert!(text.contains("<gpxdata:hr>140</gpxdata:hr>"));
        assert!(text.contains("<gpxdata:distance>10</gpxdata:distance>"));
    }

    #[test]
    fn lap_adds_waypoint() {
        let text = render(&GpxOptions::default());
        assert_eq!(text.matches("<wpt").count(), 1);
        assert!(text.contains("Manual waypoint 1"));

        let without = render(&GpxOptions {
            lap_adds_waypoint: false,
            ..Default::default()
        });
        assert_eq!(without.matches("<wpt").count(), 0);
    }

    #[test]
    fn lap_splits_segments() {
        let text = render(&GpxOptions::default());
        assert_eq!(text.matches("<trkseg>").count(), 2);

        let unsplit = render(&GpxOptions {
            lap_splits_segment: false,
            ..Default::default()
        });
        assert_eq!(unsplit.matches("<trkseg>").count(), 1);
    }

    #[test]
    fn no_write_points_keeps_laps_only() {
        let text = render(&GpxOptions {
            write_points: false,
            ..Default::default()
        });
        assert_eq!(text.matches("<trkpt").count(), 0);
        assert_eq!(text.matches("<wpt").count(), 1);
    }

    #[test]
    fn hdop_converts_centimetres() {
        let text = render(&GpxOptions::default());
        assert!(text.contains("<hdop>2.50</hdop>"));
    }
}
