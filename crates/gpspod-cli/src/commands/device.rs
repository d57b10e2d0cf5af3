//! Device-level commands: info, status, directory, clock.

use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDateTime, Timelike};

use gpspod_protocol::TimeOfDay;

use crate::error::CliError;
use crate::source::open_session;
use crate::Cli;

pub fn info(cli: &Cli) -> Result<()> {
    let mut session = open_session(cli)?;
    let info = session.device_info()?;
    println!("{info}");
    Ok(())
}

pub fn status(cli: &Cli) -> Result<()> {
    let mut session = open_session(cli)?;
    let status = session.device_status()?;
    println!("{status}");
    Ok(())
}

pub fn files(cli: &Cli) -> Result<()> {
    let mut session = open_session(cli)?;
    let entries = session.list_files()?;
    if entries.is_empty() {
        println!("No directory entries.");
        return Ok(());
    }
    for entry in entries {
        println!("{: <12} {: >9} bytes", entry.name, entry.size);
    }
    Ok(())
}

pub fn settime(cli: &Cli, iso: Option<&str>) -> Result<()> {
    let time = match iso {
        Some(text) => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
            .map_err(|e| anyhow!(CliError::Usage(format!("invalid --iso timestamp: {e}"))))?,
        None => Local::now().naive_local(),
    };
    let mut session = open_session(cli)?;
    session.set_time(to_time_of_day(&time))?;
    println!("Device time set to {}.", time.format("%Y-%m-%d %H:%M:%S"));
    Ok(())
}

fn to_time_of_day(time: &NaiveDateTime) -> TimeOfDay {
    use chrono::Datelike;
    TimeOfDay {
        year: time.year() as u16,
        month: time.month() as u8,
        day: time.day() as u8,
        hour: time.hour() as u8,
        minute: time.minute() as u8,
        ms: (time.second() * 1000) as u16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn seconds_fold_into_the_ms_field() {
        let time = NaiveDate::from_ymd_opt(2016, 10, 25)
            .and_then(|d| d.and_hms_opt(19, 53, 35))
            .expect("valid time");
        let tod = to_time_of_day(&time);
        assert_eq!(tod.year, 2016);
        assert_eq!(tod.minute, 53);
        assert_eq!(tod.ms, 35_000);
    }
}
