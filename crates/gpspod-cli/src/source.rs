//! Backend selection: live device, replayed session or dump file.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use tracing::info;

use gpspod_device::hid::HidTransport;
use gpspod_device::pdml;
use gpspod_device::{
    GpsPod, PacingConfig, RecordingTransport, ReplayLog, ReplayTransport, Session, Transport,
};
use gpspod_pmem::{PmemError, Region, REGION_SIZE};

use crate::error::CliError;
use crate::Cli;

fn pacing(cli: &Cli) -> PacingConfig {
    PacingConfig {
        read_timeout: std::time::Duration::from_millis(cli.read_timeout),
        sleep_minsize: cli.read_sleep_minsize,
        sleep_duration: std::time::Duration::from_millis(cli.read_sleep_duration),
    }
}

/// Load a recording, accepting both the native log format and PDML.
pub fn load_log(path: &Path) -> Result<ReplayLog> {
    let name = path.to_string_lossy();
    if name.ends_with(".xml") || name.ends_with(".pdml") {
        Ok(pdml::load_pdml(path)?)
    } else {
        Ok(ReplayLog::load(path)?)
    }
}

/// Open the transport selected by the global flags.
pub fn open_transport(cli: &Cli) -> Result<Box<dyn Transport>> {
    let inner: Box<dyn Transport> = if let Some(path) = &cli.playback {
        Box::new(ReplayTransport::new(load_log(path)?))
    } else {
        Box::new(HidTransport::open().context(
            "opening the GPS Track Pod; it enumerates slowly after plug-in, retry in a moment",
        )?)
    };

    if let Some(record) = &cli.record {
        let path = if record.is_empty() {
            Local::now().format("gpspod_%Y_%m_%d__%H_%M_%S.log").to_string()
        } else {
            record.clone()
        };
        info!(path, "recording session traffic");
        let recorder = RecordingTransport::create(inner, Path::new(&path))?;
        return Ok(Box::new(recorder));
    }
    Ok(inner)
}

/// Open a command session (live or replayed). Dump files cannot serve
/// commands.
pub fn open_session(cli: &Cli) -> Result<Session<Box<dyn Transport>>> {
    if cli.fs.is_some() {
        return Err(anyhow!(CliError::Usage(
            "this command needs a device; --fs only serves track and settings data".into()
        )));
    }
    Ok(Session::with_pacing(open_transport(cli)?, pacing(cli)))
}

/// Byte access to the data region, from whichever backend is selected.
pub enum DataSource {
    Pod(Box<GpsPod<Box<dyn Transport>>>),
    Dump(Vec<u8>),
}

impl DataSource {
    pub fn open(cli: &Cli) -> Result<Self> {
        if let Some(path) = &cli.fs {
            let bytes = std::fs::read(path)
                .with_context(|| format!("reading dump file {}", path.display()))?;
            if bytes.len() != REGION_SIZE as usize {
                return Err(anyhow!(CliError::Usage(format!(
                    "dump file is {} bytes, expected {:#x}",
                    bytes.len(),
                    REGION_SIZE
                ))));
            }
            return Ok(Self::Dump(bytes));
        }
        let session = Session::with_pacing(open_transport(cli)?, pacing(cli));
        Ok(Self::Pod(Box::new(GpsPod::new(session))))
    }

    pub fn pod(&mut self) -> Option<&mut GpsPod<Box<dyn Transport>>> {
        match self {
            Self::Pod(pod) => Some(pod),
            Self::Dump(_) => None,
        }
    }
}

impl Region for DataSource {
    fn read(&mut self, offset: u32, len: u32) -> Result<Vec<u8>, PmemError> {
        match self {
            Self::Pod(pod) => pod.read(offset, len).map_err(|error| PmemError::Fetch {
                offset,
                source: Box::new(error),
            }),
            Self::Dump(bytes) => bytes.read(offset, len),
        }
    }
}
