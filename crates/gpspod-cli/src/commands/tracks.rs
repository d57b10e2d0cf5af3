//! Track listing and retrieval.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use gpspod_pmem::tracks::read_tracks;

use crate::error::CliError;
use crate::gpx::{write_gpx, GpxOptions};
use crate::source::DataSource;
use crate::Cli;

pub fn list(cli: &Cli) -> Result<()> {
    let mut source = DataSource::open(cli)?;
    let decoded = read_tracks(&mut source)?;
    for warning in &decoded.warnings {
        eprintln!("warning: {warning}");
    }
    for (index, track) in decoded.tracks.iter().enumerate() {
        println!("{}", track.summary(index));
    }
    Ok(())
}

pub fn retrieve(
    cli: &Cli,
    index: usize,
    output: Option<&Path>,
    options: &GpxOptions,
) -> Result<()> {
    let mut source = DataSource::open(cli)?;
    let decoded = read_tracks(&mut source)?;
    for warning in &decoded.warnings {
        eprintln!("warning: {warning}");
    }

    let track = decoded.tracks.get(index).ok_or_else(|| {
        anyhow!(CliError::Usage(format!(
            "track index {index} out of range; valid range is 0-{}",
            decoded.tracks.len().saturating_sub(1)
        )))
    })?;

    let path: PathBuf = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(
            track
                .start_time
                .format("track_%Y_%m_%d__%H_%M_%S.gpx")
                .to_string(),
        ),
    };

    println!(
        "Retrieving track {index}, {} samples, writing to {}.",
        track.declared_samples,
        path.display()
    );
    let bytes = write_gpx(track, options)?;
    std::fs::write(&path, &bytes)?;
    println!("Done, wrote {} bytes to {}.", bytes.len(), path.display());
    Ok(())
}
