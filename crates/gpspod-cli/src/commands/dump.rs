//! Full region dump.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use tracing::info;

use gpspod_pmem::{Region, REGION_SIZE};

use crate::source::DataSource;
use crate::Cli;

const STEP: u32 = 0x8000;

pub fn run(cli: &Cli, path: &Path) -> Result<()> {
    let mut source = DataSource::open(cli)?;
    let mut file = std::fs::File::create(path)?;

    let mut offset = 0u32;
    while offset < REGION_SIZE {
        let len = STEP.min(REGION_SIZE - offset);
        let chunk = source.read(offset, len)?;
        file.write_all(&chunk)?;
        offset += len;
        info!(
            done = format_args!("{offset:#x}"),
            total = format_args!("{REGION_SIZE:#x}"),
            "dumping"
        );
    }
    file.flush()?;
    println!("Wrote {REGION_SIZE} bytes to {}.", path.display());
    Ok(())
}
