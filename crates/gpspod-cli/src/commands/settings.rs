//! Settings blob access.

use anyhow::{anyhow, Result};

use gpspod_device::SETTINGS_REGION_OFFSET;
use gpspod_pmem::Region;
use gpspod_protocol::commands::SETTINGS_SIZE;

use crate::error::CliError;
use crate::source::DataSource;
use crate::Cli;

pub fn get(cli: &Cli) -> Result<()> {
    let mut source = DataSource::open(cli)?;
    let blob = source.read(SETTINGS_REGION_OFFSET, SETTINGS_SIZE as u32)?;
    for (row, chunk) in blob.chunks(16).enumerate() {
        print!("{:04x}:", row * 16);
        for byte in chunk {
            print!(" {byte:02x}");
        }
        println!();
    }
    Ok(())
}

pub fn set(cli: &Cli, offset: u32, hex: &str) -> Result<()> {
    let bytes = parse_hex(hex)?;
    if bytes.is_empty() {
        return Err(anyhow!(CliError::Usage("no bytes to write".into())));
    }
    if offset as usize + bytes.len() > SETTINGS_SIZE {
        return Err(anyhow!(CliError::Usage(format!(
            "write of {} bytes at offset {offset} exceeds the {SETTINGS_SIZE}-byte settings blob",
            bytes.len()
        ))));
    }

    let mut source = DataSource::open(cli)?;
    let pod = source.pod().ok_or_else(|| {
        anyhow!(CliError::Usage(
            "settings set needs a device; --fs is read-only".into()
        ))
    })?;
    pod.write_setting(offset, &bytes)?;
    println!("Wrote {} bytes at settings offset {offset}.", bytes.len());
    Ok(())
}

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    if cleaned.len() % 2 != 0 {
        return Err(anyhow!(CliError::Usage(
            "hex string has an odd number of digits".into()
        )));
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&cleaned[i..i + 2], 16)
                .map_err(|_| anyhow!(CliError::Usage(format!("invalid hex near '{}'", &cleaned[i..i + 2]))))
        })
        .collect()
}
