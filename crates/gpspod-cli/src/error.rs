//! User-facing error reporting: one `<kind>: <reason>` line on stderr.

use gpspod_device::DeviceError;
use gpspod_pmem::PmemError;
use gpspod_protocol::ProtocolError;
use thiserror::Error;

/// CLI-level usage errors (bad arguments, out-of-range indices).
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
}

fn kind_of(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if let Some(device) = cause.downcast_ref::<DeviceError>() {
            return device.kind();
        }
        if let Some(pmem) = cause.downcast_ref::<PmemError>() {
            return pmem.kind();
        }
        if let Some(protocol) = cause.downcast_ref::<ProtocolError>() {
            return protocol.kind();
        }
        if cause.downcast_ref::<CliError>().is_some() {
            return "usage";
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return "transport";
        }
    }
    "usage"
}

/// Print the error and, for decode failures, the region offset it refers to.
pub fn report(err: &anyhow::Error) {
    let kind = kind_of(err);
    eprintln!("{kind}: {err:#}");
    for cause in err.chain() {
        if let Some(pmem) = cause.downcast_ref::<PmemError>() {
            if let Some(offset) = pmem.offset() {
                eprintln!("decode failed at region offset {offset:#x}");
            }
            break;
        }
    }
    if matches!(kind_of(err), "transport") {
        if err
            .chain()
            .any(|c| matches!(c.downcast_ref::<DeviceError>(), Some(DeviceError::Open(_) | DeviceError::NotFound)))
        {
            eprintln!("hint: the device is slow to enumerate after plug-in, try again");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_map_to_their_kind() {
        let err = anyhow::Error::new(DeviceError::Timeout(1000));
        assert_eq!(kind_of(&err), "transport");

        let err = anyhow::Error::new(DeviceError::Desync);
        assert_eq!(kind_of(&err), "packet");
    }

    #[test]
    fn decode_errors_map_to_decode() {
        let err = anyhow::Error::new(PmemError::UnknownTag {
            tag: 0x42,
            offset: 0x1234,
        });
        assert_eq!(kind_of(&err), "decode");
    }

    #[test]
    fn usage_errors_map_to_usage() {
        let err = anyhow::Error::new(CliError::Usage("track index out of range".into()));
        assert_eq!(kind_of(&err), "usage");
    }

    #[test]
    fn wrapped_protocol_errors_keep_their_kind() {
        let err = anyhow::Error::new(DeviceError::Protocol(ProtocolError::MessageCrc {
            computed: 1,
            stored: 2,
        }));
        assert_eq!(kind_of(&err), "protocol");
    }
}
