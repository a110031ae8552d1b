use thiserror::Error;

/// Which decoder rejected a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Eeg,
    Control,
    Telemetry,
}

impl std::fmt::Display for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PacketKind::Eeg => "EEG",
            PacketKind::Control => "control",
            PacketKind::Telemetry => "telemetry",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed {kind} packet: expected {expected} bytes, got {actual}")]
    MalformedPacket {
        kind: PacketKind,
        expected: usize,
        actual: usize,
    },
}
