//! GATT UUIDs, BLE handles, sampling constants, and command encoding for the
//! classic Muse headband.
//!
//! All UUIDs live in the Muse vendor namespace
//! `273eXXXX-4c4d-454d-96be-f03bac821358`.

use uuid::Uuid;

use crate::types::{Channel, Electrode};

// ── Characteristics ───────────────────────────────────────────────────────────

/// Bidirectional control channel (BLE handle `0x000e`).
///
/// The host writes length-prefixed ASCII commands (see [`encode_command`]);
/// the headset answers with 20-byte fragments of a JSON object.
pub const CONTROL_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x273e0001_4c4d_454d_96be_f03bac821358);

/// Telemetry characteristic (BLE handle `0x001a`): battery and housekeeping.
pub const TELEMETRY_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x273e000b_4c4d_454d_96be_f03bac821358);

/// EEG per-electrode characteristics in [`Electrode`] order:
///
/// | Row | UUID suffix | Handle | Electrode |
/// |-----|-------------|--------|-----------|
/// | 0   | 0003        | 32     | TP9       |
/// | 1   | 0004        | 35     | AF7       |
/// | 2   | 0005        | 38     | AF8       |
/// | 3   | 0006        | 41     | TP10      |
/// | 4   | 0007        | 44     | AUX       |
pub const EEG_CHARACTERISTICS: [Uuid; 5] = [
    Uuid::from_u128(0x273e0003_4c4d_454d_96be_f03bac821358), // TP9
    Uuid::from_u128(0x273e0004_4c4d_454d_96be_f03bac821358), // AF7
    Uuid::from_u128(0x273e0005_4c4d_454d_96be_f03bac821358), // AF8
    Uuid::from_u128(0x273e0006_4c4d_454d_96be_f03bac821358), // TP10
    Uuid::from_u128(0x273e0007_4c4d_454d_96be_f03bac821358), // AUX
];

// ── Handles ───────────────────────────────────────────────────────────────────

/// Notification handle of the control characteristic.
pub const CONTROL_HANDLE: u16 = 14;

/// Notification handle of the telemetry characteristic.
pub const TELEMETRY_HANDLE: u16 = 26;

/// Handle of the TP9 characteristic; the others follow at a stride of
/// [`EEG_HANDLE_STRIDE`].
pub const EEG_FIRST_HANDLE: u16 = 32;

pub const EEG_HANDLE_STRIDE: u16 = 3;

// ── Sampling constants ────────────────────────────────────────────────────────

/// Nominal EEG sample rate in Hz.
pub const EEG_FREQUENCY: f64 = 256.0;

/// EEG samples per electrode notification (≈ 46.9 ms at 256 Hz).
pub const EEG_SAMPLES_PER_READING: usize = 12;

/// Rows in an assembled sample block, one per [`Electrode`].
pub const EEG_CHANNEL_COUNT: usize = 5;

/// Electrode names in row order.
pub const EEG_CHANNEL_NAMES: [&str; EEG_CHANNEL_COUNT] = ["TP9", "AF7", "AF8", "TP10", "AUX"];

/// µV per LSB: a 2 mVpp range over 12 bits.
pub const EEG_SCALE: f64 = 0.48828125;

/// Mid-scale raw value, mapped to 0 µV.
pub const EEG_OFFSET: u16 = 0x800;

/// Raw battery reading per percent of charge.
pub const BATTERY_DIVISOR: f64 = 512.0;

// ── Payload sizes ─────────────────────────────────────────────────────────────

/// 16-bit counter + 12 × 12-bit samples = 160 bits.
pub const EEG_PAYLOAD_LEN: usize = 20;

/// Length byte + 19 character codes.
pub const CONTROL_PAYLOAD_LEN: usize = 20;

/// Five big-endian u16 fields.
pub const TELEMETRY_PAYLOAD_LEN: usize = 10;

// ── Channel mapping ───────────────────────────────────────────────────────────

impl Channel {
    /// Map a notification handle to its logical channel.
    ///
    /// EEG handles sit at `32 + 3·row`; anything off that grid, and any
    /// handle other than the control and telemetry ones, maps to `None`.
    pub fn from_handle(handle: u16) -> Option<Channel> {
        match handle {
            CONTROL_HANDLE => Some(Channel::Control),
            TELEMETRY_HANDLE => Some(Channel::Telemetry),
            h if h >= EEG_FIRST_HANDLE && (h - EEG_FIRST_HANDLE) % EEG_HANDLE_STRIDE == 0 => {
                Electrode::from_row(usize::from((h - EEG_FIRST_HANDLE) / EEG_HANDLE_STRIDE))
                    .map(Channel::Eeg)
            }
            _ => None,
        }
    }

    /// Map a GATT characteristic UUID to its logical channel.
    pub fn from_uuid(uuid: Uuid) -> Option<Channel> {
        if uuid == CONTROL_CHARACTERISTIC {
            return Some(Channel::Control);
        }
        if uuid == TELEMETRY_CHARACTERISTIC {
            return Some(Channel::Telemetry);
        }
        EEG_CHARACTERISTICS
            .iter()
            .position(|&u| u == uuid)
            .and_then(Electrode::from_row)
            .map(Channel::Eeg)
    }
}

impl Electrode {
    /// The GATT characteristic carrying this electrode's samples.
    pub fn characteristic(self) -> Uuid {
        EEG_CHARACTERISTICS[self.row()]
    }
}

// ── Control commands ──────────────────────────────────────────────────────────

/// Encode a text command for the control characteristic.
///
/// ```text
/// byte 0     : command.len() + 1 (the trailing '\n' counts)
/// bytes 1..N : ASCII command
/// byte N+1   : 0x0A
/// ```
///
/// ```
/// # use muse_stream::protocol::encode_command;
/// assert_eq!(encode_command("d"), [0x02, b'd', 0x0a]);
/// ```
pub fn encode_command(cmd: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(cmd.len() + 2);
    bytes.push((cmd.len() + 1) as u8);
    bytes.extend_from_slice(cmd.as_bytes());
    bytes.push(b'\n');
    bytes
}

/// Encode a preset-select command. Accepts `"21"` as well as `"p21"`.
///
/// ```
/// # use muse_stream::protocol::preset_command;
/// assert_eq!(preset_command("p21"), preset_command("21"));
/// assert_eq!(preset_command("21"), [0x04, b'p', b'2', b'1', 0x0a]);
/// ```
pub fn preset_command(preset: &str) -> Vec<u8> {
    let digits = preset.strip_prefix('p').unwrap_or(preset);
    encode_command(&format!("p{digits}"))
}

/// Raw command strings understood by classic firmware.
pub mod command {
    pub const RESUME: &str = "d";
    pub const HALT: &str = "h";
    pub const KEEP_ALIVE: &str = "k";
    pub const STATUS: &str = "s";
    pub const DEVICE_INFO: &str = "v1";
    /// Undocumented; the reply is `{"rc":0}` on success.
    pub const RESET: &str = "*1";
    pub const LIGHT_OFF: &str = "L0";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_map_onto_electrode_rows() {
        assert_eq!(Channel::from_handle(32), Some(Channel::Eeg(Electrode::Tp9)));
        assert_eq!(Channel::from_handle(35), Some(Channel::Eeg(Electrode::Af7)));
        assert_eq!(Channel::from_handle(38), Some(Channel::Eeg(Electrode::Af8)));
        assert_eq!(Channel::from_handle(41), Some(Channel::Eeg(Electrode::Tp10)));
        assert_eq!(Channel::from_handle(44), Some(Channel::Eeg(Electrode::Aux)));
        assert_eq!(Channel::from_handle(14), Some(Channel::Control));
        assert_eq!(Channel::from_handle(26), Some(Channel::Telemetry));
    }

    #[test]
    fn off_grid_handles_are_unknown() {
        assert_eq!(Channel::from_handle(33), None);
        assert_eq!(Channel::from_handle(47), None);
        assert_eq!(Channel::from_handle(0), None);
    }

    #[test]
    fn uuids_round_trip_through_electrodes() {
        for row in 0..EEG_CHANNEL_COUNT {
            let electrode = Electrode::from_row(row).unwrap();
            assert_eq!(
                Channel::from_uuid(electrode.characteristic()),
                Some(Channel::Eeg(electrode))
            );
        }
        assert_eq!(Channel::from_uuid(CONTROL_CHARACTERISTIC), Some(Channel::Control));
        assert_eq!(Channel::from_uuid(TELEMETRY_CHARACTERISTIC), Some(Channel::Telemetry));
        assert_eq!(Channel::from_uuid(Uuid::nil()), None);
    }

    #[test]
    fn commands_are_length_prefixed_and_newline_terminated() {
        assert_eq!(encode_command(command::HALT), [0x02, 0x68, 0x0a]);
        assert_eq!(encode_command(command::DEVICE_INFO), [0x03, b'v', b'1', 0x0a]);
        assert_eq!(preset_command("p1045"), [0x06, b'p', b'1', b'0', b'4', b'5', 0x0a]);
    }
}
