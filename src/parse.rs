//! Binary decoders for classic Muse BLE notification payloads.
//!
//! Every function here is pure and safe to call from any context.
//!
//! | Function | Characteristic | Format |
//! |---|---|---|
//! | [`decode_eeg`] | EEG (per electrode) | u16 BE counter + 12 × 12-bit BE, 0.48828125 µV/LSB |
//! | [`decode_control`] | Control | length byte + 19 character codes |
//! | [`decode_telemetry`] | Telemetry | 5 × u16 BE |

use crate::error::{DecodeError, PacketKind};
use crate::protocol::{
    BATTERY_DIVISOR, CONTROL_PAYLOAD_LEN, EEG_OFFSET, EEG_PAYLOAD_LEN, EEG_SAMPLES_PER_READING,
    EEG_SCALE, TELEMETRY_PAYLOAD_LEN,
};
use crate::types::{ControlFragment, EegFrame, Telemetry};

// ── EEG ──────────────────────────────────────────────────────────────────────

/// Decode a packed 12-bit unsigned array (big-endian, 3 bytes → 2 samples).
///
/// ```text
/// [AA BB CC] → sample0 = (AA << 4) | (BB >> 4)
///              sample1 = ((BB & 0x0F) << 8) | CC
/// ```
///
/// A trailing partial group yields whatever whole samples it contains.
pub fn decode_unsigned_12bit(data: &[u8]) -> Vec<u16> {
    let mut out = Vec::with_capacity(data.len() * 2 / 3);
    for group in data.chunks(3) {
        if let [a, b, ..] = *group {
            out.push((u16::from(a) << 4) | (u16::from(b) >> 4));
        }
        if let [_, b, c] = *group {
            out.push(((u16::from(b) & 0x0F) << 8) | u16::from(c));
        }
    }
    out
}

/// Convert a raw 12-bit reading to µV: `(raw − 2048) × 0.48828125`.
pub fn calibrate(raw: u16) -> f64 {
    EEG_SCALE * (f64::from(raw) - f64::from(EEG_OFFSET))
}

/// Decode one electrode notification.
///
/// The payload must be exactly 20 bytes: a big-endian u16 hardware counter
/// followed by twelve big-endian 12-bit samples.
pub fn decode_eeg(payload: &[u8]) -> Result<EegFrame, DecodeError> {
    if payload.len() != EEG_PAYLOAD_LEN {
        return Err(DecodeError::MalformedPacket {
            kind: PacketKind::Eeg,
            expected: EEG_PAYLOAD_LEN,
            actual: payload.len(),
        });
    }
    let counter = u16::from_be_bytes([payload[0], payload[1]]);
    let mut samples = [0.0; EEG_SAMPLES_PER_READING];
    for (slot, raw) in samples.iter_mut().zip(decode_unsigned_12bit(&payload[2..])) {
        *slot = calibrate(raw);
    }
    Ok(EegFrame { counter, samples })
}

// ── Control ──────────────────────────────────────────────────────────────────

/// Decode one control-channel notification.
///
/// Byte 0 declares how many of the following 19 bytes are meaningful; the
/// rest is filler. Bytes map one-to-one onto characters. Anything past the
/// 20th byte is ignored.
pub fn decode_control(payload: &[u8]) -> Result<ControlFragment, DecodeError> {
    if payload.len() < CONTROL_PAYLOAD_LEN {
        return Err(DecodeError::MalformedPacket {
            kind: PacketKind::Control,
            expected: CONTROL_PAYLOAD_LEN,
            actual: payload.len(),
        });
    }
    let length = payload[0];
    let text = payload[1..CONTROL_PAYLOAD_LEN]
        .iter()
        .take(usize::from(length))
        .map(|&b| char::from(b))
        .collect();
    Ok(ControlFragment { length, text })
}

// ── Telemetry ────────────────────────────────────────────────────────────────

/// Decode a telemetry notification.
///
/// | Bytes | Field |
/// |---|---|
/// | 0–1 | sequence tag |
/// | 2–3 | battery raw (÷ 512 → %) |
/// | 4–9 | unused |
pub fn decode_telemetry(payload: &[u8]) -> Result<Telemetry, DecodeError> {
    if payload.len() < TELEMETRY_PAYLOAD_LEN {
        return Err(DecodeError::MalformedPacket {
            kind: PacketKind::Telemetry,
            expected: TELEMETRY_PAYLOAD_LEN,
            actual: payload.len(),
        });
    }
    Ok(Telemetry {
        sequence_id: u16::from_be_bytes([payload[0], payload[1]]),
        battery: f64::from(u16::from_be_bytes([payload[2], payload[3]])) / BATTERY_DIVISOR,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn pack_eeg(counter: u16, raw: &[u16; 12]) -> Vec<u8> {
        let mut out = counter.to_be_bytes().to_vec();
        for pair in raw.chunks(2) {
            let (a, b) = (pair[0], pair[1]);
            out.push((a >> 4) as u8);
            out.push((((a & 0x0F) << 4) | (b >> 8)) as u8);
            out.push((b & 0xFF) as u8);
        }
        out
    }

    #[test]
    fn unpacks_twelve_bit_pairs() {
        assert_eq!(decode_unsigned_12bit(&[0xAB, 0xCD, 0xEF]), vec![0xABC, 0xDEF]);
        assert_eq!(decode_unsigned_12bit(&[0xAB, 0xCD]), vec![0xABC]);
        assert!(decode_unsigned_12bit(&[0xAB]).is_empty());
    }

    #[test]
    fn eeg_decode_inverts_calibration() {
        let microvolts = [
            0.0, 1.0, -1.0, 100.0, -100.0, 250.5, -250.5, 999.0, -999.0, 42.0, 0.48828125,
            -1000.0,
        ];
        let mut raw = [0u16; 12];
        for (r, uv) in raw.iter_mut().zip(microvolts) {
            *r = ((uv / EEG_SCALE).round() as i32 + 2048) as u16;
        }
        let frame = decode_eeg(&pack_eeg(0xBEEF, &raw)).unwrap();

        assert_eq!(frame.counter, 0xBEEF);
        for (decoded, uv) in frame.samples.iter().zip(microvolts) {
            assert_approx_eq!(*decoded, uv, EEG_SCALE / 2.0);
        }
    }

    #[test]
    fn eeg_extremes_span_two_millivolts() {
        let frame = decode_eeg(&pack_eeg(1, &[0, 0xFFF, 2048, 0, 0, 0, 0, 0, 0, 0, 0, 0])).unwrap();
        assert_eq!(frame.samples[0], -1000.0);
        assert_approx_eq!(frame.samples[1], 999.51171875, 1e-12);
        assert_eq!(frame.samples[2], 0.0);
    }

    #[test]
    fn eeg_rejects_wrong_length() {
        for len in [0, 18, 19, 21] {
            assert_eq!(
                decode_eeg(&vec![0; len]),
                Err(DecodeError::MalformedPacket {
                    kind: PacketKind::Eeg,
                    expected: 20,
                    actual: len
                })
            );
        }
    }

    #[test]
    fn control_keeps_only_declared_length() {
        let mut payload = vec![7u8];
        payload.extend_from_slice(b"{\"rc\":0}xxxxxxxxxxx");
        let fragment = decode_control(&payload).unwrap();
        assert_eq!(fragment.length, 7);
        assert_eq!(fragment.text, "{\"rc\":0");
    }

    #[test]
    fn control_length_is_capped_at_nineteen() {
        let mut payload = vec![0xFF];
        payload.extend(std::iter::repeat(b'a').take(19));
        payload.push(b'z');
        assert_eq!(decode_control(&payload).unwrap().text, "a".repeat(19));
    }

    #[test]
    fn control_rejects_short_payload() {
        assert!(matches!(
            decode_control(&[1, b'}']),
            Err(DecodeError::MalformedPacket { kind: PacketKind::Control, actual: 2, .. })
        ));
    }

    #[test]
    fn telemetry_reads_battery_from_second_field() {
        let payload = [0x00, 0x07, 0xC8, 0x00, 0, 0, 0, 0, 0, 0];
        let telemetry = decode_telemetry(&payload).unwrap();
        assert_eq!(telemetry.sequence_id, 7);
        assert_eq!(telemetry.battery, 100.0);
        assert!(decode_telemetry(&payload[..9]).is_err());
    }
}
