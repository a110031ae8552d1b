use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use muse_stream::prelude::*;
use muse_stream::protocol::EEG_SCALE;

const T0: f64 = 1_700_000_000.0;
const ELECTRODES: [Electrode; 4] = [Electrode::Tp9, Electrode::Af7, Electrode::Af8, Electrode::Tp10];

/// Pack a classic EEG notification from raw 12-bit readings.
fn eeg_payload(counter: u16, raw: [u16; 12]) -> Vec<u8> {
    let mut out = counter.to_be_bytes().to_vec();
    for pair in raw.chunks(2) {
        out.push((pair[0] >> 4) as u8);
        out.push((((pair[0] & 0x0F) << 4) | (pair[1] >> 8)) as u8);
        out.push(pair[1] as u8);
    }
    out
}

fn flat(raw: u16) -> [u16; 12] {
    [raw; 12]
}

fn samples(events: &[SessionEvent]) -> Vec<&CompletedSample> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Sample(s) => Some(s),
            _ => None,
        })
        .collect()
}

#[test]
fn one_minute_without_gaps_yields_1280_monotonic_blocks() {
    let mut rng = StdRng::seed_from_u64(60);
    let mut session = Session::new(SessionConfig::default());
    let mut events = Vec::new();

    // Start close to the top of the counter so the stream rolls over.
    let first_counter: u16 = 65_000;
    for k in 0..1280u32 {
        let counter = first_counter.wrapping_add(k as u16);
        let delivered = T0 + f64::from(12 * k + 11) / 256.0 + rng.random_range(-0.003..0.003);
        for (j, electrode) in ELECTRODES.into_iter().enumerate() {
            let n = RawNotification::new(
                Channel::Eeg(electrode),
                eeg_payload(counter, flat(2048 + j as u16)),
                delivered + j as f64 * 0.0005,
            );
            session.feed(&n, &mut events);
        }
    }

    assert!(
        !events.iter().any(|e| matches!(e, SessionEvent::Diagnostic(_))),
        "unexpected diagnostics"
    );
    let out = samples(&events);
    assert_eq!(out.len(), 256 * 60 / 12);
    assert!(out
        .windows(2)
        .all(|w| w[1].last_timestamp() > w[0].last_timestamp()));
    for block in &out {
        assert!(block.timestamps.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(block.channel(Electrode::Af7)[0], EEG_SCALE);
    }
    assert_eq!(session.clock().sample_index, 1280 * 12);
    assert!((session.clock().slope - 1.0 / 256.0).abs() < 1e-5);
}

#[test]
fn dropped_block_shifts_later_timestamps() {
    let mut session = Session::default();
    let mut events = Vec::new();

    let mut feed = |counter: u16, k: u32, events: &mut Vec<SessionEvent>| {
        let t = T0 + f64::from(12 * k + 11) / 256.0;
        for electrode in ELECTRODES {
            let n = RawNotification::new(Channel::Eeg(electrode), eeg_payload(counter, flat(2048)), t);
            session.feed(&n, events);
        }
    };
    feed(10, 0, &mut events);
    feed(11, 1, &mut events);
    // Counter 12 never arrives.
    feed(13, 3, &mut events);

    let loss: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Diagnostic(d) => Some(d.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        loss,
        vec![Diagnostic::DataLoss {
            previous: 11,
            counter: 13,
            missing: 36
        }]
    );

    let out = samples(&events);
    assert_eq!(out.len(), 3);
    // 24 delivered samples plus 36 lost ones precede the third block.
    assert_eq!(session.clock().sample_index, 72);
    let offset = out[2].timestamps[0] - out[0].timestamps[0];
    assert!((offset / session.clock().slope - 60.0).abs() < 1e-3, "offset {offset}");
}

#[test]
fn handles_drive_the_same_pipeline() {
    let mut session = Session::default();
    let mut events = Vec::new();

    let mut control = vec![8u8];
    control.extend_from_slice(b"{\"rc\":0}");
    control.resize(20, 0);

    for handle in [32u16, 35, 38, 41, 14, 26, 99] {
        let Some(channel) = Channel::from_handle(handle) else {
            continue;
        };
        let payload = match channel {
            Channel::Eeg(_) => eeg_payload(1, flat(0)),
            Channel::Control => control.clone(),
            Channel::Telemetry => vec![0, 1, 0x32, 0x00, 0, 0, 0, 0, 0, 0],
        };
        session.feed(&RawNotification::new(channel, payload, T0), &mut events);
    }

    assert_eq!(events.len(), 3);
    match &events[0] {
        SessionEvent::Sample(s) => {
            assert_eq!(s.channel(Electrode::Tp9)[0], -1000.0);
            assert_eq!(s.channel(Electrode::Tp10)[11], -1000.0);
        }
        other => panic!("expected a sample, got {other:?}"),
    }
    assert!(matches!(&events[1], SessionEvent::Control(r) if r.fields["rc"] == 0));
    assert!(matches!(&events[2], SessionEvent::Telemetry(t) if t.battery == 25.0));
}

#[test]
fn strict_policy_turns_missing_electrodes_into_gaps() {
    let mut session = Session::new(SessionConfig {
        flush_policy: FlushPolicy::RequireAllChannels,
        ..Default::default()
    });
    let mut events = Vec::new();

    for electrode in ELECTRODES {
        let n = RawNotification::new(Channel::Eeg(electrode), eeg_payload(1, flat(2048)), T0);
        session.feed(&n, &mut events);
    }
    for electrode in [Electrode::Af7, Electrode::Af8, Electrode::Tp10] {
        let n = RawNotification::new(Channel::Eeg(electrode), eeg_payload(2, flat(2048)), T0 + 0.05);
        session.feed(&n, &mut events);
    }
    assert_eq!(samples(&events).len(), 1);

    for electrode in ELECTRODES {
        let n = RawNotification::new(Channel::Eeg(electrode), eeg_payload(3, flat(2048)), T0 + 0.1);
        session.feed(&n, &mut events);
    }
    assert_eq!(samples(&events).len(), 2);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Diagnostic(Diagnostic::DataLoss { previous: 1, counter: 3, .. })
    )));
}
