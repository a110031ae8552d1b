use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use tokio::sync::mpsc;

use muse_stream::muse_client::{MuseClient, MuseClientConfig};
use muse_stream::protocol::EEG_CHANNEL_NAMES;
use muse_stream::session::{Session, SessionConfig};
use muse_stream::types::{Diagnostic, SessionEvent};

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    //   RUST_LOG=muse_stream=debug cargo run -- 00:55:DA:BB:86:C9
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Configuration ─────────────────────────────────────────────────────────
    // Optional first argument: the headset's address. Without it the first
    // device advertising "Muse…" is used.
    let config = MuseClientConfig {
        address: std::env::args().nth(1),
        preset: Some("p21".into()),
        ..Default::default()
    };

    // ── Connect ───────────────────────────────────────────────────────────────
    let client = MuseClient::new(config);
    info!("Connecting to Muse headset …");
    let (notifications, handle) = client.connect().await?;

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let worker = tokio::spawn(Session::new(SessionConfig::default()).run(notifications, event_tx));

    handle.start().await?;
    info!("Streaming started. Press Ctrl-C to stop.");

    // ── Event loop ────────────────────────────────────────────────────────────
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Sample(sample)) => {
                    let Some(first) = sample.samples().next() else {
                        continue;
                    };
                    let columns: Vec<String> = EEG_CHANNEL_NAMES
                        .iter()
                        .zip(first.data)
                        .map(|(name, value)| format!("{name}={value:+8.2}"))
                        .collect();
                    println!(
                        "[EEG] idx={:5}  ts={:.4}  {}",
                        sample.counter,
                        first.timestamp,
                        columns.join(" ")
                    );
                }
                Some(SessionEvent::Control(resp)) => println!("[CONTROL] {}", resp.raw),
                Some(SessionEvent::Telemetry(t)) => {
                    println!("[TELEMETRY] seq={:5}  battery={:.1}%", t.sequence_id, t.battery)
                }
                Some(SessionEvent::Diagnostic(Diagnostic::DataLoss { missing, .. })) => {
                    warn!("{missing} samples lost");
                }
                Some(SessionEvent::Diagnostic(Diagnostic::MalformedPacket { .. })) => {}
                None => {
                    info!("Device disconnected.");
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("Stopping …");
                if let Err(e) = handle.pause().await {
                    error!("Pause error: {e}");
                }
                handle.disconnect().await.ok();
                break;
            }
        }
    }

    drop(events);
    if let Ok(Ok(session)) = tokio::time::timeout(Duration::from_secs(2), worker).await {
        info!(
            "Session ended at sample {} (slope {:.9} s/sample)",
            session.clock().sample_index,
            session.clock().slope
        );
    }
    Ok(())
}
