//! btleplug transport: scan, connect, subscribe, and forward notifications.
//!
//! The client does no decoding of its own. Each notification is stamped with
//! the host clock, tagged with its logical [`Channel`], and pushed onto a
//! bounded channel for a [`crate::session::Session`] worker to consume. The
//! channel closes when the headset disconnects.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::protocol::{
    command, encode_command, preset_command, CONTROL_CHARACTERISTIC, TELEMETRY_CHARACTERISTIC,
};
use crate::types::{Channel, Electrode, RawNotification};

/// Host clock in seconds since the Unix epoch.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

// ── MuseDevice ────────────────────────────────────────────────────────────────

/// A headset found by [`MuseClient::scan_all`].
#[derive(Clone, Debug)]
pub struct MuseDevice {
    /// Advertised name, e.g. `"Muse-1A2B"`.
    pub name: String,
    /// Platform identifier: a MAC address on Linux, a UUID on macOS/Windows.
    pub id: String,
    pub(crate) peripheral: Peripheral,
    pub(crate) adapter: Adapter,
}

// ── MuseClientConfig ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MuseClientConfig {
    /// Connect to this address (or platform id) instead of the first device
    /// whose name matches `name_prefix`. Default: `None`.
    pub address: Option<String>,
    /// Advertised-name prefix used when no address is given. Default: `"Muse"`.
    pub name_prefix: String,
    /// Scan duration in seconds before giving up. Default: `15`.
    pub scan_timeout_secs: u64,
    /// Subscribe to the AUX electrode as well. Default: `false`.
    pub enable_aux: bool,
    /// Subscribe to battery telemetry. Default: `true`.
    pub enable_telemetry: bool,
    /// Subscribe to control replies. Default: `true`.
    pub enable_control: bool,
    /// Preset to select on start, e.g. `"p21"`. Default: `None`.
    pub preset: Option<String>,
    /// Switch the status light off on start. Default: `false`.
    pub disable_light: bool,
    /// Capacity of the notification channel. Default: `256`.
    pub channel_capacity: usize,
}

impl Default for MuseClientConfig {
    fn default() -> Self {
        Self {
            address: None,
            name_prefix: "Muse".into(),
            scan_timeout_secs: 15,
            enable_aux: false,
            enable_telemetry: true,
            enable_control: true,
            preset: None,
            disable_light: false,
            channel_capacity: 256,
        }
    }
}

impl MuseClientConfig {
    fn matches(&self, name: Option<&str>, address: &str, id: &str) -> bool {
        match &self.address {
            Some(wanted) => wanted.eq_ignore_ascii_case(address) || wanted.eq_ignore_ascii_case(id),
            None => name.is_some_and(|n| n.starts_with(&self.name_prefix)),
        }
    }

    /// Characteristics to subscribe to, besides the control one.
    fn data_characteristics(&self) -> Vec<Uuid> {
        let mut uuids: Vec<Uuid> = Electrode::ALL
            .into_iter()
            .filter(|&e| self.enable_aux || e != Electrode::Aux)
            .map(Electrode::characteristic)
            .collect();
        if self.enable_telemetry {
            uuids.push(TELEMETRY_CHARACTERISTIC);
        }
        uuids
    }
}

// ── MuseClient ────────────────────────────────────────────────────────────────

pub struct MuseClient {
    config: MuseClientConfig,
}

impl MuseClient {
    pub fn new(config: MuseClientConfig) -> Self {
        Self { config }
    }

    /// Scan for the full timeout and return every matching headset.
    pub async fn scan_all(&self) -> Result<Vec<MuseDevice>> {
        let adapter = first_adapter().await?;

        info!("scan_all: scanning for {} s …", self.config.scan_timeout_secs);
        adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(Duration::from_secs(self.config.scan_timeout_secs)).await;
        adapter.stop_scan().await.ok();

        let mut found = vec![];
        for p in adapter.peripherals().await? {
            let Ok(Some(props)) = p.properties().await else {
                continue;
            };
            let id = p.id().to_string();
            let address = props.address.to_string();
            if self.config.matches(props.local_name.as_deref(), &address, &id) {
                let name = props.local_name.unwrap_or_else(|| address.clone());
                info!("scan_all: found {name}  id={id}");
                found.push(MuseDevice {
                    name,
                    id,
                    peripheral: p,
                    adapter: adapter.clone(),
                });
            }
        }
        info!("scan_all: {} device(s) found", found.len());
        Ok(found)
    }

    /// Connect to a device returned by [`MuseClient::scan_all`].
    pub async fn connect_to(
        &self,
        device: MuseDevice,
    ) -> Result<(mpsc::Receiver<RawNotification>, MuseHandle)> {
        self.setup_peripheral(device.peripheral, device.name, device.adapter)
            .await
    }

    /// Scan until the configured address (or the first name match) shows up,
    /// then connect.
    pub async fn connect(&self) -> Result<(mpsc::Receiver<RawNotification>, MuseHandle)> {
        let adapter = first_adapter().await?;

        match &self.config.address {
            Some(address) => info!("Scanning for {address} …"),
            None => info!(
                "Scanning for devices named {}* (timeout: {} s) …",
                self.config.name_prefix, self.config.scan_timeout_secs
            ),
        }
        adapter.start_scan(ScanFilter::default()).await?;
        let found = self.find_first(&adapter).await;
        adapter.stop_scan().await.ok();
        let (peripheral, name) = found?;

        info!("Found device: {name}");
        self.setup_peripheral(peripheral, name, adapter).await
    }

    async fn setup_peripheral(
        &self,
        peripheral: Peripheral,
        device_name: String,
        adapter: Adapter,
    ) -> Result<(mpsc::Receiver<RawNotification>, MuseHandle)> {
        // BlueZ can hang in Device1.Connect when the headset drifts out of range.
        tokio::time::timeout(Duration::from_secs(10), peripheral.connect())
            .await
            .map_err(|_| anyhow!("BLE connect() timed out after 10 s"))??;

        // BlueZ reports the link before its GATT cache is populated.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(Duration::from_secs(15), peripheral.discover_services())
            .await
            .map_err(|_| anyhow!("discover_services() timed out after 15 s"))??;
        info!("Connected and services discovered: {device_name}");

        let chars: BTreeSet<Characteristic> = peripheral.characteristics();
        let find_char = |uuid: Uuid| -> Result<Characteristic> {
            chars
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or_else(|| anyhow!("Characteristic {uuid} not found"))
        };

        let control_char = find_char(CONTROL_CHARACTERISTIC)?;
        if self.config.enable_control {
            peripheral.subscribe(&control_char).await?;
        }
        for uuid in self.config.data_characteristics() {
            match find_char(uuid) {
                Ok(c) => peripheral.subscribe(&c).await?,
                Err(e) => warn!("{e}; continuing without it"),
            }
        }

        let (tx, rx) = mpsc::channel::<RawNotification>(self.config.channel_capacity);
        let (gone_tx, gone_rx) = oneshot::channel::<()>();

        // The adapter event stream usually reports a dropped link well before
        // the notification stream ends.
        let peripheral_id = peripheral.id();
        tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Disconnect watcher: could not subscribe to adapter events: {e}");
                    return;
                }
            };
            while let Some(event) = events.next().await {
                if matches!(event, CentralEvent::DeviceDisconnected(ref id) if *id == peripheral_id)
                {
                    info!("Disconnect watcher: device {peripheral_id:?} disconnected.");
                    let _ = gone_tx.send(());
                    break;
                }
            }
        });

        let notifier = peripheral.clone();
        tokio::spawn(async move {
            let mut notifications = match notifier.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    warn!("could not open notification stream: {e}");
                    return;
                }
            };
            info!("Notification stream open, waiting for data…");
            let mut gone_rx = gone_rx;
            let mut forwarded: u64 = 0;

            loop {
                let notif = tokio::select! {
                    notif = notifications.next() => match notif {
                        Some(notif) => notif,
                        None => break,
                    },
                    Ok(()) = &mut gone_rx => break,
                };
                let arrival_time = now_secs();

                let Some(channel) = Channel::from_uuid(notif.uuid) else {
                    debug!("Unknown notification from {}", notif.uuid);
                    continue;
                };
                forwarded += 1;
                if forwarded <= 5 || forwarded % 5000 == 0 {
                    debug!("notification #{forwarded} {channel:?} len={}", notif.value.len());
                }
                let raw = RawNotification::new(channel, notif.value, arrival_time);
                if tx.send(raw).await.is_err() {
                    info!("Session dropped its receiver; stopping notification forwarding.");
                    break;
                }
            }
            info!("Notification stream ended after {forwarded} notifications.");
        });

        let handle = MuseHandle {
            peripheral,
            control_char,
            preset: self.config.preset.clone(),
            disable_light: self.config.disable_light,
        };
        Ok((rx, handle))
    }

    async fn find_first(&self, adapter: &Adapter) -> Result<(Peripheral, String)> {
        let timeout_secs = self.config.scan_timeout_secs;
        let search = async {
            loop {
                for p in adapter.peripherals().await.unwrap_or_default() {
                    let Ok(Some(props)) = p.properties().await else {
                        continue;
                    };
                    let address = props.address.to_string();
                    let id = p.id().to_string();
                    if self.config.matches(props.local_name.as_deref(), &address, &id) {
                        let name = props.local_name.unwrap_or(address);
                        return (p, name);
                    }
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(timeout_secs), search)
            .await
            .map_err(|_| anyhow!("Timed out scanning for a Muse device after {timeout_secs} s"))
    }
}

/// First Bluetooth adapter, ready to scan.
async fn first_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;

    // CBCentralManager ignores scan requests until it reaches PoweredOn.
    #[cfg(target_os = "macos")]
    {
        use btleplug::api::CentralState;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            match adapter.adapter_state().await {
                Ok(CentralState::PoweredOn) => break,
                Ok(state) if tokio::time::Instant::now() >= deadline => {
                    warn!("macOS: adapter still {state:?} after 3 s; scanning anyway");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("macOS: adapter_state() error: {e}");
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    Ok(adapter)
}

// ── MuseHandle ────────────────────────────────────────────────────────────────

/// Command interface to a connected headset.
pub struct MuseHandle {
    peripheral: Peripheral,
    control_char: Characteristic,
    preset: Option<String>,
    disable_light: bool,
}

impl MuseHandle {
    async fn write(&self, payload: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.control_char, payload, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    /// Send a raw command string such as `"d"` or `"v1"`.
    pub async fn send_command(&self, cmd: &str) -> Result<()> {
        self.write(&encode_command(cmd)).await
    }

    /// Select a preset; `"p21"` and `"21"` are equivalent.
    pub async fn select_preset(&self, preset: &str) -> Result<()> {
        self.write(&preset_command(preset)).await
    }

    /// Begin streaming: configured preset, optional light-off, keep-alive,
    /// then resume.
    pub async fn start(&self) -> Result<()> {
        if let Some(preset) = &self.preset {
            self.select_preset(preset).await?;
        }
        if self.disable_light {
            self.send_command(command::LIGHT_OFF).await?;
        }
        self.keep_alive().await?;
        self.resume().await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send_command(command::RESUME).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send_command(command::HALT).await
    }

    pub async fn keep_alive(&self) -> Result<()> {
        self.send_command(command::KEEP_ALIVE).await
    }

    pub async fn request_status(&self) -> Result<()> {
        self.send_command(command::STATUS).await
    }

    pub async fn request_device_info(&self) -> Result<()> {
        self.send_command(command::DEVICE_INFO).await
    }

    /// Soft-reset the headset. The reply is `{"rc":0}` on success.
    pub async fn reset_device(&self) -> Result<()> {
        self.send_command(command::RESET).await
    }

    pub async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EEG_CHARACTERISTICS;

    #[test]
    fn address_takes_precedence_over_name() {
        let config = MuseClientConfig {
            address: Some("00:55:da:bb:86:c9".into()),
            ..Default::default()
        };
        assert!(config.matches(None, "00:55:DA:BB:86:C9", "hci0/dev_00_55_DA_BB_86_C9"));
        assert!(!config.matches(Some("Muse-86C9"), "00:55:DA:BB:86:C8", "other"));
    }

    #[test]
    fn name_prefix_matches_without_address() {
        let config = MuseClientConfig::default();
        assert!(config.matches(Some("Muse-86C9"), "", ""));
        assert!(!config.matches(Some("Headphones"), "", ""));
        assert!(!config.matches(None, "", ""));
    }

    #[test]
    fn aux_and_telemetry_subscriptions_follow_config() {
        let default = MuseClientConfig::default().data_characteristics();
        assert_eq!(default[..4], EEG_CHARACTERISTICS[..4]);
        assert_eq!(default[4], TELEMETRY_CHARACTERISTIC);
        assert_eq!(default.len(), 5);

        let aux_only = MuseClientConfig {
            enable_aux: true,
            enable_telemetry: false,
            ..Default::default()
        }
        .data_characteristics();
        assert_eq!(aux_only, EEG_CHARACTERISTICS.to_vec());
    }
}
