//! Heart-rate sensor monitor
//!
//! The sensor streams newline-terminated ASCII over a serial port, either
//! `BPM:<n>` (optionally followed by `,`-separated fields) or a bare number.
//! No sensor measures HRV here; it is estimated from heart rate.
//!
//! Port reads block, so a `spawn_blocking` reader feeds lines to the async
//! task over a channel.

use crate::config::SerialConfig;
use crate::error::{Error, Result};
use crate::state::SharedState;
use mindguard_common::SourceStatus;
use serde::Deserialize;
use serialport::SerialPortType;
use std::io::{BufRead, BufReader, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const BPM_PREFIX: &str = "BPM:";

/// HRV estimate derived from heart rate: `max(0, baseline - bpm)`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HrvProxy {
    pub baseline: f64,
}

impl Default for HrvProxy {
    fn default() -> Self {
        Self { baseline: 120.0 }
    }
}

impl HrvProxy {
    pub fn estimate(&self, bpm: f64) -> f64 {
        (self.baseline - bpm).max(0.0)
    }
}

/// Parse one sensor line into a heart-rate value
///
/// `BPM:78`, `BPM:78,HRV:50`, `noise BPM:78` and `78` all yield 78.
pub fn parse_bpm_line(line: &str) -> Option<f64> {
    let line = line.trim();

    let token = match line.find(BPM_PREFIX) {
        Some(idx) => {
            let rest = &line[idx + BPM_PREFIX.len()..];
            rest.split(|c: char| c == ',' || c.is_whitespace())
                .next()
                .unwrap_or_default()
        }
        None => line,
    };

    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// A serial port seen during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    pub name: String,
    /// Product and manufacturer strings, when the OS reports them
    pub description: String,
}

/// First candidate whose name or description contains any pattern
pub fn select_port<'a>(candidates: &'a [PortCandidate], patterns: &[String]) -> Option<&'a PortCandidate> {
    candidates.iter().find(|candidate| {
        patterns.iter().any(|pattern| {
            candidate.description.contains(pattern.as_str()) || candidate.name.contains(pattern.as_str())
        })
    })
}

/// Enumerate serial ports
pub fn available_candidates() -> Vec<PortCandidate> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Failed to enumerate serial ports: {}", e);
            return Vec::new();
        }
    };

    ports
        .into_iter()
        .map(|port| {
            let description = match &port.port_type {
                SerialPortType::UsbPort(info) => [info.product.as_deref(), info.manufacturer.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" "),
                SerialPortType::PciPort => "PCI".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                SerialPortType::Unknown => String::new(),
            };
            PortCandidate {
                name: port.port_name,
                description,
            }
        })
        .collect()
}

enum ReaderEvent {
    Line(String),
    Failed(String),
}

/// Source of serial port candidates
pub type PortEnumerator = fn() -> Vec<PortCandidate>;

/// Serial heart-rate monitor task
pub struct BiosignalMonitor {
    state: Arc<SharedState>,
    config: SerialConfig,
    hrv: HrvProxy,
    enumerate: PortEnumerator,
}

impl BiosignalMonitor {
    pub fn new(state: Arc<SharedState>, config: SerialConfig, hrv: HrvProxy) -> Self {
        Self {
            state,
            config,
            hrv,
            enumerate: available_candidates,
        }
    }

    /// Replace OS port enumeration
    pub fn with_port_enumerator(mut self, enumerate: PortEnumerator) -> Self {
        self.enumerate = enumerate;
        self
    }

    /// Configured port, else the first enumerated port matching a vendor pattern
    fn resolve_port(&self) -> Option<String> {
        if let Some(port) = &self.config.port {
            return Some(port.clone());
        }
        let candidates = (self.enumerate)();
        debug!("Serial candidates: {:?}", candidates);
        select_port(&candidates, &self.config.vendor_patterns).map(|c| c.name.clone())
    }

    /// Apply one received line: update bpm when valid, always refresh hrv
    pub async fn handle_line(&self, line: &str) {
        match parse_bpm_line(line) {
            Some(bpm) if bpm > 0.0 => {
                debug!("Heart rate {} bpm", bpm);
                self.state.set_bpm(bpm).await;
            }
            Some(_) => debug!("Ignoring non-positive heart rate: {:?}", line),
            None => debug!("Ignoring malformed sensor line: {:?}", line),
        }

        let bpm = self.state.bpm().await;
        self.state.set_hrv(self.hrv.estimate(bpm)).await;
    }

    /// Read the sensor until shutdown or a read error
    pub async fn run(self, shutdown: CancellationToken) {
        let Some(port_name) = self.resolve_port() else {
            warn!("No heart-rate sensor found, keeping simulated values");
            self.state.set_serial_status(SourceStatus::Disconnected).await;
            return;
        };

        self.state.set_serial_status(SourceStatus::Connecting).await;
        info!("Connecting to heart-rate sensor on {}", port_name);

        let port = match self.open_port(&port_name).await {
            Ok(port) => port,
            Err(e) => {
                error!("Failed to open {}: {}", port_name, e);
                self.state.set_serial_status(SourceStatus::Error).await;
                return;
            }
        };

        self.state.set_serial_port(Some(port_name.clone())).await;
        self.state.set_serial_status(SourceStatus::Active).await;
        info!("Heart-rate sensor active on {}", port_name);

        let (tx, mut rx) = mpsc::channel(64);
        let stop = Arc::new(AtomicBool::new(false));
        let reader = tokio::task::spawn_blocking({
            let stop = Arc::clone(&stop);
            move || read_lines(port, tx, stop)
        });

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(ReaderEvent::Line(line)) => self.handle_line(&line).await,
                    Some(ReaderEvent::Failed(e)) => {
                        error!("Serial read failed on {}: {}", port_name, e);
                        self.state.set_serial_status(SourceStatus::Error).await;
                        break;
                    }
                    None => {
                        self.state.set_serial_status(SourceStatus::Error).await;
                        break;
                    }
                }
            }
        }

        stop.store(true, Ordering::SeqCst);
        drop(rx);
        let _ = reader.await;
        info!("Heart-rate monitor stopped");
    }

    async fn open_port(&self, name: &str) -> Result<Box<dyn serialport::SerialPort>> {
        let builder = serialport::new(name, self.config.baud_rate)
            .timeout(Duration::from_millis(self.config.read_timeout_ms));

        tokio::task::spawn_blocking(move || builder.open())
            .await
            .map_err(|e| Error::DeviceUnavailable(format!("Serial open task failed: {}", e)))?
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))
    }
}

/// Blocking line reader; exits on stop flag, closed channel or read error
fn read_lines(port: Box<dyn serialport::SerialPort>, tx: mpsc::Sender<ReaderEvent>, stop: Arc<AtomicBool>) {
    let mut reader = BufReader::new(port);
    // A timed-out read leaves partial data in the buffer; keep it for the next read
    let mut line = String::new();

    while !stop.load(Ordering::SeqCst) {
        match reader.read_line(&mut line) {
            Ok(0) => continue,
            Ok(_) => {
                let complete = std::mem::take(&mut line);
                if tx.blocking_send(ReaderEvent::Line(complete)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                // Line noise that is not UTF-8
                line.clear();
            }
            Err(e) => {
                let _ = tx.blocking_send(ReaderEvent::Failed(e.to_string()));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefixed_and_bare_lines() {
        assert_eq!(parse_bpm_line("BPM:78\r\n"), Some(78.0));
        assert_eq!(parse_bpm_line("BPM:78,HRV:50"), Some(78.0));
        assert_eq!(parse_bpm_line("sensor BPM:64.5 ok"), Some(64.5));
        assert_eq!(parse_bpm_line("72"), Some(72.0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_bpm_line("garbage"), None);
        assert_eq!(parse_bpm_line("BPM:"), None);
        assert_eq!(parse_bpm_line(""), None);
        assert_eq!(parse_bpm_line("NaN"), None);
    }

    #[test]
    fn test_hrv_proxy_floors_at_zero() {
        let proxy = HrvProxy::default();
        assert_eq!(proxy.estimate(70.0), 50.0);
        assert_eq!(proxy.estimate(130.0), 0.0);
    }

    #[test]
    fn test_select_port_by_vendor_pattern() {
        let candidates = vec![
            PortCandidate {
                name: "/dev/ttyS0".to_string(),
                description: String::new(),
            },
            PortCandidate {
                name: "/dev/ttyACM0".to_string(),
                description: "Arduino Uno Arduino (www.arduino.cc)".to_string(),
            },
        ];
        let patterns = SerialConfig::default().vendor_patterns;

        let selected = select_port(&candidates, &patterns).unwrap();
        assert_eq!(selected.name, "/dev/ttyACM0");

        // Port names count too
        let usb = vec![PortCandidate {
            name: "/dev/ttyUSB0".to_string(),
            description: String::new(),
        }];
        assert_eq!(select_port(&usb, &patterns).unwrap().name, "/dev/ttyUSB0");

        assert!(select_port(&candidates[..1], &patterns).is_none());
    }

    #[tokio::test]
    async fn test_handle_line_updates_bpm_and_hrv() {
        let state = Arc::new(SharedState::new());
        let monitor = BiosignalMonitor::new(Arc::clone(&state), SerialConfig::default(), HrvProxy::default());

        monitor.handle_line("BPM:90").await;
        assert_eq!(state.bpm().await, 90.0);
        assert_eq!(state.hrv().await, 30.0);

        monitor.handle_line("BPM:130,HRV:5").await;
        assert_eq!(state.bpm().await, 130.0);
        assert_eq!(state.hrv().await, 0.0);
    }

    #[tokio::test]
    async fn test_malformed_line_keeps_bpm_but_refreshes_hrv() {
        let state = Arc::new(SharedState::new());
        state.set_hrv(99.0).await;
        let monitor = BiosignalMonitor::new(Arc::clone(&state), SerialConfig::default(), HrvProxy::default());

        monitor.handle_line("garbage").await;
        assert_eq!(state.bpm().await, 70.0);
        assert_eq!(state.hrv().await, 50.0);

        monitor.handle_line("BPM:0").await;
        assert_eq!(state.bpm().await, 70.0);
    }

    #[tokio::test]
    async fn test_open_failure_sets_error_status() {
        let state = Arc::new(SharedState::new());
        let config = SerialConfig {
            port: Some("/dev/mindguard-does-not-exist".to_string()),
            ..SerialConfig::default()
        };
        let monitor = BiosignalMonitor::new(Arc::clone(&state), config, HrvProxy::default());

        monitor.run(CancellationToken::new()).await;
        assert_eq!(state.serial_status().await, SourceStatus::Error);
        assert_eq!(state.serial_port().await, None);
        assert_eq!(state.bpm().await, 70.0);
    }

    #[tokio::test]
    async fn test_no_matching_port_runs_simulated() {
        let state = Arc::new(SharedState::new());
        let monitor = BiosignalMonitor::new(Arc::clone(&state), SerialConfig::default(), HrvProxy::default())
            .with_port_enumerator(Vec::new);

        tokio::time::timeout(Duration::from_secs(2), monitor.run(CancellationToken::new()))
            .await
            .expect("monitor should exit without a sensor");

        assert_eq!(state.serial_status().await, SourceStatus::Disconnected);
        assert_eq!(state.serial_port().await, None);
        assert_eq!(state.bpm().await, 70.0);
        assert_eq!(state.hrv().await, 50.0);
    }

    #[tokio::test]
    async fn test_unmatched_candidates_run_simulated() {
        fn onboard_only() -> Vec<PortCandidate> {
            vec![PortCandidate {
                name: "/dev/ttyS0".to_string(),
                description: String::new(),
            }]
        }

        let state = Arc::new(SharedState::new());
        let monitor = BiosignalMonitor::new(Arc::clone(&state), SerialConfig::default(), HrvProxy::default())
            .with_port_enumerator(onboard_only);

        monitor.run(CancellationToken::new()).await;
        assert_eq!(state.serial_status().await, SourceStatus::Disconnected);
        assert_eq!(state.serial_port().await, None);
    }
}
