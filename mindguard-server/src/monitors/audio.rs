//! Ambient sound level monitor
//!
//! cpal captures on its own thread (a `cpal::Stream` is not `Send`); the
//! input callback pushes channel-0 samples into a lock-free ring buffer and
//! the async side reads the newest block every interval.
//!
//! Level = 20·log10(RMS) with RMS on the 16-bit integer scale, truncated to
//! an integer first, so digital silence produces no reading instead of -inf.

use crate::config::AudioConfig;
use crate::error::{Error, Result};
use crate::scoring::round_one_decimal;
use crate::state::SharedState;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use mindguard_common::SourceStatus;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapProd, HeapRb,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Ring capacity in blocks; the reader only ever keeps the newest block
const RING_BLOCKS: usize = 8;

const I16_FULL_SCALE: f64 = 32767.0;

/// Sound level in dB of a block of normalized samples
///
/// Returns `None` when the integer RMS is 0.
pub fn rms_db(samples: &[f32]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let v = f64::from(s) * I16_FULL_SCALE;
            v * v
        })
        .sum();
    let rms = (sum_squares / samples.len() as f64).sqrt().trunc();

    if rms > 0.0 {
        Some(round_one_decimal(20.0 * rms.log10()))
    } else {
        None
    }
}

/// Level of the newest full block in the ring, discarding anything older
pub fn read_level<C>(consumer: &mut C, block: &mut [f32]) -> Option<f64>
where
    C: Consumer<Item = f32>,
{
    let available = consumer.occupied_len();
    if available < block.len() {
        return None;
    }
    consumer.skip(available - block.len());
    let read = consumer.pop_slice(block);
    rms_db(&block[..read])
}

/// Microphone monitor task
pub struct AudioLevelMonitor {
    state: Arc<SharedState>,
    config: AudioConfig,
}

impl AudioLevelMonitor {
    pub fn new(state: Arc<SharedState>, config: AudioConfig) -> Self {
        Self { state, config }
    }

    /// Capture until shutdown or stream failure
    pub async fn run(self, shutdown: CancellationToken) {
        let block_len = self.config.buffer_frames.max(1);
        let (producer, mut consumer) = HeapRb::<f32>::new(block_len * RING_BLOCKS).split();

        let capture = match CaptureThread::spawn(
            self.config.device.clone(),
            self.config.sample_rate,
            producer,
        )
        .await
        {
            Ok(capture) => capture,
            Err(e) => {
                error!("Microphone unavailable: {}", e);
                self.state.set_mic_status(SourceStatus::Error).await;
                return;
            }
        };

        self.state.set_mic_status(SourceStatus::Listening).await;
        info!("Microphone monitor listening");

        let mut block = vec![0.0f32; block_len];
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if capture.failed() {
                error!("Microphone stream failed, stopping monitor");
                self.state.set_mic_status(SourceStatus::Error).await;
                break;
            }

            if let Some(db) = read_level(&mut consumer, &mut block) {
                debug!("Audio level {} dB", db);
                self.state.set_audio_db(db).await;
            }
        }

        info!("Microphone monitor stopped");
    }
}

/// Thread owning the cpal input stream
///
/// Dropping it stops the stream and joins the thread.
struct CaptureThread {
    stop_tx: Option<mpsc::Sender<()>>,
    error_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureThread {
    async fn spawn(device_name: Option<String>, sample_rate: u32, producer: HeapProd<f32>) -> Result<Self> {
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let error_flag = Arc::new(AtomicBool::new(false));
        let callback_flag = Arc::clone(&error_flag);

        let handle = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let stream = match open_input_stream(device_name, sample_rate, producer, callback_flag) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Returns on stop signal or when the sender is dropped
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Capture thread exiting");
            })?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                stop_tx: Some(stop_tx),
                error_flag,
                handle: Some(handle),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::DeviceUnavailable(
                "Capture thread exited during startup".to_string(),
            )),
        }
    }

    fn failed(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Select an input device, falling back to the host default
fn select_input_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .input_devices()
            .map_err(|e| Error::DeviceUnavailable(format!("Failed to enumerate input devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested input device: {}", name);
            return Ok(device);
        }
        warn!("Requested input device '{}' not found, falling back to default", name);
    }

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::DeviceUnavailable("No default input device found".to_string()))?;
    info!(
        "Using input device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

/// Preferred config at `sample_rate`, else the device default
fn best_input_config(device: &Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
    let preferred = device
        .supported_input_configs()
        .map_err(|e| Error::DeviceUnavailable(format!("Failed to get input configs: {}", e)))?
        .find(|c| c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate);

    if let Some(supported) = preferred {
        let format = supported.sample_format();
        return Ok((supported.with_sample_rate(cpal::SampleRate(sample_rate)).config(), format));
    }

    let supported = device
        .default_input_config()
        .map_err(|e| Error::DeviceUnavailable(format!("Failed to get default input config: {}", e)))?;
    let format = supported.sample_format();
    Ok((supported.config(), format))
}

fn open_input_stream(
    device_name: Option<String>,
    sample_rate: u32,
    producer: HeapProd<f32>,
    error_flag: Arc<AtomicBool>,
) -> Result<Stream> {
    let device = select_input_device(device_name.as_deref())?;
    let (config, format) = best_input_config(&device, sample_rate)?;

    debug!(
        "Input config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, format
    );

    let stream = match format {
        SampleFormat::F32 => build_capture_stream::<f32>(&device, &config, producer, error_flag)?,
        SampleFormat::I16 => build_capture_stream::<i16>(&device, &config, producer, error_flag)?,
        SampleFormat::U16 => build_capture_stream::<u16>(&device, &config, producer, error_flag)?,
        other => {
            return Err(Error::DeviceUnavailable(format!(
                "Unsupported input sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::DeviceUnavailable(format!("Failed to start input stream: {}", e)))?;
    Ok(stream)
}

fn build_capture_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut producer: HeapProd<f32>,
    error_flag: Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Channel 0 only; samples are dropped while the ring is full
                producer.push_iter(data.chunks(channels).map(|frame| f32::from_sample_(frame[0])));
            },
            move |err| {
                error!("Microphone stream error: {}", err);
                error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::DeviceUnavailable(format!("Failed to build input stream: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_db_of_constant_signal() {
        // 0.01 * 32767 = 327.67, truncated to 327 -> 50.29 dB
        assert_eq!(rms_db(&[0.01; 1024]), Some(50.3));
        assert_eq!(rms_db(&[-0.5; 1024]), Some(84.3));
    }

    #[test]
    fn test_rms_db_of_silence_is_skipped() {
        assert_eq!(rms_db(&[0.0; 1024]), None);
        // RMS below one integer step
        assert_eq!(rms_db(&[0.00001; 1024]), None);
        assert_eq!(rms_db(&[]), None);
    }

    #[test]
    fn test_read_level_uses_newest_block() {
        let (mut producer, mut consumer) = HeapRb::<f32>::new(4096).split();
        producer.push_iter(std::iter::repeat(0.5).take(2000));
        producer.push_iter(std::iter::repeat(0.01).take(1024));

        let mut block = vec![0.0f32; 1024];
        assert_eq!(read_level(&mut consumer, &mut block), Some(50.3));
        assert_eq!(consumer.occupied_len(), 0);
    }

    #[test]
    fn test_read_level_waits_for_full_block() {
        let (mut producer, mut consumer) = HeapRb::<f32>::new(4096).split();
        producer.push_iter(std::iter::repeat(0.5).take(100));

        let mut block = vec![0.0f32; 1024];
        assert_eq!(read_level(&mut consumer, &mut block), None);
        assert_eq!(consumer.occupied_len(), 100);
    }
}
