//! `cpal`-backed concrete [`AudioCapture`] implementation.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};
use tracing::{error, info, warn};

use super::{device, AudioCapture};
use crate::buffering::{AudioProducer, Producer};
use crate::error::{BazaarError, Result};

/// Handle to an active audio capture stream.
///
/// **Not `Send` on some platforms** in the underlying `cpal::Stream`, but we
/// require it own the OS thread that created it for its whole lifetime —
/// the pipeline enforces this by running capture inside `spawn_blocking`.
pub struct CpalCapture {
    #[cfg(feature = "audio-cpal")]
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    preferred_device_name: Option<String>,
    producer: Option<AudioProducer>,
    /// Actual capture sample rate reported by the device (Hz), once started.
    pub sample_rate: Option<u32>,
}

impl CpalCapture {
    pub fn new(producer: AudioProducer, preferred_device_name: Option<String>) -> Self {
        Self {
            #[cfg(feature = "audio-cpal")]
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            preferred_device_name,
            producer: Some(producer),
            sample_rate: None,
        }
    }

    #[cfg(feature = "audio-cpal")]
    fn open(&mut self) -> Result<()> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut devices: Vec<(String, cpal::Device)> = host
            .input_devices()
            .map_err(|e| BazaarError::HardwareError(e.to_string()))?
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                (name, device)
            })
            .collect();
        if devices.is_empty() {
            return Err(BazaarError::NoDefaultInputDevice);
        }

        let default_name = host.default_input_device().and_then(|d| d.name().ok());
        let preferred_idx = self.preferred_device_name.as_deref().and_then(|preferred| {
            devices.iter().position(|(name, _)| name.as_str() == preferred)
        });
        let default_idx = default_name
            .as_deref()
            .and_then(|name| devices.iter().position(|(n, _)| n.as_str() == name));
        let best_non_loopback_idx = devices
            .iter()
            .enumerate()
            .filter(|(_, (name, _))| !device::is_loopback_like_name(name))
            .max_by_key(|(_, (name, _))| device::mic_preference_score(name))
            .map(|(idx, _)| idx);

        if self.preferred_device_name.is_some() && preferred_idx.is_none() {
            warn!(
                "preferred input device '{}' not found, falling back",
                self.preferred_device_name.as_deref().unwrap_or_default()
            );
        }

        let selected_idx = preferred_idx
            .or(default_idx)
            .or(best_non_loopback_idx)
            .unwrap_or(0);
        let (selected_name, device) = devices.swap_remove(selected_idx);

        info!(device = selected_name.as_str(), "opening input device");

        let supported = device
            .default_input_config()
            .map_err(|e| BazaarError::HardwareError(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();

        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let running = Arc::clone(&self.running);
        let paused = Arc::clone(&self.paused);
        let mut producer = self.producer.take().expect("producer present until started");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let ch = channels as usize;
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !running.load(Ordering::Relaxed) || paused.load(Ordering::Relaxed) {
                            return;
                        }
                        if ch == 1 {
                            let written = producer.push_slice(data);
                            if written < data.len() {
                                warn!("ring buffer full: dropped {} f32 samples", data.len() - written);
                            }
                            return;
                        }
                        let frames = data.len() / ch;
                        mix_buf.resize(frames, 0.0);
                        for f in 0..frames {
                            let base = f * ch;
                            mix_buf[f] = data[base..base + ch].iter().sum::<f32>() / ch as f32;
                        }
                        let written = producer.push_slice(&mix_buf);
                        if written < mix_buf.len() {
                            warn!("ring buffer full: dropped {} f32 samples", mix_buf.len() - written);
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }
            SampleFormat::I16 => {
                let ch = channels as usize;
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !running.load(Ordering::Relaxed) || paused.load(Ordering::Relaxed) {
                            return;
                        }
                        let frames = data.len() / ch;
                        mix_buf.resize(frames, 0.0);
                        for f in 0..frames {
                            let base = f * ch;
                            let sum: f32 = data[base..base + ch].iter().map(|&s| s as f32 / 32768.0).sum();
                            mix_buf[f] = sum / ch as f32;
                        }
                        let written = producer.push_slice(&mix_buf);
                        if written < mix_buf.len() {
                            warn!("ring buffer full: dropped {} i16-derived samples", mix_buf.len() - written);
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }
            fmt => return Err(BazaarError::HardwareError(format!("unsupported sample format: {fmt:?}"))),
        }
        .map_err(|e| BazaarError::HardwareError(e.to_string()))?;

        stream.play().map_err(|e| BazaarError::HardwareError(e.to_string()))?;

        self.stream = Some(stream);
        self.sample_rate = Some(sample_rate);
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    #[cfg(not(feature = "audio-cpal"))]
    fn open(&mut self) -> Result<()> {
        Err(BazaarError::HardwareError("compiled without audio-cpal feature".into()))
    }
}

impl AudioCapture for CpalCapture {
    fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }
        self.open()
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        #[cfg(feature = "audio-cpal")]
        {
            self.stream = None;
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.paused.store(true, Ordering::Release);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.paused.store(false, Ordering::Release);
        Ok(())
    }
}
