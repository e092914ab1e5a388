//! Microphone capture via CPAL.
//!
//! Opens a mono input stream at the device's native rate and feeds every
//! callback through the VAD into the ring buffer. The data path lives in
//! [`CaptureShared`] so the stream callback, the continuous monitor, and
//! tests all work against the same object; [`AudioCapture`] owns the device
//! handle and the recording lifecycle around it.

use crate::audio::resample::resample;
use crate::audio::ring_buffer::RingBuffer;
use crate::audio::vad::{VadConfig, VoiceActivityDetector, compute_rms};
use crate::defaults;
use crate::error::{HoldspeakError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// Suppresses the ALSA/JACK/PipeWire chatter CPAL triggers while probing
/// backends. Harmless messages, but they bury the daemon's own output.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Device name patterns that are never useful for voice input.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "hdmi",
    "s/pdif",
    "digital output",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS.iter().any(|p| lower.contains(p))
}

/// List capture device names, with monitor/HDMI-style junk filtered out.
pub fn list_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| {
        cpal::default_host()
            .input_devices()
            .map(|it| it.collect::<Vec<_>>())
    })
    .map_err(|e| HoldspeakError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if !should_filter_device(&name) {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// State shared between the stream callback and everything else.
pub struct CaptureShared {
    ring: RingBuffer,
    vad: Mutex<VoiceActivityDetector>,
    /// Latest frame RMS as f32 bits, clamped to [0, 1]. For level meters.
    audio_level: AtomicU32,
    collecting: AtomicBool,
    source_rate: AtomicU32,
    /// Input gain as f32 bits, clamped to [0.5, 3.0] on set.
    gain: AtomicU32,
}

impl CaptureShared {
    pub fn new(vad_config: VadConfig) -> Self {
        Self {
            ring: RingBuffer::new(),
            vad: Mutex::new(VoiceActivityDetector::new(vad_config)),
            audio_level: AtomicU32::new(0),
            collecting: AtomicBool::new(false),
            source_rate: AtomicU32::new(defaults::SAMPLE_RATE),
            gain: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    /// The capture callback body: meter, gain, VAD, buffer.
    ///
    /// `frame` is mono audio at the hardware rate. Cheap enough for the audio
    /// thread: one RMS pass, one short-lived lock each on the VAD and the
    /// ring buffer.
    pub fn ingest(&self, frame: &[f32]) {
        let rms = compute_rms(frame).clamp(0.0, 1.0);
        self.audio_level.store(rms.to_bits(), Ordering::Relaxed);

        if !self.collecting.load(Ordering::Relaxed) {
            return;
        }

        let rate = self.source_rate.load(Ordering::Relaxed);
        let gain = f32::from_bits(self.gain.load(Ordering::Relaxed));

        let gated = {
            let mut vad = self.vad.lock().unwrap_or_else(|e| e.into_inner());
            if (gain - 1.0).abs() > f32::EPSILON {
                let boosted: Vec<f32> = frame.iter().map(|&s| s * gain).collect();
                vad.process(&boosted, rate)
            } else {
                vad.process(frame, rate)
            }
        };

        if !gated.is_empty() {
            self.ring.append(&gated);
        }
    }

    /// Latest frame level in [0, 1].
    pub fn audio_level(&self) -> f32 {
        f32::from_bits(self.audio_level.load(Ordering::Relaxed))
    }

    /// True while the VAD is inside a speech region.
    pub fn is_speaking(&self) -> bool {
        let vad = self.vad.lock().unwrap_or_else(|e| e.into_inner());
        vad.is_speaking()
    }

    /// Number of raw (hardware-rate) samples waiting in the buffer.
    pub fn buffered_count(&self) -> usize {
        self.ring.count()
    }

    /// Drain the raw buffer without touching VAD state. Used by the
    /// continuous monitor mid-recording.
    pub fn drain_raw(&self) -> Vec<f32> {
        self.ring.drain()
    }

    /// Hardware sample rate the device delivers at.
    pub fn source_rate(&self) -> u32 {
        self.source_rate.load(Ordering::Relaxed)
    }

    pub fn set_source_rate(&self, rate: u32) {
        self.source_rate.store(rate.max(1), Ordering::Relaxed);
    }

    /// Set the pre-VAD input gain, clamped to [0.5, 3.0].
    pub fn set_gain(&self, gain: f32) {
        self.gain
            .store(gain.clamp(0.5, 3.0).to_bits(), Ordering::Relaxed);
    }

    /// Replace the VAD configuration in place.
    pub fn set_vad_config(&self, config: VadConfig) {
        let mut vad = self.vad.lock().unwrap_or_else(|e| e.into_inner());
        vad.set_config(config);
    }

    pub fn vad_config(&self) -> VadConfig {
        let vad = self.vad.lock().unwrap_or_else(|e| e.into_inner());
        vad.config()
    }

    fn set_collecting(&self, on: bool) {
        self.collecting.store(on, Ordering::Relaxed);
    }

    fn reset_vad(&self) {
        let mut vad = self.vad.lock().unwrap_or_else(|e| e.into_inner());
        vad.reset();
    }

    /// Resample a raw buffer to the 16 kHz model rate.
    pub fn resample_to_target(&self, raw: &[f32]) -> Vec<f32> {
        resample(raw, self.source_rate(), defaults::SAMPLE_RATE)
    }
}

/// Wrapper to move cpal::Stream into the capture struct.
///
/// SAFETY: the stream is only touched from whichever thread owns the
/// AudioCapture; it never crosses threads while live.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Owns the input device and drives the recording lifecycle.
pub struct AudioCapture {
    shared: Arc<CaptureShared>,
    stream: Option<SendableStream>,
    device_name: Option<String>,
    headless: bool,
}

impl AudioCapture {
    pub fn new(vad_config: VadConfig, device_name: Option<String>) -> Self {
        Self {
            shared: Arc::new(CaptureShared::new(vad_config)),
            stream: None,
            device_name,
            headless: false,
        }
    }

    /// Capture object with no device attached; audio is fed directly via
    /// [`CaptureShared::ingest`]. For tests and hosts that bring their own
    /// audio plumbing.
    pub fn headless(vad_config: VadConfig) -> Self {
        Self {
            shared: Arc::new(CaptureShared::new(vad_config)),
            stream: None,
            device_name: None,
            headless: true,
        }
    }

    /// Shared data path, for the monitor loop and for tests that feed frames
    /// without a device.
    pub fn shared(&self) -> Arc<CaptureShared> {
        Arc::clone(&self.shared)
    }

    /// True once the device is open and streaming.
    pub fn is_prepared(&self) -> bool {
        self.stream.is_some()
    }

    /// Open the input device and start the stream. Idempotent.
    ///
    /// The stream runs from here until `release`; whether its samples land
    /// anywhere is controlled by the collecting flag.
    pub fn prepare(&mut self) -> Result<()> {
        if self.headless || self.stream.is_some() {
            return Ok(());
        }

        let device = with_suppressed_stderr(|| self.find_device())?;
        let config = device
            .default_input_config()
            .map_err(|e| HoldspeakError::AudioCapture {
                message: format!("Failed to query input config: {}", e),
            })?;

        let native_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        self.shared.set_source_rate(native_rate);

        let stream_config: cpal::StreamConfig = config.clone().into();
        let shared = Arc::clone(&self.shared);
        let err_callback = |err| {
            eprintln!("holdspeak: audio stream error: {}", err);
        };

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if channels == 1 {
                            shared.ingest(data);
                        } else {
                            let mono = downmix(data, channels);
                            shared.ingest(&mono);
                        }
                    },
                    err_callback,
                    None,
                ),
            cpal::SampleFormat::I16 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let floats: Vec<f32> =
                            data.iter().map(|&s| s as f32 / 32768.0).collect();
                        if channels == 1 {
                            shared.ingest(&floats);
                        } else {
                            let mono = downmix(&floats, channels);
                            shared.ingest(&mono);
                        }
                    },
                    err_callback,
                    None,
                ),
            fmt => {
                return Err(HoldspeakError::AudioCapture {
                    message: format!("Unsupported sample format: {:?}", fmt),
                });
            }
        }
        .map_err(|e| HoldspeakError::AudioCapture {
            message: format!("Failed to build input stream: {}", e),
        })?;

        stream.play().map_err(|e| HoldspeakError::AudioCapture {
            message: format!("Failed to start input stream: {}", e),
        })?;

        eprintln!(
            "holdspeak: capture open ({} Hz, {} ch, device: {})",
            native_rate,
            channels,
            self.device_name.as_deref().unwrap_or("default")
        );

        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn find_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();

        if let Some(name) = &self.device_name {
            let devices = host
                .input_devices()
                .map_err(|e| HoldspeakError::AudioCapture {
                    message: format!("Failed to enumerate devices: {}", e),
                })?;
            for device in devices {
                if device.name().map(|n| &n == name).unwrap_or(false) {
                    return Ok(device);
                }
            }
            return Err(HoldspeakError::NoInputDevice {
                device: Some(name.clone()),
            });
        }

        host.default_input_device()
            .ok_or(HoldspeakError::NoInputDevice { device: None })
    }

    /// Begin collecting: prepare if needed, reset the VAD, clear any stale
    /// audio, open the gate.
    pub fn start_recording(&mut self) -> Result<()> {
        self.prepare()?;
        self.shared.reset_vad();
        let _ = self.shared.ring.drain();
        self.shared.set_collecting(true);
        Ok(())
    }

    /// Stop collecting and return the captured audio resampled to 16 kHz.
    pub fn stop_recording(&mut self) -> Vec<f32> {
        self.shared.set_collecting(false);
        let raw = self.shared.ring.drain();
        self.shared.reset_vad();

        if raw.is_empty() {
            return Vec::new();
        }
        self.shared.resample_to_target(&raw)
    }

    /// Close the device and stop the capture stream. Used when the mic
    /// should not stay warm between recordings.
    pub fn release(&mut self) {
        self.shared.set_collecting(false);
        if let Some(stream) = self.stream.take() {
            let _ = stream.0.pause();
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.release();
    }
}

/// Average interleaved channels down to mono.
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
