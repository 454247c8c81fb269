//! Microphone capture: device selection, fixed-length chunk slicing, and the
//! signal-level tap that feeds the UI meter. The platform stream lives behind
//! the [`AudioSource`] trait so the capture loop can be driven by a fake
//! source in tests.

use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mean absolute amplitude treated as a full-scale (100) signal level.
const LEVEL_FULL_SCALE: f32 = 0.25;

/// One fixed-duration segment of captured audio, already encoded as a WAV
/// payload the backend can decode directly.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    bytes: Vec<u8>,
}

impl AudioChunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Capability interface over the capture hardware. `start` hands back the
/// channel chunks arrive on; `stop` must be idempotent and must never panic,
/// since it runs on every teardown path.
pub trait AudioSource {
    fn start(&mut self) -> Result<Receiver<AudioChunk>>;
    fn stop(&mut self);
    /// Coarse 0-100 input level, advisory only. Must read 0 after `stop`.
    fn current_level(&self) -> f32;
}

/// Real microphone source built on cpal. Downmixes whatever the device
/// delivers to mono and slices it into WAV chunks of a fixed duration.
pub struct MicSource {
    device: cpal::Device,
    chunk_ms: u64,
    channel_capacity: usize,
    stream: Option<cpal::Stream>,
    level_bits: Arc<AtomicU32>,
    dropped: Arc<AtomicUsize>,
}

impl MicSource {
    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Create a source, optionally forcing a specific device so users can pick
    /// the right microphone when a machine exposes multiple inputs.
    pub fn new(preferred_device: Option<&str>, chunk_ms: u64, channel_capacity: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices().context("no input devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("input device '{name}' not found"))?
            }
            None => host
                .default_input_device()
                .context("no default input device available")?,
        };
        Ok(Self {
            device,
            chunk_ms,
            channel_capacity: channel_capacity.max(1),
            stream: None,
            level_bits: Arc::new(AtomicU32::new(0f32.to_bits())),
            dropped: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Get the name of the active capture device.
    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Chunks discarded because the capture channel was full.
    pub fn dropped_chunks(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Capture raw mono samples for `duration`. Used by the standalone signal
    /// meter, which wants one synchronous window rather than a chunk stream.
    pub fn record_window(&self, duration: Duration) -> Result<Vec<f32>> {
        let default_config = self.device.default_input_config()?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let channels = usize::from(device_config.channels.max(1));
        let device_name = self.device_name();

        let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
        let buffer_clone = buffer.clone();
        let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));

        let stream = match format {
            SampleFormat::F32 => self.device.build_input_stream(
                &device_config,
                move |data: &[f32], _| {
                    if let Ok(mut buf) = buffer_clone.lock() {
                        append_downmixed_samples(&mut buf, data, channels, |sample| sample);
                    }
                },
                err_fn,
                None,
            )?,
            SampleFormat::I16 => self.device.build_input_stream(
                &device_config,
                move |data: &[i16], _| {
                    if let Ok(mut buf) = buffer_clone.lock() {
                        append_downmixed_samples(&mut buf, data, channels, |sample| {
                            sample as f32 / 32_768.0_f32
                        });
                    }
                },
                err_fn,
                None,
            )?,
            SampleFormat::U16 => self.device.build_input_stream(
                &device_config,
                move |data: &[u16], _| {
                    if let Ok(mut buf) = buffer_clone.lock() {
                        append_downmixed_samples(&mut buf, data, channels, |sample| {
                            (sample as f32 - 32_768.0_f32) / 32_768.0_f32
                        });
                    }
                },
                err_fn,
                None,
            )?,
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        };

        stream.play()?;
        std::thread::sleep(duration);
        if let Err(err) = stream.pause() {
            log_debug(&format!("failed to pause audio stream: {err}"));
        }
        drop(stream);

        let samples = buffer
            .lock()
            .map_err(|_| anyhow!("capture buffer lock poisoned"))?;
        if samples.is_empty() {
            return Err(anyhow!(
                "no samples captured from '{device_name}'; check microphone permissions and availability"
            ));
        }
        Ok(samples.clone())
    }
}

impl AudioSource for MicSource {
    /// Open the device and begin slicing. Chunks arrive on the returned
    /// channel; when it is full the newest chunk is discarded and counted.
    fn start(&mut self) -> Result<Receiver<AudioChunk>> {
        let default_config = self.device.default_input_config()?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let device_sample_rate = device_config.sample_rate.0;
        let channels = usize::from(device_config.channels.max(1));
        let chunk_samples =
            ((u64::from(device_sample_rate) * self.chunk_ms) / 1000).max(1) as usize;

        log_debug(&format!(
            "MicSource config: format={format:?} sample_rate={device_sample_rate}Hz channels={channels} chunk_samples={chunk_samples}"
        ));

        let (sender, receiver) = bounded::<AudioChunk>(self.channel_capacity);
        let slicer = Arc::new(Mutex::new(ChunkSlicer::new(
            chunk_samples,
            device_sample_rate,
            sender,
            self.level_bits.clone(),
            self.dropped.clone(),
        )));

        let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));
        let stream = match format {
            SampleFormat::F32 => {
                let slicer = slicer.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[f32], _| {
                        if let Ok(mut slicer) = slicer.lock() {
                            slicer.push(data, channels, |sample| sample);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let slicer = slicer.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[i16], _| {
                        if let Ok(mut slicer) = slicer.lock() {
                            slicer.push(data, channels, |sample| sample as f32 / 32_768.0);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let slicer = slicer.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[u16], _| {
                        if let Ok(mut slicer) = slicer.lock() {
                            slicer.push(data, channels, |sample| {
                                (sample as f32 - 32_768.0) / 32_768.0
                            });
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        };

        stream.play()?;
        self.stream = Some(stream);
        Ok(receiver)
    }

    /// Release the device. Dropping the stream also drops the slicer's sender,
    /// which disconnects the chunk channel and unblocks the consumer.
    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log_debug(&format!("failed to pause audio stream: {err}"));
            }
            drop(stream);
        }
        self.level_bits.store(0f32.to_bits(), Ordering::Relaxed);
    }

    fn current_level(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }
}

impl Drop for MicSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Accumulates mono samples from the capture callback and emits one WAV chunk
/// per `chunk_samples`. Runs on the audio callback thread, so it only does
/// bounded work: downmix, slice, encode, try_send.
struct ChunkSlicer {
    chunk_samples: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    scratch: Vec<f32>,
    sender: Sender<AudioChunk>,
    level_bits: Arc<AtomicU32>,
    dropped: Arc<AtomicUsize>,
}

impl ChunkSlicer {
    fn new(
        chunk_samples: usize,
        sample_rate: u32,
        sender: Sender<AudioChunk>,
        level_bits: Arc<AtomicU32>,
        dropped: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            chunk_samples: chunk_samples.max(1),
            sample_rate,
            pending: Vec::with_capacity(chunk_samples),
            scratch: Vec::new(),
            sender,
            level_bits,
            dropped,
        }
    }

    fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        self.scratch.clear();
        append_downmixed_samples(&mut self.scratch, data, channels, convert);

        let level = level_from_samples(&self.scratch);
        self.level_bits.store(level.to_bits(), Ordering::Relaxed);

        self.pending.extend_from_slice(&self.scratch);
        while self.pending.len() >= self.chunk_samples {
            let samples: Vec<f32> = self.pending.drain(..self.chunk_samples).collect();
            let chunk = match encode_wav_chunk(&samples, self.sample_rate) {
                Ok(bytes) => AudioChunk::new(bytes),
                Err(err) => {
                    log_debug(&format!("failed to encode audio chunk: {err:#}"));
                    continue;
                }
            };
            if let Err(err) = self.sender.try_send(chunk) {
                match err {
                    TrySendError::Full(_) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    TrySendError::Disconnected(_) => break,
                }
            }
        }
    }
}

/// Downmix multi-channel input to mono while applying the provided converter
/// so chunks carry a single channel regardless of the microphone layout.
fn append_downmixed_samples<T, F>(buf: &mut Vec<f32>, data: &[T], channels: usize, mut convert: F)
where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }

    // Average each interleaved frame to produce a mono representation.
    let mut acc = 0.0f32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += convert(sample);
        count += 1;
        if count == channels {
            buf.push(acc / channels as f32);
            acc = 0.0;
            count = 0;
        }
    }
    if count > 0 {
        buf.push(acc / count as f32);
    }
}

/// Mean absolute magnitude rescaled linearly into 0-100 and clamped.
pub(crate) fn level_from_samples(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_abs = samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32;
    (mean_abs / LEVEL_FULL_SCALE * 100.0).clamp(0.0, 100.0)
}

/// Encode mono f32 samples as 16-bit PCM WAV so the backend can read the
/// payload without sniffing container formats.
fn encode_wav_chunk(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    {
        let cursor = Cursor::new(&mut bytes);
        let mut writer =
            hound::WavWriter::new(cursor, spec).context("failed to start WAV chunk")?;
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer
                .write_sample(value)
                .context("failed to write WAV sample")?;
        }
        writer.finalize().context("failed to finalize WAV chunk")?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn downmixes_multi_channel_audio() {
        let mut buf = Vec::new();
        let samples = [1.0f32, -1.0, 0.5, 0.5];
        append_downmixed_samples(&mut buf, &samples, 2, |sample| sample);
        assert_eq!(buf, vec![0.0, 0.5]);
    }

    #[test]
    fn preserves_single_channel_audio() {
        let mut buf = Vec::new();
        let samples = [0.1f32, 0.2, 0.3];
        append_downmixed_samples(&mut buf, &samples, 1, |sample| sample);
        assert_eq!(buf, samples);
    }

    #[test]
    fn level_is_zero_for_silence() {
        assert_eq!(level_from_samples(&[]), 0.0);
        assert_eq!(level_from_samples(&[0.0; 64]), 0.0);
    }

    #[test]
    fn level_scales_linearly_and_clamps() {
        let half = level_from_samples(&[0.125; 64]);
        assert!((half - 50.0).abs() < 0.01, "expected 50, got {half}");

        let full = level_from_samples(&[0.25; 64]);
        assert!((full - 100.0).abs() < 0.01, "expected 100, got {full}");

        let loud = level_from_samples(&[0.9; 64]);
        assert!((loud - 100.0).abs() < f32::EPSILON, "must clamp at 100");
    }

    #[test]
    fn wav_chunk_round_trips_through_hound() {
        let samples = vec![0.0f32, 0.5, -0.5, 1.0];
        let bytes = encode_wav_chunk(&samples, 44_100).expect("encode");

        let reader = hound::WavReader::new(Cursor::new(bytes)).expect("parse header");
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), samples.len() as u32);
    }

    fn test_slicer(
        chunk_samples: usize,
        capacity: usize,
    ) -> (ChunkSlicer, crossbeam_channel::Receiver<AudioChunk>, Arc<AtomicUsize>) {
        let (tx, rx) = bounded(capacity);
        let dropped = Arc::new(AtomicUsize::new(0));
        let slicer = ChunkSlicer::new(
            chunk_samples,
            16_000,
            tx,
            Arc::new(AtomicU32::new(0f32.to_bits())),
            dropped.clone(),
        );
        (slicer, rx, dropped)
    }

    #[test]
    fn slicer_emits_chunk_at_boundary() {
        let (mut slicer, rx, _) = test_slicer(4, 4);
        slicer.push(&[0.1f32, 0.2, 0.3], 1, |s| s);
        assert!(rx.try_recv().is_err(), "no chunk before the boundary");

        slicer.push(&[0.4f32, 0.5], 1, |s| s);
        let chunk = rx.try_recv().expect("chunk after the boundary");
        let reader = hound::WavReader::new(Cursor::new(chunk.bytes().to_vec())).expect("wav");
        assert_eq!(reader.len(), 4);
        // The fifth sample stays pending for the next chunk.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn slicer_drops_chunks_when_channel_is_full() {
        let (mut slicer, rx, dropped) = test_slicer(2, 1);
        slicer.push(&[0.1f32, 0.2, 0.3, 0.4, 0.5, 0.6], 1, |s| s);

        assert!(rx.try_recv().is_ok(), "first chunk is delivered");
        assert!(rx.try_recv().is_err(), "later chunks were discarded");
        assert_eq!(dropped.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn slicer_updates_signal_level() {
        let level_bits = Arc::new(AtomicU32::new(0f32.to_bits()));
        let (tx, _rx) = bounded(1);
        let mut slicer = ChunkSlicer::new(
            8,
            16_000,
            tx,
            level_bits.clone(),
            Arc::new(AtomicUsize::new(0)),
        );
        slicer.push(&[0.25f32; 4], 1, |s| s);
        let level = f32::from_bits(level_bits.load(Ordering::Relaxed));
        assert!((level - 100.0).abs() < 0.01, "expected full scale, got {level}");
    }
}
