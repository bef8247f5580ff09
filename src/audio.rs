use crate::{PlayerError, Result};
use ffmpeg_next as ffmpeg;
use log::{debug, info, warn};
use rodio::{Decoder, OutputStream, Sink};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Extracted tracks are always written as 16-bit stereo PCM
const CHANNELS: u16 = 2;
const BYTES_PER_SAMPLE: u16 = 2;

/// Outcome the audio thread reports once its stream is playing
pub type Ready = std::result::Result<(), String>;

/// Stop signal for a running audio stream
pub trait AudioControl {
    /// Stop playback. Calling this more than once has no further effect.
    fn stop(&mut self);
}

/// Audio track extracted to a temporary WAV file
#[derive(Debug)]
pub struct AudioTrack {
    file: NamedTempFile,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioTrack {
    pub fn new(file: NamedTempFile, sample_rate: u32, channels: u16) -> Self {
        Self {
            file,
            sample_rate,
            channels,
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the backing file
    pub fn remove(self) -> io::Result<()> {
        let path = self.file.path().to_path_buf();
        self.file.close()?;
        debug!("Removed audio file {}", path.display());
        Ok(())
    }
}

/// Decode the best audio stream of `path` into a temporary WAV file.
///
/// Returns `Ok(None)` when the file has no audio stream.
pub fn extract_audio(path: &Path) -> Result<Option<AudioTrack>> {
    if let Err(e) = ffmpeg::init() {
        debug!("FFmpeg init error: {:?}", e);
    }

    let mut input = ffmpeg::format::input(&path).map_err(|e| audio_error("open input", e))?;

    let (stream_index, mut decoder) = match input.streams().best(ffmpeg::media::Type::Audio) {
        Some(stream) => {
            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .map_err(|e| audio_error("codec context", e))?;
            let decoder = context
                .decoder()
                .audio()
                .map_err(|e| audio_error("audio decoder", e))?;
            (stream.index(), decoder)
        }
        None => {
            info!("No audio stream in '{}'", path.display());
            return Ok(None);
        }
    };

    let sample_rate = decoder.rate();
    let mut resampler = decoder
        .resampler(
            ffmpeg::format::Sample::I16(ffmpeg::format::sample::Type::Packed),
            ffmpeg::ChannelLayout::STEREO,
            sample_rate,
        )
        .map_err(|e| audio_error("resampler", e))?;

    let mut pcm = Vec::new();
    for (stream, packet) in input.packets() {
        if stream.index() != stream_index {
            continue;
        }
        decoder
            .send_packet(&packet)
            .map_err(|e| audio_error("send packet", e))?;
        resample_into(&mut decoder, &mut resampler, &mut pcm)?;
    }
    decoder
        .send_eof()
        .map_err(|e| audio_error("send EOF", e))?;
    resample_into(&mut decoder, &mut resampler, &mut pcm)?;

    if pcm.is_empty() {
        return Err(PlayerError::AudioStartFailure(
            "audio stream produced no samples".to_string(),
        ));
    }
    if wav_chunk_sizes(pcm.len()).is_none() {
        return Err(PlayerError::AudioStartFailure(format!(
            "audio track of {} bytes does not fit in a WAV file",
            pcm.len()
        )));
    }

    let mut file = tempfile::Builder::new()
        .prefix("ascii-reel-")
        .suffix(".wav")
        .tempfile()?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        write_wav(&mut writer, sample_rate, CHANNELS, &pcm)?;
        writer.flush()?;
    }

    info!(
        "Extracted {:.1}s of audio to {}",
        pcm.len() as f64 / (sample_rate as f64 * (CHANNELS * BYTES_PER_SAMPLE) as f64),
        file.path().display()
    );

    Ok(Some(AudioTrack::new(file, sample_rate, CHANNELS)))
}

fn resample_into(
    decoder: &mut ffmpeg::decoder::Audio,
    resampler: &mut ffmpeg::software::resampling::Context,
    pcm: &mut Vec<u8>,
) -> Result<()> {
    let mut decoded = ffmpeg::frame::Audio::empty();
    while decoder.receive_frame(&mut decoded).is_ok() {
        let mut resampled = ffmpeg::frame::Audio::empty();
        resampler
            .run(&decoded, &mut resampled)
            .map_err(|e| audio_error("resample", e))?;

        let len = resampled.samples() * (CHANNELS * BYTES_PER_SAMPLE) as usize;
        let data = resampled.data(0);
        pcm.extend_from_slice(&data[..len.min(data.len())]);
    }
    Ok(())
}

fn audio_error(stage: &str, e: ffmpeg::Error) -> PlayerError {
    PlayerError::AudioStartFailure(format!("{}: {}", stage, e))
}

/// Data and RIFF chunk sizes for `pcm_len` bytes of samples. WAV sizes are
/// 32-bit, so tracks past 4 GiB have none.
fn wav_chunk_sizes(pcm_len: usize) -> Option<(u32, u32)> {
    let data_len = u32::try_from(pcm_len).ok()?;
    Some((data_len, data_len.checked_add(36)?))
}

/// Write interleaved 16-bit little-endian PCM as a canonical WAV file
pub fn write_wav<W: Write>(out: &mut W, sample_rate: u32, channels: u16, pcm: &[u8]) -> io::Result<()> {
    let (data_len, riff_len) = wav_chunk_sizes(pcm.len()).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "PCM data too large for WAV")
    })?;
    let block_align = channels * BYTES_PER_SAMPLE;
    let byte_rate = sample_rate * block_align as u32;

    out.write_all(b"RIFF")?;
    out.write_all(&riff_len.to_le_bytes())?;
    out.write_all(b"WAVE")?;
    out.write_all(b"fmt ")?;
    out.write_all(&16u32.to_le_bytes())?;
    out.write_all(&1u16.to_le_bytes())?;
    out.write_all(&channels.to_le_bytes())?;
    out.write_all(&sample_rate.to_le_bytes())?;
    out.write_all(&byte_rate.to_le_bytes())?;
    out.write_all(&block_align.to_le_bytes())?;
    out.write_all(&(BYTES_PER_SAMPLE * 8).to_le_bytes())?;
    out.write_all(b"data")?;
    out.write_all(&data_len.to_le_bytes())?;
    out.write_all(pcm)
}

/// Starts audio tracks on their own thread
#[derive(Debug, Clone)]
pub struct AudioCoordinator {
    /// How long to wait for the output device to come up
    pub ready_timeout: Duration,
}

impl Default for AudioCoordinator {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(5),
        }
    }
}

impl AudioCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start playing `track` on the default output device.
    ///
    /// Returns once the stream is playing, so the caller can take that
    /// instant as the shared zero point.
    pub fn start(&self, track: AudioTrack) -> Result<AudioSession> {
        self.start_with(track, play_until_stopped)
    }

    /// Start `track` with a custom playback body. The body must report on
    /// `ready` and then block until `stop` yields or disconnects.
    pub fn start_with<F>(&self, track: AudioTrack, body: F) -> Result<AudioSession>
    where
        F: FnOnce(PathBuf, SyncSender<Ready>, Receiver<()>) + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel();
        let path = track.path().to_path_buf();

        let handle = thread::Builder::new()
            .name("audio".to_string())
            .spawn(move || body(path, ready_tx, stop_rx))?;

        let failure = match ready_rx.recv_timeout(self.ready_timeout) {
            Ok(Ok(())) => {
                info!("Audio playback started");
                return Ok(AudioSession {
                    stop_tx: Some(stop_tx),
                    handle: Some(handle),
                    track: Some(track),
                });
            }
            Ok(Err(message)) => message,
            Err(_) => "audio device did not become ready".to_string(),
        };

        // Disconnecting the stop channel releases a body that came up late
        drop(stop_tx);
        if handle.join().is_err() {
            warn!("Audio thread panicked during start");
        }
        if let Err(e) = track.remove() {
            warn!("Failed to remove audio file: {}", e);
        }
        Err(PlayerError::AudioStartFailure(failure))
    }
}

/// Handle to a running audio stream
pub struct AudioSession {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    track: Option<AudioTrack>,
}

impl AudioSession {
    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the stream, join its thread and delete the audio file
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if handle.join().is_err() {
            warn!("Audio thread panicked");
        }
        if let Some(track) = self.track.take() {
            if let Err(e) = track.remove() {
                warn!("Failed to remove audio file: {}", e);
            }
        }
        info!("Audio playback stopped");
    }
}

impl AudioControl for AudioSession {
    fn stop(&mut self) {
        AudioSession::stop(self);
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Thread body: play the file until told to stop
fn play_until_stopped(path: PathBuf, ready: SyncSender<Ready>, stop: Receiver<()>) {
    // The stream must outlive the sink or playback goes silent
    let (_stream, sink) = match open_sink(&path) {
        Ok(output) => output,
        Err(message) => {
            let _ = ready.send(Err(message));
            return;
        }
    };

    let _ = ready.send(Ok(()));
    let _ = stop.recv();
    sink.stop();
    debug!("Audio thread exiting");
}

fn open_sink(path: &Path) -> std::result::Result<(OutputStream, Sink), String> {
    let (stream, handle) =
        OutputStream::try_default().map_err(|e| format!("no output device: {}", e))?;
    let sink = Sink::try_new(&handle).map_err(|e| format!("audio sink: {}", e))?;
    let file = File::open(path).map_err(|e| format!("open {}: {}", path.display(), e))?;
    let source = Decoder::new(BufReader::new(file)).map_err(|e| format!("decode audio: {}", e))?;
    sink.append(source);
    Ok((stream, sink))
}
