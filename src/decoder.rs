use crate::{PlayerError, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use log::{debug, info};
use serde::Serialize;
use std::path::Path;

/// Frame rate used when the container does not report one
const FALLBACK_FPS: f64 = 25.0;

/// Video decoder that extracts every frame of a file up front
pub struct VideoDecoder {
    input_context: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    assembler: FrameAssembler,
    info: VideoInfo,
}

/// Represents a decoded video frame with metadata
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixels
    pub image: RgbImage,
    /// Timestamp in seconds
    pub timestamp: f64,
    /// Frame number
    pub frame_number: u64,
    /// Size of the frame as stored in the stream, before any decode-time scaling
    pub source_size: (u32, u32),
}

/// Stream metadata, printable with `--info-only`
#[derive(Debug, Clone, Serialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Duration in seconds, 0 when unknown
    pub duration: f64,
    pub has_audio: bool,
}

/// The full frame sequence of a video, ready for playback
#[derive(Debug)]
pub struct DecodedVideo {
    pub frames: Vec<VideoFrame>,
    pub fps: f64,
}

impl VideoFrame {
    pub fn new(image: RgbImage, timestamp: f64, frame_number: u64) -> Self {
        let source_size = image.dimensions();
        Self {
            image,
            timestamp,
            frame_number,
            source_size,
        }
    }

    /// Record the stream's native size for a frame whose pixels were scaled
    pub fn with_source_size(mut self, width: u32, height: u32) -> Self {
        self.source_size = (width, height);
        self
    }

    /// Build a frame from tightly packed RGB24 bytes
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let image = RgbImage::from_raw(width, height, data)
            .ok_or(PlayerError::InvalidFrame { width, height })?;
        Ok(Self::new(image, 0.0, 0))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl DecodedVideo {
    pub fn new(frames: Vec<VideoFrame>, fps: f64) -> Self {
        Self { frames, fps }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Playback length in seconds at the nominal frame rate
    pub fn duration(&self) -> f64 {
        if self.fps > 0.0 {
            self.frames.len() as f64 / self.fps
        } else {
            0.0
        }
    }
}

impl VideoDecoder {
    /// Create a new VideoDecoder from a file path
    pub fn new(path: &Path) -> Result<Self> {
        if let Err(e) = ffmpeg::init() {
            debug!("FFmpeg init error: {:?}", e);
        }

        debug!("Attempting to open video file: {}", path.display());
        let input_context = ffmpeg::format::input(&path).map_err(|e| {
            PlayerError::DecodeFailure(format!("failed to open '{}': {}", path.display(), e))
        })?;

        let has_audio = input_context
            .streams()
            .best(ffmpeg::media::Type::Audio)
            .is_some();

        let stream = input_context
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| {
                PlayerError::DecodeFailure(format!("no video stream in '{}'", path.display()))
            })?;

        let stream_index = stream.index();
        info!("Found video stream {} in file '{}'", stream_index, path.display());

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| PlayerError::DecodeFailure(format!("codec context: {}", e)))?;
        let decoder = context_decoder
            .decoder()
            .video()
            .map_err(|e| PlayerError::DecodeFailure(format!("video decoder: {}", e)))?;

        let fps = rational_to_f64(stream.avg_frame_rate())
            .or_else(|| rational_to_f64(stream.rate()))
            .unwrap_or(FALLBACK_FPS);

        let time_base = stream.time_base();
        let time_base = time_base.numerator() as f64 / time_base.denominator().max(1) as f64;

        let duration = if stream.duration() != ffmpeg::ffi::AV_NOPTS_VALUE {
            stream.duration() as f64 * time_base
        } else {
            0.0
        };

        let info = VideoInfo {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            duration,
            has_audio,
        };

        debug!(
            "Video info: {}x{}, {:.2} FPS, {:.2}s duration",
            info.width, info.height, info.fps, info.duration
        );

        Ok(Self {
            input_context,
            stream_index,
            decoder,
            assembler: FrameAssembler::new(time_base, fps),
            info,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Get video FPS
    pub fn fps(&self) -> f64 {
        self.info.fps
    }

    /// Get video dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    /// Scale frames down at decode time so they are at most `max_width`
    /// pixels wide. The aspect ratio is preserved.
    pub fn set_max_width(&mut self, max_width: Option<u32>) {
        self.assembler.max_width = max_width;
    }

    /// Decode every frame of the video stream
    pub fn decode_all(self) -> Result<DecodedVideo> {
        let VideoDecoder {
            mut input_context,
            stream_index,
            mut decoder,
            mut assembler,
            info,
        } = self;

        for (stream, packet) in input_context.packets() {
            if stream.index() != stream_index {
                continue;
            }
            decoder
                .send_packet(&packet)
                .map_err(|e| PlayerError::DecodeFailure(format!("send packet: {}", e)))?;
            assembler.drain(&mut decoder)?;
        }

        decoder
            .send_eof()
            .map_err(|e| PlayerError::DecodeFailure(format!("send EOF: {}", e)))?;
        assembler.drain(&mut decoder)?;

        if assembler.frames.is_empty() {
            return Err(PlayerError::DecodeFailure(
                "video stream produced no frames".to_string(),
            ));
        }

        info!(
            "Decoded {} frames at {:.2} FPS",
            assembler.frames.len(),
            info.fps
        );

        Ok(DecodedVideo::new(assembler.frames, info.fps))
    }
}

/// Input geometry a scaling context was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScalerInput {
    format: ffmpeg::format::Pixel,
    width: u32,
    height: u32,
}

/// Converts decoder output into RGB frames
struct FrameAssembler {
    scaler: Option<(ScalerInput, ffmpeg::software::scaling::Context)>,
    max_width: Option<u32>,
    time_base: f64,
    fps: f64,
    frames: Vec<VideoFrame>,
}

impl FrameAssembler {
    fn new(time_base: f64, fps: f64) -> Self {
        Self {
            scaler: None,
            max_width: None,
            time_base,
            fps,
            frames: Vec::new(),
        }
    }

    /// Pull every frame the decoder has ready
    fn drain(&mut self, decoder: &mut ffmpeg::codec::decoder::Video) -> Result<()> {
        let mut decoded = ffmpeg::frame::Video::empty();
        while decoder.receive_frame(&mut decoded).is_ok() {
            let frame = self.convert_frame(&decoded)?;
            self.frames.push(frame);
        }
        Ok(())
    }

    /// Convert FFmpeg frame to RGB format
    fn convert_frame(&mut self, frame: &ffmpeg::frame::Video) -> Result<VideoFrame> {
        let (width, height) = scaled_dimensions(frame.width(), frame.height(), self.max_width);
        let input = ScalerInput {
            format: frame.format(),
            width: frame.width(),
            height: frame.height(),
        };

        // Streams may change resolution or pixel format mid-file
        if self.scaler.as_ref().map_or(true, |(built_for, _)| *built_for != input) {
            if self.scaler.is_some() {
                info!(
                    "Video stream changed to {}x{} {:?}, rebuilding scaler",
                    input.width, input.height, input.format
                );
            }
            let scaler = ffmpeg::software::scaling::Context::get(
                input.format,
                input.width,
                input.height,
                ffmpeg::format::Pixel::RGB24,
                width,
                height,
                ffmpeg::software::scaling::Flags::AREA,
            )
            .map_err(|e| PlayerError::DecodeFailure(format!("scaling context: {}", e)))?;
            self.scaler = Some((input, scaler));
        }

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        if let Some((_, scaler)) = self.scaler.as_mut() {
            scaler
                .run(frame, &mut rgb_frame)
                .map_err(|e| PlayerError::DecodeFailure(format!("scale frame: {}", e)))?;
        }

        let frame_number = self.frames.len() as u64;
        let timestamp = match frame.timestamp() {
            Some(ts) if ts != ffmpeg::ffi::AV_NOPTS_VALUE => ts as f64 * self.time_base,
            _ => frame_number as f64 / self.fps,
        };

        // Rows are padded to the stride; keep only the pixel bytes
        let stride = rgb_frame.stride(0);
        let row_bytes = width as usize * 3;
        let data = rgb_frame.data(0);
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            pixels.extend_from_slice(&data[start..start + row_bytes]);
        }

        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or(PlayerError::InvalidFrame { width, height })?;

        debug!(
            "Decoded frame {}: {}x{}, timestamp: {:.3}s",
            frame_number, width, height, timestamp
        );

        Ok(VideoFrame::new(image, timestamp, frame_number).with_source_size(input.width, input.height))
    }
}

/// Target size for decode-time scaling
pub fn scaled_dimensions(width: u32, height: u32, max_width: Option<u32>) -> (u32, u32) {
    match max_width {
        Some(max) if max > 0 && width > max => {
            let scaled_height = (height as u64 * max as u64 + width as u64 / 2) / width as u64;
            (max, (scaled_height as u32).max(1))
        }
        _ => (width, height),
    }
}

fn rational_to_f64(rate: ffmpeg::Rational) -> Option<f64> {
    if rate.numerator() > 0 && rate.denominator() > 0 {
        Some(rate.numerator() as f64 / rate.denominator() as f64)
    } else {
        None
    }
}

/// Decode a whole video file, scaling frames to at most `max_width` pixels
pub fn load_video(path: &Path, max_width: Option<u32>) -> Result<DecodedVideo> {
    let mut decoder = VideoDecoder::new(path)?;
    decoder.set_max_width(max_width);
    decoder.decode_all()
}
