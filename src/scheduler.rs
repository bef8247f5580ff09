use crate::audio::AudioControl;
use crate::converter::FrameConverter;
use crate::decoder::{DecodedVideo, VideoFrame};
use crate::renderer::TerminalRenderer;
use crate::{PlayerError, Result};
use log::{debug, error, info, warn};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Lifecycle of one playback run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Running,
    Completed,
    Interrupted,
    Failed,
}

/// What the clock says should be on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSlot {
    Show(usize),
    Completed,
}

/// Maps elapsed wall-clock time to frame indices
#[derive(Debug, Clone, Copy)]
pub struct PlaybackClock {
    fps: f64,
    frame_count: usize,
}

impl PlaybackClock {
    pub fn new(fps: f64, frame_count: usize) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(PlayerError::InvalidConfig(format!("invalid frame rate {}", fps)));
        }
        Ok(Self { fps, frame_count })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Offset from the start at which frame `index` begins
    pub fn deadline(&self, index: usize) -> Duration {
        Duration::from_secs_f64(index as f64 / self.fps)
    }

    /// Total playback length
    pub fn duration(&self) -> Duration {
        self.deadline(self.frame_count)
    }

    /// Frame due at `elapsed`.
    ///
    /// Frame `i` owns the interval `(i / fps, (i + 1) / fps]`, so a frame is
    /// only replaced once its successor's start time has been passed, and
    /// playback completes once `elapsed` exceeds `frame_count / fps`. The
    /// result never decreases as `elapsed` grows.
    pub fn slot_at(&self, elapsed: Duration) -> FrameSlot {
        let ticks = elapsed.as_secs_f64() * self.fps;
        let index = (ticks.ceil() as usize).saturating_sub(1);
        if index >= self.frame_count {
            FrameSlot::Completed
        } else {
            FrameSlot::Show(index)
        }
    }
}

/// Cooperative cancellation flag shared between the input listener and the
/// playback loop
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of a finished playback run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackReport {
    pub state: PlaybackState,
    pub frames_shown: usize,
    /// Frames passed over because rendering fell behind the clock
    pub frames_skipped: usize,
    pub elapsed: Duration,
}

/// Drives frame conversion and output against the wall clock
pub struct PlaybackScheduler<W: Write> {
    renderer: TerminalRenderer<W>,
    converter: FrameConverter,
    cancel: CancelToken,
    state: PlaybackState,
}

impl<W: Write> PlaybackScheduler<W> {
    pub fn new(renderer: TerminalRenderer<W>, converter: FrameConverter, cancel: CancelToken) -> Self {
        Self {
            renderer,
            converter,
            cancel,
            state: PlaybackState::Idle,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn renderer(&self) -> &TerminalRenderer<W> {
        &self.renderer
    }

    /// Play `video` to completion, interruption or failure.
    ///
    /// Teardown runs once on every path: the cursor is restored, `audio` is
    /// stopped and the frame sequence is released.
    pub async fn run(
        &mut self,
        video: DecodedVideo,
        audio: Option<&mut dyn AudioControl>,
    ) -> Result<PlaybackReport> {
        self.state = PlaybackState::Running;
        let outcome = self.drive(&video.frames, video.fps).await;
        self.teardown(audio, video);

        match outcome {
            Ok(report) => {
                self.state = report.state;
                info!(
                    "Playback {:?} after {:.2}s: {} frames shown, {} skipped",
                    report.state,
                    report.elapsed.as_secs_f64(),
                    report.frames_shown,
                    report.frames_skipped
                );
                Ok(report)
            }
            Err(e) => {
                self.state = PlaybackState::Failed;
                error!("Playback failed: {}", e);
                Err(e)
            }
        }
    }

    async fn drive(&mut self, frames: &[VideoFrame], fps: f64) -> Result<PlaybackReport> {
        let clock = PlaybackClock::new(fps, frames.len())?;
        debug!(
            "Playing {} frames at {:.3} FPS ({:.2}s)",
            clock.frame_count(),
            clock.fps(),
            clock.duration().as_secs_f64()
        );
        self.renderer.begin()?;

        let start = Instant::now();
        // Earliest frame the next pass may show. Waking at a frame's start
        // time means that frame is due even though the clock's half-open
        // slot still names its predecessor.
        let mut next = 0;
        let mut frames_shown = 0;
        let mut frames_skipped = 0;

        loop {
            if self.cancel.is_cancelled() {
                info!("Playback interrupted");
                return Ok(PlaybackReport {
                    state: PlaybackState::Interrupted,
                    frames_shown,
                    frames_skipped,
                    elapsed: start.elapsed(),
                });
            }

            let index = match clock.slot_at(start.elapsed()) {
                FrameSlot::Show(due) => due.max(next),
                FrameSlot::Completed => clock.frame_count(),
            };
            if index >= clock.frame_count() {
                frames_skipped += clock.frame_count().saturating_sub(next);
                return Ok(PlaybackReport {
                    state: PlaybackState::Completed,
                    frames_shown,
                    frames_skipped,
                    elapsed: start.elapsed(),
                });
            }

            let render_start = Instant::now();
            let rendered = self.converter.convert_frame(&frames[index])?;
            self.renderer.draw(&rendered)?;

            frames_skipped += index - next;
            frames_shown += 1;
            next = index + 1;
            debug!(
                "Frame {} shown in {}ms",
                index,
                render_start.elapsed().as_millis()
            );

            // Absolute deadline, so render time does not accumulate
            sleep_until(start + clock.deadline(next)).await;
        }
    }

    fn teardown(&mut self, audio: Option<&mut dyn AudioControl>, video: DecodedVideo) {
        if let Err(e) = self.renderer.finish() {
            warn!("Failed to restore terminal cursor: {}", e);
        }
        if let Some(audio) = audio {
            audio.stop();
        }
        drop(video);
        debug!("Playback teardown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::RenderSettings;
    use image::RgbImage;
    use std::io;
    use tokio::time::sleep;

    /// Sink that records when each flush happens and can stall on flush to
    /// stand in for a slow terminal
    #[derive(Default)]
    struct TimedSink {
        flushes: Vec<Instant>,
        stall: Duration,
    }

    impl Write for TimedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            if !self.stall.is_zero() {
                std::thread::sleep(self.stall);
            }
            self.flushes.push(Instant::now());
            Ok(())
        }
    }

    fn timed_scheduler(stall: Duration) -> PlaybackScheduler<TimedSink> {
        let converter = FrameConverter::new(RenderSettings {
            width: 4,
            grayscale: true,
            ..Default::default()
        });
        let sink = TimedSink {
            stall,
            ..Default::default()
        };
        PlaybackScheduler::new(TerminalRenderer::new(sink, false), converter, CancelToken::new())
    }

    #[derive(Default)]
    struct MockAudio {
        stops: usize,
    }

    impl AudioControl for MockAudio {
        fn stop(&mut self) {
            self.stops += 1;
        }
    }

    fn video(frame_count: usize, fps: f64) -> DecodedVideo {
        let frames = (0..frame_count)
            .map(|i| VideoFrame::new(RgbImage::new(4, 4), i as f64 / fps, i as u64))
            .collect();
        DecodedVideo::new(frames, fps)
    }

    fn scheduler(cancel: CancelToken) -> PlaybackScheduler<Vec<u8>> {
        let converter = FrameConverter::new(RenderSettings {
            width: 4,
            grayscale: true,
            ..Default::default()
        });
        PlaybackScheduler::new(TerminalRenderer::new(Vec::new(), false), converter, cancel)
    }

    fn output(scheduler: &PlaybackScheduler<Vec<u8>>) -> String {
        String::from_utf8_lossy(scheduler.renderer().get_ref()).into_owned()
    }

    #[test]
    fn test_clock_selects_expected_frame() {
        let clock = PlaybackClock::new(30.0, 90).unwrap();
        assert_eq!(clock.slot_at(Duration::ZERO), FrameSlot::Show(0));
        assert_eq!(clock.slot_at(Duration::from_millis(10)), FrameSlot::Show(0));
        assert_eq!(clock.slot_at(Duration::from_secs_f64(1.5)), FrameSlot::Show(44));
        assert_eq!(clock.slot_at(Duration::from_secs_f64(1.51)), FrameSlot::Show(45));
        assert_eq!(clock.slot_at(Duration::from_secs_f64(3.0)), FrameSlot::Show(89));
        assert_eq!(clock.slot_at(Duration::from_secs_f64(3.1)), FrameSlot::Completed);
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = PlaybackClock::new(23.976, 500).unwrap();
        let mut last = 0;
        for ms in 0..25_000 {
            match clock.slot_at(Duration::from_millis(ms)) {
                FrameSlot::Show(index) => {
                    assert!(index >= last, "index went back at {}ms", ms);
                    last = index;
                }
                FrameSlot::Completed => {
                    assert!(Duration::from_millis(ms) > clock.duration() - Duration::from_millis(1));
                    last = usize::MAX;
                }
            }
        }
        assert_eq!(last, usize::MAX);
    }

    #[test]
    fn test_clock_rejects_bad_fps() {
        assert!(PlaybackClock::new(0.0, 10).is_err());
        assert!(PlaybackClock::new(f64::NAN, 10).is_err());
        assert!(PlaybackClock::new(-24.0, 10).is_err());
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_to_completion() {
        let mut scheduler = scheduler(CancelToken::new());
        let mut audio = MockAudio::default();
        assert_eq!(scheduler.state(), PlaybackState::Idle);

        let report = scheduler.run(video(90, 30.0), Some(&mut audio)).await.unwrap();

        assert_eq!(report.state, PlaybackState::Completed);
        assert_eq!(scheduler.state(), PlaybackState::Completed);
        assert_eq!(report.frames_shown + report.frames_skipped, 90);
        assert!(report.elapsed >= Duration::from_secs(3));
        assert_eq!(audio.stops, 1);

        let out = output(&scheduler);
        assert!(out.starts_with("\x1b[?25l"));
        assert_eq!(out.matches("\x1b[?25h").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_land_on_their_start_time() {
        let mut scheduler = timed_scheduler(Duration::ZERO);
        let report = scheduler.run(video(5, 25.0), None).await.unwrap();

        assert_eq!(report.state, PlaybackState::Completed);
        assert_eq!(report.frames_shown, 5);
        assert_eq!(report.elapsed, Duration::from_millis(200));

        // One flush for begin, one per frame, one for finish
        let flushes = &scheduler.renderer().get_ref().flushes;
        assert_eq!(flushes.len(), 7);
        let begin = flushes[0];
        for (index, drawn) in flushes[1..6].iter().enumerate() {
            assert_eq!(*drawn - begin, Duration::from_millis(40 * index as u64));
        }
    }

    #[tokio::test]
    async fn test_render_cost_does_not_accumulate() {
        // 10ms per frame on top of a fixed 1/30s sleep would take about 1.3s
        let mut scheduler = timed_scheduler(Duration::from_millis(10));
        let report = scheduler.run(video(30, 30.0), None).await.unwrap();

        assert_eq!(report.state, PlaybackState::Completed);
        assert_eq!(report.frames_shown + report.frames_skipped, 30);
        assert!(report.elapsed >= Duration::from_secs(1));
        assert!(
            report.elapsed < Duration::from_millis(1150),
            "playback drifted to {:?}",
            report.elapsed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_runs_teardown_once() {
        let cancel = CancelToken::new();
        let mut scheduler = scheduler(cancel.clone());
        let mut audio = MockAudio::default();

        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        let report = scheduler.run(video(90, 30.0), Some(&mut audio)).await.unwrap();

        assert_eq!(report.state, PlaybackState::Interrupted);
        assert_eq!(scheduler.state(), PlaybackState::Interrupted);
        assert!(report.frames_shown > 0);
        assert!(report.frames_shown < 90);
        assert_eq!(audio.stops, 1);
        assert_eq!(output(&scheduler).matches("\x1b[?25h").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_frame_fails_playback() {
        let mut scheduler = scheduler(CancelToken::new());
        let mut audio = MockAudio::default();
        let mut video = video(10, 30.0);
        video.frames[0] = VideoFrame::new(RgbImage::new(0, 0), 0.0, 0);

        let result = scheduler.run(video, Some(&mut audio)).await;

        assert!(matches!(result, Err(PlayerError::InvalidFrame { .. })));
        assert_eq!(scheduler.state(), PlaybackState::Failed);
        assert_eq!(audio.stops, 1);

        let out = output(&scheduler);
        assert!(!out.contains("\x1b[1;1H"), "no partial frame may be drawn");
        assert!(out.contains("\x1b[?25h"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_without_audio() {
        let mut scheduler = scheduler(CancelToken::new());
        let report = scheduler.run(video(3, 10.0), None).await.unwrap();
        assert_eq!(report.state, PlaybackState::Completed);
        assert_eq!(report.frames_shown, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_fps_fails_with_teardown() {
        let mut scheduler = scheduler(CancelToken::new());
        let mut audio = MockAudio::default();
        let result = scheduler.run(video(3, 0.0), Some(&mut audio)).await;
        assert!(matches!(result, Err(PlayerError::InvalidConfig(_))));
        assert_eq!(audio.stops, 1);
    }
}
