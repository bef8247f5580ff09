use crate::converter::RenderedFrame;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use log::{debug, warn};
use std::io::{self, Write};

/// Writes rendered frames and cursor control sequences to a character sink
pub struct TerminalRenderer<W: Write> {
    out: W,
    clear_on_start: bool,
}

impl<W: Write> TerminalRenderer<W> {
    /// Create a new renderer
    pub fn new(out: W, clear_on_start: bool) -> Self {
        Self {
            out,
            clear_on_start,
        }
    }

    /// Hide the cursor and optionally clear the screen
    pub fn begin(&mut self) -> io::Result<()> {
        queue!(self.out, Hide)?;
        if self.clear_on_start {
            queue!(self.out, Clear(ClearType::All))?;
        }
        self.out.flush()?;
        debug!("Terminal prepared for playback");
        Ok(())
    }

    /// Home the cursor and draw a full frame
    pub fn draw(&mut self, frame: &RenderedFrame) -> io::Result<()> {
        queue!(self.out, MoveTo(0, 0))?;

        for row in frame.rows() {
            let mut current: Option<(u8, u8, u8)> = None;
            for cell in row {
                if let Some((r, g, b)) = cell.color {
                    if current != cell.color {
                        queue!(self.out, SetForegroundColor(Color::Rgb { r, g, b }))?;
                        current = cell.color;
                    }
                }
                queue!(self.out, Print(cell.glyph))?;
            }
            if current.is_some() {
                queue!(self.out, ResetColor)?;
            }
            queue!(self.out, Print("\r\n"))?;
        }

        self.out.flush()
    }

    /// Reset colors and show the cursor again
    pub fn finish(&mut self) -> io::Result<()> {
        queue!(self.out, ResetColor, Show)?;
        self.out.flush()?;
        debug!("Terminal cursor restored");
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

/// Keeps the terminal in raw mode so key presses arrive unbuffered.
/// Raw mode is left when the guard is dropped.
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        debug!("Raw mode enabled");
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to leave raw mode: {}", e);
        }
    }
}
