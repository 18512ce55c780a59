//! Terminal status bar for the kiosk.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{self, ClearType};
use crossterm::{cursor, execute, queue};
use rollcall_core::GateStatus;
use std::io::{self, Write};
use std::time::Duration;

const VERIFIED_COLOR: Color = Color::Green;
const PENDING_COLOR: Color = Color::Rgb {
    r: 255,
    g: 165,
    b: 0,
};

pub const BLINK_NOTICE: &str = "BLINK DETECTED!";

/// One rendered status bar.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub text: String,
    pub color: Color,
    pub blinked: bool,
}

impl StatusLine {
    pub fn new(status: &GateStatus, blinked: bool) -> Self {
        let (text, color) = match status {
            GateStatus::Verified(name) => (format!("VERIFIED: {name}"), VERIFIED_COLOR),
            GateStatus::BlinkNeeded(_) => ("Liveness Check: Blink Needed".to_string(), PENDING_COLOR),
            GateStatus::Scanning(label) => (format!("Status: {label}"), PENDING_COLOR),
        };
        Self {
            text,
            color,
            blinked,
        }
    }
}

/// `q`, `Esc` or Ctrl-C.
pub fn is_quit_key(key: &KeyEvent) -> bool {
    if key.kind == KeyEventKind::Release {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Raw-mode terminal session; restored on drop.
pub struct Screen {
    stdout: io::Stdout,
}

impl Screen {
    pub fn enter(title: &str) -> io::Result<Self> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Color::Cyan),
            Print(format!("{title}  (q to quit)\r\n")),
            ResetColor,
            cursor::Hide
        )?;
        terminal::enable_raw_mode()?;
        Ok(Self { stdout })
    }

    /// Drain pending input; `true` once a quit key was pressed.
    pub fn quit_requested(&self) -> io::Result<bool> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if is_quit_key(&key) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub fn draw(&mut self, line: &StatusLine) -> io::Result<()> {
        queue!(
            self.stdout,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::CurrentLine),
            SetForegroundColor(line.color),
            Print(&line.text),
        )?;
        if line.blinked {
            queue!(
                self.stdout,
                SetForegroundColor(VERIFIED_COLOR),
                Print("  "),
                Print(BLINK_NOTICE),
            )?;
        }
        queue!(self.stdout, ResetColor)?;
        self.stdout.flush()
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let _ = execute!(self.stdout, ResetColor, cursor::Show, Print("\n"));
    }
}
