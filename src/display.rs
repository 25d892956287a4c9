use std::io;
use tui::backend::CrosstermBackend;
use tui::layout::Rect;
use tui::style::{Color, Style};
use tui::symbols::Marker;
use tui::widgets::canvas::{Canvas, Points};
use tui::widgets::{Block, Borders};
use tui::Terminal;

use crate::interpreter::PIXEL_ON;

/// Display is what the host hands the framebuffer to. It should abstract the
/// implementation details, so a variety of kinds of screen would work.
pub trait Display {
    /// draw one frame: row-major u32 pixels, `pitch` bytes per row
    fn draw(&mut self, pixels: &[u32], pitch: usize) -> Result<(), io::Error>;

    /// name shown around the screen, e.g. the rom name
    fn set_title(&mut self, title: &str);
}

// store useful metadata about the screen: width and height in pixels
struct Resolution(usize, usize);

impl Resolution {
    fn pixel_count(&self) -> usize {
        self.0 * self.1
    }

    fn pitch(&self) -> usize {
        self.0 * std::mem::size_of::<u32>()
    }

    fn x_bounds(&self) -> [f64; 2] {
        [0.0, (self.0 - 1) as f64]
    }

    fn y_bounds(&self) -> [f64; 2] {
        [-1.0 * (self.1 - 1) as f64, 0.0]
    }

    /// make sure we're given exactly one frame in the layout we expect
    fn check_frame(&self, pixels: &[u32], pitch: usize) -> Result<(), io::Error> {
        if pixels.len() != self.pixel_count() || pitch != self.pitch() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "expected {} pixels with pitch {}, got {} with pitch {}",
                    self.pixel_count(),
                    self.pitch(),
                    pixels.len(),
                    pitch
                ),
            ));
        }
        Ok(())
    }

    /// canvas coordinates of every pixel that is (or isn't) lit
    fn points_from_pixels<'a>(
        &self,
        pixels: &'a [u32],
        lit: bool,
    ) -> impl std::iter::Iterator<Item = (f64, f64)> + 'a {
        let w = self.0;
        pixels
            .iter()
            .enumerate()
            .filter(move |&(_, &p)| (p == PIXEL_ON) == lit)
            .map(move |(i, _)| {
                (
                    (i % w) as f64,        // x
                    -1.0 * (i / w) as f64, // y
                )
            })
    }
}

/// monochrome display in a terminal, rendered using TUI and crossterm
pub struct MonoTermDisplay {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    resolution: Resolution,
    title: String,
}

impl MonoTermDisplay {
    pub fn new(x: usize, y: usize) -> Result<MonoTermDisplay, io::Error> {
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        Ok(MonoTermDisplay {
            terminal,
            resolution: Resolution(x, y),
            title: String::from("CHIP-8"),
        })
    }
}

impl Drop for MonoTermDisplay {
    fn drop(&mut self) {
        let _ = self.terminal.show_cursor();
    }
}

impl Display for MonoTermDisplay {
    fn draw(&mut self, pixels: &[u32], pitch: usize) -> Result<(), io::Error> {
        self.resolution.check_frame(pixels, pitch)?;

        let resolution = &self.resolution;
        let title = self.title.as_str();
        let lit = resolution.points_from_pixels(pixels, true).collect::<Vec<_>>();

        // for now this assumes a 1:1 ratio between terminal, chip8 and the
        // internal TUI canvas
        self.terminal.draw(|f| {
            let size = Rect::new(0, 0, 2 + resolution.0 as u16, 2 + resolution.1 as u16);

            let canvas = Canvas::default()
                .block(
                    Block::default()
                        .title(title)
                        .borders(Borders::ALL)
                        .style(Style::default().bg(Color::Black)),
                )
                .x_bounds(resolution.x_bounds())
                .y_bounds(resolution.y_bounds())
                .marker(Marker::Block)
                .paint(|ctx| {
                    ctx.draw(&Points {
                        coords: &lit,
                        color: Color::White,
                    });
                });
            f.render_widget(canvas, size);
        })?;
        Ok(())
    }

    fn set_title(&mut self, title: &str) {
        self.title = format!("CHIP-8: {}", title);
    }
}

/// useful for testing non-display routines; remembers what it was given
#[derive(Default)]
pub struct DummyDisplay {
    pub frames: usize,
    pub last_frame: Vec<u32>,
    pub title: String,
}

impl DummyDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Display for DummyDisplay {
    fn draw(&mut self, pixels: &[u32], _pitch: usize) -> Result<(), io::Error> {
        self.frames += 1;
        self.last_frame.clear();
        self.last_frame.extend_from_slice(pixels);
        Ok(())
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }
}
