use crate::surface::{Canvas, DrawSurface};
use crossbeam_channel::Receiver;
use std::fmt::Write as _;
use std::io::{self, Write};

/// Renders the visualizer canvas in the terminal with true-colour half blocks.
pub struct ConsoleDisplay {
    rx: Receiver<Canvas>,
    frame_rate_hz: u32,
    update_hz: u32,
    columns: usize,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<Canvas>, frame_rate_hz: u32, update_hz: u32, columns: usize) -> Self {
        Self {
            rx,
            frame_rate_hz,
            update_hz,
            columns,
        }
    }

    pub fn run(&self) {
        let skip = if self.update_hz == 0 {
            self.frame_rate_hz.max(1) as u64
        } else {
            (self.frame_rate_hz / self.update_hz).max(1) as u64
        };
        let mut count: u64 = 0;
        let mut stdout = io::stdout();

        for canvas in self.rx.iter() {
            count += 1;
            if count % skip != 0 {
                continue;
            }

            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H");
            print!("{}", render_half_blocks(&canvas, self.columns));
            println!("\x1b[0m  motion soundscape  ·  {} frames", count);
            let _ = stdout.flush();
        }
    }
}

/// Two canvas rows per terminal line: `▀` with the upper pixel as
/// foreground and the lower one as background.
pub fn render_half_blocks(canvas: &Canvas, columns: usize) -> String {
    if canvas.width() == 0 || canvas.height() == 0 || columns == 0 {
        return String::new();
    }
    // Terminal cells are about twice as tall as wide, half blocks undo that
    let rows = ((columns * canvas.height()) / canvas.width()).max(2) & !1;
    let small = canvas.downsample(columns, rows);

    let mut out = String::with_capacity(columns * rows * 20);
    for y in (0..rows).step_by(2) {
        for x in 0..columns {
            let [tr, tg, tb] = small.pixel(x, y).to_u8();
            let [br, bg, bb] = small.pixel(x, y + 1).to_u8();
            let _ = write!(
                out,
                "\x1b[38;2;{};{};{}m\x1b[48;2;{};{};{}m▀",
                tr, tg, tb, br, bg, bb
            );
        }
        out.push_str("\x1b[0m\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{Circle, CompositeMode, Hsl};

    #[test]
    fn test_half_block_layout() {
        let canvas = Canvas::new(64, 36);
        let text = render_half_blocks(&canvas, 16);
        // 16 columns → 9 rows rounded down to 8 → 4 lines
        assert_eq!(text.lines().count(), 4);
        assert_eq!(text.matches('▀').count(), 16 * 4);
        assert!(text.contains("38;2;0;0;0m"));
    }

    #[test]
    fn test_colours_come_through() {
        let mut canvas = Canvas::new(8, 8);
        canvas.fill_circle(
            &Circle {
                x: 4.0,
                y: 4.0,
                radius: 20.0,
                glow: 0.0,
                color: Hsl { h: 0.0, s: 1.0, l: 0.5 },
            },
            CompositeMode::SourceOver,
        );
        let text = render_half_blocks(&canvas, 4);
        assert!(text.contains("38;2;255;0;0m"));
        assert!(text.contains("48;2;255;0;0m"));
    }

    #[test]
    fn test_empty_canvas_renders_nothing() {
        assert!(render_half_blocks(&Canvas::new(0, 0), 10).is_empty());
    }
}
