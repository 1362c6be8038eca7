use crate::types::{Frame, GridParams, TriggerEvent, PIXEL_ACTIVITY_THRESHOLD};
use log::{debug, warn};

/// Result of comparing two frames.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Zero or more triggers, at most one per column, ordered by column.
    Triggers(Vec<TriggerEvent>),
    /// Too much of the frame changed (camera jolt, light flicker): ignored.
    Discarded { active_ratio: f32 },
}

impl Detection {
    pub fn events(&self) -> &[TriggerEvent] {
        match self {
            Detection::Triggers(events) => events,
            Detection::Discarded { .. } => &[],
        }
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, Detection::Discarded { .. })
    }
}

/// Mark every pixel whose averaged intensity moved by more than the activity
/// threshold. Returns the mask and the number of active pixels.
pub fn activity_mask(previous: &Frame, current: &Frame) -> (Vec<bool>, usize) {
    let mut count = 0;
    let mask: Vec<bool> = current
        .intensities()
        .zip(previous.intensities())
        .map(|(now, before)| {
            let active = (now - before).abs() > PIXEL_ACTIVITY_THRESHOLD;
            count += active as usize;
            active
        })
        .collect();
    (mask, count)
}

/// Compare `current` against `previous` (or against itself, for the first
/// frame) and quantize the changed pixels onto the trigger grid.
///
/// Columns are scanned left to right; within a column, rows are scanned top
/// to bottom and the first cell with more than `threshold * cell_area`
/// active pixels wins. A global ratio above `threshold` discards the frame.
pub fn detect(previous: Option<&Frame>, current: &Frame, grid: &GridParams) -> Detection {
    if !current.is_well_formed() {
        debug!(
            "Malformed {}x{} frame ({} bytes), no motion",
            current.width,
            current.height,
            current.data.len()
        );
        return Detection::Triggers(Vec::new());
    }
    let previous = match previous {
        Some(p) if p.same_dimensions(current) && p.is_well_formed() => p,
        _ => current,
    };

    let (mask, active) = activity_mask(previous, current);
    let total = current.pixel_count();
    if total == 0 {
        return Detection::Triggers(Vec::new());
    }
    if active as f32 > grid.threshold * total as f32 {
        return Detection::Discarded {
            active_ratio: active as f32 / total as f32,
        };
    }

    let mut events = Vec::new();
    if grid.rows == 0 || grid.columns == 0 {
        return Detection::Triggers(events);
    }
    let cell_w = current.width / grid.columns;
    let cell_h = current.height / grid.rows;
    let needed = grid.threshold * (cell_w * cell_h) as f32;

    for column in 0..grid.columns {
        for row in 0..grid.rows {
            let mut count = 0usize;
            for y in row * cell_h..(row + 1) * cell_h {
                let line = &mask[y * current.width..(y + 1) * current.width];
                count += line[column * cell_w..(column + 1) * cell_w]
                    .iter()
                    .filter(|&&a| a)
                    .count();
            }
            if count as f32 > needed {
                events.push(TriggerEvent { column, row });
                break;
            }
        }
    }
    Detection::Triggers(events)
}

/// Frame-differencing detector that keeps the previous frame between calls.
pub struct MotionDetector {
    grid: GridParams,
    previous: Option<Frame>,
}

impl MotionDetector {
    pub fn new(grid: GridParams) -> Self {
        Self {
            grid,
            previous: None,
        }
    }

    pub fn grid(&self) -> &GridParams {
        &self.grid
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    /// Detect motion against the retained frame, then retain `frame`.
    ///
    /// A discarded frame is not retained: the next call behaves like the
    /// first one and compares the frame with itself.
    pub fn process(&mut self, frame: Frame) -> Detection {
        if let Some(prev) = &self.previous {
            if !prev.same_dimensions(&frame) {
                warn!(
                    "Frame size changed {}x{} → {}x{}, restarting motion detection",
                    prev.width, prev.height, frame.width, frame.height
                );
                self.previous = None;
            }
        }

        let detection = detect(self.previous.as_ref(), &frame, &self.grid);
        match &detection {
            Detection::Discarded { active_ratio } => {
                debug!(
                    "Frame discarded: {:.0}% of pixels changed",
                    active_ratio * 100.0
                );
                self.previous = None;
            }
            Detection::Triggers(_) => self.previous = Some(frame),
        }
        detection
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: [u8; 4] = [0, 0, 0, 0];
    const WHITE: [u8; 4] = [255, 255, 255, 255];

    fn grid(rows: usize, columns: usize) -> GridParams {
        GridParams {
            rows,
            columns,
            threshold: 0.25,
        }
    }

    #[test]
    fn test_first_frame_never_triggers() {
        let mut f = Frame::filled(64, 48, BLACK);
        f.fill_rect(0, 0, 32, 24, WHITE);
        let d = detect(None, &f, &grid(4, 4));
        assert_eq!(d, Detection::Triggers(vec![]));
    }

    #[test]
    fn test_block_triggers_its_cell() {
        let prev = Frame::filled(80, 40, BLACK);
        let mut cur = prev.clone();
        // Cell (column 2, row 1) of a 4x4 grid is x 40..60, y 10..20
        cur.fill_rect(40, 10, 20, 10, WHITE);
        let d = detect(Some(&prev), &cur, &grid(4, 4));
        assert_eq!(d.events(), &[TriggerEvent { column: 2, row: 1 }]);
    }

    #[test]
    fn test_global_debounce_discards_everything() {
        let prev = Frame::filled(40, 40, BLACK);
        let mut cur = prev.clone();
        // 30% of the frame changes: every cell of the top rows is full
        cur.fill_rect(0, 0, 40, 12, WHITE);
        let d = detect(Some(&prev), &cur, &grid(4, 4));
        assert!(d.is_discarded());
        assert!(d.events().is_empty());
    }

    #[test]
    fn test_one_trigger_per_column_topmost_wins() {
        let prev = Frame::filled(100, 100, BLACK);
        let mut cur = prev.clone();
        // Tall blob covering rows 2..8 of column 0 in a 10x10 grid
        cur.fill_rect(0, 20, 10, 60, WHITE);
        // Two separate blobs in column 5
        cur.fill_rect(50, 70, 10, 10, WHITE);
        cur.fill_rect(50, 40, 10, 10, WHITE);
        let d = detect(Some(&prev), &cur, &grid(10, 10));
        assert_eq!(
            d.events(),
            &[
                TriggerEvent { column: 0, row: 2 },
                TriggerEvent { column: 5, row: 4 },
            ]
        );
    }

    #[test]
    fn test_small_changes_are_ignored() {
        let prev = Frame::filled(40, 40, [100, 100, 100, 255]);
        let cur = Frame::filled(40, 40, [120, 120, 120, 255]);
        // Average moves by 15, under the 25 threshold
        assert_eq!(activity_mask(&prev, &cur).1, 0);
        assert!(detect(Some(&prev), &cur, &grid(2, 2)).events().is_empty());
    }

    #[test]
    fn test_cell_needs_more_than_threshold() {
        let prev = Frame::filled(40, 40, BLACK);
        let mut exactly = prev.clone();
        // 4x4 grid: cells are 10x10 = 100 px, threshold needs > 25
        exactly.fill_rect(0, 0, 5, 5, WHITE);
        assert!(detect(Some(&prev), &exactly, &grid(4, 4)).events().is_empty());
        let mut over = prev.clone();
        over.fill_rect(0, 0, 6, 5, WHITE);
        assert_eq!(detect(Some(&prev), &over, &grid(4, 4)).events().len(), 1);
    }

    #[test]
    fn test_malformed_frame_detects_nothing() {
        let prev = Frame::filled(40, 40, BLACK);
        let broken = Frame {
            timestamp_us: 0,
            width: 40,
            height: 40,
            data: vec![255; 100],
        };
        assert_eq!(detect(Some(&prev), &broken, &grid(4, 4)), Detection::Triggers(vec![]));
        // A malformed previous frame is ignored, like a missing one
        let mut cur = prev.clone();
        cur.fill_rect(0, 0, 10, 10, WHITE);
        assert!(detect(Some(&broken), &cur, &grid(4, 4)).events().is_empty());
    }

    #[test]
    fn test_detector_retains_and_forgets() {
        let mut det = MotionDetector::new(grid(4, 4));
        let black = Frame::filled(40, 40, BLACK);
        let white = Frame::filled(40, 40, WHITE);
        assert!(det.process(black.clone()).events().is_empty());
        assert!(det.has_previous());

        assert!(det.process(white.clone()).is_discarded());
        assert!(!det.has_previous());

        // Treated as a first frame again
        assert!(det.process(white).events().is_empty());
        assert!(det.has_previous());
    }
}
