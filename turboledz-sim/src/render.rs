//! Stage history drawing
//!
//! One band per physical core, core 0 at the bottom. Each band is two
//! terminal rows tall with a blank row above it; columns run from oldest on
//! the left to newest on the right edge.

use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor};
use crossterm::{cursor::MoveTo, queue, terminal::Clear, terminal::ClearType};
use std::io::Write;
use turboledz_core::{FrequencyStage, TemporalSmoother};

/// Characters per history column, including the gap.
const COLUMN_WIDTH: u16 = 3;
const BAND_HEIGHT: u16 = 3;
/// Width of the `cNN ` label in front of each band.
const LABEL_WIDTH: u16 = 4;

pub fn stage_color(stage: FrequencyStage) -> Color {
    match stage {
        FrequencyStage::Min => Color::DarkGrey,
        FrequencyStage::Low => Color::Green,
        FrequencyStage::Mid => Color::Rgb { r: 0xe0, g: 0x90, b: 0x00 },
        FrequencyStage::Max => Color::Red,
    }
}

/// History columns that fit in a terminal `width` characters wide.
pub fn visible_columns(width: u16) -> usize {
    usize::from(width.saturating_sub(LABEL_WIDTH) / COLUMN_WIDTH)
}

/// The newest `columns` collapsed stages, left-padded with `None`.
pub fn history_cells(
    history: impl ExactSizeIterator<Item = FrequencyStage>,
    columns: usize,
) -> Vec<Option<FrequencyStage>> {
    let total = history.len();
    let shown = total.min(columns);
    let mut cells = vec![None; columns - shown];
    cells.extend(history.skip(total - shown).map(Some));
    cells
}

/// Redraw every core band that fits in a `width` x `height` terminal.
pub fn draw<W: Write>(out: &mut W, smoother: &TemporalSmoother, width: u16, height: u16) -> std::io::Result<()> {
    let columns = visible_columns(width);
    let cores = smoother.num_cores();
    queue!(out, Clear(ClearType::All))?;

    for core in 0..cores {
        let Some(window) = smoother.window(core) else {
            continue;
        };
        let band = u16::try_from(cores - 1 - core).unwrap_or(u16::MAX);
        let top = band.saturating_mul(BAND_HEIGHT).saturating_add(1);
        if top.saturating_add(1) >= height {
            continue;
        }

        queue!(out, MoveTo(0, top), ResetColor, Print(format!("c{core:<2} ")))?;
        let cells = history_cells(window.history(), columns);
        for row in [top, top + 1] {
            for (col, cell) in cells.iter().enumerate() {
                let x = LABEL_WIDTH + col as u16 * COLUMN_WIDTH;
                let color = cell.map(stage_color).unwrap_or(Color::Black);
                queue!(out, MoveTo(x, row), SetBackgroundColor(color), Print("  "), ResetColor)?;
            }
        }
    }

    out.flush()
}
