use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line};
use alacritty_terminal::term::cell::Flags;
use alacritty_terminal::term::Term;

use crate::terminal::EventProxy;

/// A read-only text view into the visible terminal screen.
pub struct ScreenView<'a> {
    term: &'a Term<EventProxy>,
}

impl<'a> ScreenView<'a> {
    pub(crate) fn new(term: &'a Term<EventProxy>) -> Self {
        Self { term }
    }

    /// Number of visible rows.
    pub fn rows(&self) -> u16 {
        self.term.screen_lines() as u16
    }

    /// Number of columns.
    pub fn cols(&self) -> u16 {
        self.term.columns() as u16
    }

    /// The text of one visible row with trailing blanks removed.
    ///
    /// Row 0 is the top of the visible screen. Out-of-range rows are empty.
    pub fn line_text(&self, row: u16) -> String {
        if (row as usize) >= self.term.screen_lines() {
            return String::new();
        }

        let grid = self.term.grid();
        let line = &grid[Line(row as i32)];
        let mut text = String::with_capacity(self.term.columns());
        for col in 0..self.term.columns() {
            let cell = &line[Column(col)];
            // The spacer after a wide char carries no glyph of its own.
            if cell.flags.contains(Flags::WIDE_CHAR_SPACER) {
                continue;
            }
            text.push(cell.c);
        }
        text.truncate(text.trim_end().len());
        text
    }

    /// All visible rows joined with `\n`, trailing empty rows dropped.
    pub fn text(&self) -> String {
        let mut lines: Vec<String> = (0..self.rows()).map(|row| self.line_text(row)).collect();
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }
}
