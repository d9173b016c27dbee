//! tandem-vt: terminal buffer for Tandem sessions.
//!
//! Wraps `alacritty_terminal` so the session layer can treat a terminal as an
//! opaque sink (process output in) and source (keystrokes and viewport size
//! changes out). Escape-sequence interpretation stays inside alacritty.

pub mod screen;
pub mod terminal;

pub use screen::ScreenView;
pub use terminal::{LocalEvent, VtTerminal, DEFAULT_COLS, DEFAULT_ROWS};
