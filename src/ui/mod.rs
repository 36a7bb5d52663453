// UI module - terminal presentation of batch progress
//
// ConsolePresenter consumes the progress queue, folds events into the
// StateManager and prints one line per finished file.

pub mod console;

pub use console::{ConsolePresenter, outcome_line, render, write_report};
