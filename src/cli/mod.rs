//! Command-line host for the notebook.
mod app;
mod args;

pub use app::*;
pub use args::*;
