//! Note-taking library with categories, an embedded document store,
//! scheduled saves, data snapshots and a legacy-layout migrator.

mod backup;
mod category;
mod cli;
mod config;
mod document;
mod errors;
mod helper;
mod migration;
mod note;
mod scheduler;
mod service;
mod store;
mod types;

// Re-export key components
pub use backup::*;
pub use category::*;
pub use cli::*;
pub use config::*;
pub use document::*;
pub use errors::*;
pub use helper::*;
pub use migration::*;
pub use note::*;
pub use scheduler::*;
pub use service::*;
pub use store::*;
pub use types::*;
