pub mod daemon;
pub mod format;
pub mod history;
pub mod list;
pub mod purge;
pub mod settings;
pub mod show;
pub mod sync;
