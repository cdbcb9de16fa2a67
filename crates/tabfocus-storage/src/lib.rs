pub mod db;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod store;

pub use db::Database;
pub use memory::MemoryStore;
pub use models::{FocusState, HiddenTabRecord, TimerMode, TimerState};
pub use store::{keys, load_json, save_json, KeyValueStore};
