pub mod blacklist;
pub mod browser;
pub mod config;
pub mod daemon;
pub mod error;
pub mod guard;
pub mod housekeeping;
pub mod ipc;
pub mod native;
pub mod protocol;
pub mod service;
pub mod session;
pub mod state;
pub mod status;
pub mod timer;

pub use blacklist::BlacklistRegistry;
pub use browser::{MemoryBrowser, StatusPort, TabHost};
pub use config::Config;
pub use error::FocusError;
pub use protocol::{Request, Response, SessionStatus};
pub use service::FocusService;
pub use session::SessionEngine;
pub use timer::TimerEngine;
