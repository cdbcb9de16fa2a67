pub mod control;
pub mod host;
pub mod manifest;
