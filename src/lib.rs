// Library surface for the binary, headless integration tests and reuse.
pub mod app;
pub mod app_dirs;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod exam;
pub mod history;
pub mod logging;
pub mod profile;
pub mod runtime;
pub mod session;
pub mod ui;
