//! Application shell: settings, listener and server lifecycle

pub mod app;

pub use app::Application;
