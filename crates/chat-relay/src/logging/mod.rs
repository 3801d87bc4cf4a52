//! Tracing subscriber setup

mod subscriber;

pub use subscriber::init_logger;
