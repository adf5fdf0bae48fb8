pub mod config;
pub mod consumer;
pub mod error;
pub mod events;
pub mod pool;
pub mod source;
pub mod tasks {
    pub mod updater;
}
