pub mod config;
pub mod event;
pub mod reporter;
pub mod sink;
pub mod turn;

// Re-export specific items if needed for convenient access
pub use reporter::CallEventReporter;
pub use reporter::Transcription;
