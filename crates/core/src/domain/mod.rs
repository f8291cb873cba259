pub mod conversation;
pub mod error;
pub mod job;
pub mod settings;
pub mod stt;
pub mod types;
