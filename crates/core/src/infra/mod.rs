pub mod audio;
pub mod catalog;
pub mod generator;
pub mod metrics;
pub mod speech;
