pub mod conversation_service;
pub mod job_queue;
