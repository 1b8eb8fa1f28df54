pub mod job_handler;
pub mod object_store;
