pub mod download_directory_job;
pub mod inventory;
pub mod remote_object;
