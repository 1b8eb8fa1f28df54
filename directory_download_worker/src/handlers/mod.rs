pub mod handler_download_directory_job;
