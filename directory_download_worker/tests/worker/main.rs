mod handler_download_directory_job;
mod rabbitmq_worker;
