pub mod job_rabbitmq_subscriber;
pub mod object_store_s3_repository;
