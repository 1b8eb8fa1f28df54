use std::sync::{Arc, Mutex};

use chrono::Utc;
use claims::{assert_err, assert_ok};
use directory_download_worker::{
    configuration::{get_configuration, Settings},
    handlers::handler_download_directory_job::{DownloadDirectoryJobHandler, InventoryWriter},
    repositories::job_rabbitmq_subscriber::JobRabbitMQSubscriber,
    startup::{get_rabbitmq_connection, set_up_s3, Application},
};
use lapin::{
    options::{BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties,
};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::helpers::{init_test, read_tree, InMemoryObjectStore};

/// Uses a different queue for each test run
fn test_configuration() -> Settings {
    let mut c = get_configuration().expect("Failed to read configuration.");
    c.rabbitmq.subscription = format!(
        "test_{}_{}_{}",
        c.rabbitmq.subscription,
        Utc::now().format("%Y-%m-%d_%H-%M-%S"),
        Uuid::new_v4()
    );
    c
}

/// Needs the RabbitMQ broker and the S3 object storage of `configuration/develop.yaml`,
/// with its bucket already created
#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a running RabbitMQ broker and S3 object storage"]
async fn worker_downloads_the_directory_of_a_published_job() {
    init_test();
    let download_root = tempfile::tempdir().unwrap();

    let configuration = {
        let mut c = test_configuration();
        c.application.download_dir = download_root.path().to_path_buf();
        c
    };

    let prefix = format!("integration-tests/{}", Uuid::new_v4());
    let bucket = set_up_s3(&configuration.object_storage).await.unwrap();
    bucket
        .put_object(format!("{}/a.txt", prefix), b"hello")
        .await
        .unwrap();
    bucket
        .put_object(format!("{}/sub/b.txt", prefix), b"abc")
        .await
        .unwrap();

    let output = Arc::new(Mutex::new(Vec::<u8>::new()));
    let inventory_writer: InventoryWriter = output.clone();
    let application =
        Application::build_with_inventory_writer(configuration.clone(), inventory_writer)
            .await
            .expect("Failed to build application.");

    let cancel_token = CancellationToken::new();
    let worker = tokio::spawn(application.run_until_stopped(cancel_token.clone()));

    // Declared before publishing, as the worker may not have declared it yet
    let rabbitmq_connection = get_rabbitmq_connection(&configuration.rabbitmq)
        .await
        .unwrap();
    let rabbitmq_channel = rabbitmq_connection.create_channel().await.unwrap();
    rabbitmq_channel
        .queue_declare(
            &configuration.rabbitmq.subscription,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .unwrap();

    let job = serde_json::json!({ "path": prefix }).to_string();
    rabbitmq_channel
        .basic_publish(
            "",
            &configuration.rabbitmq.subscription,
            BasicPublishOptions::default(),
            job.as_bytes(),
            BasicProperties::default()
                .with_timestamp(Utc::now().timestamp_millis() as u64)
                .with_message_id(Uuid::new_v4().to_string().into()),
        )
        .await
        .unwrap();

    let max_retry = 20;
    let retry_step_time_ms = 500;
    let mut downloaded_files = 0;

    for _i in 0..max_retry {
        downloaded_files = read_tree(download_root.path()).len();
        info!("Downloaded files so far: {}", downloaded_files);

        if downloaded_files == 2 && !output.lock().unwrap().is_empty() {
            break;
        }

        sleep(Duration::from_millis(retry_step_time_ms)).await;
    }

    cancel_token.cancel();
    worker.await.unwrap().unwrap();

    assert_eq!(downloaded_files, 2);
    let printed = String::from_utf8(output.lock().unwrap().clone()).unwrap();
    assert!(printed.contains("[FILE] sub/b.txt (3 bytes)"));
}

/// Needs the RabbitMQ broker of `configuration/develop.yaml`
#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a running RabbitMQ broker"]
async fn a_subscription_failure_is_returned_and_leaves_the_connection_usable() {
    init_test();
    let download_root = tempfile::tempdir().unwrap();
    let configuration = test_configuration();

    // A non durable queue with the same name makes the declaration of the subscriber fail
    let other_connection = get_rabbitmq_connection(&configuration.rabbitmq)
        .await
        .unwrap();
    let other_channel = other_connection.create_channel().await.unwrap();
    other_channel
        .queue_declare(
            &configuration.rabbitmq.subscription,
            QueueDeclareOptions {
                auto_delete: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .unwrap();

    let (_store, downloader) = InMemoryObjectStore::new(10).into_downloader();
    let job_handler = DownloadDirectoryJobHandler::new(
        Arc::new(downloader),
        download_root.path().to_path_buf(),
        Arc::new(Mutex::new(std::io::sink())),
    );
    let subscriber = JobRabbitMQSubscriber::new(
        get_rabbitmq_connection(&configuration.rabbitmq)
            .await
            .unwrap(),
        &configuration.rabbitmq,
        "test",
    );

    let received = tokio::time::timeout(
        Duration::from_secs(10),
        subscriber.receive(CancellationToken::new(), &job_handler),
    )
    .await
    .expect("The subscriber kept receiving after a failed subscription");

    assert_err!(received);
    assert_ok!(subscriber.close().await);
    other_connection.close(200, "Test done").await.unwrap();
}
