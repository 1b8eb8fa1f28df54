use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use directory_download_worker::{
    handlers::handler_download_directory_job::{DownloadDirectoryJobHandler, InventoryWriter},
    repositories::job_rabbitmq_subscriber::{process_message, MessageOutcome},
};
use tokio_util::sync::CancellationToken;

use crate::helpers::{init_test, read_tree, InMemoryObjectStore};

/// A job handler whose inventories are captured in memory
struct TestHandler {
    handler: DownloadDirectoryJobHandler,
    output: Arc<Mutex<Vec<u8>>>,
}

impl TestHandler {
    fn new(store: InMemoryObjectStore, download_root: &Path) -> Self {
        let (_store, downloader) = store.into_downloader();
        let output = Arc::new(Mutex::new(Vec::<u8>::new()));
        let inventory_writer: InventoryWriter = output.clone();

        Self {
            handler: DownloadDirectoryJobHandler::new(
                Arc::new(downloader),
                download_root.to_path_buf(),
                inventory_writer,
            ),
            output,
        }
    }

    fn printed(&self) -> String {
        String::from_utf8(self.output.lock().unwrap().clone()).unwrap()
    }
}

fn destinations(download_root: &Path) -> Vec<PathBuf> {
    let mut destinations: Vec<PathBuf> = std::fs::read_dir(download_root)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    destinations.sort();
    destinations
}

#[tokio::test]
async fn a_job_is_downloaded_into_its_own_destination_and_inventoried() {
    init_test();
    let download_root = tempfile::tempdir().unwrap();

    let test_handler = TestHandler::new(
        InMemoryObjectStore::new(10)
            .with_object("batch/2024-01-01/a.txt", b"hello")
            .with_object("batch/2024-01-01/sub/b.txt", b"abc"),
        download_root.path(),
    );

    let outcome = process_message(
        &test_handler.handler,
        &CancellationToken::new(),
        br#"{"path": "batch/2024-01-01"}"#,
    )
    .await;

    assert_eq!(outcome, MessageOutcome::Ack);

    let destinations = destinations(download_root.path());
    assert_eq!(destinations.len(), 1);
    let destination = &destinations[0];
    let destination_name = destination.file_name().unwrap().to_string_lossy();
    assert!(
        destination_name.starts_with("2024-01-01_"),
        "unexpected destination {}",
        destination_name
    );

    let tree = read_tree(destination);
    assert_eq!(tree.len(), 2);
    assert_eq!(tree[&PathBuf::from("a.txt")].len(), 5);
    assert_eq!(tree[&PathBuf::from("sub/b.txt")].len(), 3);

    let printed = test_handler.printed();
    assert!(printed.contains(&format!(
        "=== Downloaded files in {} ===",
        destination.display()
    )));
    assert!(printed.contains("[FILE] a.txt (5 bytes)"));
    assert!(printed.contains("[DIR]  sub/"));
    assert!(printed.contains("[FILE] sub/b.txt (3 bytes)"));
    assert!(printed.contains(&format!(
        "=== All contents in {} ===",
        download_root.path().display()
    )));
    assert!(printed.contains(&format!("[DIR]  {}/", destination_name)));
}

#[tokio::test]
async fn a_redelivered_job_gets_a_new_destination() {
    init_test();
    let download_root = tempfile::tempdir().unwrap();

    let test_handler = TestHandler::new(
        InMemoryObjectStore::new(10).with_object("batch/a.txt", b"hello"),
        download_root.path(),
    );

    for _ in 0..2 {
        let outcome = process_message(
            &test_handler.handler,
            &CancellationToken::new(),
            br#"{"path": "batch"}"#,
        )
        .await;
        assert_eq!(outcome, MessageOutcome::Ack);
    }

    let destinations = destinations(download_root.path());
    assert_eq!(destinations.len(), 2);
    assert_eq!(read_tree(&destinations[0]), read_tree(&destinations[1]));
}

#[tokio::test]
async fn a_failing_download_is_negatively_acknowledged_and_leaves_its_partial_tree() {
    init_test();
    let download_root = tempfile::tempdir().unwrap();

    let test_handler = TestHandler::new(
        InMemoryObjectStore::new(1)
            .with_object("batch/1.txt", b"one")
            .with_object("batch/2.txt", b"two")
            .failing_on_listing_call(1),
        download_root.path(),
    );

    let outcome = process_message(
        &test_handler.handler,
        &CancellationToken::new(),
        br#"{"path": "batch"}"#,
    )
    .await;

    assert_eq!(outcome, MessageOutcome::Nack);

    let destinations = destinations(download_root.path());
    assert_eq!(destinations.len(), 1);
    assert_eq!(read_tree(&destinations[0]).len(), 1);
    assert!(test_handler.printed().is_empty());
}

#[tokio::test]
async fn a_malformed_job_creates_no_destination() {
    init_test();
    let download_root = tempfile::tempdir().unwrap();

    let test_handler = TestHandler::new(
        InMemoryObjectStore::new(10).with_object("batch/a.txt", b"hello"),
        download_root.path(),
    );

    let outcome = process_message(
        &test_handler.handler,
        &CancellationToken::new(),
        br#"{"directory": "batch"}"#,
    )
    .await;

    assert_eq!(outcome, MessageOutcome::Nack);
    assert!(destinations(download_root.path()).is_empty());
}
