use common::telemetry::{get_tracing_subscriber, init_tracing_subscriber};
use directory_download_worker::{
    configuration::get_configuration, shutdown::wait_for_shutdown_signal, startup::Application,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let tracing_subscriber = get_tracing_subscriber(
        "directory_download_worker".into(),
        "info".into(),
        std::io::stdout,
    );
    init_tracing_subscriber(tracing_subscriber).expect("Failed to set up tracing.");

    // Panics if the configuration can't be read: required settings are missing
    let configuration = get_configuration().expect("Failed to read configuration.");

    let application = match Application::build(configuration).await {
        Ok(application) => application,
        Err(error) => panic!("Failed to build application: {:?}", error),
    };

    // Cancelled on SIGINT/SIGTERM to stop receiving jobs
    let cancel_token = CancellationToken::new();
    tokio::spawn(wait_for_shutdown_signal(cancel_token.clone()));

    application
        .run_until_stopped(cancel_token)
        .await
        .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, format!("{:?}", error)))?;

    Ok(())
}
