use common::helper::error_chain_fmt;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    Channel, Connection as RabbitMQConnection,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    configuration::RabbitMQSettings,
    domain::entities::download_directory_job::DownloadDirectoryJob,
    ports::job_handler::JobHandler,
};

/// What should be answered to RabbitMQ for a consumed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Ack,
    Nack,
}

/// Consumes download directory jobs from a RabbitMQ queue (the "subscription")
///
/// Messages are handled one by one, in the order RabbitMQ delivers them.
pub struct JobRabbitMQSubscriber {
    connection: RabbitMQConnection,
    queue_name: String,
    consumer_tag: String,
    prefetch_count: u16,
    requeue_on_nack: bool,
}

#[derive(thiserror::Error)]
pub enum SubscriberError {
    #[error(transparent)]
    RabbitMQError(#[from] lapin::Error),
}

impl std::fmt::Debug for SubscriberError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl JobRabbitMQSubscriber {
    pub fn new(
        connection: RabbitMQConnection,
        settings: &RabbitMQSettings,
        consumer_tag_prefix: &str,
    ) -> Self {
        Self {
            connection,
            queue_name: settings.subscription.clone(),
            consumer_tag: format!("{}_{}", consumer_tag_prefix, uuid::Uuid::new_v4()),
            prefetch_count: settings.prefetch_count,
            requeue_on_nack: settings.requeue_on_nack,
        }
    }

    /// Receives jobs until `cancel_token` is cancelled or the consumer stops
    ///
    /// It declares the (durable) queue, then for each delivery:
    /// - a payload that is not a valid job is negatively acknowledged, the handler is not called
    /// - a job the handler fails on is negatively acknowledged
    /// - a job the handler succeeds on is acknowledged
    ///
    /// The handler receives `cancel_token` and is expected to return soon after it is cancelled.
    /// The consuming channel is closed before returning, on success or error.
    ///
    /// # Returns
    /// An error only on transport failures: failing jobs never stop the loop.
    #[tracing::instrument(name = "Receiving jobs", skip(self, cancel_token, handler), fields(queue = %self.queue_name))]
    pub async fn receive<H: JobHandler>(
        &self,
        cancel_token: CancellationToken,
        handler: &H,
    ) -> Result<(), SubscriberError> {
        let channel = self.connection.create_channel().await?;

        let result = self.consume(&channel, &cancel_token, handler).await;

        // The broker closes the channel itself on channel-level errors
        if channel.status().connected() {
            if let Err(error) = channel.close(200, "Subscriber stopped").await {
                warn!(?error, "Failed to close the consuming channel");
            }
        }

        result
    }

    async fn consume<H: JobHandler>(
        &self,
        channel: &Channel,
        cancel_token: &CancellationToken,
        handler: &H,
    ) -> Result<(), SubscriberError> {
        channel
            .basic_qos(self.prefetch_count, BasicQosOptions::default())
            .await?;

        // Idempotent
        channel
            .queue_declare(
                &self.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        let consumer_options = BasicConsumeOptions {
            no_ack: false,
            ..BasicConsumeOptions::default()
        };

        let mut consumer = channel
            .basic_consume(
                &self.queue_name,
                &self.consumer_tag,
                consumer_options,
                FieldTable::default(),
            )
            .await?;

        info!(
            "📡 Consuming from queue {} as {}, waiting for jobs ...",
            self.queue_name, self.consumer_tag
        );

        loop {
            let delivery = tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Cancellation requested, stopping to receive jobs");
                    return Ok(());
                }
                delivery = consumer.next() => delivery,
            };

            let delivery = match delivery {
                Some(Ok(delivery)) => delivery,
                // Carries the error and is always followed by the end of the stream
                Some(Err(error)) => {
                    error!(
                        ?error,
                        "Failed to consume queue message on queue {}", self.queue_name
                    );
                    return Err(error.into());
                }
                None => {
                    info!("The consumer of queue {} was cancelled", self.queue_name);
                    return Ok(());
                }
            };

            let delivery_tag = delivery.delivery_tag;

            async {
                match process_message(handler, cancel_token, &delivery.data).await {
                    MessageOutcome::Ack => {
                        info!("Acknowledging message with delivery tag {}", delivery_tag);
                        if let Err(error) = delivery.ack(BasicAckOptions::default()).await {
                            error!(?error, "Failed to ack job message");
                        }
                    }
                    MessageOutcome::Nack => {
                        info!(
                            "Not acknowledging message with delivery tag {} (requeue: {})",
                            delivery_tag, self.requeue_on_nack
                        );
                        let nack_options = BasicNackOptions {
                            requeue: self.requeue_on_nack,
                            ..BasicNackOptions::default()
                        };
                        if let Err(error) = delivery.nack(nack_options).await {
                            error!(?error, "Failed to nack job message");
                        }
                    }
                }
            }
            .instrument(info_span!(
                "Handling consumed message",
                queue = %self.queue_name,
                delivery_tag,
                message_id = %uuid::Uuid::new_v4(),
            ))
            .await
        }
    }

    /// Closes the RabbitMQ connection, the subscriber cannot receive anymore
    pub async fn close(&self) -> Result<(), SubscriberError> {
        self.connection.close(200, "Worker stopped").await?;
        Ok(())
    }
}

/// Parses a message payload and runs the handler on the job it contains
///
/// Decides whether the message should be acknowledged, without talking to RabbitMQ.
pub async fn process_message<H: JobHandler + ?Sized>(
    handler: &H,
    cancel_token: &CancellationToken,
    data: &[u8],
) -> MessageOutcome {
    let job = match DownloadDirectoryJob::try_parsing(data) {
        Ok(job) => job,
        Err(error) => {
            error!(?error, "Failed to parse download directory job message data");
            return MessageOutcome::Nack;
        }
    };

    info!(?job, "Received download directory job");

    match handler.handle(cancel_token, &job).await {
        Ok(()) => MessageOutcome::Ack,
        Err(error) => {
            error!(
                error = ?error,
                ?job,
                "Failed to handle download directory job message"
            );
            MessageOutcome::Nack
        }
    }
}
