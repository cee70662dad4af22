//! Conduit command-line client.
//!
//! Publishes stdin lines to a Kafka topic, prints a topic's messages while
//! acknowledging them in order, or reports topic health.
//!
//! # Produce
//!
//! Each stdin line becomes one message. With `--key-delimiter`, the text
//! before the delimiter is the partitioning key:
//!
//! ```bash
//! printf 'user-1:login\nuser-2:logout\n' | \
//!     conduit --broker localhost:9092 produce --topic events --key-delimiter :
//! ```
//!
//! # Consume
//!
//! Messages are printed one per line and acknowledged after printing, so an
//! interrupted run resumes after the last printed message:
//!
//! ```bash
//! conduit --broker localhost:9092 consume --topic events --group audit --offset oldest
//! ```
//!
//! # Status
//!
//! ```bash
//! conduit --broker localhost:9092 status --topic events
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::process::ExitCode;
use std::sync::Arc;

use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use conduit_core::{
    cancellation, AsyncMessageSink, AsyncMessageSource, CancelHandle, Message,
};
use conduit_kafka::{KafkaSink, KafkaSource, OffsetReset, SinkConfig, SourceConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Capacity of the message and acknowledgment channels.
const CHANNEL_CAPACITY: usize = 256;

/// Initial offset policy for a consumer group with no commits.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum Offset {
    /// Start from the oldest retained message.
    Oldest,
    /// Start from messages produced after joining.
    #[default]
    Newest,
}

impl From<Offset> for OffsetReset {
    fn from(offset: Offset) -> Self {
        match offset {
            Offset::Oldest => Self::Oldest,
            Offset::Newest => Self::Newest,
        }
    }
}

/// Conduit Kafka client.
#[derive(Parser, Debug)]
#[command(name = "conduit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bootstrap broker address. Can be specified multiple times.
    #[arg(long = "broker", default_value = "localhost:9092")]
    brokers: Vec<String>,

    /// Broker protocol version to assume (e.g., `2.8.0`).
    #[arg(long)]
    kafka_version: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish stdin lines as messages.
    Produce {
        /// Destination topic.
        #[arg(long)]
        topic: String,

        /// Use the text before this character as the partitioning key.
        #[arg(long)]
        key_delimiter: Option<char>,

        /// Largest message the producer will send.
        #[arg(long)]
        max_message_bytes: Option<u32>,
    },
    /// Print messages and acknowledge each after printing.
    Consume {
        /// Source topic.
        #[arg(long)]
        topic: String,

        /// Consumer group.
        #[arg(long)]
        group: String,

        /// Where to start when the group has no committed offset.
        #[arg(long, value_enum, default_value = "newest")]
        offset: Offset,

        /// Stop after this many messages.
        #[arg(long)]
        max_messages: Option<u64>,
    },
    /// Report the health of a topic.
    Status {
        /// Topic to inspect.
        #[arg(long)]
        topic: String,
    },
}

/// Cancels `handle` on Ctrl-C.
fn cancel_on_interrupt(handle: Arc<CancelHandle>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            handle.cancel();
        }
    });
}

fn key_fn(delimiter: char) -> impl Fn(&Message) -> Bytes + Send + Sync + 'static {
    let mut buf = [0u8; 4];
    let delimiter = delimiter.encode_utf8(&mut buf).as_bytes().to_vec();
    move |message: &Message| {
        let data = message.data();
        let end = data
            .windows(delimiter.len())
            .position(|window| window == delimiter.as_slice())
            .unwrap_or(data.len());
        Bytes::copy_from_slice(&data[..end])
    }
}

async fn produce(
    brokers: Vec<String>,
    version: Option<String>,
    topic: String,
    key_delimiter: Option<char>,
    max_message_bytes: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = SinkConfig::new(brokers, topic);
    config.version = version;
    config.max_message_bytes = max_message_bytes;
    if let Some(delimiter) = key_delimiter {
        config = config.with_key_fn(key_fn(delimiter));
    }
    let sink = Arc::new(KafkaSink::connect(config)?);

    let (handle, cancel) = cancellation();
    let handle = Arc::new(handle);
    cancel_on_interrupt(Arc::clone(&handle));

    let (msg_tx, msg_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (ack_tx, mut ack_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);

    let publisher = tokio::spawn({
        let sink = Arc::clone(&sink);
        async move { sink.publish_messages(cancel, ack_tx, msg_rx).await }
    });
    let acknowledged = tokio::spawn(async move {
        let mut count: u64 = 0;
        while let Some(message) = ack_rx.recv().await {
            debug!(message_id = %message.id(), "Acknowledged");
            count += 1;
        }
        count
    });

    let mut interrupted = handle.cancellation();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sent: u64 = 0;
    loop {
        let line = tokio::select! {
            () = interrupted.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if msg_tx.send(Message::new(line)).await.is_err() {
            // The publisher stopped; its result says why.
            break;
        }
        sent += 1;
    }
    drop(msg_tx);

    let result = publisher.await?;
    let acked = acknowledged.await?;
    info!(sent, acked, "Produce finished");
    sink.close()?;
    Ok(result?)
}

async fn consume(
    brokers: Vec<String>,
    version: Option<String>,
    topic: String,
    group: String,
    offset: Offset,
    max_messages: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = SourceConfig::new(brokers, topic, group).with_offset(offset.into());
    config.version = version;
    let source = Arc::new(KafkaSource::connect(config)?);

    let (handle, cancel) = cancellation();
    cancel_on_interrupt(Arc::new(handle));

    let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
    let (ack_tx, ack_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let consumer = tokio::spawn({
        let source = Arc::clone(&source);
        async move { source.consume_messages(cancel, msg_tx, ack_rx).await }
    });

    let mut stdout = tokio::io::stdout();
    let mut printed: u64 = 0;
    while let Some(message) = msg_rx.recv().await {
        stdout.write_all(message.data()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;

        if ack_tx.send(message).await.is_err() {
            break;
        }
        printed += 1;
        if max_messages.is_some_and(|max| printed >= max) {
            debug!(printed, "Message limit reached");
            break;
        }
    }
    // Dropping the ack stream ends the session once pending acks commit.
    // Anything delivered but not printed is redelivered next time.
    drop(ack_tx);
    while msg_rx.recv().await.is_some() {}

    let result = consumer.await?;
    info!(printed, "Consume finished");
    source.close()?;
    Ok(result?)
}

async fn status(
    brokers: Vec<String>,
    version: Option<String>,
    topic: String,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = SinkConfig::new(brokers, topic);
    config.version = version;
    let sink = KafkaSink::connect(config)?;

    let status = sink.status().await?;
    println!("{status}");
    sink.close()?;

    if status.working {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(problems = status.problems.len(), "Topic degraded");
        Ok(ExitCode::from(2))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries message payloads.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(brokers = %args.brokers.join(","), "Starting conduit");

    match args.command {
        Command::Produce {
            topic,
            key_delimiter,
            max_message_bytes,
        } => {
            produce(
                args.brokers,
                args.kafka_version,
                topic,
                key_delimiter,
                max_message_bytes,
            )
            .await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Consume {
            topic,
            group,
            offset,
            max_messages,
        } => {
            consume(
                args.brokers,
                args.kafka_version,
                topic,
                group,
                offset,
                max_messages,
            )
            .await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Status { topic } => status(args.brokers, args.kafka_version, topic).await,
    }
}
