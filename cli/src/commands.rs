use anyhow::{Context, Result};
use clap::Subcommand;
use server::model::BrokeredMessage;
use server::processor::RequestProcessor;
use server::requests::RequestEnvelope;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a request envelope and print its message ID
    Send {
        /// Request type, e.g. RetrieveCompaniesRequest
        #[arg(long = "type")]
        request_type: String,
        /// JSON payload
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Also wait for the reply and print it
        #[arg(long)]
        wait: bool,
        /// Seconds to wait for the reply
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Wait for the reply to a request sent earlier on this session
    Receive {
        message_id: String,
        /// Seconds to wait
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print replies from any session until none arrive or Ctrl-C
    Listen {
        /// Seconds to wait for each reply
        #[arg(long, default_value_t = 5)]
        max_wait: u64,
    },
    /// Show the next reply without consuming it
    Peek,
}

pub async fn run(
    command: Command,
    processor: &RequestProcessor,
    cancel: CancellationToken,
) -> Result<()> {
    match command {
        Command::Send {
            request_type,
            payload,
            wait,
            timeout,
        } => {
            let payload = serde_json::from_str(&payload).context("Payload is not valid JSON")?;
            let message_id = processor
                .send_raw(RequestEnvelope::new(request_type, payload))
                .await?;
            println!("{message_id}");

            if wait {
                let reply = processor
                    .get_response(&message_id, wait_time(processor, timeout))
                    .await?;
                print_reply(&reply)?;
            }
        }
        Command::Receive {
            message_id,
            timeout,
        } => {
            let reply = processor
                .get_response(&message_id, wait_time(processor, timeout))
                .await?;
            print_reply(&reply)?;
        }
        Command::Listen { max_wait } => {
            listen(processor, Duration::from_secs(max_wait), cancel).await?;
        }
        Command::Peek => match processor.connection().peek().await? {
            Some(reply) => print_reply(&reply)?,
            None => println!("No replies waiting"),
        },
    }
    Ok(())
}

fn wait_time(processor: &RequestProcessor, timeout_secs: Option<u64>) -> Duration {
    timeout_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(processor.max_response_wait())
}

async fn listen(
    processor: &RequestProcessor,
    max_wait: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut received = 0usize;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("Listening cancelled");
                break;
            }
            next = processor.connection().receive_any(max_wait) => next?,
        };

        match next {
            Some(reply) => {
                received += 1;
                print_reply(&reply)?;
            }
            None => {
                log::debug!("No reply within {max_wait:?}, stopping");
                break;
            }
        }
    }
    println!("{received} replies received");
    Ok(())
}

fn print_reply(reply: &BrokeredMessage) -> Result<()> {
    println!(
        "MessageId: {}  Sequence: {}  Enqueued: {}",
        reply.id, reply.sequence, reply.enqueued_at
    );
    if let Some(session_id) = &reply.session_id {
        println!("SessionId: {session_id}");
    }
    println!("{}", serde_json::to_string_pretty(&reply.body_data())?);
    Ok(())
}
