use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chat_feed::{
    config::load_settings, rest::RestChatBackend, ChatSessionController, FeedEvent, FetchOutcome,
    LiveHub, SurfaceViewer,
};
use clap::Parser;
use shared::domain::{ChatRoomId, ProfileId};
use tokio::{
    sync::broadcast::{
        self,
        error::{RecvError, TryRecvError},
    },
    time::timeout,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const RECEIPT_WAIT: Duration = Duration::from_secs(5);

/// Opens one chat room, pages its history and prints the grouped feed as JSON.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    profile_id: Uuid,
    #[arg(long)]
    chat_room_id: Uuid,
    #[arg(long)]
    page_size: Option<u32>,
    /// Number of "load more" rounds after the initial page.
    #[arg(long, default_value_t = 0)]
    extra_pages: u32,
    /// Treat the surface as hidden so no read receipts are sent.
    #[arg(long)]
    hidden: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(page_size) = args.page_size {
        settings.page_size = page_size;
    }

    let backend = Arc::new(RestChatBackend::from_settings(&settings)?);
    let chat_room_id = ChatRoomId(args.chat_room_id);
    let profile_id = ProfileId(args.profile_id);

    let chat_room = backend.fetch_chat_room(chat_room_id).await?;
    let counterparties: Vec<String> = chat_room
        .counterparties(profile_id)
        .map(|id| id.to_string())
        .collect();
    info!(%chat_room_id, counterparties = ?counterparties, "opening chat room");

    let controller = ChatSessionController::new(
        &settings,
        backend.clone(),
        Arc::new(LiveHub::new(settings.live_channel_capacity)),
        backend,
        Arc::new(SurfaceViewer::new(Some(profile_id), !args.hidden)),
    );
    let mut events = controller.subscribe_events();
    controller.open_room(chat_room_id).await;

    for _ in 0..=args.extra_pages {
        match controller.fetch_more().await? {
            FetchOutcome::Applied {
                exhausted: true, ..
            } => break,
            FetchOutcome::Skipped | FetchOutcome::Stale => break,
            FetchOutcome::Applied { .. } => {}
        }
    }

    if timeout(RECEIPT_WAIT, settle_read_receipts(&mut events))
        .await
        .is_err()
    {
        warn!(%chat_room_id, "read receipts still in flight at exit");
    }

    let view = controller.view().await;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Returns once every receipt dispatched so far has been submitted or failed.
async fn settle_read_receipts(events: &mut broadcast::Receiver<FeedEvent>) {
    let mut outstanding = 0usize;
    loop {
        let event = match events.try_recv() {
            Ok(event) => event,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => return,
            Err(TryRecvError::Empty) if outstanding == 0 => return,
            Err(TryRecvError::Empty) => match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return,
            },
        };
        match event {
            FeedEvent::ReadReceiptDispatched { .. } => outstanding += 1,
            FeedEvent::ReadReceiptSubmitted { .. } | FeedEvent::ReadReceiptFailed { .. } => {
                outstanding = outstanding.saturating_sub(1);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use shared::domain::MessageId;

    use super::*;

    fn room() -> ChatRoomId {
        ChatRoomId(Uuid::from_u128(9))
    }

    #[tokio::test]
    async fn settles_immediately_without_dispatched_receipts() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(FeedEvent::FeedUpdated {
            chat_room_id: room(),
        })
        .expect("send");

        timeout(Duration::from_secs(1), settle_read_receipts(&mut rx))
            .await
            .expect("settled");
    }

    #[tokio::test]
    async fn waits_for_dispatched_receipt_to_finish() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(FeedEvent::ReadReceiptDispatched {
            chat_room_id: room(),
            message_id: MessageId(4),
        })
        .expect("send");

        let settle = tokio::spawn(async move { settle_read_receipts(&mut rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!settle.is_finished());

        tx.send(FeedEvent::ReadReceiptFailed {
            chat_room_id: room(),
            message_id: MessageId(4),
            error: "unavailable".into(),
        })
        .expect("send");
        timeout(Duration::from_secs(1), settle)
            .await
            .expect("settled")
            .expect("join");
    }
}
