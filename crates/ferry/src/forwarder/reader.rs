//! Message source reader.
//!
//! Streams a donor channel from a bookmark forward, one gateway page at a
//! time. Transport failures end the stream quietly: "the channel is
//! exhausted" and "the fetch failed" look the same to callers. An invalid
//! session is the exception and always reaches the caller.

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::gateway::{ChannelId, GatewayError, MessageId, RawMessage, SessionGateway};

/// Lazily page through `channel` for messages with `id > after_id`.
///
/// Each page starts after the highest id of the previous one; the stream
/// ends at the first empty page or after yielding an error.
pub fn messages(
    gateway: &dyn SessionGateway,
    channel: ChannelId,
    after_id: MessageId,
    page_size: u32,
) -> BoxStream<'_, Result<RawMessage, GatewayError>> {
    stream::unfold(Some(after_id), move |cursor| async move {
        let Some(offset) = cursor else {
            return None;
        };
        match gateway.fetch_messages(channel, offset, page_size).await {
            Ok(page) if page.is_empty() => None,
            Ok(page) => {
                // A gateway that does not advance would loop forever.
                let next = page.iter().map(|m| m.id).max().filter(|&max| max > offset);
                debug!(donor = channel, offset, fetched = page.len(), "Fetched page");
                Some((Ok(page), next))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
    .flat_map(|page| {
        stream::iter(match page {
            Ok(msgs) => msgs.into_iter().map(Ok).collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        })
    })
    .boxed()
}

/// Read everything after `after_id` into one batch.
///
/// Stops early, keeping what was read, on cancellation or on a transport
/// failure. Only [`GatewayError::SessionInvalid`] is returned as an error.
pub async fn read_batch(
    gateway: &dyn SessionGateway,
    channel: ChannelId,
    after_id: MessageId,
    page_size: u32,
    cancel: &CancellationToken,
) -> Result<Vec<RawMessage>, GatewayError> {
    let mut stream = messages(gateway, channel, after_id, page_size);
    let mut batch = Vec::new();

    while !cancel.is_cancelled() {
        match stream.next().await {
            Some(Ok(msg)) => batch.push(msg),
            Some(Err(e)) if e.is_session_invalid() => return Err(e),
            Some(Err(e)) => {
                warn!(
                    donor = channel,
                    fetched = batch.len(),
                    error = %e,
                    "Failed to fetch messages from channel"
                );
                break;
            }
            None => break,
        }
    }

    Ok(batch)
}
