use async_stream::stream;
use duet_storage::{Entry, Features, Presence};
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};

/// Default number of entries probed at once.
pub const DEFAULT_PROBE_CONCURRENCY: usize = 16;

async fn probe_side(features: &Features, entry: &Entry) -> Presence {
    match features.probe(entry).await {
        Ok(presence) => presence,
        Err(err) => {
            tracing::warn!(
                path = %entry.path().display(),
                backend = features.name(),
                error = %err,
                "Probe failed, existence unknown"
            );
            Presence::Unknown
        },
    }
}

async fn probe_entry(local: &Features, remote: &Features, position: usize, mut entry: Entry) -> (usize, Entry) {
    let (local_presence, remote_presence) = tokio::join!(probe_side(local, &entry), probe_side(remote, &entry));
    entry.record_local(local_presence);
    entry.record_remote(remote_presence);
    (position, entry)
}

/// Probe both sides of every entry, `concurrency` entries at a time.
///
/// Entries are yielded in completion order, together with their position in
/// `entries`. A failed probe never ends the stream; the side is recorded as
/// [`Unknown`](Presence::Unknown) instead.
pub fn probe_stream<'a>(
    local: &'a Features,
    remote: &'a Features,
    entries: Vec<Entry>,
    concurrency: usize,
) -> impl Stream<Item = (usize, Entry)> + 'a {
    stream!({
        let mut pending: Vec<_> = entries
            .into_iter()
            .enumerate()
            .map(|(position, entry)| probe_entry(local, remote, position, entry))
            .collect();
        let mut processing = FuturesUnordered::new();
        processing.extend(pending.drain(..concurrency.max(1).min(pending.len())));
        while let Some(probed) = processing.next().await {
            yield probed;
            // Oldest first.
            if !pending.is_empty() {
                processing.push(pending.remove(0));
            }
        }
    })
}

/// Probe every entry, returning them in their original order.
pub async fn probe(local: &Features, remote: &Features, entries: Vec<Entry>, concurrency: usize) -> Vec<Entry> {
    let mut probed: Vec<(usize, Entry)> = probe_stream(local, remote, entries, concurrency).collect().await;
    probed.sort_by_key(|(position, _)| *position);
    probed.into_iter().map(|(_, entry)| entry).collect()
}
