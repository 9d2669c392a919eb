//! Fixed-cadence text reveal, independent of how the network chunked it.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use unicode_segmentation::UnicodeSegmentation;

/// Emits `text` one grapheme per `every`. A zero interval emits the whole
/// text at once. Returns `false` when `cancel` fired before the end.
pub async fn reveal<F>(text: &str, every: Duration, cancel: &CancellationToken, mut emit: F) -> bool
where
    F: FnMut(&str),
{
    if cancel.is_cancelled() {
        return false;
    }
    if every.is_zero() {
        if !text.is_empty() {
            emit(text);
        }
        return true;
    }

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    for grapheme in text.graphemes(true) {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            _ = ticker.tick() => emit(grapheme),
        }
    }
    true
}
