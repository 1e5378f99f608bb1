//! Average block time estimation for the source chain.
//!
//! A sample window of `sample_size` heights ending right below the committable boundary
//! (`current_height - confirmation_depth`) is requested concurrently. The average is computed
//! exactly once, after every request of the window has settled: absent blocks and failed
//! requests are dropped, the remaining headers are ordered by height, and the mean of their
//! consecutive timestamp deltas is rounded up to the next whole second.

use crate::client::{BlockHeader, ChainClient};
use crate::error::{AnchorError, AnchorResult, ChainError};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTimeInfo {
    pub current_height: u64,
    /// Seconds, rounded up.
    pub average_block_time: u64,
    /// Seconds between the first and the last sampled block.
    pub total_time: u64,
    /// Ordered by height.
    pub sampled_blocks: Vec<BlockHeader>,
}

impl BlockTimeInfo {
    pub fn average_block_duration(&self) -> Duration {
        Duration::from_secs(self.average_block_time)
    }
}

/// Heights of the sample window, clipped at genesis.
pub fn sample_window(current_height: u64, sample_size: u64, confirmation_depth: u64) -> Vec<u64> {
    let Some(end) = current_height.checked_sub(confirmation_depth) else {
        return Vec::new();
    };
    let start = end.saturating_sub(sample_size);
    (start..end).collect()
}

/// Returns `(average, total)` in seconds for blocks ordered by height.
pub fn average_of_deltas(blocks: &[BlockHeader]) -> Option<(u64, u64)> {
    if blocks.len() < 2 {
        return None;
    }
    let total: u64 = blocks.windows(2).map(|pair| pair[1].timestamp.saturating_sub(pair[0].timestamp)).sum();
    let intervals = (blocks.len() - 1) as u64;
    Some((total.div_ceil(intervals), total))
}

/// Samples the source chain and computes its average block time.
///
/// `request_timeout` bounds the height lookup and the whole sampling fan-out.
pub async fn estimate_block_time(
    client: &dyn ChainClient,
    sample_size: u64,
    confirmation_depth: u64,
    request_timeout: Duration,
) -> AnchorResult<BlockTimeInfo> {
    let current_height = tokio::time::timeout(request_timeout, client.current_height())
        .await
        .map_err(|_| ChainError::Timeout { request: "current_height", after: request_timeout })??;

    let heights = sample_window(current_height, sample_size, confirmation_depth);
    let requested = heights.len();
    tracing::debug!(
        current_height,
        confirmation_depth,
        requested,
        "Sampling source blocks for block time estimation"
    );

    let settled = tokio::time::timeout(request_timeout, client.batch_get_blocks(heights))
        .await
        .map_err(|_| ChainError::Timeout { request: "batch_get_blocks", after: request_timeout })?;

    let mut sampled_blocks: Vec<BlockHeader> = settled.into_iter().filter_map(|(_, block)| block).collect();
    sampled_blocks.sort_by_key(|block| block.height);
    sampled_blocks.dedup_by_key(|block| block.height);

    let Some((average_block_time, total_time)) = average_of_deltas(&sampled_blocks) else {
        tracing::warn!(requested, received = sampled_blocks.len(), "Not enough blocks to estimate block time");
        return Err(AnchorError::InsufficientData { requested, received: sampled_blocks.len() });
    };

    if sampled_blocks.len() < requested {
        tracing::debug!(requested, received = sampled_blocks.len(), "Some sampled blocks were unavailable");
    }
    tracing::info!("⏱️  Average source block time is {average_block_time}s over {} blocks", sampled_blocks.len());

    Ok(BlockTimeInfo { current_height, average_block_time, total_time, sampled_blocks })
}
