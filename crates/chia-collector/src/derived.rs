//! Metrics computed from more than one backend response.

use chia_rpc::{BlockRecord, FullNodeApi, RpcResult};
use tracing::debug;

/// Protocol target: 4608 blocks per 24 hours.
pub const SECONDS_PER_BLOCK: f64 = 86400.0 / 4608.0;

/// Sentinel published when time-to-win is undefined.
pub const UNDEFINED: f64 = -1.0;

/// Height distance between the two sampled transaction blocks.
const BLOCKS_TO_COMPARE: u32 = 500;

/// Below this peak height the chain is too short to sample.
const MIN_PEAK_HEIGHT: u32 = BLOCKS_TO_COMPARE + 100;

/// Average seconds per block over roughly the last 500 blocks.
///
/// Falls back to [`SECONDS_PER_BLOCK`] when there is no peak, the chain is
/// shorter than 600 blocks, or a walk back to a transaction block reaches
/// genesis. RPC failures propagate.
pub async fn average_block_time(node: &dyn FullNodeApi, peak: Option<&BlockRecord>) -> RpcResult<f64> {
    let Some(peak) = peak else {
        return Ok(SECONDS_PER_BLOCK);
    };
    if peak.height < MIN_PEAK_HEIGHT {
        debug!(height = peak.height, "chain too short, using protocol block time");
        return Ok(SECONDS_PER_BLOCK);
    }

    let Some(newest) = last_transaction_block(node, peak.clone()).await? else {
        return Ok(SECONDS_PER_BLOCK);
    };
    let past = node
        .get_block_record_by_height(newest.height.saturating_sub(BLOCKS_TO_COMPARE))
        .await?;
    let Some(oldest) = last_transaction_block(node, past).await? else {
        return Ok(SECONDS_PER_BLOCK);
    };

    match (newest.timestamp, oldest.timestamp) {
        (Some(t1), Some(t0)) if newest.height > oldest.height => {
            Ok(t1.saturating_sub(t0) as f64 / f64::from(newest.height - oldest.height))
        }
        _ => Ok(SECONDS_PER_BLOCK),
    }
}

/// Walk `prev_hash` links until a block with a timestamp is found.
async fn last_transaction_block(
    node: &dyn FullNodeApi,
    mut block: BlockRecord,
) -> RpcResult<Option<BlockRecord>> {
    loop {
        if block.is_transaction_block() {
            return Ok(Some(block));
        }
        if block.height == 0 {
            return Ok(None);
        }
        block = node.get_block_record(&block.prev_hash).await?;
    }
}

/// Expected seconds until the fleet wins a block, or [`UNDEFINED`].
///
/// The block time is truncated to whole seconds before dividing by the
/// fleet's share of the netspace.
pub fn expected_time_to_win(fleet_plot_size: f64, netspace: f64, average_block_time: f64) -> f64 {
    if netspace == 0.0 {
        return UNDEFINED;
    }
    let proportion = fleet_plot_size / netspace;
    if proportion == 0.0 {
        return UNDEFINED;
    }
    average_block_time.trunc() / proportion
}
