//! Settled-round records: a lookup index for idempotent replay and an
//! append-only audit log.

use crate::errors::{RgsResult, StorageError};
use crate::games::types::SettlementResult;
use crate::storage::{KvStore, StorageBatch};

const SETTLED_PREFIX: &str = "round:settled:";
const AUDIT_PREFIX: &[u8] = b"round:audit:";

fn settled_key(round_id: &str) -> Vec<u8> {
    format!("{}{}", SETTLED_PREFIX, round_id).into_bytes()
}

fn audit_key(result: &SettlementResult) -> Vec<u8> {
    // Key layout: prefix | settled_at nanos (be) | round_id
    // Sorts oldest-first; the round id suffix keeps same-instant entries apart.
    let nanos = result
        .settled_at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| result.settled_at.timestamp_millis().saturating_mul(1_000_000));
    let mut key = Vec::with_capacity(AUDIT_PREFIX.len() + 8 + result.round_id.len());
    key.extend_from_slice(AUDIT_PREFIX);
    key.extend_from_slice(&(nanos.max(0) as u64).to_be_bytes());
    key.extend_from_slice(result.round_id.as_bytes());
    key
}

/// Recorded result for `round_id`, most recent wins
pub fn load_settled(storage: &dyn KvStore, round_id: &str) -> RgsResult<Option<SettlementResult>> {
    let Some(bytes) = storage.get(&settled_key(round_id))? else {
        return Ok(None);
    };

    let result = serde_json::from_slice(&bytes).map_err(|e| {
        StorageError::CorruptedData(format!("Failed to decode settlement for round {}: {}", round_id, e))
    })?;
    Ok(Some(result))
}

/// Add the index entry and the audit entry for `result` to `batch`
pub fn record_settlement(batch: &mut StorageBatch, result: &SettlementResult) -> RgsResult<()> {
    let bytes = serde_json::to_vec(result).map_err(|e| {
        StorageError::WriteFailed(format!(
            "Failed to encode settlement for round {}: {}",
            result.round_id, e
        ))
    })?;

    batch
        .put(settled_key(&result.round_id), bytes.clone())
        .put(audit_key(result), bytes);
    Ok(())
}

/// Most recent `limit` audit entries, oldest first
pub fn load_audit_log(storage: &dyn KvStore, limit: usize) -> RgsResult<Vec<SettlementResult>> {
    let rows = storage.scan_prefix_rev(AUDIT_PREFIX, limit)?;

    let mut results = Vec::with_capacity(rows.len());
    for (key, value) in rows.into_iter().rev() {
        match serde_json::from_slice::<SettlementResult>(&value) {
            Ok(result) => results.push(result),
            Err(e) => tracing::warn!(
                key = %hex::encode(&key),
                error = %e,
                "skipping undecodable audit entry"
            ),
        }
    }
    Ok(results)
}
