use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}
