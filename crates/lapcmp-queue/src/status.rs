//! Job records in Redis, keyed by call id.

use redis::AsyncCommands;

use lapcmp_models::JobRecord;

use crate::error::QueueResult;
use crate::queue::JobQueue;

/// Redis key for a call id's record.
pub fn status_key(call_id: &str) -> String {
    format!("lapcmp:status:{}", call_id)
}

/// Reads and writes `JobRecord`s with the configured TTL.
#[derive(Clone)]
pub struct StatusStore {
    client: redis::Client,
    ttl_secs: u64,
}

impl StatusStore {
    pub fn new(queue: &JobQueue) -> Self {
        Self {
            client: queue.client().clone(),
            ttl_secs: queue.config().status_ttl.as_secs().max(1),
        }
    }

    pub async fn put(&self, record: &JobRecord) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(status_key(&record.call_id), payload, self.ttl_secs)
            .await?;
        Ok(())
    }

    pub async fn get(&self, call_id: &str) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(status_key(call_id)).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(Into::into))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_key() {
        assert_eq!(status_key("abc"), "lapcmp:status:abc");
    }
}
