use super::{StoreError, ThrottleStore};
use ::redis::aio::MultiplexedConnection;
use ::redis::{Client, RedisError, Script};
use async_trait::async_trait;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// INCR that sets the expiry only when the key is created, so the window is
/// fixed from the first request rather than sliding with every hit.
static INCREMENT_WITH_TTL: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        local count = redis.call('INCR', KEYS[1])
        if count == 1 then
            redis.call('EXPIRE', KEYS[1], ARGV[1])
        end
        return count
        ",
    )
});

/// Redis-backed counters shared by every service process.
///
/// The connection is established lazily and re-established after I/O
/// failures, so a Redis outage at start-up does not prevent the service
/// from booting.
pub struct RedisStore {
    client: Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Unavailable(format!("Failed to create Redis client: {}", e)))?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(CONNECT_TIMEOUT, self.client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| StoreError::Unavailable("Timed out connecting to Redis".to_string()))?
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to Redis: {}", e)))?;

        debug!("Connected to Redis");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn handle_error(&self, err: RedisError) -> StoreError {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            warn!(error = %err, "Dropping Redis connection after I/O failure");
            *self.connection.lock().await = None;
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

#[async_trait]
impl ThrottleStore for RedisStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        let ttl_secs = ttl.as_secs().max(1);

        match INCREMENT_WITH_TTL
            .key(key)
            .arg(ttl_secs)
            .invoke_async::<_, u64>(&mut conn)
            .await
        {
            Ok(count) => Ok(count),
            Err(e) => Err(self.handle_error(e).await),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        match ::redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.handle_error(e).await),
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_redis_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let store = RedisStore::new(&format!("redis://127.0.0.1:{}", port)).unwrap();
        let err = store
            .increment("images_127.0.0.1", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.ping().await.is_err());
    }
}
