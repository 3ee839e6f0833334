use std::{future::Future, time::Duration};

use async_trait::async_trait;
use redis::{
    Client, ConnectionAddr, ConnectionInfo, ErrorKind, RedisConnectionInfo, RedisError, Script,
    aio::MultiplexedConnection,
};
use tracing::{debug, trace};

use cronha_model::{CoordinationConfig, Endpoint};

use crate::{LockStore, StoreError, StoreResult};

/// Refresh expiry only while the key still holds the caller's value.
const RENEW_LUA: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

/// Delete only while the key still holds the caller's value.
const RELEASE_LUA: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// How the writable store endpoint is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// Always talk to one fixed endpoint.
    Direct(Endpoint),
    /// Ask sentinels, in order, for the master of `group`.
    Sentinel { nodes: Vec<Endpoint>, group: String },
}

impl Discovery {
    pub fn from_config(cfg: &CoordinationConfig) -> Self {
        if cfg.discovery_endpoints.is_empty() {
            Discovery::Direct(cfg.direct_endpoint.clone())
        } else {
            Discovery::Sentinel {
                nodes: cfg.discovery_endpoints.clone(),
                group: cfg.coordination_group_name.clone(),
            }
        }
    }
}

/// [`LockStore`] backed by Redis, optionally behind Sentinel.
///
/// Each call resolves the endpoint and opens a fresh connection, so a master
/// failover between two calls is invisible to callers. The whole call,
/// discovery included, is bounded by `call_timeout`.
pub struct RedisStore {
    discovery: Discovery,
    db: i64,
    call_timeout: Duration,
    discovery_timeout: Duration,
    renew_script: Script,
    release_script: Script,
}

impl RedisStore {
    pub fn new(
        discovery: Discovery,
        db: i64,
        call_timeout: Duration,
        discovery_timeout: Duration,
    ) -> Self {
        Self {
            discovery,
            db,
            call_timeout,
            discovery_timeout,
            renew_script: Script::new(RENEW_LUA),
            release_script: Script::new(RELEASE_LUA),
        }
    }

    pub fn from_config(cfg: &CoordinationConfig) -> Self {
        Self::new(
            Discovery::from_config(cfg),
            cfg.logical_database_index,
            cfg.store_timeout(),
            cfg.discovery_timeout(),
        )
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Find the endpoint that currently accepts writes.
    async fn resolve(&self) -> StoreResult<Endpoint> {
        let (nodes, group) = match &self.discovery {
            Discovery::Direct(endpoint) => return Ok(endpoint.clone()),
            Discovery::Sentinel { nodes, group } => (nodes, group),
        };

        let mut last_error = None;
        for node in nodes {
            trace!(sentinel = %node, group = %group, "asking sentinel for master address");
            match tokio::time::timeout(self.discovery_timeout, ask_sentinel(node, group)).await {
                Ok(Ok(master)) => {
                    trace!(master = %master, "sentinel resolved master");
                    return Ok(master);
                }
                Ok(Err(e)) => {
                    debug!(sentinel = %node, error = %e, "sentinel query failed");
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    debug!(sentinel = %node, "sentinel query timed out");
                    last_error = Some(format!("sentinel {node} timed out"));
                }
            }
        }
        Err(StoreError::Unavailable(format!(
            "no sentinel resolved group '{group}': {}",
            last_error.unwrap_or_else(|| "no sentinels configured".into())
        )))
    }

    async fn connect(&self) -> StoreResult<MultiplexedConnection> {
        let endpoint = self.resolve().await?;
        let client = Client::open(connection_info(&endpoint, self.db)).map_err(classify)?;
        client
            .get_multiplexed_async_connection()
            .await
            .map_err(classify)
    }

    /// Run one store call under the client-side deadline.
    async fn bounded<T: Send>(
        &self,
        op: &'static str,
        fut: impl Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(StoreError::Unavailable(format!(
                "{op} timed out after {}ms",
                self.call_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl LockStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn try_acquire(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        self.bounded("try_acquire", async {
            let mut conn = self.connect().await?;
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms(ttl))
                .query_async(&mut conn)
                .await
                .map_err(classify)?;
            Ok(reply.is_some())
        })
        .await
    }

    async fn try_renew(&self, key: &str, expected: &str, ttl: Duration) -> StoreResult<bool> {
        self.bounded("try_renew", async {
            let mut conn = self.connect().await?;
            let renewed: i64 = self
                .renew_script
                .key(key)
                .arg(expected)
                .arg(ttl_ms(ttl))
                .invoke_async(&mut conn)
                .await
                .map_err(classify)?;
            Ok(renewed == 1)
        })
        .await
    }

    async fn force_acquire(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.bounded("force_acquire", async {
            let mut conn = self.connect().await?;
            let _: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(ttl_ms(ttl))
                .query_async(&mut conn)
                .await
                .map_err(classify)?;
            Ok(())
        })
        .await
    }

    async fn read(&self, key: &str) -> StoreResult<Option<String>> {
        self.bounded("read", async {
            let mut conn = self.connect().await?;
            let value: Option<String> = redis::cmd("GET")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(classify)?;
            Ok(value)
        })
        .await
    }

    async fn release(&self, key: &str, expected: &str) -> StoreResult<bool> {
        self.bounded("release", async {
            let mut conn = self.connect().await?;
            let deleted: i64 = self
                .release_script
                .key(key)
                .arg(expected)
                .invoke_async(&mut conn)
                .await
                .map_err(classify)?;
            Ok(deleted == 1)
        })
        .await
    }
}

async fn ask_sentinel(node: &Endpoint, group: &str) -> StoreResult<Endpoint> {
    let client = Client::open(connection_info(node, 0)).map_err(classify)?;
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(classify)?;
    let reply: Option<Vec<String>> = redis::cmd("SENTINEL")
        .arg("get-master-addr-by-name")
        .arg(group)
        .query_async(&mut conn)
        .await
        .map_err(classify)?;

    match reply.as_deref() {
        Some([host, port]) => port
            .parse::<u16>()
            .map(|port| Endpoint::new(host.clone(), port))
            .map_err(|_| StoreError::Unavailable(format!("sentinel returned bad port '{port}'"))),
        _ => Err(StoreError::Unavailable(format!(
            "sentinel {node} does not know group '{group}'"
        ))),
    }
}

fn connection_info(endpoint: &Endpoint, db: i64) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(endpoint.host().to_string(), endpoint.port()),
        redis: RedisConnectionInfo {
            db,
            ..Default::default()
        },
    }
}

/// Error replies are rejections; everything else (I/O, refused connection,
/// read-only replica after failover) means the store is not usable right now.
fn classify(err: RedisError) -> StoreError {
    match err.kind() {
        ErrorKind::ResponseError | ErrorKind::TypeError => StoreError::Rejected(err.to_string()),
        _ => StoreError::Unavailable(err.to_string()),
    }
}

fn ttl_ms(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}
