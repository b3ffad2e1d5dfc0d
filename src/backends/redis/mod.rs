/// Redis cache-store client and connector
///
/// A minimal RESP client over one TCP stream, covering the commands the
/// cache-aside layer and the pool need: AUTH, SELECT, PING, GET, SET EX,
/// EXISTS, FLUSHDB.
pub mod resp;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, warn};

use self::resp::{encode_command, RespParser, RespValue};
use crate::config::CacheStoreConfig;
use crate::core::{BackendKind, Connector};
use crate::error::{PoolError, PoolResult, RedisError};

/// One physical connection to the cache store
#[derive(Debug)]
pub struct CacheStoreConnection {
    stream: TcpStream,
    read_buf: BytesMut,
    command_timeout: Duration,
    selected_db: Option<u32>,
}

impl CacheStoreConnection {
    /// Connect, enable keepalive and authenticate if a password is given
    pub async fn connect(
        addr: SocketAddr,
        password: Option<&str>,
        command_timeout: Duration,
    ) -> PoolResult<Self> {
        let stream = timeout(command_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| PoolError::timeout(format!("connect to cache store {}", addr)))??;

        stream.set_nodelay(true)?;
        if let Err(e) = socket2::SockRef::from(&stream).set_keepalive(true) {
            warn!("Failed to enable keepalive on cache-store stream: {}", e);
        }

        let mut conn = Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            command_timeout,
            selected_db: None,
        };

        if let Some(password) = password.filter(|p| !p.is_empty()) {
            conn.expect_ok("AUTH", &[b"AUTH", password.as_bytes()]).await?;
        }

        Ok(conn)
    }

    /// Database index chosen by the last successful SELECT
    pub fn selected_db(&self) -> Option<u32> {
        self.selected_db
    }

    pub async fn select(&mut self, db: u32) -> PoolResult<()> {
        let index = db.to_string();
        self.expect_ok("SELECT", &[b"SELECT", index.as_bytes()]).await?;
        self.selected_db = Some(db);
        Ok(())
    }

    pub async fn ping(&mut self) -> PoolResult<()> {
        match self.command(&[b"PING"]).await? {
            RespValue::SimpleString(s) if s == "PONG" => Ok(()),
            other => Err(unexpected("PING", &other)),
        }
    }

    pub async fn get(&mut self, key: &str) -> PoolResult<Option<Bytes>> {
        match self.command(&[b"GET", key.as_bytes()]).await? {
            RespValue::BulkString(value) => Ok(value),
            other => Err(unexpected("GET", &other)),
        }
    }

    /// SET with an expiry in seconds
    pub async fn set_ex(&mut self, key: &str, value: &[u8], ttl: Duration) -> PoolResult<()> {
        let seconds = ttl.as_secs().max(1).to_string();
        self.expect_ok("SET", &[b"SET", key.as_bytes(), value, b"EX", seconds.as_bytes()])
            .await
    }

    /// SET NX with an expiry; false when the key already held a value
    pub async fn set_nx_ex(&mut self, key: &str, value: &[u8], ttl: Duration) -> PoolResult<bool> {
        let seconds = ttl.as_secs().max(1).to_string();
        let args: [&[u8]; 6] = [b"SET", key.as_bytes(), value, b"NX", b"EX", seconds.as_bytes()];
        match self.command(&args).await? {
            RespValue::SimpleString(s) if s == "OK" => Ok(true),
            RespValue::BulkString(None) => Ok(false),
            other => Err(unexpected("SET", &other)),
        }
    }

    /// Drop every key in the selected database
    pub async fn flush_db(&mut self) -> PoolResult<()> {
        self.expect_ok("FLUSHDB", &[b"FLUSHDB"]).await
    }

    /// Send a command and read one reply; server errors become `RedisError::CommandError`
    pub async fn command(&mut self, args: &[&[u8]]) -> PoolResult<RespValue> {
        let name = args
            .first()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .unwrap_or_default();

        let reply = timeout(self.command_timeout, self.round_trip(args))
            .await
            .map_err(|_| PoolError::timeout(format!("redis {}", name)))??;

        match reply {
            RespValue::Error(message) => Err(RedisError::command(name, message).into()),
            value => Ok(value),
        }
    }

    async fn round_trip(&mut self, args: &[&[u8]]) -> PoolResult<RespValue> {
        let frame = encode_command(args);
        self.stream.write_all(&frame).await?;

        loop {
            if let Some((value, used)) = RespParser::parse(&self.read_buf)
                .map_err(|e| RedisError::protocol(e.to_string()))?
            {
                self.read_buf.advance(used);
                return Ok(value);
            }

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(RedisError::ConnectionClosed.into());
            }
        }
    }

    async fn expect_ok(&mut self, name: &str, args: &[&[u8]]) -> PoolResult<()> {
        match self.command(args).await? {
            RespValue::SimpleString(s) if s == "OK" => Ok(()),
            other => Err(unexpected(name, &other)),
        }
    }

    /// Polite QUIT; errors are ignored since the socket is dropped either way
    pub async fn quit(mut self) {
        let _ = timeout(Duration::from_millis(200), self.round_trip(&[b"QUIT"])).await;
        let _ = self.stream.shutdown().await;
    }
}

fn unexpected(command: &str, value: &RespValue) -> PoolError {
    RedisError::protocol(format!("unexpected {} reply: {:?}", command, value)).into()
}

/// Opens cache-store connections from configuration
pub struct RedisConnector {
    host: String,
    port: u16,
    password: Option<String>,
    connect_timeout: Duration,
}

impl RedisConnector {
    pub fn new(config: &CacheStoreConfig, connect_timeout: Duration) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            password: config.password.clone(),
            connect_timeout,
        }
    }

    async fn resolve(&self) -> PoolResult<SocketAddr> {
        lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| PoolError::create_failed(BackendKind::CacheStore, e.to_string()))?
            .next()
            .ok_or_else(|| {
                PoolError::create_failed(
                    BackendKind::CacheStore,
                    format!("no address for {}:{}", self.host, self.port),
                )
            })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Connection = CacheStoreConnection;

    fn kind(&self) -> BackendKind {
        BackendKind::CacheStore
    }

    async fn connect(&self) -> PoolResult<CacheStoreConnection> {
        let addr = self.resolve().await?;
        debug!("Opening cache-store connection to {}", addr);

        CacheStoreConnection::connect(addr, self.password.as_deref(), self.connect_timeout)
            .await
            .map_err(|e| PoolError::create_failed(BackendKind::CacheStore, e.to_string()))
    }

    async fn close(&self, conn: CacheStoreConnection) {
        conn.quit().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve canned replies, one per received read
    async fn canned_server(replies: &'static [&'static str]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buffer = [0u8; 1024];
            for reply in replies {
                if stream.read(&mut buffer).await.unwrap_or(0) == 0 {
                    break;
                }
                stream.write_all(reply.as_bytes()).await.unwrap();
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_ping_and_get() {
        let addr = canned_server(&["+PONG\r\n", "$5\r\nhello\r\n", "$-1\r\n"]).await;
        let mut conn = CacheStoreConnection::connect(addr, None, Duration::from_secs(1))
            .await
            .unwrap();

        conn.ping().await.unwrap();
        assert_eq!(conn.get("k").await.unwrap(), Some(Bytes::from("hello")));
        assert_eq!(conn.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_auth_failure_surfaces_command_error() {
        let addr = canned_server(&["-WRONGPASS invalid password\r\n"]).await;
        let result = CacheStoreConnection::connect(addr, Some("bad"), Duration::from_secs(1)).await;

        assert!(matches!(
            result,
            Err(PoolError::Redis(RedisError::CommandError { .. }))
        ));
    }

    #[tokio::test]
    async fn test_select_records_database() {
        let addr = canned_server(&["+OK\r\n"]).await;
        let mut conn = CacheStoreConnection::connect(addr, None, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(conn.selected_db(), None);
        conn.select(3).await.unwrap();
        assert_eq!(conn.selected_db(), Some(3));
    }

    #[tokio::test]
    async fn test_set_nx_reports_existing_key() {
        let addr = canned_server(&["+OK\r\n", "$-1\r\n", "-ERR syntax error\r\n"]).await;
        let mut conn = CacheStoreConnection::connect(addr, None, Duration::from_secs(1))
            .await
            .unwrap();
        let ttl = Duration::from_secs(300);

        assert!(conn.set_nx_ex("conduct:v1:top_rank", b"v1", ttl).await.unwrap());
        assert!(!conn.set_nx_ex("conduct:v1:top_rank", b"v2", ttl).await.unwrap());
        assert!(matches!(
            conn.set_nx_ex("conduct:v1:top_rank", b"v3", ttl).await,
            Err(PoolError::Redis(RedisError::CommandError { .. }))
        ));
    }

    #[tokio::test]
    async fn test_closed_connection_is_reported() {
        let addr = canned_server(&[]).await;
        let mut conn = CacheStoreConnection::connect(addr, None, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(conn.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_connector_refused() {
        let config = CacheStoreConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            password: None,
            databases: Default::default(),
        };
        let connector = RedisConnector::new(&config, Duration::from_secs(1));

        let result = connector.connect().await;
        assert!(matches!(
            result,
            Err(PoolError::ConnectionCreateFailed { kind: BackendKind::CacheStore, .. })
        ));
    }
}
