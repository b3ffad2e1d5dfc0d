//! In-process cache store speaking enough RESP for the pool and accessor
#![allow(dead_code)]

use bytes::{Buf, Bytes, BytesMut};
use conduct_store::backends::redis::resp::{encode_into, RespParser, RespValue};
use conduct_store::Config;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::AbortHandle;

#[derive(Default)]
struct FakeState {
    dbs: HashMap<u32, HashMap<String, (Bytes, Option<u64>)>>,
    commands: Vec<String>,
    password: Option<String>,
}

type Shared = Arc<Mutex<FakeState>>;

pub struct FakeRedis {
    pub addr: SocketAddr,
    state: Shared,
    tasks: Arc<Mutex<Vec<AbortHandle>>>,
}

impl FakeRedis {
    pub async fn start() -> Self {
        Self::start_with_password(None).await
    }

    pub async fn start_with_password(password: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state: Shared = Arc::new(Mutex::new(FakeState {
            password: password.map(str::to_string),
            ..Default::default()
        }));
        let tasks: Arc<Mutex<Vec<AbortHandle>>> = Arc::default();

        let accept_state = Arc::clone(&state);
        let accept_tasks = Arc::clone(&tasks);
        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handle = tokio::spawn(serve(stream, Arc::clone(&accept_state)));
                accept_tasks.lock().unwrap().push(handle.abort_handle());
            }
        });
        tasks.lock().unwrap().push(accept.abort_handle());

        Self { addr, state, tasks }
    }

    /// Kill the listener and every open connection
    pub fn stop(&self) {
        for handle in self.tasks.lock().unwrap().drain(..) {
            handle.abort();
        }
    }

    /// Configuration pointing the cache store here and the relational store nowhere
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.database.cache_store.host = "127.0.0.1".to_string();
        config.database.cache_store.port = self.addr.port();
        config.database.relational.port = 1;
        config.pool.max_wait_ms = 300;
        config.pool.retry_interval_ms = 50;
        config.pool.connect_timeout_sec = 1;
        config.pool.health_check_timeout_sec = 1;
        config
    }

    pub fn insert(&self, db: u32, key: &str, value: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .dbs
            .entry(db)
            .or_default()
            .insert(key.to_string(), (Bytes::copy_from_slice(value), None));
    }

    pub fn value(&self, db: u32, key: &str) -> Option<Bytes> {
        let state = self.state.lock().unwrap();
        state.dbs.get(&db)?.get(key).map(|(value, _)| value.clone())
    }

    pub fn ttl(&self, db: u32, key: &str) -> Option<u64> {
        let state = self.state.lock().unwrap();
        state.dbs.get(&db)?.get(key)?.1
    }

    pub fn key_count(&self, db: u32) -> usize {
        let state = self.state.lock().unwrap();
        state.dbs.get(&db).map(|keys| keys.len()).unwrap_or(0)
    }

    pub fn command_count(&self, name: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.commands.iter().filter(|c| c.as_str() == name).count()
    }
}

impl Drop for FakeRedis {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(mut stream: TcpStream, state: Shared) {
    let mut buf = BytesMut::with_capacity(1024);
    let mut db = 0u32;

    loop {
        match RespParser::parse(&buf) {
            Ok(Some((request, used))) => {
                buf.advance(used);
                let (reply, quit) = handle(&state, &mut db, request);
                let mut out = BytesMut::new();
                encode_into(&mut out, &reply);
                if stream.write_all(&out).await.is_err() || quit {
                    return;
                }
            }
            Ok(None) => match stream.read_buf(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            },
            Err(_) => return,
        }
    }
}

fn ok() -> RespValue {
    RespValue::SimpleString("OK".to_string())
}

fn handle(state: &Shared, db: &mut u32, request: RespValue) -> (RespValue, bool) {
    let args: Vec<Vec<u8>> = match request {
        RespValue::Array(Some(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                RespValue::BulkString(Some(bytes)) => Some(bytes.to_vec()),
                _ => None,
            })
            .collect(),
        _ => return (RespValue::Error("ERR expected array".to_string()), false),
    };
    let Some(name) = args.first().map(|a| String::from_utf8_lossy(a).to_uppercase()) else {
        return (RespValue::Error("ERR empty command".to_string()), false);
    };
    let text = |i: usize| String::from_utf8_lossy(&args[i]).into_owned();

    let mut state = state.lock().unwrap();
    state.commands.push(name.clone());

    let reply = match name.as_str() {
        "AUTH" => {
            if state.password.as_deref() == Some(text(1).as_str()) {
                ok()
            } else {
                RespValue::Error("WRONGPASS invalid password".to_string())
            }
        }
        "SELECT" => match text(1).parse() {
            Ok(index) => {
                *db = index;
                ok()
            }
            Err(_) => RespValue::Error("ERR invalid DB index".to_string()),
        },
        "PING" => RespValue::SimpleString("PONG".to_string()),
        "GET" => {
            let value = state
                .dbs
                .get(db)
                .and_then(|keys| keys.get(&text(1)))
                .map(|(value, _)| value.clone());
            RespValue::BulkString(value)
        }
        "SET" => {
            let mut ttl = None;
            let mut only_if_absent = false;
            let mut i = 3;
            while i < args.len() {
                match text(i).to_uppercase().as_str() {
                    "NX" => only_if_absent = true,
                    "EX" if i + 1 < args.len() => {
                        ttl = text(i + 1).parse().ok();
                        i += 1;
                    }
                    _ => {}
                }
                i += 1;
            }

            let keys = state.dbs.entry(*db).or_default();
            if only_if_absent && keys.contains_key(&text(1)) {
                RespValue::BulkString(None)
            } else {
                keys.insert(text(1), (Bytes::from(args[2].clone()), ttl));
                ok()
            }
        }
        "FLUSHDB" => {
            state.dbs.remove(db);
            ok()
        }
        "QUIT" => return (ok(), true),
        other => RespValue::Error(format!("ERR unknown command '{}'", other)),
    };

    (reply, false)
}
