use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::thread;
use std::time::Duration;

use super::core::{is_under, KvError, KvPair, KvStore};
use crate::impl_try_from;

/// Consul 存储配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, SmartDefault)]
#[serde(default)]
pub struct ConsulStoreConfig {
    /// Consul HTTP 地址
    #[default(_code = "\"http://127.0.0.1:8500\".to_string()")]
    pub endpoint: String,

    /// ACL token，通过 `X-Consul-Token` 头传递
    pub token: Option<String>,

    /// 数据中心，不设置时使用 agent 所在数据中心
    pub datacenter: Option<String>,

    /// 连接与普通请求超时（秒）
    #[default = 10]
    pub connection_timeout_secs: u64,

    /// watch_tree 阻塞查询的最长等待时间（秒）
    #[default = 10]
    pub wait_secs: u64,
}

/// Consul KV 接口返回的条目
#[derive(Debug, Deserialize)]
struct ConsulEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: Option<String>,
}

/// 一次查询的结果
struct Fetched {
    /// 404 时为 None
    pairs: Option<Vec<KvPair>>,
    /// `X-Consul-Index` 响应头，用于阻塞查询
    index: u64,
}

/// 基于 Consul HTTP API 的 KV 存储
///
/// - `get`: `GET /v1/kv/<key>`
/// - `list`: `GET /v1/kv/<prefix>?recurse=true`，返回全部后代
/// - `watch_tree`: 在后台线程中循环发起阻塞查询，索引变化时推送快照
///
/// # 示例
/// ```no_run
/// use cfg_loader::kv::{ConsulStore, ConsulStoreConfig, KvStore};
///
/// let store = ConsulStore::new(ConsulStoreConfig {
///     endpoint: "http://127.0.0.1:8500".to_string(),
///     ..Default::default()
/// }).unwrap();
///
/// let pair = store.get("app/port").unwrap();
/// ```
#[derive(Clone)]
pub struct ConsulStore {
    endpoint: String,
    token: Option<String>,
    datacenter: Option<String>,
    request_timeout: Duration,
    wait: Duration,
    client: reqwest::blocking::Client,
}

impl ConsulStore {
    pub fn new(config: ConsulStoreConfig) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.connection_timeout_secs);
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(request_timeout)
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token,
            datacenter: config.datacenter,
            request_timeout,
            wait: Duration::from_secs(config.wait_secs),
            client,
        })
    }

    fn url(&self, key: &str) -> String {
        let path = key
            .trim_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/v1/kv/{}", self.endpoint, path)
    }

    /// 查询一个键或前缀；`index` 不为空时发起阻塞查询
    fn fetch(&self, key: &str, recurse: bool, index: Option<u64>) -> Result<Fetched, KvError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if recurse {
            query.push(("recurse", "true".to_string()));
        }
        if let Some(dc) = &self.datacenter {
            query.push(("dc", dc.clone()));
        }
        let mut timeout = self.request_timeout;
        if let Some(index) = index {
            query.push(("index", index.to_string()));
            query.push(("wait", format!("{}s", self.wait.as_secs())));
            timeout += self.wait;
        }

        let mut request = self.client.get(self.url(key)).query(&query).timeout(timeout);
        if let Some(token) = &self.token {
            request = request.header("X-Consul-Token", token);
        }
        let resp = request.send()?;

        let index = resp
            .headers()
            .get("X-Consul-Index")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(Fetched { pairs: None, index }),
            status if status.is_success() => {
                let entries: Vec<ConsulEntry> = resp.json()?;
                let pairs = entries
                    .into_iter()
                    .map(decode_entry)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Fetched {
                    pairs: Some(pairs),
                    index,
                })
            }
            status => Err(KvError::InvalidResponse(format!(
                "unexpected status {} for {:?}",
                status, key
            ))),
        }
    }
}

impl_try_from!(ConsulStoreConfig => ConsulStore);

impl KvStore for ConsulStore {
    fn get(&self, key: &str) -> Result<KvPair, KvError> {
        self.fetch(key, false, None)?
            .pairs
            .and_then(|pairs| pairs.into_iter().next())
            .ok_or(KvError::KeyNotFound)
    }

    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, KvError> {
        let prefix = prefix.trim_matches('/');
        match self.fetch(prefix, true, None)?.pairs {
            Some(pairs) => Ok(children(prefix, pairs)),
            None => Err(KvError::KeyNotFound),
        }
    }

    fn watch_tree(
        &self,
        prefix: &str,
        stop: Receiver<()>,
    ) -> Result<Receiver<Vec<KvPair>>, KvError> {
        let prefix = prefix.trim_matches('/').to_string();
        let (tx, rx) = unbounded();

        // 首次查询同步完成，连接失败时直接返回错误
        let first = self.fetch(&prefix, true, None)?;
        let _ = tx.send(first.pairs.map(|p| children(&prefix, p)).unwrap_or_default());

        let store = self.clone();
        thread::spawn(move || store.watch_loop(&prefix, first.index, &stop, &tx));

        Ok(rx)
    }

    fn close(&self) -> Result<(), KvError> {
        Ok(())
    }
}

impl ConsulStore {
    fn watch_loop(&self, prefix: &str, mut index: u64, stop: &Receiver<()>, tx: &Sender<Vec<KvPair>>) {
        loop {
            if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
                return;
            }

            match self.fetch(prefix, true, Some(index)) {
                Ok(fetched) if fetched.index == 0 => {
                    // 没有 X-Consul-Index 时查询不会阻塞，退避后再重试
                    log::warn!("consul response for {:?} carries no index, backing off", prefix);
                    if !backoff(stop) {
                        return;
                    }
                }
                Ok(fetched) => {
                    if fetched.index == index {
                        continue;
                    }
                    // 索引回退时按 Consul 的约定从 0 重新开始
                    index = if fetched.index < index { 0 } else { fetched.index };

                    let snapshot = fetched.pairs.map(|p| children(prefix, p)).unwrap_or_default();
                    log::debug!("consul prefix {:?} changed, index {}", prefix, index);
                    if tx.send(snapshot).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    log::warn!("consul watch on {:?} failed: {}", prefix, e);
                    if !backoff(stop) {
                        return;
                    }
                }
            }
        }
    }
}

/// 等待一秒再重试，期间收到停止信号返回 false
fn backoff(stop: &Receiver<()>) -> bool {
    matches!(
        stop.recv_timeout(Duration::from_secs(1)),
        Err(RecvTimeoutError::Timeout)
    )
}

fn decode_entry(entry: ConsulEntry) -> Result<KvPair, KvError> {
    let value = match entry.value {
        Some(encoded) => Some(STANDARD.decode(encoded.as_bytes()).map_err(|e| {
            KvError::InvalidResponse(format!("decoding value of {:?}: {}", entry.key, e))
        })?),
        None => None,
    };
    Ok(KvPair {
        key: entry.key,
        value,
    })
}

/// 过滤掉前缀自身以及只是字符串前缀相同的键（如列出 `a/b` 时的 `a/bc`）
fn children(prefix: &str, pairs: Vec<KvPair>) -> Vec<KvPair> {
    pairs
        .into_iter()
        .filter(|p| p.key.trim_end_matches('/') != prefix && is_under(prefix, &p.key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;
    use mockito::Matcher;

    fn store_for(server: &mockito::Server) -> ConsulStore {
        ConsulStore::new(ConsulStoreConfig {
            endpoint: server.url(),
            wait_secs: 1,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_consul_store_config_default() {
        let config: ConsulStoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.endpoint, "http://127.0.0.1:8500");
        assert_eq!(config.connection_timeout_secs, 10);
        assert_eq!(config.wait_secs, 10);
        assert_eq!(config.token, None);
    }

    #[test]
    fn test_consul_store_get() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/v1/kv/app/port")
            .match_query(Matcher::Any)
            .match_header("X-Consul-Token", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("X-Consul-Index", "12")
            .with_body(r#"[{"Key": "app/port", "Value": "ODA4MA==", "ModifyIndex": 12}]"#)
            .create();

        let store = ConsulStore::new(ConsulStoreConfig {
            endpoint: server.url(),
            token: Some("secret".to_string()),
            ..Default::default()
        })
        .unwrap();

        let pair = store.get("app/port").unwrap();
        mock.assert();
        assert_eq!(pair.key, "app/port");
        assert_eq!(pair.value, Some(b"8080".to_vec()));
    }

    #[test]
    fn test_consul_store_get_not_found() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/v1/kv/app/missing")
            .match_query(Matcher::Any)
            .with_status(404)
            .create();

        let store = store_for(&server);
        assert!(matches!(store.get("app/missing"), Err(KvError::KeyNotFound)));
        mock.assert();
    }

    #[test]
    fn test_consul_store_list_filters_siblings() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/v1/kv/a/e/1")
            .match_query(Matcher::UrlEncoded("recurse".into(), "true".into()))
            .with_status(200)
            .with_body(
                r#"[
                    {"Key": "a/e/1", "Value": null},
                    {"Key": "a/e/1/x", "Value": "MC4x"},
                    {"Key": "a/e/10/x", "Value": "MS4w"}
                ]"#,
            )
            .create();

        let store = store_for(&server);
        let pairs = store.list("a/e/1").unwrap();
        mock.assert();
        assert_eq!(pairs, vec![KvPair::new("a/e/1/x", "0.1")]);
    }

    #[test]
    fn test_consul_store_list_not_found() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1/kv/nothing")
            .match_query(Matcher::Any)
            .with_status(404)
            .create();

        let store = store_for(&server);
        assert!(matches!(store.list("nothing"), Err(KvError::KeyNotFound)));
    }

    #[test]
    fn test_consul_store_server_error() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1/kv/app")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("Internal Server Error")
            .create();

        let store = store_for(&server);
        let err = store.list("app").unwrap_err();
        assert!(matches!(err, KvError::InvalidResponse(_)));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_consul_store_invalid_base64() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1/kv/app/port")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"Key": "app/port", "Value": "!!!"}]"#)
            .create();

        let store = store_for(&server);
        assert!(matches!(store.get("app/port"), Err(KvError::InvalidResponse(_))));
    }

    #[test]
    fn test_consul_store_watch_tree_initial_snapshot() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/v1/kv/app")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("X-Consul-Index", "7")
            .with_body(r#"[{"Key": "app/port", "Value": "ODA4MA=="}]"#)
            .create();

        let store = store_for(&server);
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let snapshots = store.watch_tree("app", stop_rx).unwrap();

        let initial = snapshots.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(initial, vec![KvPair::new("app/port", "8080")]);

        drop(stop_tx);
    }

    #[test]
    fn test_consul_store_watch_tree_backs_off_without_index() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/v1/kv/app")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"Key": "app/port", "Value": "ODA4MA=="}]"#)
            .expect_at_most(4)
            .create();

        let store = store_for(&server);
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let snapshots = store.watch_tree("app", stop_rx).unwrap();
        assert!(snapshots.recv_timeout(Duration::from_secs(2)).is_ok());

        thread::sleep(Duration::from_millis(1500));
        drop(stop_tx);
        thread::sleep(Duration::from_millis(200));

        mock.assert();
        assert!(snapshots.try_recv().is_err());
    }

    #[test]
    fn test_consul_store_url_encoding() {
        let store = ConsulStore::new(ConsulStoreConfig {
            endpoint: "http://consul:8500/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(store.url("/a b/c/"), "http://consul:8500/v1/kv/a%20b/c");
    }
}
