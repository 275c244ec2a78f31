//! 环境变量配置源
//!
//! 前缀统一转为大写，`PREFIX_FIELD` 映射到字段 `field`，`PREFIX_A__B` 映射到嵌套字段 `a.b`。
//! 变量的读取和前缀匹配交给 figment 的 `Env` provider，解码与 KV 来源共用弱类型规则

use anyhow::Result;
use figment::providers::Env;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::source::{Changes, Source};
use crate::decode::decode_node;
use crate::impl_from;
use crate::kv::ConfigNode;
use crate::watch::Debouncer;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvSourceConfig {
    /// 变量名前缀，不含结尾的 `_`；为空时读取全部环境变量
    pub prefix: String,
}

/// 环境变量配置源
///
/// 环境变量没有变更通知，`changes` 在 `close` 之前不会发出任何信号
pub struct EnvSource {
    prefix: String,
    debouncer: Debouncer,
}

impl EnvSource {
    pub fn new(config: EnvSourceConfig) -> Self {
        Self {
            prefix: config.prefix.to_uppercase(),
            debouncer: Debouncer::idle(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn provider(&self) -> Env {
        let env = if self.prefix.is_empty() {
            Env::raw()
        } else {
            Env::prefixed(&format!("{}_", self.prefix))
        };
        env.split("__")
    }

    /// 当前匹配前缀的变量，键为去掉前缀后按 `.` 分隔的小写路径
    pub fn vars(&self) -> Vec<(String, String)> {
        self.provider()
            .iter()
            .map(|(key, value)| (key.as_str().to_lowercase(), value))
            .collect()
    }
}

impl_from!(EnvSourceConfig => EnvSource);

impl Source for EnvSource {
    fn get<T: DeserializeOwned>(&self) -> Result<T> {
        let vars = self.vars();
        log::debug!("loading {} variables with prefix {:?}", vars.len(), self.prefix);
        decode_node(&ConfigNode::from_paths(vars, '.'))
    }

    fn changes(&self) -> Changes {
        self.debouncer.changes()
    }

    fn close(&mut self) -> Result<()> {
        self.debouncer.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DECODE;
    use serial_test::serial;
    use std::env;

    #[derive(Debug, Deserialize, Default, PartialEq)]
    struct Database {
        host: String,
        port: u16,
    }

    #[derive(Debug, Deserialize, Default, PartialEq)]
    struct AppConfig {
        name: String,
        debug: bool,
        workers: u32,
        database: Database,
        tags: Vec<String>,
    }

    fn with_vars<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        for (k, v) in vars {
            env::set_var(k, v);
        }
        f();
        for (k, _) in vars {
            env::remove_var(k);
        }
    }

    #[test]
    #[serial]
    fn test_env_source_load() {
        with_vars(
            &[
                ("CFGTEST_NAME", "orders"),
                ("CFGTEST_DEBUG", "true"),
                ("CFGTEST_DATABASE__HOST", "db.local"),
                ("CFGTEST_DATABASE__PORT", "5432"),
                ("CFGTEST_TAGS", "blue"),
            ],
            || {
                let source = EnvSource::new(EnvSourceConfig {
                    prefix: "cfgtest".to_string(),
                });
                assert_eq!(source.prefix(), "CFGTEST");

                let mut config = AppConfig::default();
                source.load(&mut config).unwrap();
                assert_eq!(
                    config,
                    AppConfig {
                        name: "orders".to_string(),
                        debug: true,
                        workers: 0,
                        database: Database {
                            host: "db.local".to_string(),
                            port: 5432,
                        },
                        tags: vec!["blue".to_string()],
                    }
                );
            },
        );
    }

    #[test]
    #[serial]
    fn test_env_source_no_matching_vars() {
        let source = EnvSource::from(EnvSourceConfig {
            prefix: "CFGTEST_NOTHING_SET".to_string(),
        });
        let config: AppConfig = source.get().unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    #[serial]
    fn test_env_source_decode_error() {
        with_vars(&[("CFGTEST_WORKERS", "many")], || {
            let source = EnvSource::new(EnvSourceConfig {
                prefix: "CFGTEST".to_string(),
            });
            let mut config = AppConfig::default();
            config.name = "unchanged".to_string();

            let err = source.load(&mut config).unwrap_err();
            assert!(DECODE.contains(&err));
            assert_eq!(config.name, "unchanged");
        });
    }

    #[test]
    fn test_env_source_changes_close() {
        let mut source = EnvSource::new(EnvSourceConfig::default());
        let changes = source.changes();
        assert!(changes.try_recv().is_err());

        source.close().unwrap();
        assert!(changes.recv().is_err());
        assert!(source.close().is_ok());
    }
}
