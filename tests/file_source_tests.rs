//! 文件配置源集成测试：修改文件后收到一次变更信号，重新 load 得到新内容

use anyhow::Result;
use cfg_loader::cfg::{unmarshal, FileSource, FileSourceConfig, Source};
use cfg_loader::errors::TRANSPORT;
use cfg_loader::HumanDur;
use serde::Deserialize;
use serde_with::serde_as;
use std::fs;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

#[serde_as]
#[derive(Debug, Deserialize, Default, PartialEq)]
struct Limits {
    max_conns: u32,
    #[serde_as(as = "HumanDur")]
    idle_timeout: Duration,
}

#[derive(Debug, Deserialize, Default, PartialEq)]
struct AppConfig {
    name: String,
    hosts: Vec<String>,
    limits: Limits,
}

#[test]
fn test_yaml_reload_flow() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("app.yaml");
    fs::write(
        &path,
        "name: orders\nhosts: [a, b]\nlimits:\n  max_conns: 10\n  idle_timeout: 30s\n",
    )?;

    let mut source = FileSource::new(
        FileSourceConfig {
            path: path.to_string_lossy().to_string(),
            debounce_ms: 200,
        },
        unmarshal::yaml(),
    );
    let changes = source.changes();

    let mut config = AppConfig::default();
    source.load(&mut config)?;
    assert_eq!(config.name, "orders");
    assert_eq!(config.hosts, vec!["a", "b"]);
    assert_eq!(config.limits.idle_timeout, Duration::from_secs(30));

    thread::sleep(Duration::from_millis(100));
    fs::write(
        &path,
        "name: orders\nhosts: [a, b, c]\nlimits:\n  max_conns: 20\n  idle_timeout: 1m\n",
    )?;

    assert!(changes.recv_timeout(Duration::from_secs(3)).is_ok(), "应该收到变更信号");
    source.load(&mut config)?;
    assert_eq!(config.hosts.len(), 3);
    assert_eq!(config.limits.max_conns, 20);
    assert_eq!(config.limits.idle_timeout, Duration::from_secs(60));

    source.close()?;
    assert!(changes.recv().is_err());
    Ok(())
}

#[test]
fn test_deleted_file_is_transport_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("app.json");
    fs::write(&path, r#"{"name": "orders"}"#)?;

    let mut source = FileSource::json(path.to_string_lossy());
    let config: AppConfig = source.get()?;
    assert_eq!(config.name, "orders");
    assert!(config.hosts.is_empty());

    fs::remove_file(&path)?;
    let err = source.get::<AppConfig>().unwrap_err();
    assert!(TRANSPORT.contains(&err));

    assert!(source.close().is_ok());
    Ok(())
}

#[test]
fn test_toml_source() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("app.toml");
    fs::write(
        &path,
        "name = \"orders\"\nhosts = [\"x\"]\n\n[limits]\nmax_conns = 4\nidle_timeout = \"500ms\"\n",
    )?;

    let mut source = FileSource::toml(path.to_string_lossy());
    let config: AppConfig = source.get()?;
    assert_eq!(
        config,
        AppConfig {
            name: "orders".to_string(),
            hosts: vec!["x".to_string()],
            limits: Limits {
                max_conns: 4,
                idle_timeout: Duration::from_millis(500),
            },
        }
    );
    source.close()?;
    Ok(())
}
