//! 文件监听原语
//!
//! 对 notify 的薄封装：构造时挂载到单个路径，产生原始变更事件流，关闭时释放

use anyhow::Result;
use crossbeam::channel::{unbounded, Receiver};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

use crate::errors::{WrapErr, UNAVAILABLE, WATCH};

/// 单个文件的原始变更事件源
///
/// 事件未经去重，一次写入可能产生多个事件；访问类事件（open/close/read）会被过滤掉
pub struct FileWatch {
    path: PathBuf,
    watcher: RecommendedWatcher,
    events: Receiver<Event>,
}

impl FileWatch {
    /// 创建 notify watcher 并挂载到 `path`
    ///
    /// 路径不存在或系统监听资源不足时返回 `UNAVAILABLE` 类别的错误
    pub fn attach(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (event_tx, event_rx) = unbounded();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !event.kind.is_access() {
                    let _ = event_tx.send(event);
                }
            }
            Err(e) => log::warn!("file watch error: {}", e),
        })
        .wrap_err(&UNAVAILABLE, "creating file watcher")?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .wrap_err_with(&UNAVAILABLE, || format!("adding {:?} to watcher", path))?;

        Ok(Self {
            path,
            watcher,
            events: event_rx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 原始事件流
    pub fn events(&self) -> Receiver<Event> {
        self.events.clone()
    }

    /// 取消监听并释放 watcher
    ///
    /// 文件已被删除时内核会自动移除监听，此时取消监听失败不视为错误
    pub fn release(mut self) -> Result<()> {
        match self.watcher.unwatch(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.kind, notify::ErrorKind::WatchNotFound) => Ok(()),
            Err(e) if !self.path.exists() => {
                log::debug!("unwatch {:?} after removal: {}", self.path, e);
                Ok(())
            }
            Err(e) => Err(e).wrap_err_with(&WATCH, || format!("removing {:?} from watcher", self.path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_file_watch_modify() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let file_path = temp_dir.path().join("test.json");
        fs::write(&file_path, "{}")?;

        let watch = FileWatch::attach(&file_path)?;
        let events = watch.events();
        assert_eq!(watch.path(), file_path.as_path());

        thread::sleep(Duration::from_millis(100));
        fs::write(&file_path, r#"{"version": 2}"#)?;

        assert!(events.recv_timeout(Duration::from_secs(2)).is_ok(), "应该收到文件修改事件");

        watch.release()?;
        Ok(())
    }

    #[test]
    fn test_file_watch_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let result = FileWatch::attach(temp_dir.path().join("missing.json"));

        let err = result.err().expect("监听不存在的文件应该失败");
        assert!(UNAVAILABLE.contains(&err));
    }

    #[test]
    fn test_file_watch_release_after_delete() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let file_path = temp_dir.path().join("test.yaml");
        fs::write(&file_path, "a: 1")?;

        let watch = FileWatch::attach(&file_path)?;
        fs::remove_file(&file_path)?;
        thread::sleep(Duration::from_millis(200));

        assert!(watch.release().is_ok());
        Ok(())
    }
}
