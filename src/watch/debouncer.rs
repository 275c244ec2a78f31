//! 防抖变更通知
//!
//! 把外部监听原语产生的原始事件流整理成"稳定后只通知一次"的信号流

use anyhow::{anyhow, Result};
use crossbeam::channel::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::errors::WATCH;

/// 变更信号流：收到 `()` 表示配置源可能已变化，需要重新 load；通道关闭表示配置源已关闭
pub type Changes = Receiver<()>;

/// 后台运行中的防抖线程
struct Running {
    /// 停止令牌：drop 即通知后台线程退出
    stop: Sender<()>,
    /// 释放监听原语的结果，后台线程退出前写入
    result: Receiver<Result<()>>,
    thread: JoinHandle<()>,
}

enum State {
    Running(Running),
    /// 没有后台线程，只持有信号通道的发送端，关闭时 drop 掉
    Idle(Sender<()>),
    Closed,
}

/// 防抖监听器
///
/// # 行为
///
/// - 空闲时等待第一个原始事件
/// - 收到事件后进入排空循环：窗口内每来一个新事件，窗口重新计时；
///   窗口内再无事件时发出恰好一个信号，回到空闲等待
/// - 信号通道容量为 1，消费方读得慢时，后续信号会合并到尚未读取的那一个里
/// - `close` 在任何阶段都会立即终止后台线程，不补发信号，关闭信号通道，
///   释放监听原语并返回释放时的错误
///
/// # 示例
///
/// ```
/// use cfg_loader::watch::Debouncer;
/// use std::time::Duration;
///
/// let (tx, rx) = crossbeam::channel::unbounded::<()>();
/// let mut debouncer = Debouncer::spawn(rx, Duration::from_millis(50), || Ok(()));
/// let changes = debouncer.changes();
///
/// for _ in 0..3 {
///     tx.send(()).unwrap();
/// }
/// assert!(changes.recv_timeout(Duration::from_secs(2)).is_ok());
///
/// debouncer.close().unwrap();
/// assert!(changes.recv().is_err());
/// ```
pub struct Debouncer {
    changes: Changes,
    state: State,
}

impl Debouncer {
    /// 启动后台防抖线程
    ///
    /// # 参数
    /// - `events`: 原始事件流，事件内容不关心
    /// - `window`: 防抖窗口
    /// - `release`: 关闭时释放监听原语，在后台线程中调用一次
    pub fn spawn<E, F>(events: Receiver<E>, window: Duration, release: F) -> Self
    where
        E: Send + 'static,
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let (changes_tx, changes_rx) = channel::bounded(1);
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let (result_tx, result_rx) = channel::bounded(1);

        let thread = thread::spawn(move || {
            run(&events, &stop_rx, &changes_tx, window);

            let _ = result_tx.send(release());
            // changes_tx 在这里 drop，信号通道随之关闭
        });

        Self {
            changes: changes_rx,
            state: State::Running(Running {
                stop: stop_tx,
                result: result_rx,
                thread,
            }),
        }
    }

    /// 创建一个永远不会发出信号的监听器，信号通道在 `close` 时关闭
    ///
    /// 用于不支持变更监听的配置源
    pub fn idle() -> Self {
        let (changes_tx, changes_rx) = channel::bounded(1);
        Self {
            changes: changes_rx,
            state: State::Idle(changes_tx),
        }
    }

    /// 创建一个已经关闭的监听器
    pub fn closed() -> Self {
        let (_, changes_rx) = channel::bounded(1);
        Self {
            changes: changes_rx,
            state: State::Closed,
        }
    }

    /// 获取信号流，可以多次调用，返回的接收端共享同一个通道
    pub fn changes(&self) -> Changes {
        self.changes.clone()
    }

    /// 后台线程是否仍在运行
    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    /// 停止后台线程并等待其退出，返回释放监听原语时的错误
    ///
    /// 重复调用是安全的，之后的调用直接返回 `Ok(())`
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Running(running) => {
                drop(running.stop);
                let result = running
                    .result
                    .recv()
                    .map_err(|_| anyhow!("watch thread exited without reporting"));
                if running.thread.join().is_err() {
                    return Err(WATCH.error("watch thread panicked").into());
                }
                match result {
                    Ok(released) => released.map_err(|e| WATCH.wrap(e, "closing watcher").into()),
                    Err(e) => Err(WATCH.wrap(e, "closing watcher").into()),
                }
            }
            State::Idle(changes_tx) => {
                drop(changes_tx);
                Ok(())
            }
            State::Closed => Ok(()),
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("closing debouncer on drop failed: {:#}", e);
        }
    }
}

/// 后台线程主循环，返回时表示需要退出
fn run<E>(events: &Receiver<E>, stop: &Receiver<()>, changes: &Sender<()>, window: Duration) {
    loop {
        crossbeam::select! {
            recv(stop) -> _ => return,
            recv(events) -> event => {
                if event.is_err() {
                    log::warn!("raw event stream closed, waiting for stop");
                    let _ = stop.recv();
                    return;
                }

                // 排空窗口内连续到达的事件，窗口内静默后才发出信号
                let mut events_closed = false;
                loop {
                    crossbeam::select! {
                        recv(stop) -> _ => return,
                        recv(events) -> event => {
                            if event.is_err() {
                                events_closed = true;
                                break;
                            }
                        }
                        recv(channel::after(window)) -> _ => break,
                    }
                }

                // 通道已满说明上一个信号还未被读取，本次合并进去
                if changes.try_send(()).is_ok() {
                    log::debug!("change signal emitted");
                }

                if events_closed {
                    log::warn!("raw event stream closed, waiting for stop");
                    let _ = stop.recv();
                    return;
                }
            }
        }
    }
}
