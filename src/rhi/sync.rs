//! CPU/GPU 同步
//!
//! `Fence` 是一个单调递增的 64 位计数器：GPU 在队列执行到 signal 时写入，
//! CPU 和其他队列读取或等待。可以在线程间共享。
//!
//! 等待默认没有截止时间，`WaitOptions` 可以附加超时和取消令牌。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::core::error::{Result, RhiError};
use crate::rhi::backend::FenceBackend;

/// 取消令牌
///
/// 克隆得到的令牌共享同一个标志，任意一个调用 `cancel` 后所有等待者都会返回。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Fence 等待选项
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    /// 最长等待时间，None 表示无限等待
    pub timeout: Option<Duration>,
    /// 取消令牌
    pub cancel: Option<CancelToken>,
}

impl WaitOptions {
    /// 无截止时间、不可取消
    pub fn infinite() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }

    pub fn cancel_with(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn deadline_from(&self, start: Instant) -> Option<Instant> {
        self.timeout.map(|timeout| start + timeout)
    }
}

/// GPU 栅栏
pub struct Fence {
    backend: Box<dyn FenceBackend>,
    last_signaled: AtomicU64,
}

impl Fence {
    pub(crate) fn new(backend: Box<dyn FenceBackend>, initial_value: u64) -> Self {
        Self {
            backend,
            last_signaled: AtomicU64::new(initial_value),
        }
    }

    /// GPU 已经完成的值
    pub fn completed_value(&self) -> u64 {
        self.backend.completed_value()
    }

    /// 最近一次提交的 signal 值（可能尚未完成）
    pub fn last_signaled_value(&self) -> u64 {
        self.last_signaled.load(Ordering::Acquire)
    }

    /// 完成值是否已经达到 `value`
    pub fn is_reached(&self, value: u64) -> bool {
        self.completed_value() >= value
    }

    pub(crate) fn backend(&self) -> &dyn FenceBackend {
        self.backend.as_ref()
    }

    /// signal 之前检查单调性
    pub(crate) fn check_signal(&self, value: u64) -> Result<()> {
        let last = self.last_signaled_value();
        if value < last {
            return Err(RhiError::invalid_parameter(format!(
                "Fence values must not decrease: signal {} after {}",
                value, last
            )));
        }
        Ok(())
    }

    pub(crate) fn record_signal(&self, value: u64) {
        self.last_signaled.fetch_max(value, Ordering::AcqRel);
    }

    /// 阻塞直到完成值达到 `value`
    pub(crate) fn wait_for(&self, value: u64, options: &WaitOptions) -> Result<()> {
        if self.is_reached(value) {
            return Ok(());
        }

        let cancel = options.cancel.as_ref();
        if cancel.map_or(false, CancelToken::is_cancelled) {
            return Err(RhiError::Cancelled { value });
        }

        let start = Instant::now();
        let result = self
            .backend
            .wait(value, options.deadline_from(start), cancel);
        trace!(value, elapsed_us = start.elapsed().as_micros() as u64, ok = result.is_ok(), "Fence wait finished");
        result
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("completed", &self.completed_value())
            .field("last_signaled", &self.last_signaled_value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::Mutex;

    /// 完成值由测试直接写入
    struct ManualFence {
        value: Mutex<u64>,
    }

    impl FenceBackend for ManualFence {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn completed_value(&self) -> u64 {
            *self.value.lock().unwrap()
        }

        fn wait(&self, value: u64, deadline: Option<Instant>, cancel: Option<&CancelToken>) -> Result<()> {
            loop {
                let completed = self.completed_value();
                if completed >= value {
                    return Ok(());
                }
                if cancel.map_or(false, |c| c.is_cancelled()) {
                    return Err(RhiError::Cancelled { value });
                }
                if deadline.map_or(false, |d| Instant::now() >= d) {
                    return Err(RhiError::Timeout { value, completed });
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    fn manual_fence(initial: u64) -> Fence {
        Fence::new(Box::new(ManualFence { value: Mutex::new(initial) }), initial)
    }

    #[test]
    fn test_signal_must_not_decrease() {
        let fence = manual_fence(0);
        assert!(fence.check_signal(3).is_ok());
        fence.record_signal(3);
        assert!(fence.check_signal(3).is_ok());
        assert!(matches!(fence.check_signal(2), Err(RhiError::InvalidParameter(_))));
        assert_eq!(fence.last_signaled_value(), 3);
    }

    #[test]
    fn test_reached_value_returns_immediately() {
        let fence = manual_fence(5);
        assert!(fence.is_reached(5));
        assert!(fence.wait_for(4, &WaitOptions::infinite()).is_ok());
    }

    #[test]
    fn test_wait_timeout() {
        let fence = manual_fence(1);
        let err = fence
            .wait_for(2, &WaitOptions::with_timeout(Duration::from_millis(10)))
            .unwrap_err();
        assert!(matches!(err, RhiError::Timeout { value: 2, completed: 1 }));
    }

    #[test]
    fn test_wait_already_cancelled() {
        let fence = manual_fence(0);
        let token = CancelToken::new();
        token.cancel();
        let err = fence
            .wait_for(1, &WaitOptions::infinite().cancel_with(token))
            .unwrap_err();
        assert!(matches!(err, RhiError::Cancelled { value: 1 }));
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let fence = manual_fence(0);
        let token = CancelToken::new();
        let remote = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            remote.cancel();
        });
        let err = fence
            .wait_for(1, &WaitOptions::infinite().cancel_with(token))
            .unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, RhiError::Cancelled { value: 1 }));
    }
}
