//! headless 栅栏
//!
//! 完成值放在 `Mutex<u64>` 里，GPU 工作线程写入后通过 `Condvar` 唤醒等待者。

use std::any::Any;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::core::error::{Result, RhiError};
use crate::rhi::backend::FenceBackend;
use crate::rhi::sync::CancelToken;

/// 带取消令牌等待时，检查令牌的间隔
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(2);

pub(crate) struct FenceState {
    completed: Mutex<u64>,
    cond: Condvar,
}

impl FenceState {
    pub(crate) fn new(initial_value: u64) -> Arc<Self> {
        Arc::new(Self {
            completed: Mutex::new(initial_value),
            cond: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn completed(&self) -> u64 {
        *self.lock()
    }

    /// GPU 时间线到达 signal 点
    ///
    /// 多个队列可能乱序到达，完成值只增不减。
    pub(crate) fn signal(&self, value: u64) {
        let mut completed = self.lock();
        *completed = (*completed).max(value);
        drop(completed);
        self.cond.notify_all();
    }

    pub(crate) fn wait(&self, value: u64, deadline: Option<Instant>, cancel: Option<&CancelToken>) -> Result<()> {
        let mut completed = self.lock();
        loop {
            if *completed >= value {
                return Ok(());
            }
            if cancel.map_or(false, CancelToken::is_cancelled) {
                return Err(RhiError::Cancelled { value });
            }

            let mut slice = cancel.map(|_| CANCEL_POLL_INTERVAL);
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(RhiError::Timeout {
                        value,
                        completed: *completed,
                    });
                }
                let remaining = deadline - now;
                slice = Some(slice.map_or(remaining, |s| s.min(remaining)));
            }

            completed = match slice {
                Some(slice) => {
                    self.cond
                        .wait_timeout(completed, slice)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.cond.wait(completed).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

/// headless 后端的 fence
pub struct HeadlessFence {
    state: Arc<FenceState>,
}

impl HeadlessFence {
    pub(crate) fn new(initial_value: u64) -> Self {
        Self {
            state: FenceState::new(initial_value),
        }
    }

    pub(crate) fn state(&self) -> &Arc<FenceState> {
        &self.state
    }
}

impl FenceBackend for HeadlessFence {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn completed_value(&self) -> u64 {
        self.state.completed()
    }

    fn wait(&self, value: u64, deadline: Option<Instant>, cancel: Option<&CancelToken>) -> Result<()> {
        self.state.wait(value, deadline, cancel)
    }
}
