//! 定时同步：按固定间隔触发，同一时刻最多只有一次同步在执行

use crate::core::engine::MirrorPass;
use crate::core::error::{Result, SyncError};
use crate::core::stats::SyncStats;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// 调度器与定时任务共享的状态
struct Shared {
    engine: Arc<dyn MirrorPass>,
    /// 是否有同步正在执行
    syncing: AtomicBool,
    /// 因上一次同步未结束而跳过的触发次数
    skipped: AtomicU64,
}

impl Shared {
    /// 执行一次同步；已有同步在执行时直接跳过并返回 None
    async fn run_guarded(&self, source: &Path, destination: &Path) -> Option<Result<SyncStats>> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("上一次同步仍在进行，跳过本次触发");
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        scopeguard::defer! {
            self.syncing.store(false, Ordering::Release);
        }

        let started = Instant::now();
        let result = self.engine.synchronize(source, destination).await;
        match &result {
            Ok(_) => debug!("本次同步耗时 {:.2}s", started.elapsed().as_secs_f64()),
            Err(e) => error!(
                "同步失败 ({:.2}s)，等待下一次触发: {}",
                started.elapsed().as_secs_f64(),
                e
            ),
        }
        Some(result)
    }
}

struct Running {
    source: PathBuf,
    destination: PathBuf,
    interval: Duration,
    timer: JoinHandle<()>,
}

/// 定时同步调度器
pub struct Scheduler {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(engine: Arc<dyn MirrorPass>) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                syncing: AtomicBool::new(false),
                skipped: AtomicU64::new(0),
            }),
            running: Mutex::new(None),
        }
    }

    /// 立即同步一次，然后按 `interval` 定时同步
    ///
    /// 首次同步的结果原样返回；即使首次失败，定时器也会启动。
    pub async fn start(
        &self,
        source: &Path,
        destination: &Path,
        interval: Duration,
    ) -> Result<Option<SyncStats>> {
        if interval.is_zero() {
            return Err(SyncError::InvalidArgument("同步间隔必须大于 0".to_string()));
        }

        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(SyncError::AlreadyRunning);
        }

        info!(
            "启动定时同步: {} -> {}, 间隔 {:?}",
            source.display(),
            destination.display(),
            interval
        );
        let first = self.shared.run_guarded(source, destination).await;

        let timer = tokio::spawn(tick_loop(
            self.shared.clone(),
            source.to_path_buf(),
            destination.to_path_buf(),
            interval,
        ));
        *running = Some(Running {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            interval,
            timer,
        });

        match first {
            Some(Ok(stats)) => Ok(Some(stats)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// 停止定时器；正在执行的同步会继续完成。重复调用无副作用。
    pub async fn stop(&self) {
        if let Some(running) = self.running.lock().await.take() {
            running.timer.abort();
            info!(
                "已停止定时同步: {} -> {} (间隔 {:?})",
                running.source.display(),
                running.destination.display(),
                running.interval
            );
        }
    }

    /// 等待正在执行的同步结束
    pub async fn wait_idle(&self) {
        while self.is_syncing() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub fn is_syncing(&self) -> bool {
        self.shared.syncing.load(Ordering::Acquire)
    }

    pub fn skipped_ticks(&self) -> u64 {
        self.shared.skipped.load(Ordering::Relaxed)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.timer.abort();
        }
    }
}

async fn tick_loop(shared: Arc<Shared>, source: PathBuf, destination: PathBuf, interval: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        debug!("定时触发同步");

        // 同步放到独立任务中执行，计时不受同步耗时影响
        let shared = shared.clone();
        let source = source.clone();
        let destination = destination.clone();
        tokio::spawn(async move {
            if let Some(Ok(stats)) = shared.run_guarded(&source, &destination).await {
                if !stats.is_unchanged() {
                    info!("定时同步有变更: {}", stats);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// 记录调用次数和最大并发数的假引擎
    #[derive(Default)]
    struct SlowPass {
        delay: Duration,
        fail: bool,
        runs: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    #[async_trait]
    impl MirrorPass for SlowPass {
        async fn synchronize(&self, _source: &Path, _destination: &Path) -> Result<SyncStats> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                Err(SyncError::InvalidArgument("boom".to_string()))
            } else {
                Ok(SyncStats::new())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_ticks_are_skipped() {
        let pass = Arc::new(SlowPass {
            delay: Duration::from_millis(300),
            ..Default::default()
        });
        let scheduler = Scheduler::new(pass.clone());

        // 首次同步 0~300ms；定时触发于 500ms（执行到 800ms）、700ms（被跳过）
        scheduler
            .start(Path::new("/src"), Path::new("/dst"), Duration::from_millis(200))
            .await
            .unwrap();
        assert!(scheduler.is_running().await);

        tokio::time::sleep(Duration::from_millis(550)).await;
        scheduler.stop().await;
        scheduler.wait_idle().await;

        assert_eq!(pass.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(pass.runs.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.skipped_ticks(), 1);
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_idempotent() {
        let scheduler = Scheduler::new(Arc::new(SlowPass::default()));

        scheduler
            .start(Path::new("/src"), Path::new("/dst"), Duration::from_secs(3600))
            .await
            .unwrap();
        let err = scheduler
            .start(Path::new("/src"), Path::new("/dst"), Duration::from_secs(3600))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::AlreadyRunning));

        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let scheduler = Scheduler::new(Arc::new(SlowPass::default()));
        let err = scheduler
            .start(Path::new("/src"), Path::new("/dst"), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_failed_pass_keeps_ticking() {
        let pass = Arc::new(SlowPass {
            fail: true,
            ..Default::default()
        });
        let scheduler = Scheduler::new(pass.clone());

        let first = scheduler
            .start(Path::new("/src"), Path::new("/dst"), Duration::from_millis(30))
            .await;
        assert!(first.is_err());
        assert!(scheduler.is_running().await);

        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;
        scheduler.wait_idle().await;

        assert!(pass.runs.load(Ordering::SeqCst) >= 2);
        assert!(!scheduler.is_syncing());
    }
}
