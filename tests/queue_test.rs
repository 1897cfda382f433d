use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use audio2text::utils::poll::{poll_until, PollError};
use audio2text::{ConversionError, ConversionQueue, ConversionRequest, Converter, ErrorKind};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// 根据文件名决定行为的测试替身
///
/// - `ok-*`      处理 `work` 后成功
/// - `never-*`   页面永远不就绪，按轮询上限超时
/// - `missing-*` 找不到上传按钮
/// - `panic-*`   转换过程中 panic
/// - `hang-*`    一直等到被取消
struct ScriptedSite {
    work: Duration,
    poll_interval: Duration,
    max_wait: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    runs: Mutex<Vec<u64>>,
}

impl ScriptedSite {
    fn new() -> Arc<Self> {
        Self::with_work(Duration::from_millis(5))
    }

    fn with_work(work: Duration) -> Arc<Self> {
        Arc::new(Self {
            work,
            poll_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(300),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            runs: Mutex::new(Vec::new()),
        })
    }

    fn runs(&self) -> Vec<u64> {
        self.runs.lock().unwrap().clone()
    }

    async fn simulate(&self, request: &ConversionRequest, cancel: &CancellationToken) -> Result<String, ConversionError> {
        let name = request.original_filename.as_str();
        if name.starts_with("never-") {
            let never_ready = poll_until(self.poll_interval, self.max_wait, cancel, || async {
                Ok::<Option<()>, Infallible>(None)
            })
            .await;
            return match never_ready {
                Err(PollError::TimedOut { waited }) => Err(ConversionError::Timeout { waited }),
                _ => Err(ConversionError::Cancelled),
            };
        }
        if name.starts_with("missing-") {
            return Err(ConversionError::ElementNotFound {
                what: "上传按钮",
                selectors: vec!["#uploadButton".to_string()],
            });
        }
        if name.starts_with("panic-") {
            panic!("页面脚本崩溃");
        }
        if name.starts_with("hang-") {
            cancel.cancelled().await;
            return Err(ConversionError::Cancelled);
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(ConversionError::Cancelled),
            _ = sleep(self.work) => Ok(format!("Nội dung cuộc họp được chuyển từ {name}, đủ dài để được coi là hợp lệ.")),
        }
    }
}

/// 活跃计数，panic 展开时同样会减回去
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Converter for ScriptedSite {
    async fn convert(&self, request: &ConversionRequest, cancel: &CancellationToken) -> Result<String, ConversionError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _active = ActiveGuard(&self.active);
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.runs.lock().unwrap().push(request.id);

        self.simulate(request, cancel).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_run_in_fifo_order_one_at_a_time() {
    let site = ScriptedSite::new();
    let queue = ConversionQueue::start(site.clone());

    let mut submitters = Vec::new();
    for caller in 0..8 {
        let queue = queue.clone();
        submitters.push(tokio::spawn(async move {
            let mut handles = Vec::new();
            for n in 0..5 {
                handles.push(queue.submit(format!("/uploads/{caller}-{n}.mp3"), format!("ok-{caller}-{n}.mp3")));
            }
            let mut results = Vec::new();
            for handle in handles {
                let id = handle.job_id();
                results.push((id, handle.await));
            }
            results
        }));
    }

    let mut submitted = Vec::new();
    for submitter in submitters {
        for (id, result) in submitter.await.unwrap() {
            assert!(result.success(), "job {id}: {:?}", result.error());
            submitted.push(id);
        }
    }

    let runs = site.runs();
    assert_eq!(runs.len(), 40);
    // 运行顺序就是编号（提交）顺序
    let mut sorted = runs.clone();
    sorted.sort_unstable();
    assert_eq!(runs, sorted);
    submitted.sort_unstable();
    assert_eq!(runs, submitted);

    assert_eq!(site.max_active.load(Ordering::SeqCst), 1);
    queue.shutdown().await;
}

#[tokio::test]
async fn test_submit_does_not_wait_for_running_job() {
    let site = ScriptedSite::new();
    let queue = ConversionQueue::start(site.clone());

    let blocker = queue.submit("/uploads/hang.mp3", "hang-1.mp3");
    while !queue.is_busy() {
        tokio::task::yield_now().await;
    }

    let started = std::time::Instant::now();
    let waiting: Vec<_> = (0..1000)
        .map(|n| queue.submit(format!("/uploads/{n}.mp3"), format!("ok-{n}.mp3")))
        .collect();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(queue.pending(), 1000);

    queue.shutdown().await;
    assert_eq!(blocker.await.error_kind(), Some(ErrorKind::Cancelled));
    for handle in waiting {
        assert_eq!(handle.await.error_kind(), Some(ErrorKind::Cancelled));
    }
    // 取消的排队任务不会进入转换
    assert_eq!(site.runs().len(), 1);
}

#[tokio::test]
async fn test_failures_and_panics_do_not_stop_the_queue() {
    let site = ScriptedSite::new();
    let queue = ConversionQueue::start(site.clone());

    let missing = queue.submit("/uploads/1.mp3", "missing-1.mp3");
    let crashed = queue.submit("/uploads/2.mp3", "panic-2.mp3");
    let fine = queue.submit("/uploads/3.mp3", "ok-3.mp3");

    let missing = missing.await;
    assert!(!missing.success());
    assert!(missing.text().is_none());
    assert_eq!(missing.error_kind(), Some(ErrorKind::ElementNotFound));
    assert_eq!(missing.http_status(), 500);

    let crashed = crashed.await;
    assert_eq!(crashed.error_kind(), Some(ErrorKind::Resource));

    let fine = fine.await;
    assert!(fine.success());
    assert!(fine.text().is_some_and(|t| t.contains("ok-3.mp3")));

    assert_eq!(site.max_active.load(Ordering::SeqCst), 1);
    queue.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_never_ready_job_times_out_and_next_job_still_runs() {
    let site = ScriptedSite::with_work(Duration::from_secs(20));
    let queue = ConversionQueue::start(site.clone());
    let started = Instant::now();

    let a = queue.submit("/uploads/file1.mp3", "ok-file1.mp3");
    let b = queue.submit("/uploads/file2.mp3", "never-file2.mp3");
    let c = queue.submit("/uploads/file3.mp3", "ok-file3.mp3");

    let a = a.await;
    assert!(a.success());

    let b = b.await;
    assert_eq!(b.error_kind(), Some(ErrorKind::Timeout));
    let waited = b.processing_time().unwrap();
    assert!(waited >= Duration::from_secs(300), "{waited:?}");
    assert!(waited <= Duration::from_secs(302), "{waited:?}");

    let c = c.await;
    assert!(c.success());

    assert_eq!(site.runs(), vec![1, 2, 3]);
    // A + B 的上限 + C
    assert!(started.elapsed() <= Duration::from_secs(20 + 302 + 20));
    queue.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_queued_job_is_skipped() {
    let site = ScriptedSite::new();
    let queue = ConversionQueue::start(site.clone());

    let first = queue.submit("/uploads/hang.mp3", "hang-1.mp3");
    let second = queue.submit("/uploads/2.mp3", "ok-2.mp3");
    let third = queue.submit("/uploads/3.mp3", "ok-3.mp3");
    while !queue.is_busy() {
        tokio::task::yield_now().await;
    }

    second.cancel();
    first.cancel();

    assert_eq!(first.await.error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(second.await.error_kind(), Some(ErrorKind::Cancelled));
    assert!(third.await.success());

    assert_eq!(site.runs(), vec![1, 3]);
    queue.shutdown().await;
}
