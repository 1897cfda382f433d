//! 转换任务

use std::fmt::Display;
use std::path::PathBuf;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::models::ConversionResult;

/// 一次转换请求的内容
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// 任务编号，按提交顺序递增
    pub id: u64,
    /// 已保存到本地的音频文件
    pub file_path: PathBuf,
    /// 上传时的原始文件名（仅用于日志）
    pub original_filename: String,
}

impl Display for ConversionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[任务 #{} {}]", self.id, self.original_filename)
    }
}

/// 排队中或正在执行的任务
///
/// `complete` 消耗自身，一个任务只能被完成一次
#[derive(Debug)]
pub struct Job {
    pub request: ConversionRequest,
    pub cancel: CancellationToken,
    pub enqueued_at: Instant,
    responder: oneshot::Sender<ConversionResult>,
}

impl Job {
    pub(crate) fn new(
        request: ConversionRequest,
        cancel: CancellationToken,
    ) -> (Self, oneshot::Receiver<ConversionResult>) {
        let (responder, receiver) = oneshot::channel();
        let job = Self {
            request,
            cancel,
            enqueued_at: Instant::now(),
            responder,
        };
        (job, receiver)
    }

    /// 交付结果
    ///
    /// 返回 `false` 表示调用方已经不再等待
    pub fn complete(self, result: ConversionResult) -> bool {
        self.responder.send(result).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ConversionRequest {
        ConversionRequest {
            id: 7,
            file_path: PathBuf::from("/tmp/meeting.mp3"),
            original_filename: "meeting.mp3".to_string(),
        }
    }

    #[tokio::test]
    async fn test_complete_delivers_result_once() {
        let (job, receiver) = Job::new(request(), CancellationToken::new());
        assert!(job.complete(ConversionResult::cancelled()));

        let result = receiver.await.unwrap();
        assert!(!result.success());
    }

    #[test]
    fn test_complete_after_caller_left() {
        let (job, receiver) = Job::new(request(), CancellationToken::new());
        drop(receiver);
        assert!(!job.complete(ConversionResult::cancelled()));
    }

    #[test]
    fn test_display_tags_job() {
        assert_eq!(request().to_string(), "[任务 #7 meeting.mp3]");
    }
}
