use std::collections::HashMap;
use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::domain::job::{JobInfo, JobKind, JobStatus};

/// ジョブキュー: 生成器呼び出しの発行・追跡・キャンセル
pub struct JobQueue {
    jobs: Mutex<HashMap<String, JobEntry>>,
}

struct JobEntry {
    info: JobInfo,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// ジョブを登録し、キャンセルシグナルの Receiver を返す
    pub fn enqueue(&self, epoch: u64, kind: JobKind) -> (String, oneshot::Receiver<()>) {
        let job_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let info = JobInfo::new(job_id.clone(), epoch, kind, now);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        self.jobs.lock().insert(
            job_id.clone(),
            JobEntry {
                info,
                cancel_tx: Some(cancel_tx),
            },
        );

        (job_id, cancel_rx)
    }

    /// ジョブをDone状態に変更
    pub fn mark_done(&self, job_id: &str) {
        let mut jobs = self.jobs.lock();
        if let Some(entry) = jobs.get_mut(job_id) {
            if entry.info.is_active() {
                entry.info.status = JobStatus::Done;
                entry.cancel_tx = None;
            }
        }
    }

    /// ジョブをFailed状態に変更
    pub fn mark_failed(&self, job_id: &str, error: String) {
        let mut jobs = self.jobs.lock();
        if let Some(entry) = jobs.get_mut(job_id) {
            if entry.info.is_active() {
                entry.info.status = JobStatus::Failed;
                entry.info.error = Some(error);
                entry.cancel_tx = None;
            }
        }
    }

    /// 実行中の全ジョブをキャンセル
    pub fn cancel_all(&self) -> Vec<String> {
        let mut jobs = self.jobs.lock();
        let mut canceled = vec![];

        for (job_id, entry) in jobs.iter_mut() {
            if entry.info.is_active() {
                Self::cancel_entry(entry);
                canceled.push(job_id.clone());
            }
        }

        canceled
    }

    fn cancel_entry(entry: &mut JobEntry) {
        entry.info.status = JobStatus::Canceled;
        if let Some(tx) = entry.cancel_tx.take() {
            let _ = tx.send(());
        }
    }

    /// 完了済みジョブを削除（メモリ解放）
    pub fn cleanup_completed(&self) {
        self.jobs.lock().retain(|_, entry| entry.info.is_active());
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// キャンセルシグナルが来たら future を破棄して None を返す
pub async fn run_cancellable<F: Future>(
    fut: F,
    cancel_rx: oneshot::Receiver<()>,
) -> Option<F::Output> {
    tokio::select! {
        out = fut => Some(out),
        _ = cancel_rx => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job(queue: &JobQueue, job_id: &str) -> Option<JobInfo> {
        queue.jobs.lock().get(job_id).map(|e| e.info.clone())
    }

    fn active(queue: &JobQueue) -> usize {
        queue.jobs.lock().values().filter(|e| e.info.is_active()).count()
    }

    #[test]
    fn test_enqueue_and_get() {
        let queue = JobQueue::new();
        let (job_id, _cancel_rx) = queue.enqueue(3, JobKind::Scenario);

        let info = job(&queue, &job_id).unwrap();
        assert_eq!(info.status, JobStatus::Running);
        assert_eq!(info.kind, JobKind::Scenario);
        assert_eq!(info.epoch, 3);
        assert_eq!(active(&queue), 1);
    }

    #[test]
    fn test_mark_done_then_cancel_is_noop() {
        let queue = JobQueue::new();
        let (job_id, _cancel_rx) = queue.enqueue(1, JobKind::Feedback);

        queue.mark_done(&job_id);
        assert_eq!(job(&queue, &job_id).unwrap().status, JobStatus::Done);
        assert!(queue.cancel_all().is_empty());
        assert_eq!(job(&queue, &job_id).unwrap().status, JobStatus::Done);
    }

    #[test]
    fn test_mark_failed() {
        let queue = JobQueue::new();
        let (job_id, _) = queue.enqueue(1, JobKind::Feedback);

        queue.mark_failed(&job_id, "Generation timeout".to_string());
        let info = job(&queue, &job_id).unwrap();
        assert_eq!(info.status, JobStatus::Failed);
        assert_eq!(info.error.as_deref(), Some("Generation timeout"));
    }

    #[test]
    fn test_cancel_all() {
        let queue = JobQueue::new();
        let (j1, _) = queue.enqueue(1, JobKind::Scenario);
        let (j2, _) = queue.enqueue(1, JobKind::Feedback);
        let (j3, _) = queue.enqueue(1, JobKind::Feedback);
        queue.mark_done(&j3);

        let canceled = queue.cancel_all();
        assert_eq!(canceled.len(), 2);
        assert!(canceled.contains(&j1));
        assert!(canceled.contains(&j2));
        assert_eq!(job(&queue, &j3).unwrap().status, JobStatus::Done);
        assert_eq!(active(&queue), 0);
    }

    #[test]
    fn test_cleanup() {
        let queue = JobQueue::new();
        let (j1, _) = queue.enqueue(1, JobKind::Scenario);
        let (j2, _) = queue.enqueue(1, JobKind::Feedback);

        queue.mark_done(&j1);
        queue.cleanup_completed();

        assert!(job(&queue, &j1).is_none());
        assert!(job(&queue, &j2).is_some());
    }

    #[tokio::test]
    async fn test_run_cancellable_completes() {
        let queue = JobQueue::new();
        let (_job_id, cancel_rx) = queue.enqueue(1, JobKind::Feedback);
        let out = run_cancellable(async { 42 }, cancel_rx).await;
        assert_eq!(out, Some(42));
    }

    #[tokio::test]
    async fn test_run_cancellable_drops_future_on_cancel() {
        let queue = JobQueue::new();
        let (job_id, cancel_rx) = queue.enqueue(1, JobKind::Scenario);
        assert_eq!(queue.cancel_all(), vec![job_id.clone()]);

        let out = run_cancellable(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                1
            },
            cancel_rx,
        )
        .await;
        assert_eq!(out, None);
        assert_eq!(job(&queue, &job_id).unwrap().status, JobStatus::Canceled);
    }
}
