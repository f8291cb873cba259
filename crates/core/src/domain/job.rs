use serde::Serialize;

/// ジョブ状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Done,
    Failed,
    Canceled,
}

/// ジョブ種別（生成器呼び出し1回に対応）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Scenario,
    Feedback,
}

/// ジョブメタデータ
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub job_id: String,
    /// 発行時の会話エポック
    pub epoch: u64,
    pub kind: JobKind,
    pub status: JobStatus,
    pub created_at: String,
    pub error: Option<String>,
}

impl JobInfo {
    pub fn new(job_id: String, epoch: u64, kind: JobKind, now: String) -> Self {
        Self {
            job_id,
            epoch,
            kind,
            status: JobStatus::Running,
            created_at: now,
            error: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == JobStatus::Running
    }
}
