// 上传会话运行信息
//
// 会话状态机：Idle -> Running <-> Paused -> {Completed, Failed}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 会话状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// 未启动
    Idle,
    /// 上传中
    Running,
    /// 已暂停
    Paused,
    /// 已完成
    Completed,
    /// 失败
    Failed,
}

impl SessionStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// 会话运行信息（进度、速度、时间戳）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// 会话ID
    pub id: String,
    /// 事务 ID
    pub transaction_id: String,
    /// 会话状态
    pub status: SessionStatus,
    /// 总大小（长度未知的流在读完前为已读取的大小）
    pub total_size: u64,
    /// 已确认大小
    pub uploaded_size: u64,
    /// 上传速度 (bytes/s)
    pub speed: u64,
    /// 总分片数
    pub total_chunks: u32,
    /// 已确认分片数
    pub completed_chunks: u32,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 开始时间 (Unix timestamp)
    pub started_at: Option<i64>,
    /// 完成时间 (Unix timestamp)
    pub completed_at: Option<i64>,
    /// 远端 ID（完成后）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// 错误信息
    pub error: Option<String>,
}

impl SessionInfo {
    pub fn new(transaction_id: String, total_size: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            transaction_id,
            status: SessionStatus::Idle,
            total_size,
            uploaded_size: 0,
            speed: 0,
            total_chunks: 0,
            completed_chunks: 0,
            created_at: chrono::Utc::now().timestamp(),
            started_at: None,
            completed_at: None,
            remote_id: None,
            error: None,
        }
    }

    /// 计算进度百分比
    pub fn progress(&self) -> f64 {
        if self.total_size == 0 {
            return if self.status == SessionStatus::Completed {
                100.0
            } else {
                0.0
            };
        }
        (self.uploaded_size as f64 / self.total_size as f64) * 100.0
    }

    /// 估算剩余时间 (秒)
    pub fn eta(&self) -> Option<u64> {
        if self.speed == 0 || self.uploaded_size >= self.total_size {
            return None;
        }
        let remaining = self.total_size - self.uploaded_size;
        Some(remaining / self.speed)
    }

    /// 标记为上传中
    pub fn mark_running(&mut self) {
        self.status = SessionStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(chrono::Utc::now().timestamp());
        }
    }

    /// 标记为暂停
    pub fn mark_paused(&mut self) {
        self.status = SessionStatus::Paused;
    }

    /// 标记为已完成
    pub fn mark_completed(&mut self, remote_id: String) {
        self.status = SessionStatus::Completed;
        self.completed_at = Some(chrono::Utc::now().timestamp());
        self.uploaded_size = self.total_size;
        self.remote_id = Some(remote_id);
    }

    /// 标记为失败
    pub fn mark_failed(&mut self, error: String) {
        self.status = SessionStatus::Failed;
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_creation() {
        let info = SessionInfo::new("tx".to_string(), 1024 * 1024);
        assert_eq!(info.status, SessionStatus::Idle);
        assert_eq!(info.uploaded_size, 0);
        assert_eq!(info.progress(), 0.0);
        assert!(info.started_at.is_none());
    }

    #[test]
    fn test_progress_and_eta() {
        let mut info = SessionInfo::new("tx".to_string(), 1000);

        info.uploaded_size = 250;
        assert_eq!(info.progress(), 25.0);

        info.uploaded_size = 200;
        info.speed = 100; // 100 bytes/s
        assert_eq!(info.eta(), Some(8)); // (1000 - 200) / 100 = 8s

        info.speed = 0;
        assert_eq!(info.eta(), None); // 速度为0，无法估算
    }

    #[test]
    fn test_status_transitions() {
        let mut info = SessionInfo::new("tx".to_string(), 1000);

        info.mark_running();
        assert_eq!(info.status, SessionStatus::Running);
        assert!(info.started_at.is_some());

        info.mark_paused();
        assert_eq!(info.status, SessionStatus::Paused);
        assert!(!info.status.is_terminal());

        info.mark_completed("remote".to_string());
        assert_eq!(info.status, SessionStatus::Completed);
        assert_eq!(info.uploaded_size, info.total_size);
        assert_eq!(info.remote_id.as_deref(), Some("remote"));
        assert!(info.status.is_terminal());
    }

    #[test]
    fn test_empty_upload_progress() {
        let mut info = SessionInfo::new("tx".to_string(), 0);
        assert_eq!(info.progress(), 0.0);
        info.mark_completed("id".to_string());
        assert_eq!(info.progress(), 100.0);
    }
}
