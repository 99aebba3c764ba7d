use crate::error::{AppError, AppResult};
use crate::models::{Dispute, EscrowRecord, Match, Withdrawal};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Audit log entry, one JSON object per line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: i64,
    pub event_type: String, // "match_status_changed", "escrow_released", ...
    pub match_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub details: serde_json::Value,
}

/// Append-only audit trail for money and dispute events
pub struct AuditTrailService {
    log_file: PathBuf,
    file_handle: Arc<Mutex<std::fs::File>>,
}

impl AuditTrailService {
    pub fn new(log_directory: PathBuf) -> AppResult<Self> {
        std::fs::create_dir_all(&log_directory)
            .map_err(|e| AppError::Message(format!("Failed to create log directory: {}", e)))?;

        let date = chrono::Utc::now().format("%Y-%m-%d");
        let log_file = log_directory.join(format!("audit_{}.log", date));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| AppError::Message(format!("Failed to open audit log file: {}", e)))?;

        info!("Audit trail initialized: {:?}", log_file);

        Ok(Self {
            log_file,
            file_handle: Arc::new(Mutex::new(file)),
        })
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub async fn log(&self, entry: AuditLogEntry) -> AppResult<()> {
        let json = serde_json::to_string(&entry)?;

        let mut file = self.file_handle.lock().await;
        writeln!(file, "{}", json)
            .map_err(|e| AppError::Message(format!("Failed to write audit log: {}", e)))?;
        file.flush()
            .map_err(|e| AppError::Message(format!("Failed to flush audit log: {}", e)))?;

        Ok(())
    }

    /// Write an entry; a failed write is logged, never surfaced
    async fn record(
        &self,
        event_type: &str,
        match_id: Option<Uuid>,
        actor_id: Option<Uuid>,
        details: serde_json::Value,
    ) {
        let entry = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: event_type.to_string(),
            match_id,
            actor_id,
            details,
        };
        if let Err(e) = self.log(entry).await {
            warn!("Audit entry {} dropped: {}", event_type, e);
        }
    }

    pub async fn log_match_status(&self, updated: &Match, previous: &str, actor_id: Option<Uuid>) {
        self.record(
            "match_status_changed",
            Some(updated.id),
            actor_id,
            serde_json::json!({
                "from": previous,
                "to": updated.status,
                "trip_id": updated.trip_id.to_string(),
                "parcel_id": updated.parcel_id.to_string(),
                "reason": updated.cancelled_reason,
            }),
        )
        .await;
    }

    /// `event_type` is `escrow_held`, `escrow_released`, `escrow_refunded`, ...
    pub async fn log_escrow(&self, event_type: &str, escrow: &EscrowRecord, actor_id: Option<Uuid>) {
        self.record(
            event_type,
            Some(escrow.match_id),
            actor_id,
            serde_json::json!({
                "escrow_id": escrow.id.to_string(),
                "status": escrow.status,
                "amount": escrow.amount.to_string(),
                "traveler_payout": escrow.traveler_payout.to_string(),
                "platform_fee": escrow.platform_fee.to_string(),
                "payment_reference": escrow.payment_reference,
            }),
        )
        .await;
    }

    pub async fn log_dispute(&self, dispute: &Dispute, actor_id: Uuid) {
        self.record(
            "dispute_updated",
            Some(dispute.match_id),
            Some(actor_id),
            serde_json::json!({
                "dispute_id": dispute.id.to_string(),
                "status": dispute.status,
                "reason": dispute.reason,
                "resolution": dispute.resolution,
                "note": dispute.resolution_note,
            }),
        )
        .await;
    }

    pub async fn log_withdrawal(&self, withdrawal: &Withdrawal, actor_id: Option<Uuid>) {
        self.record(
            "withdrawal_updated",
            None,
            actor_id,
            serde_json::json!({
                "withdrawal_id": withdrawal.id.to_string(),
                "user_id": withdrawal.user_id.to_string(),
                "status": withdrawal.status,
                "amount": withdrawal.amount.to_string(),
                "failure_reason": withdrawal.failure_reason,
            }),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_are_json_lines() {
        let dir = std::env::temp_dir().join(format!("airbar-audit-{}", Uuid::new_v4()));
        let audit = AuditTrailService::new(dir.clone()).unwrap();

        audit
            .record("escrow_held", Some(Uuid::new_v4()), None, serde_json::json!({"n": 1}))
            .await;
        audit
            .record("escrow_released", None, None, serde_json::json!({"n": 2}))
            .await;

        let contents = std::fs::read_to_string(audit.log_file()).unwrap();
        let lines: Vec<AuditLogEntry> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].event_type, "escrow_held");
        assert_eq!(lines[1].details["n"], 2);

        std::fs::remove_dir_all(dir).ok();
    }
}
