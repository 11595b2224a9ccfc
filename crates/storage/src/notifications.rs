use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use aqua_talent_core::notify::NotificationDraft;
use aqua_talent_core::types::{Notification, Role};

use crate::{parse_enum, to_rfc3339, RepoError, Tx};

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, recipient_type, kind, title, message, related_id, is_read, created_at";

/// Repository for in-app notifications.
#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    recipient_id: String,
    recipient_type: String,
    kind: String,
    title: String,
    message: String,
    related_id: Option<String>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    fn into_domain(self) -> Result<Notification, RepoError> {
        Ok(Notification {
            recipient_type: parse_enum("recipient_type", &self.recipient_type)?,
            kind: parse_enum("kind", &self.kind)?,
            id: self.id,
            recipient_id: self.recipient_id,
            title: self.title,
            message: self.message,
            related_id: self.related_id,
            is_read: self.is_read,
            created_at: self.created_at,
        })
    }
}

impl NotificationRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persists drafts inside the caller's transaction.
    pub async fn insert_all(
        &self,
        tx: &mut Tx<'_>,
        drafts: &[NotificationDraft],
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, RepoError> {
        let mut stored = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let notification = Notification {
                id: Uuid::new_v4().to_string(),
                recipient_id: draft.recipient_id.clone(),
                recipient_type: draft.recipient_type,
                kind: draft.kind,
                title: draft.title.clone(),
                message: draft.message.clone(),
                related_id: draft.related_id.clone(),
                is_read: false,
                created_at: now,
            };
            sqlx::query(
                "INSERT INTO notifications \
                 (id, recipient_id, recipient_type, kind, title, message, related_id, is_read, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)",
            )
            .bind(&notification.id)
            .bind(&notification.recipient_id)
            .bind(notification.recipient_type.as_str())
            .bind(notification.kind.as_str())
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(&notification.related_id)
            .bind(to_rfc3339(now))
            .execute(&mut **tx)
            .await?;
            stored.push(notification);
        }
        Ok(stored)
    }

    /// Every notification for a recipient, newest first.
    pub async fn list_for(
        &self,
        recipient_type: Role,
        recipient_id: &str,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepoError> {
        let query = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE recipient_type = ? AND recipient_id = ? AND (? = 0 OR is_read = 0) \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(recipient_type.as_str())
            .bind(recipient_id)
            .bind(unread_only)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(NotificationRow::into_domain).collect()
    }

    pub async fn unread_count(&self, recipient_type: Role, recipient_id: &str) -> Result<i64, RepoError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications \
             WHERE recipient_type = ? AND recipient_id = ? AND is_read = 0",
        )
        .bind(recipient_type.as_str())
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn fetch(&self, id: &str) -> Result<Notification, RepoError> {
        let query = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?");
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)?
            .into_domain()
    }

    /// Marks one notification read. Only its recipient matches the filter.
    pub async fn mark_read(
        &self,
        id: &str,
        recipient_type: Role,
        recipient_id: &str,
    ) -> Result<Notification, RepoError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1 \
             WHERE id = ? AND recipient_type = ? AND recipient_id = ?",
        )
        .bind(id)
        .bind(recipient_type.as_str())
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        self.fetch(id).await
    }

    /// Marks every unread notification of the recipient read; returns how many changed.
    pub async fn mark_all_read(&self, recipient_type: Role, recipient_id: &str) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1 \
             WHERE recipient_type = ? AND recipient_id = ? AND is_read = 0",
        )
        .bind(recipient_type.as_str())
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
