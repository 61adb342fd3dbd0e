use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, Row};

use klasmwen_types::notifications::{NewNotification, Notification};
use klasmwen_types::pagination::{CursorPage, PageOptions};

use crate::Database;
use crate::keyset::{Filter, KeysetQuery, SortOrder, build_page};
use crate::models::{parse_enum, timestamp, user_summary};

const NOTIFICATION_SELECT: &str = "SELECT n.id, n.kind, n.post_id, n.comment_id, n.is_read, n.created_at,
       u.id, u.username, u.avatar_url
FROM notifications n
JOIN users u ON u.id = n.actor_id";

fn map_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        kind: parse_enum(row, 1)?,
        post_id: row.get(2)?,
        comment_id: row.get(3)?,
        read: row.get(4)?,
        created_at: timestamp(row, 5)?,
        actor: user_summary(row, 6)?,
    })
}

/// Writes a notification on an open connection so callers can include it in
/// the transaction that caused it.
pub(crate) fn insert_notification(conn: &Connection, n: &NewNotification) -> Result<()> {
    conn.execute(
        "INSERT INTO notifications (recipient_id, actor_id, kind, post_id, comment_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            &n.recipient_id,
            &n.actor_id,
            n.kind.as_str(),
            n.post_id,
            n.comment_id,
        ),
    )?;
    Ok(())
}

impl Database {
    // -- Notifications --

    pub fn list_notifications(
        &self,
        recipient_id: &str,
        options: &PageOptions,
    ) -> Result<CursorPage<Notification>> {
        let filter =
            Filter::new().and("n.recipient_id = ?", [Value::Text(recipient_id.to_string())]);
        self.with_conn(|conn| {
            build_page(
                conn,
                KeysetQuery::new(NOTIFICATION_SELECT, filter),
                "n.id",
                SortOrder::Desc,
                options,
                map_notification,
                |n| n.id,
            )
        })
    }

    pub fn unread_notification_count(&self, recipient_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Marks one notification read. Only the recipient can do this; returns
    /// false if the notification does not exist or belongs to someone else.
    pub fn mark_notification_read(&self, id: i64, recipient_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient_id = ?2",
                (id, recipient_id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn mark_all_notifications_read(&self, recipient_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id],
            )?;
            Ok(changed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;
    use klasmwen_types::notifications::NotificationKind;

    fn seeded() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        fixtures::user(&db, "alice");
        fixtures::user(&db, "bob");
        let post = fixtures::post(&db, "alice");
        db.with_conn(|conn| {
            for _ in 0..3 {
                let n = NewNotification::for_recipient("alice", "bob", NotificationKind::Like, post, None)
                    .unwrap();
                insert_notification(conn, &n)?;
            }
            Ok(())
        })
        .unwrap();
        (db, post)
    }

    #[test]
    fn unread_count_follows_mark_read() {
        let (db, _) = seeded();
        assert_eq!(db.unread_notification_count("alice").unwrap(), 3);

        let page = db.list_notifications("alice", &PageOptions::first(10)).unwrap();
        let newest = page.data[0].id;
        assert!(db.mark_notification_read(newest, "alice").unwrap());
        assert_eq!(db.unread_notification_count("alice").unwrap(), 2);

        assert_eq!(db.mark_all_notifications_read("alice").unwrap(), 2);
        assert_eq!(db.unread_notification_count("alice").unwrap(), 0);
    }

    #[test]
    fn other_users_cannot_mark_read() {
        let (db, _) = seeded();
        let page = db.list_notifications("alice", &PageOptions::first(1)).unwrap();
        assert!(page.pagination.has_more);
        assert!(!db.mark_notification_read(page.data[0].id, "bob").unwrap());
        assert!(db.list_notifications("bob", &PageOptions::first(10)).unwrap().data.is_empty());
    }
}
