//! Reports and the moderation queue.
//!
//! A report targets exactly one post or comment (enforced by a CHECK
//! constraint). Reports are enriched when read: the target's summary is
//! joined in, `content_type` is derived from which foreign key is set, and
//! `is_content_hidden` mirrors the target's current `hidden` flag, so a
//! visibility change shows up on every report about that content.

use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params_from_iter};

use klasmwen_types::api::ReportFilters;
use klasmwen_types::models::{
    ContentType, Report, ReportReason, ReportStatus, ReportedComment, ReportedPost,
};
use klasmwen_types::pagination::{OffsetPage, OffsetPagination};

use crate::keyset::Filter;
use crate::models::{
    format_timestamp, optional_timestamp, optional_user_summary, parse_enum, timestamp,
    user_summary,
};
use crate::{Database, OptionalExt};

const REPORT_SELECT: &str = "SELECT r.id, r.status, r.moderator_notes, r.created_at, r.updated_at,
       ru.id, ru.username, ru.avatar_url,
       rr.id, rr.label, rr.description,
       r.post_id, p.title, p.hidden, pu.id, pu.username, pu.avatar_url,
       r.comment_id, c.post_id, c.content, c.hidden, cu.id, cu.username, cu.avatar_url
FROM reports r
JOIN users ru ON ru.id = r.reporter_id
JOIN report_reasons rr ON rr.id = r.reason_id
LEFT JOIN posts p ON p.id = r.post_id
LEFT JOIN users pu ON pu.id = p.author_id
LEFT JOIN comments c ON c.id = r.comment_id
LEFT JOIN users cu ON cu.id = c.author_id";

fn map_report(row: &Row<'_>) -> rusqlite::Result<Report> {
    let post_id: Option<i64> = row.get(11)?;
    let post = match (post_id, optional_user_summary(row, 14)?) {
        (Some(id), Some(author)) => Some(ReportedPost {
            id,
            title: row.get(12)?,
            author,
        }),
        _ => None,
    };
    let post_hidden: Option<bool> = row.get(13)?;

    let comment_id: Option<i64> = row.get(17)?;
    let comment = match (comment_id, optional_user_summary(row, 21)?) {
        (Some(id), Some(author)) => Some(ReportedComment {
            id,
            post_id: row.get(18)?,
            content: row.get(19)?,
            author,
        }),
        _ => None,
    };
    let comment_hidden: Option<bool> = row.get(20)?;

    let (content_type, hidden) = match comment_id {
        Some(_) => (ContentType::Comment, comment_hidden),
        None => (ContentType::Post, post_hidden),
    };

    Ok(Report {
        id: row.get(0)?,
        status: parse_enum(row, 1)?,
        moderator_notes: row.get(2)?,
        created_at: timestamp(row, 3)?,
        updated_at: optional_timestamp(row, 4)?,
        reporter: user_summary(row, 5)?,
        reason: ReportReason {
            id: row.get(8)?,
            label: row.get(9)?,
            description: row.get(10)?,
        },
        post,
        comment,
        content_type,
        is_content_hidden: hidden.unwrap_or(false),
    })
}

fn query_report(conn: &Connection, id: i64) -> Result<Option<Report>> {
    let sql = format!("{} WHERE r.id = ?1", REPORT_SELECT);
    conn.query_row(&sql, [id], map_report).optional()
}

fn report_filter(filters: &ReportFilters) -> Filter {
    let mut filter = Filter::new();
    if let Some(status) = filters.status {
        filter.push("r.status = ?", [Value::Text(status.as_str().to_string())]);
    }
    if let Some(reason_id) = filters.reason_id {
        filter.push("r.reason_id = ?", [Value::Integer(reason_id)]);
    }
    if let Some(post_id) = filters.post_id {
        filter.push("r.post_id = ?", [Value::Integer(post_id)]);
    }
    if let Some(comment_id) = filters.comment_id {
        filter.push("r.comment_id = ?", [Value::Integer(comment_id)]);
    }
    if let Some(from) = filters.date_from {
        filter.push("r.created_at >= ?", [Value::Text(format_timestamp(from))]);
    }
    if let Some(to) = filters.date_to {
        filter.push("r.created_at <= ?", [Value::Text(format_timestamp(to))]);
    }
    match filters.resource_type {
        Some(ContentType::Post) => filter.push("r.post_id IS NOT NULL", []),
        Some(ContentType::Comment) => filter.push("r.comment_id IS NOT NULL", []),
        None => {}
    }
    filter
}

fn target_exists(conn: &Connection, content_type: ContentType, id: i64) -> Result<bool> {
    let sql = match content_type {
        ContentType::Post => "SELECT 1 FROM posts WHERE id = ?1",
        ContentType::Comment => "SELECT 1 FROM comments WHERE id = ?1",
    };
    let found: Option<i64> = conn.query_row(sql, [id], |row| row.get(0)).optional()?;
    Ok(found.is_some())
}

impl Database {
    // -- Report reasons --

    pub fn list_report_reasons(&self) -> Result<Vec<ReportReason>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, label, description FROM report_reasons ORDER BY id")?;
            let reasons = stmt
                .query_map([], |row| {
                    Ok(ReportReason {
                        id: row.get(0)?,
                        label: row.get(1)?,
                        description: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(reasons)
        })
    }

    pub fn get_report_reason(&self, id: i64) -> Result<Option<ReportReason>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, label, description FROM report_reasons WHERE id = ?1",
                [id],
                |row| {
                    Ok(ReportReason {
                        id: row.get(0)?,
                        label: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Reports --

    /// Files a PENDING report against one post or comment. Returns `None`
    /// when the target does not exist.
    pub fn create_report(
        &self,
        reporter_id: &str,
        reason_id: i64,
        target: ContentType,
        target_id: i64,
    ) -> Result<Option<Report>> {
        self.with_conn(|conn| {
            if !target_exists(conn, target, target_id)? {
                return Ok(None);
            }
            let (post_id, comment_id) = match target {
                ContentType::Post => (Some(target_id), None),
                ContentType::Comment => (None, Some(target_id)),
            };
            conn.execute(
                "INSERT INTO reports (reporter_id, reason_id, post_id, comment_id)
                 VALUES (?1, ?2, ?3, ?4)",
                (reporter_id, reason_id, post_id, comment_id),
            )?;
            query_report(conn, conn.last_insert_rowid())
        })
    }

    pub fn get_report(&self, id: i64) -> Result<Option<Report>> {
        self.with_conn(|conn| query_report(conn, id))
    }

    /// Moderation queue, newest first, offset paginated.
    pub fn list_reports(
        &self,
        filters: &ReportFilters,
        page: u32,
        limit: u32,
    ) -> Result<OffsetPage<Report>> {
        let filter = report_filter(filters);
        let where_clause = filter.where_clause();

        self.with_conn(|conn| {
            let count_sql = format!("SELECT COUNT(*) FROM reports r{}", where_clause);
            let total: i64 =
                conn.query_row(&count_sql, params_from_iter(filter.params().iter()), |row| {
                    row.get(0)
                })?;

            let sql = format!(
                "{}{} ORDER BY r.created_at DESC, r.id DESC LIMIT ? OFFSET ?",
                REPORT_SELECT, where_clause
            );
            let mut params = filter.params().to_vec();
            params.push(Value::Integer(i64::from(limit)));
            params.push(Value::Integer(OffsetPagination::offset(page, limit) as i64));

            let mut stmt = conn.prepare(&sql)?;
            let data = stmt
                .query_map(params_from_iter(params.iter()), map_report)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(OffsetPage {
                data,
                pagination: OffsetPagination::new(total, page, limit),
            })
        })
    }

    /// Any status may follow any other. `None` notes keep the stored notes.
    pub fn update_report_status(
        &self,
        id: i64,
        status: ReportStatus,
        moderator_notes: Option<&str>,
    ) -> Result<Option<Report>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE reports
                 SET status = ?1,
                     moderator_notes = COALESCE(?2, moderator_notes),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                (status.as_str(), moderator_notes, id),
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_report(conn, id)
        })
    }

    /// Removes the report only; the reported content keeps its visibility.
    pub fn delete_report(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM reports WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    // -- Moderation --

    pub fn set_content_hidden(&self, target: ContentType, id: i64, hidden: bool) -> Result<bool> {
        match target {
            ContentType::Post => self.set_post_hidden(id, hidden),
            ContentType::Comment => self.set_comment_hidden(id, hidden),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewComment;
    use crate::queries::fixtures;
    use chrono::{Duration, Utc};

    struct Board {
        db: Database,
        post: i64,
        comment: i64,
    }

    fn board() -> Board {
        let db = Database::open_in_memory().unwrap();
        fixtures::user(&db, "alice");
        fixtures::user(&db, "bob");
        let post = fixtures::post(&db, "alice");
        let comment = db
            .create_comment(&NewComment::root(post, "bob", "rude"), None)
            .unwrap()
            .id;
        Board { db, post, comment }
    }

    #[test]
    fn seeded_reasons_are_listed_in_order() {
        let db = Database::open_in_memory().unwrap();
        let reasons = db.list_report_reasons().unwrap();
        assert_eq!(reasons.len(), 6);
        assert_eq!(reasons[0].label, "Spam");
        assert!(db.get_report_reason(99).unwrap().is_none());
    }

    #[test]
    fn report_targets_exactly_one_content_item() {
        let b = board();
        let report = b.db.create_report("bob", 1, ContentType::Post, b.post).unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Pending);
        assert_eq!(report.content_type, ContentType::Post);
        assert!(report.post.is_some() && report.comment.is_none());

        let both = b.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reports (reporter_id, reason_id, post_id, comment_id)
                 VALUES ('bob', 1, ?1, ?2)",
                (b.post, b.comment),
            )?;
            Ok(())
        });
        assert!(both.is_err());

        let neither = b.db.with_conn(|conn| {
            conn.execute("INSERT INTO reports (reporter_id, reason_id) VALUES ('bob', 1)", [])?;
            Ok(())
        });
        assert!(neither.is_err());
    }

    #[test]
    fn missing_target_yields_none() {
        let b = board();
        assert!(b.db.create_report("bob", 1, ContentType::Comment, 999).unwrap().is_none());
        assert!(b.db.create_report("bob", 1, ContentType::Post, 999).unwrap().is_none());
    }

    #[test]
    fn visibility_toggle_shows_through_enrichment() {
        let b = board();
        let report = b
            .db
            .create_report("alice", 2, ContentType::Comment, b.comment)
            .unwrap()
            .unwrap();
        assert_eq!(report.content_type, ContentType::Comment);
        assert!(!report.is_content_hidden);
        assert_eq!(report.comment.as_ref().map(|c| c.author.id.as_str()), Some("bob"));

        assert!(b.db.set_content_hidden(ContentType::Comment, b.comment, true).unwrap());
        assert!(b.db.get_report(report.id).unwrap().unwrap().is_content_hidden);

        assert!(b.db.set_content_hidden(ContentType::Comment, b.comment, false).unwrap());
        assert!(!b.db.get_report(report.id).unwrap().unwrap().is_content_hidden);

        assert!(!b.db.set_content_hidden(ContentType::Post, 999, true).unwrap());
    }

    #[test]
    fn status_updates_accept_any_transition() {
        let b = board();
        let id = b.db.create_report("bob", 1, ContentType::Post, b.post).unwrap().unwrap().id;

        let reviewed = b
            .db
            .update_report_status(id, ReportStatus::Reviewed, Some("checked"))
            .unwrap()
            .unwrap();
        assert_eq!(reviewed.status, ReportStatus::Reviewed);
        assert!(reviewed.updated_at.is_some());

        let reopened = b.db.update_report_status(id, ReportStatus::Pending, None).unwrap().unwrap();
        assert_eq!(reopened.status, ReportStatus::Pending);
        assert_eq!(reopened.moderator_notes.as_deref(), Some("checked"));

        assert!(b.db.update_report_status(999, ReportStatus::Dismissed, None).unwrap().is_none());
    }

    #[test]
    fn deleting_report_keeps_content_hidden() {
        let b = board();
        let id = b.db.create_report("bob", 1, ContentType::Post, b.post).unwrap().unwrap().id;
        b.db.set_content_hidden(ContentType::Post, b.post, true).unwrap();
        assert!(b.db.delete_report(id).unwrap());
        assert!(!b.db.delete_report(id).unwrap());
        assert!(b.db.get_post(b.post).unwrap().unwrap().hidden);
    }

    #[test]
    fn queue_filters_and_paginates() {
        let b = board();
        for _ in 0..3 {
            b.db.create_report("bob", 1, ContentType::Post, b.post).unwrap();
        }
        for _ in 0..2 {
            b.db.create_report("alice", 2, ContentType::Comment, b.comment).unwrap();
        }

        let all = b.db.list_reports(&ReportFilters::default(), 1, 2).unwrap();
        assert_eq!(all.data.len(), 2);
        assert_eq!(all.pagination.total, 5);
        assert_eq!(all.pagination.total_pages, 3);
        assert!(all.pagination.has_next);
        assert!(all.data[0].id > all.data[1].id);

        let last = b.db.list_reports(&ReportFilters::default(), 3, 2).unwrap();
        assert_eq!(last.data.len(), 1);
        assert!(!last.pagination.has_next);

        let comments = ReportFilters {
            resource_type: Some(ContentType::Comment),
            ..ReportFilters::default()
        };
        let page = b.db.list_reports(&comments, 1, 20).unwrap();
        assert_eq!(page.pagination.total, 2);
        assert!(page.data.iter().all(|r| r.content_type == ContentType::Comment));

        let future = ReportFilters {
            date_from: Some(Utc::now() + Duration::days(1)),
            ..ReportFilters::default()
        };
        assert_eq!(b.db.list_reports(&future, 1, 20).unwrap().pagination.total, 0);

        let spam = ReportFilters {
            reason_id: Some(1),
            status: Some(ReportStatus::Pending),
            ..ReportFilters::default()
        };
        assert_eq!(b.db.list_reports(&spam, 1, 20).unwrap().pagination.total, 3);
    }
}
