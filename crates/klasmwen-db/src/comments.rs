use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, Row};

use klasmwen_types::models::Comment;
use klasmwen_types::notifications::{NewNotification, NotificationKind};
use klasmwen_types::pagination::{CursorPage, PageOptions};

use crate::keyset::{Filter, KeysetQuery, SortOrder, build_page};
use crate::models::{NewComment, optional_user_summary, timestamp, user_summary};
use crate::notifications::insert_notification;
use crate::{Database, OptionalExt};

/// `reply_count` counts publicly visible replies only.
const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.parent_id, c.content, c.hidden, c.created_at,
       a.id, a.username, a.avatar_url,
       m.id, m.username, m.avatar_url,
       (SELECT COUNT(*) FROM comments r WHERE r.parent_id = c.id AND r.hidden = 0)
FROM comments c
JOIN users a ON a.id = c.author_id
LEFT JOIN users m ON m.id = c.mentioned_user_id";

fn map_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        parent_id: row.get(2)?,
        content: row.get(3)?,
        hidden: row.get(4)?,
        created_at: timestamp(row, 5)?,
        author: user_summary(row, 6)?,
        mentioned_user: optional_user_summary(row, 9)?,
        reply_count: row.get(12)?,
    })
}

fn query_comment(conn: &Connection, id: i64) -> Result<Option<Comment>> {
    let sql = format!("{} WHERE c.id = ?1", COMMENT_SELECT);
    conn.query_row(&sql, [id], map_comment).optional()
}

impl Database {
    // -- Comments --

    pub fn get_comment(&self, id: i64) -> Result<Option<Comment>> {
        self.with_conn(|conn| query_comment(conn, id))
    }

    /// Inserts a comment whose thread linkage is already resolved and, in the
    /// same transaction, notifies `recipient_id` (a COMMENT notification for
    /// root comments, REPLY for replies). Self-notifications are skipped.
    pub fn create_comment(&self, new: &NewComment, recipient_id: Option<&str>) -> Result<Comment> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO comments (post_id, author_id, parent_id, mentioned_user_id, content)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    new.post_id,
                    new.author_id,
                    new.parent_id,
                    new.mentioned_user_id,
                    new.content
                ],
            )?;
            let id = tx.last_insert_rowid();

            let kind = if new.parent_id.is_some() {
                NotificationKind::Reply
            } else {
                NotificationKind::Comment
            };
            if let Some(notification) = recipient_id.and_then(|recipient| {
                NewNotification::for_recipient(recipient, &new.author_id, kind, new.post_id, Some(id))
            }) {
                insert_notification(&tx, &notification)?;
            }

            let comment = query_comment(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Comment {} vanished after insert", id))?;
            tx.commit()?;
            Ok(comment)
        })
    }

    /// Root comments of a post, newest first. `total_items` counts every
    /// visible comment on the post, replies included; without
    /// `include_hidden`, replies under a hidden root are not visible.
    pub fn list_root_comments(
        &self,
        post_id: i64,
        include_hidden: bool,
        options: &PageOptions,
    ) -> Result<CursorPage<Comment>> {
        let mut filter = Filter::new()
            .and("c.post_id = ?", [Value::Integer(post_id)])
            .and("c.parent_id IS NULL", []);
        if !include_hidden {
            filter.push("c.hidden = 0", []);
        }
        let query = KeysetQuery::new(COMMENT_SELECT, filter);

        self.with_conn(|conn| {
            let page = build_page(
                conn,
                query,
                "c.id",
                SortOrder::Desc,
                options,
                map_comment,
                |comment| comment.id,
            )?;
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM comments c
                 LEFT JOIN comments r ON r.id = c.parent_id
                 WHERE c.post_id = ?1 AND (?2 OR (c.hidden = 0 AND COALESCE(r.hidden, 0) = 0))",
                (post_id, include_hidden),
                |row| row.get(0),
            )?;
            Ok(page.with_total(total))
        })
    }

    /// First-level and deep replies of a root comment in one chronological
    /// list; deep replies carry `mentioned_user`.
    pub fn list_replies(
        &self,
        parent_id: i64,
        include_hidden: bool,
        options: &PageOptions,
    ) -> Result<CursorPage<Comment>> {
        let mut filter = Filter::new().and("c.parent_id = ?", [Value::Integer(parent_id)]);
        if !include_hidden {
            filter.push("c.hidden = 0", []);
        }
        let query = KeysetQuery::new(COMMENT_SELECT, filter);

        self.with_conn(|conn| {
            build_page(
                conn,
                query,
                "c.id",
                SortOrder::Asc,
                options,
                map_comment,
                |comment| comment.id,
            )
        })
    }

    /// Deleting a root comment also deletes its replies (cascade on
    /// `parent_id`).
    pub fn delete_comment(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    pub fn set_comment_hidden(&self, id: i64, hidden: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed =
                conn.execute("UPDATE comments SET hidden = ?1 WHERE id = ?2", (hidden, id))?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    struct Thread {
        db: Database,
        post: i64,
    }

    fn thread() -> Thread {
        let db = Database::open_in_memory().unwrap();
        for name in ["alice", "bob", "carol"] {
            fixtures::user(&db, name);
        }
        let post = fixtures::post(&db, "alice");
        Thread { db, post }
    }

    impl Thread {
        fn root(&self, author: &str) -> Comment {
            self.db
                .create_comment(&NewComment::root(self.post, author, "root"), Some("alice"))
                .unwrap()
        }

        fn reply(&self, parent: &Comment, author: &str) -> Comment {
            self.db
                .create_comment(
                    &NewComment::reply_to(parent, author, "reply"),
                    Some(&parent.author.id),
                )
                .unwrap()
        }
    }

    #[test]
    fn deep_reply_is_stored_under_root_with_mention() {
        let t = thread();
        let root = t.root("alice");
        let first = t.reply(&root, "bob");
        let deep = t.reply(&first, "carol");

        assert_eq!(first.parent_id, Some(root.id));
        assert!(first.mentioned_user.is_none());
        assert_eq!(deep.parent_id, Some(root.id));
        assert_eq!(deep.mentioned_user.as_ref().map(|u| u.id.as_str()), Some("bob"));
    }

    #[test]
    fn threading_invariant_holds_for_every_row() {
        let t = thread();
        let root = t.root("alice");
        let a = t.reply(&root, "bob");
        let b = t.reply(&a, "carol");
        t.reply(&b, "alice");

        let violations: i64 = t
            .db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM comments c
                     LEFT JOIN comments p ON p.id = c.parent_id
                     WHERE (c.parent_id IS NOT NULL AND (p.id IS NULL OR p.parent_id IS NOT NULL))
                        OR (c.mentioned_user_id IS NOT NULL AND c.parent_id IS NULL)",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(violations, 0);
    }

    #[test]
    fn root_listing_counts_replies_and_totals() {
        let t = thread();
        let older = t.root("bob");
        let newer = t.root("carol");
        t.reply(&older, "alice");
        t.reply(&older, "carol");

        let page = t.db.list_root_comments(t.post, false, &PageOptions::first(10)).unwrap();
        let ids: Vec<i64> = page.data.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
        assert_eq!(page.data[1].reply_count, 2);
        assert_eq!(page.pagination.total_items, Some(4));
    }

    #[test]
    fn replies_are_oldest_first_and_paginate() {
        let t = thread();
        let root = t.root("alice");
        let mut expected = Vec::new();
        let mut last = t.reply(&root, "bob");
        expected.push(last.id);
        for author in ["carol", "bob", "alice", "carol"] {
            last = t.reply(&last, author);
            expected.push(last.id);
        }

        let mut seen = Vec::new();
        let mut options = PageOptions::first(2);
        loop {
            let page = t.db.list_replies(root.id, false, &options).unwrap();
            seen.extend(page.data.iter().map(|c| c.id));
            match page.pagination.next_cursor {
                Some(next) => options.cursor = Some(next),
                None => break,
            }
        }
        assert_eq!(seen, expected);
    }

    #[test]
    fn hidden_comments_are_filtered_for_regular_viewers() {
        let t = thread();
        let visible = t.root("bob");
        let hidden = t.root("carol");
        assert!(t.db.set_comment_hidden(hidden.id, true).unwrap());

        let page = t.db.list_root_comments(t.post, false, &PageOptions::first(10)).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, visible.id);
        assert_eq!(page.pagination.total_items, Some(1));

        let moderated = t.db.list_root_comments(t.post, true, &PageOptions::first(10)).unwrap();
        assert_eq!(moderated.data.len(), 2);
    }

    #[test]
    fn counts_skip_hidden_comments_and_hidden_threads() {
        let t = thread();
        let open = t.root("bob");
        t.reply(&open, "carol");
        let hidden_reply = t.reply(&open, "alice");
        let closed = t.root("carol");
        t.reply(&closed, "bob");
        assert!(t.db.set_comment_hidden(hidden_reply.id, true).unwrap());
        assert!(t.db.set_comment_hidden(closed.id, true).unwrap());

        let page = t.db.list_root_comments(t.post, false, &PageOptions::first(10)).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].reply_count, 1);
        assert_eq!(page.pagination.total_items, Some(2));

        let moderated = t.db.list_root_comments(t.post, true, &PageOptions::first(10)).unwrap();
        assert_eq!(moderated.pagination.total_items, Some(5));

        assert_eq!(t.db.get_post(t.post).unwrap().unwrap().comment_count, 2);
    }

    #[test]
    fn deleting_root_removes_its_replies() {
        let t = thread();
        let root = t.root("bob");
        let reply = t.reply(&root, "carol");
        assert!(t.db.delete_comment(root.id).unwrap());
        assert!(t.db.get_comment(reply.id).unwrap().is_none());
    }

    #[test]
    fn comments_notify_post_and_parent_authors() {
        let t = thread();
        let root = t.root("bob");
        t.reply(&root, "carol");
        t.root("alice");

        let alice = t.db.list_notifications("alice", &PageOptions::first(10)).unwrap();
        assert_eq!(alice.data.len(), 1);
        assert_eq!(alice.data[0].kind, NotificationKind::Comment);

        let bob = t.db.list_notifications("bob", &PageOptions::first(10)).unwrap();
        assert_eq!(bob.data.len(), 1);
        assert_eq!(bob.data[0].kind, NotificationKind::Reply);
        assert_eq!(bob.data[0].actor.id, "carol");
    }
}
