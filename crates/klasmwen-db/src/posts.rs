use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, Row};

use klasmwen_types::models::Post;
use klasmwen_types::pagination::{CursorPage, PageOptions};

use crate::keyset::{Filter, KeysetQuery, SortOrder, build_page};
use crate::models::{optional_timestamp, timestamp, user_summary};
use crate::{Database, OptionalExt};

/// Post columns in [`map_post`] order; needs `posts p` joined to `users u`.
/// `comment_count` counts publicly visible comments: replies under a hidden
/// root are left out with it.
pub(crate) const POST_COLUMNS: &str = "p.id, p.title, p.content, p.hidden, p.created_at, p.updated_at,
       u.id, u.username, u.avatar_url,
       (SELECT COUNT(*) FROM likes lc WHERE lc.post_id = p.id),
       (SELECT COUNT(*) FROM comments cc LEFT JOIN comments cr ON cr.id = cc.parent_id
        WHERE cc.post_id = p.id AND cc.hidden = 0 AND COALESCE(cr.hidden, 0) = 0)";

pub(crate) const POST_FROM: &str = "posts p JOIN users u ON u.id = p.author_id";

/// Reads a post starting at column `idx` (see [`POST_COLUMNS`]).
pub(crate) fn map_post(row: &Row<'_>, idx: usize) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(idx)?,
        title: row.get(idx + 1)?,
        content: row.get(idx + 2)?,
        hidden: row.get(idx + 3)?,
        created_at: timestamp(row, idx + 4)?,
        updated_at: optional_timestamp(row, idx + 5)?,
        author: user_summary(row, idx + 6)?,
        like_count: row.get(idx + 9)?,
        comment_count: row.get(idx + 10)?,
    })
}

pub(crate) fn query_post(conn: &Connection, id: i64) -> Result<Option<Post>> {
    let sql = format!("SELECT {} FROM {} WHERE p.id = ?1", POST_COLUMNS, POST_FROM);
    conn.query_row(&sql, [id], |row| map_post(row, 0)).optional()
}

impl Database {
    // -- Posts --

    pub fn create_post(&self, author_id: &str, title: &str, content: &str) -> Result<Post> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (author_id, title, content) VALUES (?1, ?2, ?3)",
                (author_id, title, content),
            )?;
            let id = conn.last_insert_rowid();
            query_post(conn, id)?.ok_or_else(|| anyhow::anyhow!("Post {} vanished after insert", id))
        })
    }

    pub fn get_post(&self, id: i64) -> Result<Option<Post>> {
        self.with_conn(|conn| query_post(conn, id))
    }

    /// Newest-first feed, optionally restricted to one author. Hidden posts
    /// are skipped unless `include_hidden`.
    pub fn list_posts(
        &self,
        author_id: Option<&str>,
        include_hidden: bool,
        options: &PageOptions,
    ) -> Result<CursorPage<Post>> {
        let mut filter = Filter::new();
        if let Some(author_id) = author_id {
            filter.push("p.author_id = ?", [Value::Text(author_id.to_string())]);
        }
        if !include_hidden {
            filter.push("p.hidden = 0", []);
        }
        let query = KeysetQuery::new(format!("SELECT {} FROM {}", POST_COLUMNS, POST_FROM), filter);

        self.with_conn(|conn| {
            build_page(
                conn,
                query,
                "p.id",
                SortOrder::Desc,
                options,
                |row| map_post(row, 0),
                |post| post.id,
            )
        })
    }

    /// Applies the provided fields and stamps `updated_at`. Returns `None` if
    /// the post does not exist.
    pub fn update_post(
        &self,
        id: i64,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<Option<Post>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE posts
                 SET title = COALESCE(?1, title),
                     content = COALESCE(?2, content),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                (title, content, id),
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_post(conn, id)
        })
    }

    /// Deletes a post together with its comments, likes, bookmarks, reports
    /// and notifications (foreign-key cascades).
    pub fn delete_post(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    pub fn set_post_hidden(&self, id: i64, hidden: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE posts SET hidden = ?1 WHERE id = ?2", (hidden, id))?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    #[test]
    fn created_post_carries_author_and_counts() {
        let db = Database::open_in_memory().unwrap();
        fixtures::user(&db, "alice");
        let post = db.create_post("alice", "Exam tips", "Sleep well").unwrap();
        assert_eq!(post.author.username, "alice");
        assert_eq!(post.like_count, 0);
        assert_eq!(post.comment_count, 0);
        assert!(!post.hidden);
        assert!(post.updated_at.is_none());
    }

    #[test]
    fn feed_is_newest_first_and_skips_hidden() {
        let db = Database::open_in_memory().unwrap();
        fixtures::user(&db, "alice");
        let ids: Vec<i64> = (0..5).map(|_| fixtures::post(&db, "alice")).collect();
        db.set_post_hidden(ids[2], true).unwrap();

        let page = db.list_posts(None, false, &PageOptions::first(10)).unwrap();
        let seen: Vec<i64> = page.data.iter().map(|p| p.id).collect();
        assert_eq!(seen, vec![ids[4], ids[3], ids[1], ids[0]]);

        let all = db.list_posts(None, true, &PageOptions::first(10)).unwrap();
        assert_eq!(all.data.len(), 5);
    }

    #[test]
    fn feed_pages_through_author_posts() {
        let db = Database::open_in_memory().unwrap();
        fixtures::user(&db, "alice");
        fixtures::user(&db, "bob");
        for i in 0..7 {
            fixtures::post(&db, if i % 2 == 0 { "alice" } else { "bob" });
        }

        let first = db.list_posts(Some("alice"), false, &PageOptions::first(3)).unwrap();
        assert_eq!(first.data.len(), 3);
        assert!(first.pagination.has_more);

        let next = PageOptions::new(3, first.pagination.next_cursor.clone());
        let second = db.list_posts(Some("alice"), false, &next).unwrap();
        assert_eq!(second.data.len(), 1);
        assert!(!second.pagination.has_more);
        assert!(second.data.iter().all(|p| p.author.id == "alice"));
    }

    #[test]
    fn update_touches_only_given_fields() {
        let db = Database::open_in_memory().unwrap();
        fixtures::user(&db, "alice");
        let id = fixtures::post(&db, "alice");
        let post = db.update_post(id, None, Some("edited")).unwrap().unwrap();
        assert_eq!(post.title, "title");
        assert_eq!(post.content, "edited");
        assert!(post.updated_at.is_some());
        assert!(db.update_post(999, Some("x"), None).unwrap().is_none());
    }

    #[test]
    fn delete_cascades_to_comments() {
        let db = Database::open_in_memory().unwrap();
        fixtures::user(&db, "alice");
        let id = fixtures::post(&db, "alice");
        db.create_comment(&crate::models::NewComment::root(id, "alice", "hi"), None)
            .unwrap();
        assert!(db.delete_post(id).unwrap());
        assert!(db.get_post(id).unwrap().is_none());
        let remaining: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM comments", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(remaining, 0);
        assert!(!db.delete_post(id).unwrap());
    }
}
