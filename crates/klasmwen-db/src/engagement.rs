//! Likes and bookmarks. Both are `(user_id, post_id)` join rows and are
//! listed by creation time through the compound cursor.

use anyhow::Result;
use rusqlite::Connection;
use rusqlite::types::Value;

use klasmwen_types::models::{BookmarkedPost, LikedPost};
use klasmwen_types::notifications::{NewNotification, NotificationKind};
use klasmwen_types::pagination::{CursorPage, PageOptions, UserPostKey};

use crate::keyset::{CompoundKey, Filter, KeysetQuery, SortOrder, build_compound_page};
use crate::models::timestamp;
use crate::notifications::insert_notification;
use crate::posts::{POST_COLUMNS, map_post};
use crate::{Database, OptionalExt};

const LIKE_KEY: CompoundKey<'static> = CompoundKey {
    table: "likes",
    alias: "l",
    key_columns: &["user_id", "post_id"],
    order: &[("created_at", SortOrder::Desc), ("post_id", SortOrder::Desc)],
};

const BOOKMARK_KEY: CompoundKey<'static> = CompoundKey {
    table: "bookmarks",
    alias: "b",
    key_columns: &["user_id", "post_id"],
    order: &[("created_at", SortOrder::Desc), ("post_id", SortOrder::Desc)],
};

fn post_author(conn: &Connection, post_id: i64) -> Result<Option<String>> {
    conn.query_row("SELECT author_id FROM posts WHERE id = ?1", [post_id], |row| row.get(0))
        .optional()
}

fn like_count(conn: &Connection, post_id: i64) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM likes WHERE post_id = ?1", [post_id], |row| {
        row.get(0)
    })?)
}

/// Restricts a join-table listing to one user, optionally skipping hidden posts.
fn owner_filter(alias: &str, user_id: &str, include_hidden: bool) -> Filter {
    let mut filter =
        Filter::new().and(format!("{}.user_id = ?", alias), [Value::Text(user_id.to_string())]);
    if !include_hidden {
        filter.push("p.hidden = 0", []);
    }
    filter
}

impl Database {
    // -- Likes --

    /// Likes the post if the user has not, otherwise removes the like.
    /// Returns `(liked, like_count)` or `None` when the post does not exist.
    /// A new like notifies the post author.
    pub fn toggle_like(&self, user_id: &str, post_id: i64) -> Result<Option<(bool, i64)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(author_id) = post_author(&tx, post_id)? else {
                return Ok(None);
            };

            let removed = tx.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND post_id = ?2",
                (user_id, post_id),
            )?;
            let liked = removed == 0;
            if liked {
                tx.execute(
                    "INSERT INTO likes (user_id, post_id) VALUES (?1, ?2)",
                    (user_id, post_id),
                )?;
                if let Some(n) = NewNotification::for_recipient(
                    &author_id,
                    user_id,
                    NotificationKind::Like,
                    post_id,
                    None,
                ) {
                    insert_notification(&tx, &n)?;
                }
            }

            let count = like_count(&tx, post_id)?;
            tx.commit()?;
            Ok(Some((liked, count)))
        })
    }

    /// Posts liked by `user_id`, most recently liked first.
    pub fn list_liked_posts(
        &self,
        user_id: &str,
        include_hidden: bool,
        options: &PageOptions,
    ) -> Result<CursorPage<LikedPost>> {
        let select = format!(
            "SELECT l.created_at, {} FROM likes l
             JOIN posts p ON p.id = l.post_id
             JOIN users u ON u.id = p.author_id",
            POST_COLUMNS
        );
        let query = KeysetQuery::new(select, owner_filter("l", user_id, include_hidden));

        self.with_conn(|conn| {
            build_compound_page(
                conn,
                query,
                &LIKE_KEY,
                options,
                |row| {
                    Ok(LikedPost {
                        liked_at: timestamp(row, 0)?,
                        post: map_post(row, 1)?,
                    })
                },
                |item| UserPostKey {
                    user_id: user_id.to_string(),
                    post_id: item.post.id,
                },
            )
        })
    }

    // -- Bookmarks --

    /// Returns false when the post does not exist. Bookmarking twice fails
    /// with a primary key violation.
    pub fn add_bookmark(&self, user_id: &str, post_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            if post_author(conn, post_id)?.is_none() {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO bookmarks (user_id, post_id) VALUES (?1, ?2)",
                (user_id, post_id),
            )?;
            Ok(true)
        })
    }

    pub fn remove_bookmark(&self, user_id: &str, post_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM bookmarks WHERE user_id = ?1 AND post_id = ?2",
                (user_id, post_id),
            )?;
            Ok(removed > 0)
        })
    }

    pub fn list_bookmarks(
        &self,
        user_id: &str,
        include_hidden: bool,
        options: &PageOptions,
    ) -> Result<CursorPage<BookmarkedPost>> {
        let select = format!(
            "SELECT b.created_at, {} FROM bookmarks b
             JOIN posts p ON p.id = b.post_id
             JOIN users u ON u.id = p.author_id",
            POST_COLUMNS
        );
        let query = KeysetQuery::new(select, owner_filter("b", user_id, include_hidden));

        self.with_conn(|conn| {
            build_compound_page(
                conn,
                query,
                &BOOKMARK_KEY,
                options,
                |row| {
                    Ok(BookmarkedPost {
                        bookmarked_at: timestamp(row, 0)?,
                        post: map_post(row, 1)?,
                    })
                },
                |item| UserPostKey {
                    user_id: user_id.to_string(),
                    post_id: item.post.id,
                },
            )
        })
    }
}
