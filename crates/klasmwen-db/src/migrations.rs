use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL DEFAULT 'STUDENT'
                            CHECK (role IN ('ADMIN', 'MODERATOR', 'STUDENT', 'GUEST')),
                bio         TEXT,
                avatar_url  TEXT,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE posts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title       TEXT NOT NULL,
                content     TEXT NOT NULL,
                hidden      INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at  TEXT
            );

            CREATE INDEX idx_posts_author ON posts(author_id, id);

            -- Replies always point at a root comment; deep replies carry the
            -- user they answer in mentioned_user_id.
            CREATE TABLE comments (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id             INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                author_id           TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                parent_id           INTEGER REFERENCES comments(id) ON DELETE CASCADE,
                mentioned_user_id   TEXT REFERENCES users(id) ON DELETE SET NULL,
                content             TEXT NOT NULL,
                hidden              INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                CHECK (mentioned_user_id IS NULL OR parent_id IS NOT NULL)
            );

            CREATE INDEX idx_comments_post ON comments(post_id, parent_id, id);
            CREATE INDEX idx_comments_parent ON comments(parent_id, id);

            CREATE TABLE likes (
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (user_id, post_id)
            );

            CREATE INDEX idx_likes_user_created ON likes(user_id, created_at, post_id);
            CREATE INDEX idx_likes_post ON likes(post_id);

            CREATE TABLE bookmarks (
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (user_id, post_id)
            );

            CREATE INDEX idx_bookmarks_user_created ON bookmarks(user_id, created_at, post_id);

            CREATE TABLE report_reasons (
                id          INTEGER PRIMARY KEY,
                label       TEXT NOT NULL UNIQUE,
                description TEXT
            );

            CREATE TABLE reports (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                reporter_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                reason_id       INTEGER NOT NULL REFERENCES report_reasons(id),
                post_id         INTEGER REFERENCES posts(id) ON DELETE CASCADE,
                comment_id      INTEGER REFERENCES comments(id) ON DELETE CASCADE,
                status          TEXT NOT NULL DEFAULT 'PENDING'
                                CHECK (status IN ('PENDING', 'REVIEWED', 'DISMISSED')),
                moderator_notes TEXT,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at      TEXT,
                CHECK ((post_id IS NULL) <> (comment_id IS NULL))
            );

            CREATE INDEX idx_reports_created ON reports(created_at, id);
            CREATE INDEX idx_reports_status ON reports(status, created_at);

            CREATE TABLE notifications (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                actor_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                kind            TEXT NOT NULL CHECK (kind IN ('LIKE', 'COMMENT', 'REPLY')),
                post_id         INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                comment_id      INTEGER REFERENCES comments(id) ON DELETE CASCADE,
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_notifications_recipient ON notifications(recipient_id, id);

            -- Seed the report reasons offered to users
            INSERT INTO report_reasons (id, label, description) VALUES
                (1, 'Spam', 'Advertising, scams or repeated off-topic content'),
                (2, 'Harassment', 'Bullying, threats or targeted abuse'),
                (3, 'Inappropriate content', 'Explicit, violent or otherwise unsuitable material'),
                (4, 'Misinformation', 'Deliberately false or misleading information'),
                (5, 'Academic dishonesty', 'Sharing exam answers or plagiarised work'),
                (6, 'Other', NULL);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
