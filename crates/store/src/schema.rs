//! Database schema and the statements prepared against it.
//!
//! The schema is applied on every open, so every statement here must be
//! idempotent.

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS roster_items (
    jid   TEXT PRIMARY KEY NOT NULL,
    name  TEXT NOT NULL DEFAULT '',
    subs  TEXT NOT NULL DEFAULT 'none'
);

CREATE TABLE IF NOT EXISTS roster_groups (
    jid   TEXT NOT NULL REFERENCES roster_items(jid) ON DELETE CASCADE,
    name  TEXT NOT NULL,
    PRIMARY KEY (jid, name)
);

-- A single row keyed by the constant 0.
CREATE TABLE IF NOT EXISTS roster_version (
    id    INTEGER PRIMARY KEY CHECK (id = 0),
    ver   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    sent         INTEGER NOT NULL DEFAULT 0,
    to_addr      TEXT NOT NULL,
    from_addr    TEXT NOT NULL,
    sender       TEXT NOT NULL,
    stanza_id    TEXT NOT NULL DEFAULT '',
    origin_id    TEXT,
    body         TEXT NOT NULL DEFAULT '',
    msg_type     TEXT NOT NULL DEFAULT 'normal',
    delay        INTEGER NOT NULL,
    roster_jid   TEXT NOT NULL,
    archive_id   TEXT UNIQUE,
    received     INTEGER NOT NULL DEFAULT 0,
    UNIQUE (origin_id, sender)
);
CREATE INDEX IF NOT EXISTS idx_messages_roster_delay
    ON messages(roster_jid, delay);
";

// ── Roster ───────────────────────────────────────────────────────

pub(crate) const TRUNCATE_ROSTER: &str = "DELETE FROM roster_items";

pub(crate) const DELETE_ROSTER_ITEM: &str = "DELETE FROM roster_items WHERE jid = ?1";

pub(crate) const UPSERT_ROSTER_ITEM: &str = "
INSERT INTO roster_items (jid, name, subs)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(jid) DO UPDATE SET name = excluded.name, subs = excluded.subs";

pub(crate) const CLEAR_ROSTER_GROUPS: &str = "DELETE FROM roster_groups WHERE jid = ?1";

pub(crate) const INSERT_ROSTER_GROUP: &str = "
INSERT INTO roster_groups (jid, name)
    VALUES (?1, ?2)
    ON CONFLICT DO NOTHING";

pub(crate) const UPSERT_ROSTER_VERSION: &str = "
INSERT INTO roster_version (id, ver)
    VALUES (0, ?1)
    ON CONFLICT(id) DO UPDATE SET ver = excluded.ver";

pub(crate) const SELECT_ROSTER_VERSION: &str = "SELECT ver FROM roster_version WHERE id = 0";

pub(crate) const SELECT_ROSTER: &str = "SELECT jid, name, subs FROM roster_items ORDER BY jid";

pub(crate) const SELECT_ROSTER_ITEM: &str = "SELECT jid, name, subs FROM roster_items WHERE jid = ?1";

pub(crate) const SELECT_ROSTER_GROUPS: &str =
    "SELECT name FROM roster_groups WHERE jid = ?1 ORDER BY name";

// ── Messages ─────────────────────────────────────────────────────

// First conflict target: the same message seen again (live vs. archive).
// The archive id is only backfilled onto a row that has none, and never
// to a value another row already owns. Second target: the archive id
// itself is already known. RETURNING yields no row when nothing changed.
pub(crate) const INSERT_MESSAGE: &str = "
INSERT INTO messages
    (sent, to_addr, from_addr, sender, stanza_id, origin_id, body, msg_type, delay, roster_jid, archive_id)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT (origin_id, sender) DO UPDATE SET archive_id = excluded.archive_id
        WHERE messages.archive_id IS NULL
          AND excluded.archive_id IS NOT NULL
          AND NOT EXISTS (SELECT 1 FROM messages AS m WHERE m.archive_id = excluded.archive_id)
    ON CONFLICT (archive_id) DO NOTHING
    RETURNING id";

pub(crate) const MARK_RECEIVED: &str = "
UPDATE messages SET received = 1
    WHERE id = (
        SELECT id FROM messages
            WHERE sent = 1 AND (stanza_id = ?1 OR origin_id = ?1)
            ORDER BY delay DESC, id DESC
            LIMIT 1
    )";

pub(crate) const QUERY_HISTORY: &str = "
SELECT sent, to_addr, from_addr, stanza_id, origin_id, body, msg_type, delay, archive_id, received
    FROM messages
    WHERE roster_jid = ?1
        AND msg_type = COALESCE(NULLIF(?2, ''), msg_type)
    ORDER BY delay ASC, id ASC";

// SQLite takes the bare columns of an aggregate query from the row that
// produced MAX().
pub(crate) const AFTER_ID: &str = "
SELECT r.jid, m.archive_id, MAX(m.delay)
    FROM messages AS m
        INNER JOIN roster_items AS r ON m.roster_jid = r.jid
    WHERE m.archive_id IS NOT NULL
    GROUP BY r.jid
    ORDER BY r.jid";

/// Statements executed on the writer connection.
pub(crate) const WRITE_STATEMENTS: &[&str] = &[
    TRUNCATE_ROSTER,
    DELETE_ROSTER_ITEM,
    UPSERT_ROSTER_ITEM,
    CLEAR_ROSTER_GROUPS,
    INSERT_ROSTER_GROUP,
    UPSERT_ROSTER_VERSION,
    INSERT_MESSAGE,
    MARK_RECEIVED,
];

/// Statements executed on the shared reader connection.
pub(crate) const READ_STATEMENTS: &[&str] = &[
    SELECT_ROSTER_VERSION,
    SELECT_ROSTER,
    SELECT_ROSTER_ITEM,
    SELECT_ROSTER_GROUPS,
];

/// Statements executed on pooled streaming connections.
pub(crate) const STREAM_STATEMENTS: &[&str] = &[QUERY_HISTORY, AFTER_ID];
