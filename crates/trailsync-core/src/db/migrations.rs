//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
pub async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Run `statements` in one transaction, rolling back on the first failure.
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            libsql::params![version],
        )
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: resource tables
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        "CREATE TABLE IF NOT EXISTS collections (
            id TEXT NOT NULL,
            owner TEXT NOT NULL,
            version INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            name TEXT NOT NULL,
            collection_type TEXT NOT NULL,
            PRIMARY KEY (id, owner)
        )",
        // One default collection per account
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_collections_my_trails
            ON collections(owner) WHERE collection_type = 'MY_TRAILS'",
        "CREATE TABLE IF NOT EXISTS trails (
            id TEXT NOT NULL,
            owner TEXT NOT NULL,
            version INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            date INTEGER,
            loop_type TEXT,
            activity TEXT,
            collection_uuid TEXT NOT NULL,
            original_track_uuid TEXT NOT NULL,
            current_track_uuid TEXT NOT NULL,
            PRIMARY KEY (id, owner)
        )",
        "CREATE INDEX IF NOT EXISTS idx_trails_collection ON trails(owner, collection_uuid)",
        "CREATE TABLE IF NOT EXISTS tracks (
            id TEXT NOT NULL,
            owner TEXT NOT NULL,
            version INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            data BLOB NOT NULL,
            PRIMARY KEY (id, owner)
        )",
        "CREATE TABLE IF NOT EXISTS tags (
            id TEXT NOT NULL,
            owner TEXT NOT NULL,
            version INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            name TEXT NOT NULL,
            parent_uuid TEXT,
            collection_uuid TEXT NOT NULL,
            PRIMARY KEY (id, owner)
        )",
        "CREATE INDEX IF NOT EXISTS idx_tags_collection ON tags(owner, collection_uuid)",
        "CREATE TABLE IF NOT EXISTS trail_tags (
            tag_uuid TEXT NOT NULL,
            trail_uuid TEXT NOT NULL,
            owner TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (tag_uuid, trail_uuid, owner)
        )",
        "CREATE INDEX IF NOT EXISTS idx_trail_tags_trail ON trail_tags(owner, trail_uuid)",
        "CREATE TABLE IF NOT EXISTS photos (
            id TEXT NOT NULL,
            owner TEXT NOT NULL,
            version INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            trail_uuid TEXT NOT NULL,
            file_id TEXT NOT NULL,
            size INTEGER NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            date_taken INTEGER,
            latitude REAL,
            longitude REAL,
            is_cover INTEGER NOT NULL DEFAULT 0,
            position INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (id, owner)
        )",
        "CREATE INDEX IF NOT EXISTS idx_photos_trail ON photos(owner, trail_uuid)",
        "CREATE TABLE IF NOT EXISTS shares (
            id TEXT NOT NULL,
            owner TEXT NOT NULL,
            version INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            name TEXT NOT NULL,
            element_type TEXT NOT NULL,
            elements TEXT NOT NULL,
            recipients TEXT NOT NULL,
            include_photos INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (id, owner)
        )",
    ];
    apply(conn, 1, &statements).await
}

/// Migration to version 2: quota ledger
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS quotas (
            owner TEXT NOT NULL,
            kind TEXT NOT NULL,
            used INTEGER NOT NULL DEFAULT 0,
            max INTEGER NOT NULL,
            PRIMARY KEY (owner, kind)
        )",
    ];
    apply(conn, CURRENT_VERSION, &statements).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = ?1
                )",
                libsql::params![name],
            )
            .await
            .unwrap();

        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_creates_every_table() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in [
            "collections",
            "trails",
            "tracks",
            "tags",
            "trail_tags",
            "photos",
            "shares",
            "quotas",
        ] {
            assert!(table_exists(&conn, table).await, "missing table {table}");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_single_default_collection_per_owner() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let insert = "INSERT INTO collections
            (id, owner, version, created_at, updated_at, name, collection_type)
            VALUES (?1, 'a@b.c', 1, 0, 0, 'My Trails', 'MY_TRAILS')";
        conn.execute(insert, libsql::params!["one"]).await.unwrap();
        let second = conn.execute(insert, libsql::params!["two"]).await;
        assert!(second.is_err());
    }
}
