//! SQLite-backed store via libsql. Implements the repository ports and `TxManager`.
//!
//! One database file (reviewers.db) in the configured data directory. Transactions run on a
//! dedicated connection opened with `BEGIN IMMEDIATE`, so the write lock is taken up front and
//! two read-modify-write units on the same pull request cannot interleave. Timestamps are
//! stored as Unix milliseconds.

use crate::domain::{
    DomainError, PullRequest, PullRequestId, PullRequestStatus, Team, TeamMember, TeamName,
    TeamStats, User, UserId,
};
use crate::ports::{
    PullRequestRepository, Scope, TeamRepository, Transaction, TxManager, UserRepository,
};
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Row, params};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS teams (
    name TEXT PRIMARY KEY
);
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    team_name TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_users_team ON users (team_name);
CREATE TABLE IF NOT EXISTS pull_requests (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    author_id TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('OPEN', 'MERGED')),
    created_at INTEGER NOT NULL,
    merged_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_pull_requests_author ON pull_requests (author_id);
CREATE TABLE IF NOT EXISTS pull_request_reviewers (
    pull_request_id TEXT NOT NULL REFERENCES pull_requests (id) ON DELETE CASCADE,
    reviewer_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (pull_request_id, reviewer_id)
);
CREATE INDEX IF NOT EXISTS idx_reviewers_reviewer ON pull_request_reviewers (reviewer_id);
"#;

const STATS_QUERY: &str = r#"
WITH team_users AS (
    SELECT id, is_active FROM users WHERE team_name = ?1
),
team_prs AS (
    SELECT pr.status, pr.created_at, pr.merged_at
    FROM pull_requests pr
    JOIN team_users tu ON tu.id = pr.author_id
)
SELECT
    (SELECT COUNT(*) FROM team_users),
    (SELECT COUNT(*) FROM team_users WHERE is_active = 1),
    (SELECT COUNT(*) FROM team_prs),
    (SELECT COUNT(*) FROM team_prs WHERE status = 'OPEN'),
    (SELECT COUNT(*) FROM team_prs WHERE status = 'MERGED'),
    CAST(COALESCE(
        (SELECT AVG((merged_at - created_at) / 1000.0) FROM team_prs WHERE status = 'MERGED'),
        0
    ) AS INTEGER)
"#;

const PR_COLUMNS: &str = "id, name, author_id, status, created_at, merged_at";

const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

fn storage(e: libsql::Error) -> DomainError {
    DomainError::Storage(e.to_string())
}

fn is_unique_violation(e: &libsql::Error) -> bool {
    match e {
        libsql::Error::SqliteFailure(code, _)
            if *code == SQLITE_CONSTRAINT_UNIQUE || *code == SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            true
        }
        other => other.to_string().contains("UNIQUE constraint failed"),
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, DomainError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DomainError::Storage(format!("timestamp out of range: {}", ms)))
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or_default()
}

/// PRAGMAs that report a value must be run as queries and drained.
async fn run_pragma(conn: &Connection, pragma: &str) -> Result<(), DomainError> {
    let mut rows = conn
        .query(pragma, ())
        .await
        .map_err(|e| DomainError::Storage(format!("{} failed: {}", pragma, e)))?;
    while rows.next().await.map_err(storage)?.is_some() {}
    Ok(())
}

/// Transaction on a dedicated connection. Dropping it unfinished closes the connection,
/// which rolls the transaction back.
struct SqliteTx {
    owner: Arc<Database>,
    conn: Mutex<Option<Connection>>,
}

impl SqliteTx {
    async fn connection(&self) -> Result<Connection, DomainError> {
        self.conn
            .lock()
            .await
            .clone()
            .ok_or_else(|| DomainError::Storage("transaction already finished".into()))
    }

    async fn finish(&self, statement: &str) -> Result<(), DomainError> {
        let conn = self
            .conn
            .lock()
            .await
            .take()
            .ok_or_else(|| DomainError::Storage("transaction already finished".into()))?;
        conn.execute(statement, ()).await.map_err(storage)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transaction for SqliteTx {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn commit(&self) -> Result<(), DomainError> {
        self.finish("COMMIT").await
    }

    async fn rollback(&self) -> Result<(), DomainError> {
        self.finish("ROLLBACK").await
    }
}

/// SQLite store. Safe to share via Arc; each detached call opens its own connection.
pub struct SqliteStore {
    db: Arc<Database>,
    db_path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Connect to (or create) `reviewers.db` under `base_dir` and ensure the schema exists.
    /// Call this once at startup.
    pub async fn connect(
        base_dir: impl AsRef<Path>,
        busy_timeout: Duration,
    ) -> Result<Self, DomainError> {
        let base = base_dir.as_ref();
        std::fs::create_dir_all(base).map_err(|e| DomainError::Storage(e.to_string()))?;
        let db_path = base.join("reviewers.db");
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(storage)?;

        let store = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout,
        };
        let conn = store.open().await?;
        // WAL lets detached readers proceed while a transaction holds the write lock.
        run_pragma(&conn, "PRAGMA journal_mode=WAL").await?;
        run_pragma(&conn, "PRAGMA synchronous=NORMAL").await?;
        conn.execute_batch(SCHEMA).await.map_err(storage)?;

        info!(path = %store.db_path.display(), "SQLite connected with WAL mode");
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn open(&self) -> Result<Connection, DomainError> {
        let conn = self.db.connect().map_err(storage)?;
        let pragma = format!("PRAGMA busy_timeout = {}", self.busy_timeout.as_millis());
        run_pragma(&conn, &pragma).await?;
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(storage)?;
        Ok(conn)
    }

    /// Connection for `scope`: a fresh auto-commit connection, or the transaction's own.
    async fn conn(&self, scope: &Scope) -> Result<Connection, DomainError> {
        match scope {
            Scope::Detached => self.open().await,
            Scope::Tx(tx) => {
                tx.as_any()
                    .downcast_ref::<SqliteTx>()
                    .filter(|tx| Arc::ptr_eq(&tx.owner, &self.db))
                    .ok_or_else(|| {
                        DomainError::Storage("transaction belongs to another store".into())
                    })?
                    .connection()
                    .await
            }
        }
    }

    async fn load_team(conn: &Connection, name: &TeamName) -> Result<Team, DomainError> {
        let mut rows = conn
            .query("SELECT name FROM teams WHERE name = ?1", params![name.as_str()])
            .await
            .map_err(storage)?;
        if rows.next().await.map_err(storage)?.is_none() {
            return Err(DomainError::TeamNotFound(name.clone()));
        }

        let mut rows = conn
            .query(
                "SELECT id, username, is_active FROM users WHERE team_name = ?1 ORDER BY id",
                params![name.as_str()],
            )
            .await
            .map_err(storage)?;
        let mut members = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage)? {
            members.push(TeamMember {
                id: UserId::new(row.get::<String>(0).map_err(storage)?),
                username: row.get::<String>(1).map_err(storage)?,
                is_active: row.get::<i64>(2).map_err(storage)? != 0,
            });
        }

        Ok(Team {
            name: name.clone(),
            members,
        })
    }

    fn read_pull_request(row: &Row) -> Result<PullRequest, DomainError> {
        let status: String = row.get(3).map_err(storage)?;
        let status = PullRequestStatus::parse(&status)
            .ok_or_else(|| DomainError::Storage(format!("unknown status: {}", status)))?;
        let merged_at = row
            .get::<Option<i64>>(5)
            .map_err(storage)?
            .map(from_millis)
            .transpose()?;
        Ok(PullRequest {
            id: PullRequestId::new(row.get::<String>(0).map_err(storage)?),
            name: row.get::<String>(1).map_err(storage)?,
            author_id: UserId::new(row.get::<String>(2).map_err(storage)?),
            status,
            assigned_reviewers: Vec::new(),
            created_at: from_millis(row.get::<i64>(4).map_err(storage)?)?,
            merged_at,
        })
    }

    async fn load_reviewers(
        conn: &Connection,
        id: &PullRequestId,
    ) -> Result<Vec<UserId>, DomainError> {
        let mut rows = conn
            .query(
                "SELECT reviewer_id FROM pull_request_reviewers \
                 WHERE pull_request_id = ?1 ORDER BY position",
                params![id.as_str()],
            )
            .await
            .map_err(storage)?;
        let mut reviewers = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage)? {
            reviewers.push(UserId::new(row.get::<String>(0).map_err(storage)?));
        }
        Ok(reviewers)
    }

    async fn replace_reviewers(
        conn: &Connection,
        id: &PullRequestId,
        reviewers: &[UserId],
    ) -> Result<(), DomainError> {
        conn.execute(
            "DELETE FROM pull_request_reviewers WHERE pull_request_id = ?1",
            params![id.as_str()],
        )
        .await
        .map_err(storage)?;
        for (position, reviewer) in reviewers.iter().enumerate() {
            conn.execute(
                "INSERT INTO pull_request_reviewers (pull_request_id, reviewer_id, position) \
                 VALUES (?1, ?2, ?3)",
                params![id.as_str(), reviewer.as_str(), position as i64],
            )
            .await
            .map_err(storage)?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TxManager for SqliteStore {
    async fn begin(&self) -> Result<Arc<dyn Transaction>, DomainError> {
        let conn = self.open().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(storage)?;
        debug!("transaction started");
        Ok(Arc::new(SqliteTx {
            owner: Arc::clone(&self.db),
            conn: Mutex::new(Some(conn)),
        }))
    }
}

#[async_trait::async_trait]
impl TeamRepository for SqliteStore {
    async fn create(&self, scope: &Scope, name: &TeamName) -> Result<(), DomainError> {
        let conn = self.conn(scope).await?;
        conn.execute(
            "INSERT INTO teams (name) VALUES (?1)",
            params![name.as_str()],
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::TeamAlreadyExists(name.clone())
            } else {
                storage(e)
            }
        })?;
        Ok(())
    }

    async fn get_by_name(&self, scope: &Scope, name: &TeamName) -> Result<Team, DomainError> {
        let conn = self.conn(scope).await?;
        Self::load_team(&conn, name).await
    }

    async fn get_by_user_id(&self, scope: &Scope, user_id: &UserId) -> Result<Team, DomainError> {
        let conn = self.conn(scope).await?;
        let mut rows = conn
            .query(
                "SELECT team_name FROM users WHERE id = ?1",
                params![user_id.as_str()],
            )
            .await
            .map_err(storage)?;
        let Some(row) = rows.next().await.map_err(storage)? else {
            return Err(DomainError::UserNotFound(user_id.clone()));
        };
        let team_name = TeamName::new(row.get::<String>(0).map_err(storage)?);
        Self::load_team(&conn, &team_name).await
    }

    async fn get_stats(&self, scope: &Scope, name: &TeamName) -> Result<TeamStats, DomainError> {
        let conn = self.conn(scope).await?;
        let mut rows = conn
            .query("SELECT 1 FROM teams WHERE name = ?1", params![name.as_str()])
            .await
            .map_err(storage)?;
        if rows.next().await.map_err(storage)?.is_none() {
            return Err(DomainError::TeamNotFound(name.clone()));
        }

        let mut rows = conn
            .query(STATS_QUERY, params![name.as_str()])
            .await
            .map_err(storage)?;
        let row = rows
            .next()
            .await
            .map_err(storage)?
            .ok_or_else(|| DomainError::Storage("stats query returned no rows".into()))?;
        Ok(TeamStats {
            team_name: name.clone(),
            members_count: to_count(row.get(0).map_err(storage)?),
            active_members_count: to_count(row.get(1).map_err(storage)?),
            total_pull_requests: to_count(row.get(2).map_err(storage)?),
            open_pull_requests: to_count(row.get(3).map_err(storage)?),
            merged_pull_requests: to_count(row.get(4).map_err(storage)?),
            avg_time_to_merge_secs: row.get::<i64>(5).map_err(storage)?,
        })
    }
}

#[async_trait::async_trait]
impl UserRepository for SqliteStore {
    async fn upsert_batch(&self, scope: &Scope, users: &[User]) -> Result<(), DomainError> {
        if users.is_empty() {
            return Ok(());
        }
        let conn = self.conn(scope).await?;
        for u in users {
            conn.execute(
                r#"
                INSERT INTO users (id, username, team_name, is_active)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT (id) DO UPDATE SET
                    username = excluded.username,
                    team_name = excluded.team_name,
                    is_active = excluded.is_active
                "#,
                params![
                    u.id.as_str(),
                    u.username.as_str(),
                    u.team_name.as_str(),
                    i64::from(u.is_active)
                ],
            )
            .await
            .map_err(storage)?;
        }
        Ok(())
    }

    async fn get_by_id(&self, scope: &Scope, id: &UserId) -> Result<User, DomainError> {
        let conn = self.conn(scope).await?;
        let mut rows = conn
            .query(
                "SELECT id, username, team_name, is_active FROM users WHERE id = ?1",
                params![id.as_str()],
            )
            .await
            .map_err(storage)?;
        let Some(row) = rows.next().await.map_err(storage)? else {
            return Err(DomainError::UserNotFound(id.clone()));
        };
        Ok(User {
            id: UserId::new(row.get::<String>(0).map_err(storage)?),
            username: row.get::<String>(1).map_err(storage)?,
            team_name: TeamName::new(row.get::<String>(2).map_err(storage)?),
            is_active: row.get::<i64>(3).map_err(storage)? != 0,
        })
    }

    async fn update(&self, scope: &Scope, user: &User) -> Result<(), DomainError> {
        let conn = self.conn(scope).await?;
        let affected = conn
            .execute(
                "UPDATE users SET username = ?2, team_name = ?3, is_active = ?4 WHERE id = ?1",
                params![
                    user.id.as_str(),
                    user.username.as_str(),
                    user.team_name.as_str(),
                    i64::from(user.is_active)
                ],
            )
            .await
            .map_err(storage)?;
        if affected == 0 {
            return Err(DomainError::UserNotFound(user.id.clone()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PullRequestRepository for SqliteStore {
    async fn create(&self, scope: &Scope, pr: &PullRequest) -> Result<(), DomainError> {
        let conn = self.conn(scope).await?;
        conn.execute(
            "INSERT INTO pull_requests (id, name, author_id, status, created_at, merged_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                pr.id.as_str(),
                pr.name.as_str(),
                pr.author_id.as_str(),
                pr.status.as_str(),
                pr.created_at.timestamp_millis(),
                pr.merged_at.map(|t| t.timestamp_millis())
            ],
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::PullRequestExists(pr.id.clone())
            } else {
                storage(e)
            }
        })?;
        Self::replace_reviewers(&conn, &pr.id, &pr.assigned_reviewers).await
    }

    async fn get_by_id(
        &self,
        scope: &Scope,
        id: &PullRequestId,
    ) -> Result<PullRequest, DomainError> {
        let conn = self.conn(scope).await?;
        let sql = format!("SELECT {} FROM pull_requests WHERE id = ?1", PR_COLUMNS);
        let mut rows = conn
            .query(&sql, params![id.as_str()])
            .await
            .map_err(storage)?;
        let Some(row) = rows.next().await.map_err(storage)? else {
            return Err(DomainError::PullRequestNotFound(id.clone()));
        };
        let mut pr = Self::read_pull_request(&row)?;
        pr.assigned_reviewers = Self::load_reviewers(&conn, &pr.id).await?;
        Ok(pr)
    }

    async fn list_by_reviewer(
        &self,
        scope: &Scope,
        reviewer_id: &UserId,
    ) -> Result<Vec<PullRequest>, DomainError> {
        let conn = self.conn(scope).await?;
        let sql = format!(
            "SELECT {} FROM pull_requests WHERE id IN \
             (SELECT pull_request_id FROM pull_request_reviewers WHERE reviewer_id = ?1) \
             ORDER BY created_at, id",
            PR_COLUMNS
        );
        let mut rows = conn
            .query(&sql, params![reviewer_id.as_str()])
            .await
            .map_err(storage)?;
        let mut prs = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage)? {
            prs.push(Self::read_pull_request(&row)?);
        }
        drop(rows);

        for pr in &mut prs {
            pr.assigned_reviewers = Self::load_reviewers(&conn, &pr.id).await?;
        }
        Ok(prs)
    }

    async fn update(&self, scope: &Scope, pr: &PullRequest) -> Result<(), DomainError> {
        let conn = self.conn(scope).await?;
        let affected = conn
            .execute(
                "UPDATE pull_requests \
                 SET name = ?2, author_id = ?3, status = ?4, created_at = ?5, merged_at = ?6 \
                 WHERE id = ?1",
                params![
                    pr.id.as_str(),
                    pr.name.as_str(),
                    pr.author_id.as_str(),
                    pr.status.as_str(),
                    pr.created_at.timestamp_millis(),
                    pr.merged_at.map(|t| t.timestamp_millis())
                ],
            )
            .await
            .map_err(storage)?;
        if affected == 0 {
            return Err(DomainError::PullRequestNotFound(pr.id.clone()));
        }
        Self::replace_reviewers(&conn, &pr.id, &pr.assigned_reviewers).await
    }
}
