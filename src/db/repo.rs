use super::model::{Privilege, RepositoryRecord, WatchedManifest};
use crate::model::Role;
use anyhow::{anyhow, Result};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    // Pass through non-sqlite schemes
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    // Expand leading ~/ to HOME
    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    // Ensure parent directory exists if any
    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn watch_from_row(row: sqlx::sqlite::SqliteRow) -> WatchedManifest {
    WatchedManifest {
        id: row.get("id"),
        owner: row.get("owner"),
        repo: row.get("repo"),
        path: row.get("path"),
        git_ref: row.get("git_ref"),
        current_fp: row.get("current_fp"),
        target_fp: row.get("target_fp"),
        waiting_fp: row.get("waiting_fp"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const WATCH_COLUMNS: &str =
    "id, owner, repo, path, git_ref, current_fp, target_fp, waiting_fp, created_at, updated_at";

/// Upsert the row for a configured watch target. A brand-new row starts idle
/// with empty current/target/waiting fingerprints.
#[instrument(skip_all)]
pub async fn get_or_create_watch(
    pool: &Pool,
    owner: &str,
    repo: &str,
    path: &str,
    git_ref: &str,
) -> Result<WatchedManifest> {
    let existing = sqlx::query(&format!(
        "SELECT {WATCH_COLUMNS} FROM watched_manifests \
         WHERE owner = ? AND repo = ? AND path = ? AND git_ref = ?"
    ))
    .bind(owner)
    .bind(repo)
    .bind(path)
    .bind(git_ref)
    .fetch_optional(pool)
    .await?;
    if let Some(row) = existing {
        return Ok(watch_from_row(row));
    }

    let row = sqlx::query(&format!(
        "INSERT INTO watched_manifests (owner, repo, path, git_ref) VALUES (?, ?, ?, ?) \
         RETURNING {WATCH_COLUMNS}"
    ))
    .bind(owner)
    .bind(repo)
    .bind(path)
    .bind(git_ref)
    .fetch_one(pool)
    .await?;
    Ok(watch_from_row(row))
}

#[instrument(skip_all)]
pub async fn get_watch(pool: &Pool, id: i64) -> Result<WatchedManifest> {
    let row = sqlx::query(&format!(
        "SELECT {WATCH_COLUMNS} FROM watched_manifests WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(watch_from_row)
        .ok_or_else(|| anyhow!("watched manifest {} not found", id))
}

/// Record the latest observed fingerprint. Runs on every successful fetch.
#[instrument(skip_all)]
pub async fn set_waiting_fp(pool: &Pool, id: i64, fp: &str) -> Result<()> {
    sqlx::query(
        "UPDATE watched_manifests SET waiting_fp = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(fp)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Promote a fingerprint to the in-flight reconciliation target.
#[instrument(skip_all)]
pub async fn set_target_fp(pool: &Pool, id: i64, fp: &str) -> Result<()> {
    sqlx::query(
        "UPDATE watched_manifests SET target_fp = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(fp)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark the in-flight target as fully applied: the target becomes the new
/// baseline and the row returns to idle. Single atomic row update.
#[instrument(skip_all)]
pub async fn complete_target(pool: &Pool, id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE watched_manifests \
         SET current_fp = target_fp, target_fp = '', updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn repository_exists(pool: &Pool, owner: &str, repo: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM repositories WHERE owner = ? AND repo = ?")
            .bind(owner)
            .bind(repo)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

/// Persist a provisioned repository. Safe to re-run: an existing
/// (owner, repo) row is left untouched.
#[instrument(skip_all)]
pub async fn insert_repository(
    pool: &Pool,
    owner: &str,
    repo: &str,
    description: &str,
    visibility: &str,
    manifest_id: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO repositories (owner, repo, description, visibility, manifest_id) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (owner, repo) DO NOTHING",
    )
    .bind(owner)
    .bind(repo)
    .bind(description)
    .bind(visibility)
    .bind(manifest_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_repository(
    pool: &Pool,
    owner: &str,
    repo: &str,
) -> Result<Option<RepositoryRecord>> {
    let row = sqlx::query(
        "SELECT id, owner, repo, description, visibility, manifest_id, created_at \
         FROM repositories WHERE owner = ? AND repo = ?",
    )
    .bind(owner)
    .bind(repo)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| RepositoryRecord {
        id: row.get("id"),
        owner: row.get("owner"),
        repo: row.get("repo"),
        description: row.get("description"),
        visibility: row.get("visibility"),
        manifest_id: row.get("manifest_id"),
        created_at: row.get("created_at"),
    }))
}

#[instrument(skip_all)]
pub async fn list_privileges(pool: &Pool, owner: &str, repo: &str) -> Result<Vec<Privilege>> {
    let rows = sqlx::query(
        "SELECT owner, repo, user, role FROM privileges WHERE owner = ? AND repo = ? \
         ORDER BY user",
    )
    .bind(owner)
    .bind(repo)
    .fetch_all(pool)
    .await?;

    let mut privileges = Vec::with_capacity(rows.len());
    for row in rows {
        let role_str: String = row.get("role");
        let role = Role::parse_role(&role_str)
            .ok_or_else(|| anyhow!("privilege row has unknown role {}", role_str))?;
        privileges.push(Privilege {
            owner: row.get("owner"),
            repo: row.get("repo"),
            user: row.get("user"),
            role,
        });
    }
    Ok(privileges)
}

/// Record a granted role. A user moving between role lists replaces their
/// single row (unique on owner, repo, user).
#[instrument(skip_all)]
pub async fn insert_privilege(
    pool: &Pool,
    owner: &str,
    repo: &str,
    user: &str,
    role: Role,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO privileges (owner, repo, user, role) VALUES (?, ?, ?, ?) \
         ON CONFLICT (owner, repo, user) DO UPDATE SET role = excluded.role",
    )
    .bind(owner)
    .bind(repo)
    .bind(user)
    .bind(role.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn delete_privilege(pool: &Pool, owner: &str, repo: &str, user: &str) -> Result<()> {
    sqlx::query("DELETE FROM privileges WHERE owner = ? AND repo = ? AND user = ?")
        .bind(owner)
        .bind(repo)
        .bind(user)
        .execute(pool)
        .await?;
    Ok(())
}
