//! Watch loop: the per-manifest polling state machine.
//!
//! A watched manifest is Idle while `target_fp` is empty and Reconciling
//! otherwise. Each tick fetches the current fingerprint, records it as
//! waiting, promotes it to target when idle and different from the baseline,
//! then attempts to reconcile the target. Only one fingerprint is ever in
//! flight; newer observations queue behind it as `waiting_fp` and are
//! considered once the target clears.
use crate::config::Watch;
use crate::db::{self, Pool};
use crate::forge::Forge;
use crate::{manifest, reconciler};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Bootstrap the store row for a configured watch target. A brand-new row
/// starts idle with empty fingerprints; an existing row resumes where it
/// left off, including an in-flight target.
pub async fn ensure_watch(pool: &Pool, target: &Watch) -> Result<db::WatchedManifest> {
    db::get_or_create_watch(
        pool,
        &target.owner,
        &target.repo,
        &target.path,
        &target.git_ref,
    )
    .await
}

/// One state-machine step. Any error leaves the row in a state the next tick
/// can resume from: a fetch failure changes nothing, a reconciliation failure
/// keeps the same target for retry.
pub async fn tick(pool: &Pool, forge: &dyn Forge, watch_id: i64) -> Result<()> {
    let w = db::get_watch(pool, watch_id).await?;

    // Fail-closed: never advance state on a failed fetch.
    let observed = forge
        .fetch_manifest(&w.owner, &w.repo, &w.path, &w.git_ref)
        .await
        .context("failed to fetch manifest fingerprint")?;

    // The waiting fingerprint always reflects the latest observation.
    db::set_waiting_fp(pool, watch_id, &observed.fingerprint).await?;

    let w = db::get_watch(pool, watch_id).await?;
    if w.is_idle() {
        if w.waiting_fp.is_empty() || w.waiting_fp == w.current_fp {
            return Ok(());
        }
        db::set_target_fp(pool, watch_id, &w.waiting_fp).await?;
        info!(
            owner = %w.owner,
            repo = %w.repo,
            target = %w.waiting_fp,
            "promoted waiting fingerprint to reconciliation target"
        );
    } else {
        info!(
            owner = %w.owner,
            repo = %w.repo,
            target = %w.target_fp,
            waiting = %w.waiting_fp,
            "re-attempting in-flight reconciliation target"
        );
    }

    let w = db::get_watch(pool, watch_id).await?;
    let blob = forge
        .fetch_blob(&w.owner, &w.repo, &w.target_fp)
        .await
        .context("failed to fetch manifest blob")?;

    let parsed = match manifest::parse(&blob) {
        Ok(m) => m,
        Err(err) => {
            // Retrying cannot fix a malformed manifest: the blob behind this
            // fingerprint never changes. Stay stalled on the same target
            // until a newer fingerprint is observed, then move to it.
            warn!(
                %err,
                owner = %w.owner,
                repo = %w.repo,
                target = %w.target_fp,
                "manifest failed to decode"
            );
            if !w.waiting_fp.is_empty() && w.waiting_fp != w.target_fp {
                db::set_target_fp(pool, watch_id, &w.waiting_fp).await?;
                warn!(
                    owner = %w.owner,
                    repo = %w.repo,
                    abandoned = %w.target_fp,
                    target = %w.waiting_fp,
                    "abandoning undecodable target for newer fingerprint"
                );
            }
            return Err(err.into());
        }
    };

    reconciler::reconcile_manifest(pool, forge, watch_id, &parsed).await?;

    db::complete_target(pool, watch_id).await?;
    info!(
        owner = %w.owner,
        repo = %w.repo,
        current = %w.target_fp,
        "reconciliation complete; target is the new baseline"
    );
    Ok(())
}

/// Drive ticks for one watched manifest on a fixed interval until the
/// shutdown signal fires. A shutdown mid-tick drops the in-flight calls;
/// every store write is single-row scoped, so the state machine resumes the
/// same target on restart.
pub async fn run(
    pool: Pool,
    forge: Arc<dyn Forge>,
    target: Watch,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let row = ensure_watch(&pool, &target).await?;
    info!(
        owner = %target.owner,
        repo = %target.repo,
        path = %target.path,
        git_ref = %target.git_ref,
        interval_secs = interval.as_secs(),
        "watching manifest"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                info!(owner = %target.owner, repo = %target.repo, "watch loop stopping");
                return Ok(());
            }
        }

        tokio::select! {
            res = tick(&pool, forge.as_ref(), row.id) => {
                if let Err(err) = res {
                    error!(?err, owner = %target.owner, repo = %target.repo, "tick failed");
                }
            }
            _ = shutdown.changed() => {
                info!(
                    owner = %target.owner,
                    repo = %target.repo,
                    "shutdown during tick; state resumes on restart"
                );
                return Ok(());
            }
        }
    }
}
