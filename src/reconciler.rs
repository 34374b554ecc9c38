//! Reconciler: drives repository existence and role grants toward what a
//! decoded manifest declares.
//!
//! A whole-manifest reconciliation succeeds only if every repository's
//! existence check and every grant/revoke completed; individual failures are
//! logged and left for the next attempt, which recomputes the same diff and
//! retries only what is still missing.
use crate::db::{self, Pool, Privilege};
use crate::forge::{CreateOutcome, Forge};
use crate::manifest::{Community, Manifest, RepositoryDecl};
use crate::model::{Role, Visibility};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Deltas between the desired role mapping and the persisted privileges,
/// partitioned per role: a user whose role changed appears in `removals`
/// with the old role and in `additions` with the new one. Removals are
/// applied first so the revoke cannot clobber a fresh grant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDiff {
    pub additions: Vec<(String, Role)>,
    pub removals: Vec<(String, Role)>,
}

impl RoleDiff {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

/// Compute the desired `user -> role` mapping for one repository declaration.
///
/// The role source is the declaration's own lists if any is non-empty,
/// otherwise the community's. Lists are scanned in precedence order and a
/// user is inserted only once, so a higher-precedence role wins silently on
/// overlap.
pub fn desired_roles(community: &Community, decl: &RepositoryDecl) -> BTreeMap<String, Role> {
    let lists: [&[String]; 4] = if decl.has_own_members() {
        [
            &decl.managers,
            &decl.developers,
            &decl.viewers,
            &decl.reporters,
        ]
    } else {
        [
            &community.managers,
            &community.developers,
            &community.viewers,
            &community.reporters,
        ]
    };

    let mut desired = BTreeMap::new();
    for (role, list) in Role::ORDERED.into_iter().zip(lists) {
        for user in list {
            desired.entry(user.clone()).or_insert(role);
        }
    }
    desired
}

/// Diff the desired mapping against the persisted privilege rows.
pub fn diff_roles(desired: &BTreeMap<String, Role>, existing: &[Privilege]) -> RoleDiff {
    let existing_by_user: BTreeMap<&str, Role> = existing
        .iter()
        .map(|p| (p.user.as_str(), p.role))
        .collect();

    let mut diff = RoleDiff::default();
    for (user, role) in desired {
        match existing_by_user.get(user.as_str()) {
            Some(have) if have == role => {}
            Some(have) => {
                diff.removals.push((user.clone(), *have));
                diff.additions.push((user.clone(), *role));
            }
            None => diff.additions.push((user.clone(), *role)),
        }
    }
    for p in existing {
        if !desired.contains_key(&p.user) {
            diff.removals.push((p.user.clone(), p.role));
        }
    }
    diff
}

/// Reconcile every repository declared in the manifest, in manifest order.
/// Returns Err if any sub-step failed; already-applied work is kept.
pub async fn reconcile_manifest(
    pool: &Pool,
    forge: &dyn Forge,
    manifest_id: i64,
    manifest: &Manifest,
) -> Result<()> {
    let owner = manifest
        .community
        .name
        .as_deref()
        .ok_or_else(|| anyhow!("manifest has no community name"))?;

    let mut failures = 0usize;
    for decl in &manifest.repositories {
        let Some(repo) = decl.name.as_deref() else {
            warn!(owner, "skipping repository declaration without a name");
            failures += 1;
            continue;
        };

        if let Err(err) = ensure_repository(pool, forge, manifest_id, owner, repo, decl).await {
            warn!(?err, owner, repo, "failed to ensure repository exists");
            failures += 1;
            continue;
        }

        let desired = desired_roles(&manifest.community, decl);
        let existing = match db::list_privileges(pool, owner, repo).await {
            Ok(ps) => ps,
            Err(err) => {
                warn!(?err, owner, repo, "failed to load persisted privileges");
                failures += 1;
                continue;
            }
        };
        let diff = diff_roles(&desired, &existing);
        if !diff.is_empty() {
            info!(
                owner,
                repo,
                additions = diff.additions.len(),
                removals = diff.removals.len(),
                "applying role diff"
            );
        }
        failures += apply_role_diff(pool, forge, owner, repo, &diff).await;
    }

    if failures > 0 {
        return Err(anyhow!("{failures} reconciliation operations failed"));
    }
    Ok(())
}

/// Create the repository if the store has no record of it. A Conflict outcome
/// from the forge means it already exists and is treated as success; the
/// record is persisted either way.
async fn ensure_repository(
    pool: &Pool,
    forge: &dyn Forge,
    manifest_id: i64,
    owner: &str,
    repo: &str,
    decl: &RepositoryDecl,
) -> Result<()> {
    if db::repository_exists(pool, owner, repo).await? {
        return Ok(());
    }

    let description = decl.description.as_deref().unwrap_or("");
    let visibility = Visibility::from_manifest_type(decl.repo_type.as_deref().unwrap_or("public"));
    match forge
        .create_repository(owner, repo, description, visibility)
        .await?
    {
        CreateOutcome::Created => info!(owner, repo, "repository created"),
        CreateOutcome::AlreadyExists => {
            info!(owner, repo, "repository already exists on forge")
        }
    }
    db::insert_repository(pool, owner, repo, description, visibility.as_str(), manifest_id).await?;
    Ok(())
}

/// Apply one repository's diff. Each (user, role) operation is independent:
/// failures are logged and counted, never abort siblings. Privilege rows are
/// only written or deleted after the forge call succeeded. Removals run
/// before additions so a role change revokes the old grant first.
async fn apply_role_diff(
    pool: &Pool,
    forge: &dyn Forge,
    owner: &str,
    repo: &str,
    diff: &RoleDiff,
) -> usize {
    let mut failed = 0usize;

    for (user, role) in &diff.removals {
        match forge.revoke_role(owner, repo, user, *role).await {
            Ok(()) => {
                if let Err(err) = db::delete_privilege(pool, owner, repo, user).await {
                    warn!(?err, owner, repo, user, "revoked but failed to delete privilege");
                    failed += 1;
                } else {
                    info!(owner, repo, user, role = role.as_str(), "role revoked");
                }
            }
            Err(err) => {
                warn!(?err, owner, repo, user, role = role.as_str(), "failed to revoke role");
                failed += 1;
            }
        }
    }

    for (user, role) in &diff.additions {
        match forge.grant_role(owner, repo, user, *role).await {
            Ok(()) => {
                if let Err(err) = db::insert_privilege(pool, owner, repo, user, *role).await {
                    warn!(?err, owner, repo, user, "granted but failed to persist privilege");
                    failed += 1;
                } else {
                    info!(owner, repo, user, role = role.as_str(), "role granted");
                }
            }
            Err(err) => {
                warn!(?err, owner, repo, user, role = role.as_str(), "failed to grant role");
                failed += 1;
            }
        }
    }

    failed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn community(
        managers: &[&str],
        developers: &[&str],
        viewers: &[&str],
        reporters: &[&str],
    ) -> Community {
        Community {
            name: Some("c".into()),
            managers: managers.iter().map(|s| s.to_string()).collect(),
            developers: developers.iter().map(|s| s.to_string()).collect(),
            viewers: viewers.iter().map(|s| s.to_string()).collect(),
            reporters: reporters.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn decl() -> RepositoryDecl {
        RepositoryDecl {
            name: Some("docs".into()),
            description: None,
            repo_type: None,
            managers: vec![],
            developers: vec![],
            viewers: vec![],
            reporters: vec![],
        }
    }

    fn privilege(user: &str, role: Role) -> Privilege {
        Privilege {
            owner: "c".into(),
            repo: "docs".into(),
            user: user.into(),
            role,
        }
    }

    #[test]
    fn higher_precedence_role_wins() {
        let c = community(&["alice"], &[], &["alice", "bob"], &["alice"]);
        let desired = desired_roles(&c, &decl());
        assert_eq!(desired.get("alice"), Some(&Role::Manager));
        assert_eq!(desired.get("bob"), Some(&Role::Viewer));
        assert_eq!(desired.len(), 2);
    }

    #[test]
    fn repository_lists_fully_override_community() {
        let c = community(&["alice"], &[], &["vera"], &["rita"]);
        let mut d = decl();
        d.developers = vec!["carol".into()];

        let desired = desired_roles(&c, &d);
        // Only the declared developers list applies; community managers,
        // viewers and reporters are not merged in.
        assert_eq!(desired.len(), 1);
        assert_eq!(desired.get("carol"), Some(&Role::Developer));
    }

    #[test]
    fn community_lists_used_when_no_override() {
        let c = community(&["alice"], &["bob"], &[], &[]);
        let desired = desired_roles(&c, &decl());
        assert_eq!(desired.get("alice"), Some(&Role::Manager));
        assert_eq!(desired.get("bob"), Some(&Role::Developer));
    }

    #[test]
    fn diff_additions_and_removals() {
        // existing: bob developer, carol viewer; desired: alice manager, bob developer.
        let existing = vec![
            privilege("bob", Role::Developer),
            privilege("carol", Role::Viewer),
        ];
        let mut desired = BTreeMap::new();
        desired.insert("alice".to_string(), Role::Manager);
        desired.insert("bob".to_string(), Role::Developer);

        let diff = diff_roles(&desired, &existing);
        assert_eq!(diff.additions, vec![("alice".to_string(), Role::Manager)]);
        assert_eq!(diff.removals, vec![("carol".to_string(), Role::Viewer)]);
    }

    #[test]
    fn diff_is_empty_when_converged() {
        let existing = vec![privilege("bob", Role::Developer)];
        let mut desired = BTreeMap::new();
        desired.insert("bob".to_string(), Role::Developer);
        assert!(diff_roles(&desired, &existing).is_empty());
    }

    #[test]
    fn role_change_revokes_old_and_grants_new() {
        let existing = vec![privilege("bob", Role::Viewer)];
        let mut desired = BTreeMap::new();
        desired.insert("bob".to_string(), Role::Developer);

        let diff = diff_roles(&desired, &existing);
        assert_eq!(diff.additions, vec![("bob".to_string(), Role::Developer)]);
        assert_eq!(diff.removals, vec![("bob".to_string(), Role::Viewer)]);
    }
}
