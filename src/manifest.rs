//! Manifest document types and decoding.
//!
//! The watched manifest is a YAML file with a `community` block (name plus
//! four role lists) and a `repositories` list. A repository that declares any
//! of its own role lists fully overrides the community lists; there is no
//! merging.
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("manifest is missing the community name")]
    MissingCommunityName,
    #[error("repository entry {0} is missing a name")]
    MissingRepositoryName(usize),
}

/// The decoded manifest document.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub community: Community,
    #[serde(default)]
    pub repositories: Vec<RepositoryDecl>,
}

/// Community-wide defaults: the role source for repositories that declare no
/// role lists of their own. The community name is also the owning org for
/// every declared repository.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Community {
    pub name: Option<String>,
    #[serde(default)]
    pub managers: Vec<String>,
    #[serde(default)]
    pub developers: Vec<String>,
    #[serde(default)]
    pub viewers: Vec<String>,
    #[serde(default)]
    pub reporters: Vec<String>,
}

/// One declared repository.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RepositoryDecl {
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub repo_type: Option<String>,
    #[serde(default)]
    pub managers: Vec<String>,
    #[serde(default)]
    pub developers: Vec<String>,
    #[serde(default)]
    pub viewers: Vec<String>,
    #[serde(default)]
    pub reporters: Vec<String>,
}

impl RepositoryDecl {
    /// A repository with any non-empty role list replaces the community lists
    /// wholesale, including the lists it leaves empty.
    pub fn has_own_members(&self) -> bool {
        !self.managers.is_empty()
            || !self.developers.is_empty()
            || !self.viewers.is_empty()
            || !self.reporters.is_empty()
    }
}

/// Decode manifest bytes. Missing names are rejected here so the reconciler
/// never sees a half-formed declaration.
pub fn parse(content: &[u8]) -> Result<Manifest, DecodeError> {
    let manifest: Manifest = serde_yaml::from_slice(content)?;
    match manifest.community.name.as_deref() {
        Some(name) if !name.trim().is_empty() => {}
        _ => return Err(DecodeError::MissingCommunityName),
    }
    for (i, repo) in manifest.repositories.iter().enumerate() {
        match repo.name.as_deref() {
            Some(name) if !name.trim().is_empty() => {}
            _ => return Err(DecodeError::MissingRepositoryName(i)),
        }
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
community:
  name: open-community
  managers:
    - alice
  developers:
    - bob
repositories:
  - name: docs
    description: Community documentation
    type: public
  - name: infra
    type: private
    developers:
      - carol
"#;

    #[test]
    fn parse_example_ok() {
        let m = parse(EXAMPLE.as_bytes()).unwrap();
        assert_eq!(m.community.name.as_deref(), Some("open-community"));
        assert_eq!(m.repositories.len(), 2);
        assert!(!m.repositories[0].has_own_members());
        assert!(m.repositories[1].has_own_members());
        assert_eq!(m.repositories[1].developers, vec!["carol"]);
    }

    #[test]
    fn missing_community_name_rejected() {
        let doc = "community:\n  managers:\n    - alice\nrepositories: []\n";
        let err = parse(doc.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingCommunityName));
    }

    #[test]
    fn missing_repository_name_rejected() {
        let doc = "community:\n  name: c\nrepositories:\n  - description: no name\n";
        let err = parse(doc.as_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingRepositoryName(0)));
    }

    #[test]
    fn malformed_yaml_rejected() {
        let err = parse(b"community: [not a map").unwrap_err();
        assert!(matches!(err, DecodeError::Parse(_)));
    }
}
