//! Validation of the run inputs handed to the tool by CI.
//!
//! Everything here runs before the first git or amplify call; a failure is
//! always a [`PushardError::Input`].

use crate::errors::PushardError;
use crate::types::CommitRef;
use std::collections::BTreeSet;

pub fn validate_deploy_hash(value: Option<&str>) -> Result<CommitRef, PushardError> {
    match value {
        Some(hash) if !hash.is_empty() => CommitRef::parse(hash)
            .map_err(|_| PushardError::Input("deploy hash is not valid".to_string())),
        _ => Err(PushardError::Input("deploy hash is missing".to_string())),
    }
}

/// Parses a comma-separated skip list. An unset or empty string means no skips.
pub fn parse_skip_hashes(
    value: Option<&str>,
    deploy_hash: &CommitRef,
) -> Result<BTreeSet<CommitRef>, PushardError> {
    let raw = match value {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(BTreeSet::new()),
    };

    let mut skip = BTreeSet::new();
    for segment in raw.split(',') {
        if segment.is_empty() {
            return Err(PushardError::Input(
                "skip hash list contains an empty entry".to_string(),
            ));
        }
        let commit = CommitRef::parse(segment).map_err(|_| {
            PushardError::Input(format!("skip hash list entry is not valid: {segment:?}"))
        })?;
        if &commit == deploy_hash {
            return Err(PushardError::Input(
                "skip hash list must not contain the deploy hash".to_string(),
            ));
        }
        skip.insert(commit);
    }
    Ok(skip)
}

pub fn validate_branch(value: Option<&str>, allowed: &[String]) -> Result<String, PushardError> {
    match value {
        Some(branch) if allowed.iter().any(|a| a == branch) => Ok(branch.to_string()),
        Some(branch) => Err(PushardError::Input(format!(
            "destination branch {branch:?} is not one of [{}]",
            allowed.join(", ")
        ))),
        None => Err(PushardError::Input(
            "destination branch is missing".to_string(),
        )),
    }
}

pub fn require_secret(name: &str, value: Option<&str>) -> Result<String, PushardError> {
    match value {
        Some(secret) if !secret.trim().is_empty() => Ok(secret.to_string()),
        _ => Err(PushardError::Input(format!("{name} is not set"))),
    }
}
