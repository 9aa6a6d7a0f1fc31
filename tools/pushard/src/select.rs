use crate::errors::PushardError;
use crate::logging::append_run_log;
use crate::types::CommitRef;
use serde_json::json;
use std::collections::BTreeSet;

/// Commits to replay onto the target branch, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySet {
    commits: Vec<CommitRef>,
}

impl ReplaySet {
    pub fn new(commits: Vec<CommitRef>) -> Self {
        Self { commits }
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CommitRef> {
        self.commits.iter()
    }

    pub fn as_slice(&self) -> &[CommitRef] {
        &self.commits
    }

    pub fn into_vec(self) -> Vec<CommitRef> {
        self.commits
    }

    /// Drops every commit present in `skip`, keeping relative order.
    pub fn without(mut self, skip: &BTreeSet<CommitRef>) -> Self {
        self.commits.retain(|commit| !skip.contains(commit));
        self
    }
}

/// Computes the commits between the recorded deploy marker and the target.
///
/// `revisions` is newest first, as printed by `git rev-list`. The slice runs
/// from the target (inclusive) to the marker (exclusive) and is returned in
/// replay order. With `keep_boundary_merge` the marker commit itself is kept
/// at the head of the set; the replay loop re-pushes its backend without
/// merging it again.
pub fn select_replay_set(
    revisions: &[CommitRef],
    start_marker: &CommitRef,
    target: &CommitRef,
    keep_boundary_merge: bool,
    skip: &BTreeSet<CommitRef>,
) -> Result<ReplaySet, PushardError> {
    if revisions.is_empty() {
        return Err(PushardError::Input(
            "source branch has no commits".to_string(),
        ));
    }
    let position = |commit: &CommitRef| revisions.iter().position(|c| c == commit);
    let (Some(target_idx), Some(start_idx)) = (position(target), position(start_marker)) else {
        return Err(PushardError::Input(format!(
            "cannot find deploy marker {start_marker} or deploy hash {target} on the source branch"
        )));
    };

    let end = if keep_boundary_merge {
        (start_idx + 1).min(revisions.len())
    } else {
        start_idx
    };

    let mut commits = if target_idx < end {
        revisions[target_idx..end].to_vec()
    } else {
        Vec::new()
    };
    commits.reverse();
    let selected = commits.len();
    let replay = ReplaySet::new(commits).without(skip);

    append_run_log(
        "info",
        "select.replay_set.computed",
        json!({
            "start_marker": start_marker.as_str(),
            "target": target.as_str(),
            "target_idx": target_idx,
            "start_idx": start_idx,
            "keep_boundary_merge": keep_boundary_merge,
            "selected": selected,
            "skipped": selected - replay.len(),
            "commits": replay.iter().map(CommitRef::as_str).collect::<Vec<_>>()
        }),
    );
    Ok(replay)
}
