use crate::errors::PushardError;
use std::fmt;

pub const COMMIT_HASH_LEN: usize = 40;

/// A full 40-character lowercase hex commit id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitRef(String);

impl CommitRef {
    pub fn parse(value: &str) -> Result<Self, PushardError> {
        if is_commit_hash(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(PushardError::Input(format!(
                "not a 40-character commit hash: {value:?}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn is_commit_hash(value: &str) -> bool {
    value.len() == COMMIT_HASH_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// CloudFormation stack status as reported by `describe-stacks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackState(String);

impl StackState {
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_in_progress(&self) -> bool {
        self.0.ends_with("_IN_PROGRESS")
    }
}

impl fmt::Display for StackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing between the recorded marker and the requested target.
    NothingToDeploy,
    Deployed { commits: usize },
    /// `--dry-run`: the commits that would have been replayed.
    Planned { commits: Vec<CommitRef> },
}
