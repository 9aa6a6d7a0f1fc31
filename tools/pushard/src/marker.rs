//! Deploy marker codec.
//!
//! The last deployed dev commit is recorded in the target branch history as
//! `🔀<hash>🔀` inside a commit message. The message must hold exactly one
//! marker.

use crate::errors::PushardError;
use crate::types::CommitRef;

pub const MARKER_DELIMITER: char = '🔀';

pub fn checkpoint_message(commit: &CommitRef) -> String {
    format!("{MARKER_DELIMITER}{commit}{MARKER_DELIMITER}")
}

pub fn merge_message(commit: &CommitRef) -> String {
    format!("Merge commit {}", checkpoint_message(commit))
}

pub fn parse_marker(message: &str) -> Result<CommitRef, PushardError> {
    let parts = message.split(MARKER_DELIMITER).collect::<Vec<_>>();
    if parts.len() != 3 || parts[1].is_empty() {
        return Err(PushardError::Input(format!(
            "last commit message does not carry exactly one deploy marker: {:?}",
            message.trim()
        )));
    }
    CommitRef::parse(parts[1]).map_err(|_| {
        PushardError::Input(format!("deploy marker is not a commit hash: {:?}", parts[1]))
    })
}

/// The previous run ended on a merge commit whose content is already on the
/// target branch.
pub fn is_merge_message(message: &str) -> bool {
    message.contains("Merge")
}

#[cfg(test)]
mod tests {
    use super::{checkpoint_message, is_merge_message, merge_message, parse_marker};
    use crate::errors::PushardError;
    use crate::types::CommitRef;

    fn commit() -> CommitRef {
        CommitRef::parse("0123456789abcdef0123456789abcdef01234567").expect("valid")
    }

    #[test]
    fn checkpoint_message_round_trips() {
        let message = checkpoint_message(&commit());
        assert_eq!(parse_marker(&message).expect("parsed"), commit());
        assert_eq!(parse_marker(&format!("{message}\n\n")).expect("parsed"), commit());
    }

    #[test]
    fn merge_message_round_trips_and_reads_as_merge() {
        let message = merge_message(&commit());
        assert_eq!(
            message,
            "Merge commit 🔀0123456789abcdef0123456789abcdef01234567🔀"
        );
        assert_eq!(parse_marker(&message).expect("parsed"), commit());
        assert!(is_merge_message(&message));
        assert!(!is_merge_message(&checkpoint_message(&commit())));
    }

    #[test]
    fn missing_or_ambiguous_markers_are_input_errors() {
        for message in [
            "chore: bump deps",
            "🔀🔀",
            "🔀abc",
            "🔀0123456789abcdef0123456789abcdef01234567🔀 and 🔀x🔀",
            "🔀not-a-hash🔀",
        ] {
            assert!(
                matches!(parse_marker(message), Err(PushardError::Input(_))),
                "{message}"
            );
        }
    }
}
