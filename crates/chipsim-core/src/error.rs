/// Refusals of library-level operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[allow(missing_docs)]
pub enum LibraryError {
    #[error("chip name must not be empty")]
    EmptyName,
    #[error("chip \"{name}\" is used by {users:?}")]
    ChipInUse { name: String, users: Vec<String> },
    #[error("chip is not in the saved library")]
    NotSaved,
}
