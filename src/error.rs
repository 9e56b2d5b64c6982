use thiserror::Error;

/// Errors returned by the mutating operations of a `WavlMap`.
///
/// Both are expected outcomes of a well-formed call. The map is left untouched when either is
/// returned.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// An item with an equal key is already in the map.
    #[error("key is already present")]
    DuplicateKey,

    /// No item with the requested key is in the map.
    #[error("key not found")]
    KeyNotFound,
}

/// Result type for map operations.
pub type Result<T, E = Error> = core::result::Result<T, E>;
