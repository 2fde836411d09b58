// Error type shared by all codec operations.
//
// Every error is fatal to the current encode/decode call: a batch either
// round-trips exactly or the call fails.  There are no partial results and
// no silent correction.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Module name contains one of the reserved delimiter characters
    /// (`{ } , : | < > *`).
    #[error("invalid module name: {0}")]
    InvalidModuleName(String),

    /// The same full module name was assigned twice, or a name was mapped
    /// to two different ids.
    #[error("duplicate name assignment: {0}")]
    DuplicateName(String),

    /// A decoded module list has a hole at this position.
    #[error("unassigned position {0} in decoded module list")]
    UnassignedPosition(usize),

    /// Two encodings claimed the same module-list position.
    #[error("overwrite of module at position {0}")]
    PositionOverwrite(usize),

    /// The version-hash token in an encoded id list does not match the
    /// locally cached id map.
    #[error("module id list hash does not match the local id map")]
    InvalidIdListHash,

    /// The length prefix of a trit-packed feature list does not match the
    /// decoder's canonical feature list.
    #[error("feature list length {actual} does not match canonical list length {expected}")]
    InvalidFeatureListLength { expected: usize, actual: usize },

    /// Canonical feature list exceeds the 16-bit length prefix.
    #[error("canonical feature list too long: {0} entries (max 65535)")]
    FeatureListTooLong(usize),

    /// An encoded module id has no reverse mapping in the id map.
    #[error("no module mapped to id {0}")]
    UnknownId(u32),

    /// A plugin id or ordinal has no reverse mapping.
    #[error("no loader plugin mapped to {0}")]
    UnknownPluginOrdinal(u32),

    /// Malformed folded-trie text.
    #[error("malformed folded module text at byte {pos}: {msg}")]
    BadTrieSyntax { pos: usize, msg: &'static str },

    /// Encoded id list ended mid-segment or is not a whole number of
    /// integers.
    #[error("truncated module id list")]
    TruncatedIdList,

    /// The width flag byte of an id list is neither 0 (16-bit) nor
    /// 1 (32-bit).
    #[error("invalid id list width flag {0:#04x}")]
    InvalidWidthFlag(u8),

    /// A decoded position exceeds the hard module-count limit.
    #[error("module position {0} exceeds the hard limit")]
    PositionOutOfRange(u32),

    /// The `count` query arg disagrees with the decoded module list.
    #[error("module count mismatch: count arg says {expected}, decoded {actual}")]
    InvalidCount { expected: usize, actual: usize },

    /// Base64 framing failed to decode.
    #[error("invalid base64: {0}")]
    BadBase64(#[from] base64::DecodeError),
}
