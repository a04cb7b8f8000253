//! conduit-core — digest engine, partition ranges, identifiers, topics and
//! configuration. All other Conduit crates depend on this one.

pub mod config;
pub mod hash;
pub mod identifier;
pub mod partition;
pub mod topic;

pub use hash::{digest_bytes, digest_of, Digest, DigestParseError, LwHasher};
pub use identifier::{Identifier, IdentifierError};
pub use partition::{admit, Admission, PartitionRange, RangeError, MAX_SPLIT};
pub use topic::{TopicError, TopicRules};
