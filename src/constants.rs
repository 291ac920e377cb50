// -
// Upstream protocol literals

/// Server parameter enabling keyspace/keyevent notifications
pub const NOTIFY_CONFIG_KEY: &str = "notify-keyspace-events";

/// First element of a pushed pub/sub message frame
pub const PUSH_MESSAGE_KIND: &str = "message";

/// `TYPE` reply for hash-shaped values, the only shape we replicate
pub const HASH_TYPE: &str = "hash";

// -
// Record fields

pub const VERSION_FIELD: &str = "version";
pub const EXPIRE_FIELD: &str = "expire";

// -
// Local store namespaces

/// Sled tree holding replicated records and their index entries
pub(crate) const REPLICA_TREE: &str = "_replica";

/// Key prefix of the IndexEntry derived from a ChangeKey
pub const INDEX_KEY_PREFIX: &str = "__version__:";
