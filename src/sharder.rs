//! Sharder implementation.
use md5;

/// Number of buckets percentage rollouts are expressed in.
pub const TOTAL_BUCKETS: u64 = 100;

/// Maps an input to one of `total_shards` buckets.
///
/// Implementations must be deterministic across processes and uniformly distributed. There is no
/// security requirement.
pub trait Sharder {
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u64) -> u64;
}

/// The default sharder: first 4 bytes of the MD5 digest as a big-endian `u32`.
pub struct Md5Sharder;

impl Sharder for Md5Sharder {
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u64) -> u64 {
        let hash = md5::compute(input);
        let value = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]);
        (value as u64) % total_shards
    }
}

/// Bucket in `[0, 100)` for a user and flag pair, using `sharder`.
pub fn bucket_with(sharder: &impl Sharder, user_id: &str, flag_key: &str) -> u32 {
    sharder.get_shard(format!("{user_id}:{flag_key}"), TOTAL_BUCKETS) as u32
}

/// Bucket in `[0, 100)` for a user and flag pair, using [`Md5Sharder`].
///
/// ```
/// let bucket = flagwise::bucket("user-1", "new-checkout");
/// assert!(bucket < 100);
/// assert_eq!(bucket, flagwise::bucket("user-1", "new-checkout"));
/// ```
pub fn bucket(user_id: &str, flag_key: &str) -> u32 {
    bucket_with(&Md5Sharder, user_id, flag_key)
}
