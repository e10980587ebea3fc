use crate::frame::Frame;
use crate::store::Store;

/// A parsed command that can run against the keyspace. Every command answers with exactly one
/// frame, errors included.
pub trait Executable {
    fn exec(self, store: &Store) -> Frame;
}
