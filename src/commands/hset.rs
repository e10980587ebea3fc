use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;

/// Sets `field` in the hash stored at `key` to `value`. The hash is created if it doesn't exist,
/// an existing field is overwritten.
///
/// Unlike upstream Redis this takes a single field/value pair and replies with `OK`.
///
/// Ref: <https://redis.io/docs/latest/commands/hset/>
#[derive(Debug, PartialEq)]
pub struct HSet {
    pub key: String,
    pub field: String,
    pub value: Bytes,
}

impl Executable for HSet {
    fn exec(self, store: &Store) -> Frame {
        store.hset(self.key, self.field, self.value);

        Frame::ok()
    }
}

impl TryFrom<&mut CommandParser> for HSet {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        parser.expect_arity("hset", 3..=3)?;

        let key = parser.next_string()?;
        let field = parser.next_string()?;
        let value = parser.next_bytes()?;

        Ok(Self { key, field, value })
    }
}
