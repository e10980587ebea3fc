use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;

/// Returns all fields and values of the hash stored at `key`, as a flat array alternating field
/// and value. The order of the pairs is unspecified. A missing hash yields `nil`.
///
/// Ref: <https://redis.io/docs/latest/commands/hgetall/>
#[derive(Debug, PartialEq)]
pub struct HGetAll {
    pub key: String,
}

impl Executable for HGetAll {
    fn exec(self, store: &Store) -> Frame {
        let Some(hash) = store.hgetall(&self.key) else {
            return Frame::Null;
        };

        let frames = hash
            .into_iter()
            .flat_map(|(field, value)| [Frame::Bulk(field.into()), Frame::Bulk(value)])
            .collect();

        Frame::Array(frames)
    }
}

impl TryFrom<&mut CommandParser> for HGetAll {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        parser.expect_arity("hgetall", 1..=1)?;

        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
