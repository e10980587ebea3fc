use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;

/// Removes the specified keys from both the string and the hash namespace.
///
/// The reply counts removals per namespace: a key that held both a string and a hash counts
/// twice. Each namespace is checked under its own lock, so the command as a whole is not atomic.
///
/// Ref: <https://redis.io/commands/del>
#[derive(Debug, PartialEq)]
pub struct Del {
    pub keys: Vec<String>,
}

impl Executable for Del {
    fn exec(self, store: &Store) -> Frame {
        let mut count = 0;
        for key in self.keys {
            if store.remove(&key).is_some() {
                count += 1;
            }
            if store.hremove(&key).is_some() {
                count += 1;
            }
        }
        Frame::Integer(count)
    }
}

impl TryFrom<&mut CommandParser> for Del {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        parser.expect_arity("del", 1..)?;

        let mut keys = vec![];

        loop {
            match parser.next_string() {
                Ok(key) => keys.push(key),
                Err(CommandParserError::EndOfStream) => break,
                Err(err) => return Err(err),
            }
        }

        Ok(Self { keys })
    }
}
