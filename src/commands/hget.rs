use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;

/// Returns the value associated with `field` in the hash stored at `key`, `nil` when either the
/// hash or the field is missing.
///
/// Ref: <https://redis.io/docs/latest/commands/hget/>
#[derive(Debug, PartialEq)]
pub struct HGet {
    pub key: String,
    pub field: String,
}

impl Executable for HGet {
    fn exec(self, store: &Store) -> Frame {
        match store.hget(&self.key, &self.field) {
            Some(value) => Frame::Bulk(value),
            None => Frame::Null,
        }
    }
}

impl TryFrom<&mut CommandParser> for HGet {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        parser.expect_arity("hget", 2..=2)?;

        let key = parser.next_string()?;
        let field = parser.next_string()?;

        Ok(Self { key, field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use bytes::Bytes;

    #[test]
    fn existing_field() {
        let store = Store::new();
        store.hset("h".to_string(), "f".to_string(), Bytes::from("2"));

        let cmd = Command::try_from(Frame::command(["HGET", "h", "f"])).unwrap();

        assert_eq!(
            cmd,
            Command::HGet(HGet {
                key: String::from("h"),
                field: String::from("f"),
            })
        );
        assert_eq!(cmd.exec(&store), Frame::bulk("2"));
    }

    #[test]
    fn missing_hash_or_field() {
        let store = Store::new();
        store.hset("h".to_string(), "f".to_string(), Bytes::from("2"));
        store.set("s".to_string(), Bytes::from("scalar"));

        for frame in [
            Frame::command(["HGET", "h", "nope"]),
            Frame::command(["HGET", "nope", "f"]),
            Frame::command(["HGET", "s", "f"]),
        ] {
            let result = Command::try_from(frame).unwrap().exec(&store);

            assert_eq!(result, Frame::Null);
        }
    }

    #[test]
    fn wrong_number_of_arguments() {
        let err = Command::try_from(Frame::command(["HGET", "h"])).unwrap_err();

        assert_eq!(
            err.into_frame(),
            Frame::error("ERR wrong number of arguments for 'hget' command")
        );
    }
}
