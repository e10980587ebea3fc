use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;

/// Get the value of `key`. If the key does not exist the special value `nil` is returned.
///
/// Ref: <https://redis.io/docs/latest/commands/get/>
#[derive(Debug, PartialEq)]
pub struct Get {
    pub key: String,
}

impl Executable for Get {
    fn exec(self, store: &Store) -> Frame {
        match store.get(&self.key) {
            Some(value) => Frame::Bulk(value),
            None => Frame::Null,
        }
    }
}

impl TryFrom<&mut CommandParser> for Get {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        parser.expect_arity("get", 1..=1)?;

        let key = parser.next_string()?;
        Ok(Self { key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use bytes::Bytes;

    #[test]
    fn existing_key() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("GET")),
            Frame::Bulk(Bytes::from("key1")),
        ]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Get(Get {
                key: String::from("key1")
            })
        );

        let store = Store::new();
        store.set(String::from("key1"), Bytes::from("1"));

        let result = cmd.exec(&store);

        assert_eq!(result, Frame::Bulk(Bytes::from("1")));
    }

    #[test]
    fn missing_key() {
        let frame = Frame::command(["GET", "key1"]);
        let cmd = Command::try_from(frame).unwrap();

        let store = Store::new();

        let result = cmd.exec(&store);

        assert_eq!(result, Frame::Null);
    }

    #[test]
    fn hash_key_is_not_a_string() {
        let store = Store::new();
        store.hset("key1".to_string(), "f".to_string(), Bytes::from("v"));

        let result = Command::try_from(Frame::command(["GET", "key1"]))
            .unwrap()
            .exec(&store);

        assert_eq!(result, Frame::Null);
    }

    #[test]
    fn zero_keys() {
        let err = Command::try_from(Frame::command(["GET"])).unwrap_err();

        assert_eq!(
            err.into_frame(),
            Frame::error("ERR wrong number of arguments for 'get' command")
        );
    }
}
