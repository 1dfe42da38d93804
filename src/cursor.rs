use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::{SinkError, types::BlockRef};

/// Version tag of the cursor payload this sink understands.
const PAYLOAD_PREFIX: &str = "sink:1";

/// Opaque resumption token issued by the server with each block.
///
/// Feeding the last received cursor back into [`Sinker::run`] resumes the
/// stream exactly after the block it points to, surviving restarts and
/// reorgs. The empty string parses to the blank cursor, which means "start
/// from the configured start block".
///
/// The opaque form round-trips verbatim: `Cursor::parse(c.to_string()) == c`.
///
/// [`Sinker::run`]: crate::Sinker::run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    opaque: String,
    block: BlockRef,
}

impl Cursor {
    /// The blank cursor, pointing nowhere.
    #[must_use]
    pub fn new_blank() -> Self {
        Self::default()
    }

    /// Decodes a server-issued opaque cursor.
    ///
    /// An empty input yields the blank cursor. Any non-empty input that does
    /// not decode indicates wire-format skew with the server and fails with
    /// [`SinkError::InvalidCursor`].
    pub fn parse(input: impl Into<String>) -> Result<Self, SinkError> {
        let opaque = input.into();
        if opaque.is_empty() {
            return Ok(Self::default());
        }

        let invalid = |reason: &str| SinkError::InvalidCursor {
            value: opaque.clone(),
            reason: reason.to_string(),
        };

        let decoded = URL_SAFE_NO_PAD
            .decode(opaque.as_bytes())
            .map_err(|_| invalid("not base64"))?;
        let payload = String::from_utf8(decoded).map_err(|_| invalid("payload is not utf-8"))?;

        let rest = payload
            .strip_prefix(PAYLOAD_PREFIX)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| invalid("unsupported payload version"))?;

        let (number, id) = rest
            .split_once(':')
            .ok_or_else(|| invalid("missing block reference"))?;
        let number = number.parse::<u64>().map_err(|_| invalid("block number is not numeric"))?;
        if id.is_empty() {
            return Err(invalid("empty block id"));
        }

        Ok(Self { opaque, block: BlockRef::new(id, number) })
    }

    /// Builds the cursor that points to `block`, in the same encoding the
    /// server uses.
    #[must_use]
    pub fn for_block(block: BlockRef) -> Self {
        let payload = format!("{PAYLOAD_PREFIX}:{}:{}", block.number, block.id);
        Self { opaque: URL_SAFE_NO_PAD.encode(payload), block }
    }

    pub fn is_blank(&self) -> bool {
        self.opaque.is_empty()
    }

    /// The block this cursor points to, zero-valued for the blank cursor.
    pub fn block(&self) -> &BlockRef {
        &self.block
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.opaque)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_cursor_round_trips() {
        let cursor = Cursor::parse("").unwrap();

        assert!(cursor.is_blank());
        assert_eq!(cursor.block(), &BlockRef::default());
        assert_eq!(cursor.to_string(), "");
    }

    #[test]
    fn opaque_form_round_trips_verbatim() {
        let cursor = Cursor::for_block(BlockRef::new("0xabcd", 12_345));
        let reparsed = Cursor::parse(cursor.to_string()).unwrap();

        assert_eq!(reparsed, cursor);
        assert_eq!(reparsed.block().number, 12_345);
        assert_eq!(reparsed.block().id, "0xabcd");
    }

    #[test]
    fn block_id_with_separator_survives() {
        let cursor = Cursor::for_block(BlockRef::new("a:b:c", 7));
        let reparsed = Cursor::parse(cursor.to_string()).unwrap();

        assert_eq!(reparsed.block().id, "a:b:c");
    }

    #[test]
    fn garbage_input_fails() {
        for input in ["definitely not base64!!", "aGVsbG8", "c2luazoxOnh5eg"] {
            let err = Cursor::parse(input).unwrap_err();
            assert!(matches!(err, SinkError::InvalidCursor { .. }), "input {input:?}");
        }
    }

    #[test]
    fn rejects_foreign_payload_version() {
        let opaque = URL_SAFE_NO_PAD.encode("sink:2:10:abc");
        let err = Cursor::parse(opaque).unwrap_err();

        assert!(matches!(err, SinkError::InvalidCursor { .. }));
    }
}
