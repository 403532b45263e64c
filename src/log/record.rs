use crate::error::{Error, Result};

/// Sentinel written in the size column of a tombstone record.
pub const TOMB_FLAG: &str = "Tomb";

/// A single record in the data log.
///
/// Live records are one CSV line `key,value,size,\n` where `size` is the
/// decimal byte length of `value`. Tombstones are written as `key,,Tomb\n`;
/// the parser also recognises the legacy form `key,,0,\n` so logs written by
/// either convention recover cleanly. A record is identified by the byte
/// offset of its first character within the log file; the offset is not part
/// of the record itself.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub key: String,
    pub value: String,
    /// Byte length of the value as written.
    pub size: u64,
    pub tomb: bool,
}

impl LogRecord {
    /// A live record for the given key and value.
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        let size = value.len() as u64;
        LogRecord {
            key,
            value,
            size,
            tomb: false,
        }
    }

    /// A tombstone marking the key as deleted.
    pub fn tombstone(key: impl Into<String>) -> Self {
        LogRecord {
            key: key.into(),
            value: String::new(),
            size: 0,
            tomb: true,
        }
    }

    /// The on-disk line for this record, including the trailing newline.
    pub fn encode(&self) -> String {
        if self.tomb {
            format!("{},,{}\n", self.key, TOMB_FLAG)
        } else {
            format!("{},{},{},\n", self.key, self.value, self.size)
        }
    }

    /// Parses one log line (without its trailing newline).
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 3 || fields.len() > 4 {
            return Err(Error::Corrupt(format!(
                "log record has {} fields, expected 3 or 4",
                fields.len()
            )));
        }

        let key = fields[0].to_string();
        let value = fields[1].to_string();
        let marker = fields[2];

        if key.is_empty() {
            return Err(Error::Corrupt("log record has an empty key".into()));
        }

        if marker == TOMB_FLAG {
            return Ok(LogRecord {
                key,
                value: String::new(),
                size: 0,
                tomb: true,
            });
        }

        let size: u64 = marker.parse().map_err(|_| {
            Error::Corrupt(format!("could not parse size field {marker:?} as an integer"))
        })?;

        // Legacy tombstone convention: empty value with size zero.
        let tomb = value.is_empty() && size == 0;
        Ok(LogRecord {
            key,
            value,
            size,
            tomb,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_live() {
        let record = LogRecord::put("alpha", "1");
        assert_eq!(record.encode(), "alpha,1,1,\n");
        assert_eq!(record.size, 1);
        assert!(!record.tomb);
    }

    #[test]
    fn test_encode_tombstone() {
        let record = LogRecord::tombstone("alpha");
        assert_eq!(record.encode(), "alpha,,Tomb\n");
        assert_eq!(record.size, 0);
        assert!(record.tomb);
    }

    #[test]
    fn test_parse_roundtrip() {
        let record = LogRecord::put("key", "some value");
        let line = record.encode();
        let parsed = LogRecord::parse(line.trim_end_matches('\n')).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_parse_tombstone_forms() {
        // The form this crate writes.
        let parsed = LogRecord::parse("k,,Tomb").unwrap();
        assert!(parsed.tomb);
        assert_eq!(parsed.key, "k");

        // The legacy zero-size form.
        let parsed = LogRecord::parse("k,,0,").unwrap();
        assert!(parsed.tomb);

        // A tombstone that still carries a value only marks the delete.
        let parsed = LogRecord::parse("k,v,Tomb").unwrap();
        assert!(parsed.tomb);
        assert_eq!(parsed.value, "");
    }

    #[test]
    fn test_parse_rejects_bad_size() {
        let err = LogRecord::parse("k,v,twelve,").unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn test_parse_rejects_malformed_line() {
        assert!(LogRecord::parse("just-a-key").is_err());
        assert!(LogRecord::parse("a,b,c,d,e").is_err());
        assert!(LogRecord::parse(",value,5,").is_err());
    }

    #[test]
    fn test_empty_value_is_legacy_tombstone() {
        // `key,,0,` is byte-identical for an empty-value put and a legacy
        // tombstone; the parser resolves it as a tombstone.
        let record = LogRecord::put("k", "");
        let parsed = LogRecord::parse(record.encode().trim_end_matches('\n')).unwrap();
        assert!(parsed.tomb);
    }
}
