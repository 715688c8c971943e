//! The header block written at the top of every new segment.
//!
//! ```text
//! #Encoding: UTF-8
//! #Version: 1.0.0
//! #Date: 2022-01-19 10:22 +00:00 / 2022-01-19 11:22 +01:00
//! #Fields: timestamp level [thread, *tag] message *params
//!
//! ```
//!
//! The block ends with an empty line. Readers skip everything up to and
//! including that line.

use chrono::{DateTime, Local, Utc};

use crate::config::StoreConfig;

/// Renders segment header blocks.
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    encoding: String,
    version: String,
    fields: String,
    date_pattern: String,
    zone: chrono::FixedOffset,
}

impl HeaderBlock {
    /// Builds the header renderer described by `config`.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            encoding: config.encoding.clone(),
            version: config.version.clone(),
            fields: config.fields.clone(),
            date_pattern: config.header_date_pattern.clone(),
            zone: config.zone(),
        }
    }

    /// Renders the header of a segment created at `created`.
    ///
    /// The creation date appears twice: in the fixed reference zone, then in
    /// the local zone of the machine. The text ends with the blank
    /// terminator line.
    pub fn render(&self, created: DateTime<Utc>) -> String {
        let fixed = created.with_timezone(&self.zone).format(&self.date_pattern);
        let local = created.with_timezone(&Local).format(&self.date_pattern);
        format!(
            "#Encoding: {}\n#Version: {}\n#Date: {fixed} / {local}\n#Fields: {}\n\n",
            self.encoding, self.version, self.fields
        )
    }

    /// Returns `true` for the line that closes a header block.
    ///
    /// `line` is a raw line including its newline.
    pub fn is_terminator(line: &str) -> bool {
        line == "\n"
    }
}
