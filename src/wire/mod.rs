//! Text command grammar shared by the encoder and the loader.
//!
//! ```text
//! TS.ADD <key> <ts> <value> LABELS <k1> <v1> ... measurement <name> fieldname <field>\n
//! TS.MADD <key> <ts> <value> <key> <ts> <value> ...\n
//! ```

use md5::{Digest, Md5};

pub const ADD: &str = "TS.ADD";
pub const MADD: &str = "TS.MADD";
pub const LABELS: &str = "LABELS";
pub const MEASUREMENT_LABEL: &str = "measurement";
pub const FIELDNAME_LABEL: &str = "fieldname";

/// Hash of a canonical label string: first four bytes of its MD5 digest,
/// read big-endian as a signed 32-bit integer.
///
/// Collisions are possible and are not detected.
pub fn label_hash(canonical: &str) -> i32 {
    let digest = Md5::digest(canonical.as_bytes());
    i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Wire key of one (measurement, field) pair: `measurement_field{hash}`.
pub fn series_key(measurement: &str, field: &str, hash: i32) -> String {
    format!("{}_{}{{{}}}", measurement, field, hash)
}

/// One command line split into its name and positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command<'a> {
    pub name: &'a str,
    pub args: Vec<&'a str>,
}

/// Splits a line on whitespace: the first token is the command, the rest are
/// passed through verbatim. Returns `None` for a blank line.
pub fn split_command(line: &str) -> Option<Command<'_>> {
    let mut tokens = line.split_whitespace();
    let name = tokens.next()?;
    Some(Command {
        name,
        args: tokens.collect(),
    })
}
