//! PFTP request/response messages.
//!
//! Requests are protobuf `PbPFtpOperation` messages. A GET on a path ending
//! in `/` answers with a `PbPFtpDirectory` listing, a GET on a file answers
//! with the raw file bytes. A listing response starting with a zero byte
//! means the directory does not exist.

use prost::Message;

use crate::error::ProtocolError;

/// Operation verbs understood by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Command {
    Get = 0,
    Put = 1,
    Merge = 2,
    Remove = 3,
}

/// `PbPFtpOperation`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Operation {
    #[prost(enumeration = "Command", required, tag = "1")]
    pub command: i32,
    #[prost(string, required, tag = "2")]
    pub path: String,
}

/// `PbPFtpEntry`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Entry {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(uint64, required, tag = "2")]
    pub size: u64,
}

/// `PbPFtpDirectory`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Directory {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<Entry>,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteEntry {
    /// Entry name; directories end with `/`.
    pub name: String,
    /// Size in bytes as reported by the device.
    pub size: u64,
}

impl RemoteEntry {
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

impl From<Entry> for RemoteEntry {
    fn from(entry: Entry) -> Self {
        Self {
            name: entry.name,
            size: entry.size,
        }
    }
}

/// Ensure a directory path ends with `/`.
#[must_use]
pub fn normalize_dir(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Encode a GET request for `path`.
#[must_use]
pub fn encode_get(path: &str) -> Vec<u8> {
    Operation {
        command: Command::Get as i32,
        path: path.to_string(),
    }
    .encode_to_vec()
}

/// Decode a request; the inverse of [`encode_get`].
pub fn decode_operation(bytes: &[u8]) -> Result<Operation, ProtocolError> {
    Operation::decode(bytes).map_err(Into::into)
}

/// Decode a directory listing response.
///
/// Returns `Ok(None)` when the response carries the "not found" sentinel.
pub fn decode_directory(bytes: &[u8]) -> Result<Option<Vec<RemoteEntry>>, ProtocolError> {
    if bytes.first() == Some(&0) {
        return Ok(None);
    }
    let directory = Directory::decode(bytes)?;
    Ok(Some(
        directory.entries.into_iter().map(RemoteEntry::from).collect(),
    ))
}

/// Encode a listing the way the device does; used by simulators and tests.
#[must_use]
pub fn encode_directory(entries: &[RemoteEntry]) -> Vec<u8> {
    Directory {
        entries: entries
            .iter()
            .map(|e| Entry {
                name: e.name.clone(),
                size: e.size,
            })
            .collect(),
    }
    .encode_to_vec()
}
