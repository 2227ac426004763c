//! File operations over a [`Transport`].

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use polarsync_protocol::{DeviceStatus, RemoteEntry};
use polarsync_protocol::pftp::{decode_directory, encode_get, normalize_dir};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Local name used when downloading the root without a destination.
pub const ROOT_OUTPUT_NAME: &str = "output";

/// PFTP client bound to one transport.
pub struct Pftp<T> {
    transport: T,
}

impl<T: Transport> Pftp<T> {
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// List a remote directory. `Ok(None)` when the device says it does not
    /// exist.
    pub async fn dir(&mut self, path: &str) -> Result<Option<Vec<RemoteEntry>>> {
        let path = normalize_dir(path);
        tracing::info!(path = %path, "Listing directory");

        let response = self.transport.request(&encode_get(&path)).await?;
        let entries = decode_directory(&response)?;
        if entries.is_none() {
            tracing::info!(path = %path, "Directory does not exist");
        }
        Ok(entries)
    }

    /// Fetch the raw content of a remote file.
    pub async fn fetch(&mut self, path: &str) -> Result<Vec<u8>> {
        self.transport.request(&encode_get(path)).await
    }

    /// Download `remote` to `local`. Returns the number of bytes written.
    ///
    /// `local` only ever appears fully written.
    pub async fn get(&mut self, remote: &str, local: &Path) -> Result<u64> {
        tracing::info!(remote = %remote, local = %local.display(), "Downloading");
        let data = self.fetch(remote).await?;
        write_atomically(local, |file| file.write_all(&data))?;
        Ok(data.len() as u64)
    }
}

/// Write `dest` through a temporary sibling renamed into place on success.
///
/// If `write` or any later step fails the temporary file is removed and
/// `dest` is left untouched.
pub fn write_atomically<F>(dest: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".polarsync-")
        .suffix(".part")
        .tempfile_in(parent)?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Local file name for a download without an explicit destination.
#[must_use]
pub fn default_local_name(remote: &str) -> PathBuf {
    match remote.trim_end_matches('/').rsplit('/').next() {
        Some(name) if !name.is_empty() => PathBuf::from(name),
        _ => PathBuf::from(ROOT_OUTPUT_NAME),
    }
}

/// List `path`. An absent directory is reported as
/// [`DeviceStatus::NoSuchFileOrDirectory`].
pub async fn list_directory<T: Transport>(
    pftp: &mut Pftp<T>,
    path: &str,
) -> Result<Vec<RemoteEntry>> {
    pftp.dir(path)
        .await?
        .ok_or(Error::Status(DeviceStatus::NoSuchFileOrDirectory))
}

/// Download `remote` to `local`, or to its base name in the working
/// directory. Returns the path written.
pub async fn download_file<T: Transport>(
    pftp: &mut Pftp<T>,
    remote: &str,
    local: Option<&Path>,
) -> Result<PathBuf> {
    let local = local.map_or_else(|| default_local_name(remote), Path::to_path_buf);
    pftp.get(remote, &local).await?;
    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Reply, ScriptedTransport};

    #[tokio::test]
    async fn test_dir_appends_slash() {
        let t = ScriptedTransport::new().dir("/U/0/", &[("S/", 0), ("DSUM/", 0)]);
        let mut pftp = Pftp::new(t);

        let entries = pftp.dir("/U/0").await.unwrap().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_dir());
        assert_eq!(pftp.transport().requests(), ["/U/0/"]);
    }

    #[tokio::test]
    async fn test_dir_absent_sentinel() {
        let t = ScriptedTransport::new().file("/X/", &[0]);
        let mut pftp = Pftp::new(t);
        assert_eq!(pftp.dir("/X/").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dir_empty_response() {
        let t = ScriptedTransport::new().file("/E/", &[]);
        let mut pftp = Pftp::new(t);
        assert_eq!(pftp.dir("/E/").await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_get_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("F");
        let t = ScriptedTransport::new().file("/A/F", b"0123456789");
        let mut pftp = Pftp::new(t);

        let written = pftp.get("/A/F", &dest).await.unwrap();
        assert_eq!(written, 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"0123456789");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_get_failure_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("F");
        let t = ScriptedTransport::new().reply("/A/F", Reply::Status(DeviceStatus::SystemBusy));
        let mut pftp = Pftp::new(t);

        let err = pftp.get("/A/F", &dest).await.unwrap_err();
        assert!(matches!(err, Error::Status(DeviceStatus::SystemBusy)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_interrupted_write_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("F");

        let result = write_atomically(&dest, |file| {
            file.write_all(b"half")?;
            Err(io::Error::other("disk went away"))
        });

        assert!(result.is_err());
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("F");
        std::fs::write(&dest, b"old content").unwrap();

        write_atomically(&dest, |file| file.write_all(b"new")).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn test_default_local_name() {
        assert_eq!(default_local_name("/U/0/DSUM/DSUM.BPB"), PathBuf::from("DSUM.BPB"));
        assert_eq!(default_local_name("/U/0/"), PathBuf::from("0"));
        assert_eq!(default_local_name("/"), PathBuf::from("output"));
    }

    #[tokio::test]
    async fn test_download_file_explicit_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("summary.bpb");
        let t = ScriptedTransport::new().file("/U/0/DSUM/DSUM.BPB", b"abc");
        let mut pftp = Pftp::new(t);

        let path = download_file(&mut pftp, "/U/0/DSUM/DSUM.BPB", Some(&dest))
            .await
            .unwrap();
        assert_eq!(path, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_list_directory_absent_is_not_found() {
        let t = ScriptedTransport::new().file("/X/", &[0]).dir("/Y/", &[("F", 3)]);
        let mut pftp = Pftp::new(t);

        let err = list_directory(&mut pftp, "/X").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(list_directory(&mut pftp, "/Y").await.unwrap().len(), 1);
    }
}
