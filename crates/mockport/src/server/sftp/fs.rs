//! SFTP subsystem handler serving a directory tree.
//!
//! Every client path goes through [`resolve_in_root`], so nothing outside the
//! endpoint root is reachable.

use crate::files::{normalize_virtual, resolve_in_root};
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use std::collections::HashMap;
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

/// Largest payload returned by a single READ, whatever length the client asks for.
pub(crate) const MAX_READ_LEN: u32 = 256 * 1024;

enum OpenHandle {
    File(tokio::fs::File),
    Dir { path: PathBuf, listed: bool },
}

pub struct SftpSession {
    root: PathBuf,
    handles: HashMap<String, OpenHandle>,
    next_handle: u64,
    version: Option<u32>,
}

impl SftpSession {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            handles: HashMap::new(),
            next_handle: 0,
            version: None,
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StatusCode> {
        resolve_in_root(&self.root, path).map_err(|e| {
            debug!("Rejected SFTP path: {}", e);
            StatusCode::PermissionDenied
        })
    }

    fn insert_handle(&mut self, handle: OpenHandle) -> String {
        self.next_handle += 1;
        let key = self.next_handle.to_string();
        self.handles.insert(key.clone(), handle);
        key
    }

    fn file_mut(&mut self, handle: &str) -> Result<&mut tokio::fs::File, StatusCode> {
        match self.handles.get_mut(handle) {
            Some(OpenHandle::File(file)) => Ok(file),
            _ => Err(StatusCode::BadMessage),
        }
    }
}

fn ok(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

fn status_of(err: io::Error) -> StatusCode {
    match err.kind() {
        io::ErrorKind::NotFound => StatusCode::NoSuchFile,
        io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        io::ErrorKind::UnexpectedEof => StatusCode::Eof,
        _ => StatusCode::Failure,
    }
}

impl russh_sftp::server::Handler for SftpSession {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        if self.version.is_some() {
            return Err(StatusCode::ConnectionLost);
        }
        self.version = Some(version);
        Ok(Version::new())
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let canonical = normalize_virtual(&path).map_err(|_| StatusCode::PermissionDenied)?;
        Ok(Name {
            id,
            files: vec![File::dummy(canonical)],
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let metadata = tokio::fs::metadata(self.resolve(&path)?)
            .await
            .map_err(status_of)?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&metadata),
        })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let metadata = tokio::fs::symlink_metadata(self.resolve(&path)?)
            .await
            .map_err(status_of)?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&metadata),
        })
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let metadata = match self.handles.get(&handle) {
            Some(OpenHandle::File(file)) => file.metadata().await,
            Some(OpenHandle::Dir { path, .. }) => tokio::fs::metadata(path).await,
            None => return Err(StatusCode::BadMessage),
        }
        .map_err(status_of)?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&metadata),
        })
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.resolve(&path)?;
        Ok(ok(id))
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        if !self.handles.contains_key(&handle) {
            return Err(StatusCode::BadMessage);
        }
        Ok(ok(id))
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let path = self.resolve(&path)?;
        let metadata = tokio::fs::metadata(&path).await.map_err(status_of)?;
        if !metadata.is_dir() {
            return Err(StatusCode::NoSuchFile);
        }
        let handle = self.insert_handle(OpenHandle::Dir {
            path,
            listed: false,
        });
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let path = match self.handles.get_mut(&handle) {
            Some(OpenHandle::Dir { listed: true, .. }) => return Err(StatusCode::Eof),
            Some(OpenHandle::Dir { path, listed }) => {
                *listed = true;
                path.clone()
            }
            _ => return Err(StatusCode::BadMessage),
        };

        let mut entries = tokio::fs::read_dir(&path).await.map_err(status_of)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(status_of)? {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            files.push(File::new(
                entry.file_name().to_string_lossy(),
                FileAttributes::from(&metadata),
            ));
        }

        if files.is_empty() {
            return Err(StatusCode::Eof);
        }
        Ok(Name { id, files })
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let path = self.resolve(&filename)?;
        let options = tokio::fs::OpenOptions::from(std::fs::OpenOptions::from(pflags));
        let file = options.open(&path).await.map_err(status_of)?;
        let handle = self.insert_handle(OpenHandle::File(file));
        Ok(Handle { id, handle })
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let file = self.file_mut(&handle)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(status_of)?;

        let len = len.min(MAX_READ_LEN);
        let mut data = Vec::with_capacity(len as usize);
        file.take(u64::from(len))
            .read_to_end(&mut data)
            .await
            .map_err(status_of)?;
        if data.is_empty() {
            return Err(StatusCode::Eof);
        }
        Ok(Data { id, data })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let file = self.file_mut(&handle)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(status_of)?;
        file.write_all(&data).await.map_err(status_of)?;
        Ok(ok(id))
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        match self.handles.remove(&handle) {
            Some(OpenHandle::File(mut file)) => {
                file.flush().await.map_err(status_of)?;
                Ok(ok(id))
            }
            Some(OpenHandle::Dir { .. }) => Ok(ok(id)),
            None => Err(StatusCode::BadMessage),
        }
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        tokio::fs::remove_file(self.resolve(&filename)?)
            .await
            .map_err(status_of)?;
        Ok(ok(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        tokio::fs::create_dir(self.resolve(&path)?)
            .await
            .map_err(status_of)?;
        Ok(ok(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        tokio::fs::remove_dir(self.resolve(&path)?)
            .await
            .map_err(status_of)?;
        Ok(ok(id))
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        let from = self.resolve(&oldpath)?;
        let to = self.resolve(&newpath)?;
        tokio::fs::rename(from, to).await.map_err(status_of)?;
        Ok(ok(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh_sftp::server::Handler;

    fn session() -> (tempfile::TempDir, SftpSession) {
        let dir = tempfile::tempdir().unwrap();
        let session = SftpSession::new(dir.path().to_path_buf());
        (dir, session)
    }

    #[tokio::test]
    async fn test_realpath_is_virtual() {
        let (_dir, mut session) = session();
        let name = session.realpath(1, ".".to_string()).await.unwrap();
        assert_eq!(name.files[0].filename, "/");
        let name = session.realpath(2, "/a/../b".to_string()).await.unwrap();
        assert_eq!(name.files[0].filename, "/b");
        assert_eq!(
            session.realpath(3, "/../etc".to_string()).await.unwrap_err(),
            StatusCode::PermissionDenied
        );
    }

    #[tokio::test]
    async fn test_write_then_read_file() {
        let (dir, mut session) = session();
        let flags = OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE;
        let handle = session
            .open(1, "/upload.txt".to_string(), flags, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        session
            .write(2, handle.clone(), 0, b"hello sftp".to_vec())
            .await
            .unwrap();
        session.close(3, handle).await.unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("upload.txt")).unwrap(),
            b"hello sftp"
        );

        let handle = session
            .open(4, "upload.txt".to_string(), OpenFlags::READ, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        let data = session.read(5, handle.clone(), 6, 100).await.unwrap();
        assert_eq!(data.data, b"sftp");
        assert_eq!(
            session.read(6, handle.clone(), 100, 10).await.unwrap_err(),
            StatusCode::Eof
        );
        session.close(7, handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_length_is_capped() {
        let (dir, mut session) = session();
        let size = MAX_READ_LEN as usize + 4096;
        std::fs::write(dir.path().join("big.bin"), vec![7u8; size]).unwrap();

        let handle = session
            .open(1, "/big.bin".to_string(), OpenFlags::READ, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        let data = session.read(2, handle.clone(), 0, u32::MAX).await.unwrap();
        assert_eq!(data.data.len(), MAX_READ_LEN as usize);

        let rest = session
            .read(3, handle.clone(), u64::from(MAX_READ_LEN), u32::MAX)
            .await
            .unwrap();
        assert_eq!(rest.data.len(), 4096);
        session.close(4, handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_readdir_lists_once_then_eof() {
        let (dir, mut session) = session();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let handle = session.opendir(1, "/".to_string()).await.unwrap().handle;
        let name = session.readdir(2, handle.clone()).await.unwrap();
        let mut names: Vec<_> = name.files.iter().map(|f| f.filename.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "sub"]);
        assert_eq!(
            session.readdir(3, handle.clone()).await.unwrap_err(),
            StatusCode::Eof
        );
        session.close(4, handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_paths_outside_root_are_denied() {
        let (_dir, mut session) = session();
        assert_eq!(
            session.stat(1, "/../../etc/passwd".to_string()).await.unwrap_err(),
            StatusCode::PermissionDenied
        );
        assert_eq!(
            session
                .open(2, "../x".to_string(), OpenFlags::READ, FileAttributes::default())
                .await
                .unwrap_err(),
            StatusCode::PermissionDenied
        );
    }

    #[tokio::test]
    async fn test_mkdir_rename_remove() {
        let (dir, mut session) = session();
        session
            .mkdir(1, "/in".to_string(), FileAttributes::default())
            .await
            .unwrap();
        std::fs::write(dir.path().join("in/f"), "x").unwrap();
        session
            .rename(2, "/in/f".to_string(), "/in/g".to_string())
            .await
            .unwrap();
        assert!(dir.path().join("in/g").exists());
        session.remove(3, "/in/g".to_string()).await.unwrap();
        session.rmdir(4, "/in".to_string()).await.unwrap();
        assert!(!dir.path().join("in").exists());
        assert_eq!(
            session.stat(5, "/in".to_string()).await.unwrap_err(),
            StatusCode::NoSuchFile
        );
    }
}
