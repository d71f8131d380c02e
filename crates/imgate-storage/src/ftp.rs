use crate::keys::ObjectKeys;
use crate::traits::{
    stored_result, FetchedObject, FileInput, ImageUploader, StorageError, StorageResult,
    UploadContext,
};
use async_trait::async_trait;
use bytes::Bytes;
use imgate_core::{FtpSettings, StorageType, StoredImageRecord, UploadResult};
use std::io::Cursor;
use std::net::ToSocketAddrs;
use std::time::{Duration, Instant};
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);
/// Chunk size for relaying a downloaded file.
const STREAM_CHUNK: usize = 64 * 1024;

/// FTP backend
///
/// Every operation opens its own control connection and closes it when done. The client is
/// synchronous, so sessions run on the blocking pool.
#[derive(Debug, Clone)]
pub struct FtpUploader {
    settings: FtpSettings,
}

impl FtpUploader {
    pub fn new(settings: &FtpSettings) -> StorageResult<Self> {
        if settings.host.trim().is_empty() {
            return Err(StorageError::ConfigError(
                "FTP host not configured".to_string(),
            ));
        }
        Ok(Self {
            settings: settings.clone(),
        })
    }

    /// Run `op` inside a logged-in session on the blocking pool.
    async fn session<T, F>(&self, timeout: Duration, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> StorageResult<T> + Send + 'static,
    {
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || {
            let mut ftp = connect(&settings, timeout)?;
            let result = op(&mut ftp);
            if let Err(e) = ftp.quit() {
                tracing::debug!(error = %e, "FTP quit failed");
            }
            result
        })
        .await
        .map_err(|e| StorageError::Transport(format!("FTP task failed: {}", e)))?
    }

    async fn store(&self, path: String, data: Bytes) -> StorageResult<()> {
        self.session(UPLOAD_TIMEOUT, move |ftp| {
            let path = clean_path(&path);
            make_parent_dirs(ftp, &path);
            ftp.put_file(&path, &mut Cursor::new(data))
                .map(|_| ())
                .map_err(|e| translate(e, &path))
        })
        .await
    }

    async fn remove(&self, path: String) -> StorageResult<()> {
        self.session(TRANSFER_TIMEOUT, move |ftp| {
            let path = clean_path(&path);
            ftp.rm(&path).map_err(|e| translate(e, &path))
        })
        .await
    }
}

fn connect(settings: &FtpSettings, timeout: Duration) -> StorageResult<FtpStream> {
    let addr = (settings.host.trim(), settings.port)
        .to_socket_addrs()
        .map_err(|e| StorageError::Transport(format!("resolve {}: {}", settings.host, e)))?
        .next()
        .ok_or_else(|| {
            StorageError::Transport(format!("no address for {}", settings.host))
        })?;

    let mut ftp = FtpStream::connect_timeout(addr, timeout).map_err(|e| translate(e, "connect"))?;
    ftp.get_ref().set_read_timeout(Some(timeout))?;
    ftp.get_ref().set_write_timeout(Some(timeout))?;

    ftp.login(&settings.user, &settings.pass)
        .map_err(|e| StorageError::Forbidden(format!("FTP login failed: {}", e)))?;
    ftp.transfer_type(FileType::Binary)
        .map_err(|e| translate(e, "TYPE I"))?;
    Ok(ftp)
}

/// Create each directory above `path`. Existing directories answer with an error that is
/// safe to ignore.
fn make_parent_dirs(ftp: &mut FtpStream, path: &str) {
    let segments: Vec<&str> = path.split('/').collect();
    let mut current = String::new();
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        if let Err(e) = ftp.mkdir(&current) {
            tracing::trace!(dir = %current, error = %e, "FTP mkdir skipped");
        }
    }
}

/// Normalise a stored URL path to a relative FTP path.
pub fn clean_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    unified
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn translate(err: FtpError, path: &str) -> StorageError {
    let message = err.to_string();
    if message.contains("550") {
        return StorageError::NotFound(format!(
            "file not found or permission denied: {}",
            path
        ));
    }

    let lowered = message.to_lowercase();
    if lowered.contains("timed out") || lowered.contains("would block") {
        StorageError::Timeout(format!("{}: {}", path, message))
    } else {
        StorageError::Transport(format!("{}: {}", path, message))
    }
}

#[async_trait]
impl ImageUploader for FtpUploader {
    async fn upload(&self, ctx: &UploadContext, file: FileInput) -> StorageResult<UploadResult> {
        let processed = ctx.process(file).await?;
        let keys = ObjectKeys::new(&processed.unique_file_name);
        let start = Instant::now();

        self.store(keys.key(), processed.compressed_bytes.clone())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, host = %self.settings.host, key = %keys.key(), "FTP upload failed");
                e
            })?;

        let thumbnail_stored = match &processed.thumbnail_bytes {
            Some(thumb) => match self.store(keys.thumbnail_key(), thumb.clone()).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, key = %keys.thumbnail_key(), "FTP thumbnail upload failed");
                    false
                }
            },
            None => false,
        };

        tracing::info!(
            host = %self.settings.host,
            key = %keys.key(),
            size_bytes = processed.compressed_size(),
            has_thumbnail = thumbnail_stored,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "FTP upload successful"
        );

        Ok(stored_result(
            &processed,
            &keys,
            thumbnail_stored,
            StorageType::Ftp,
            "Upload successful",
        ))
    }

    async fn delete(&self, record: &StoredImageRecord) -> bool {
        if let Err(e) = self.remove(record.url.clone()).await {
            tracing::error!(error = %e, url = %record.url, "FTP delete failed");
            return false;
        }

        if record.has_thumbnail() {
            if let Err(e) = self.remove(record.thumbnail_url.clone()).await {
                tracing::warn!(error = %e, url = %record.thumbnail_url, "FTP thumbnail delete failed");
                return false;
            }
        }

        tracing::info!(url = %record.url, "FTP delete successful");
        true
    }

    /// Downloads into memory first; the control connection is closed before the stream starts.
    async fn fetch(&self, path: &str) -> StorageResult<FetchedObject> {
        let start = Instant::now();
        let remote = path.to_string();

        let data = self
            .session(TRANSFER_TIMEOUT, move |ftp| {
                let remote = clean_path(&remote);
                ftp.retr_as_buffer(&remote)
                    .map(Cursor::into_inner)
                    .map_err(|e| translate(e, &remote))
            })
            .await?;

        let size = data.len() as u64;
        tracing::debug!(
            path = %path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "FTP download complete"
        );

        let data = Bytes::from(data);
        let chunks: Vec<StorageResult<Bytes>> = (0..data.len())
            .step_by(STREAM_CHUNK)
            .map(|offset| Ok(data.slice(offset..(offset + STREAM_CHUNK).min(data.len()))))
            .collect();

        Ok(FetchedObject {
            stream: Box::pin(futures::stream::iter(chunks)),
            content_length: Some(size),
        })
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Ftp
    }
}

#[cfg(all(test, feature = "storage-ftp"))]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(
            clean_path("/uploads//2024\\05/a.webp/"),
            "uploads/2024/05/a.webp"
        );
        assert_eq!(clean_path("uploads/a.webp"), "uploads/a.webp");
    }

    #[test]
    fn test_missing_host_fails_fast() {
        let err = FtpUploader::new(&FtpSettings::default()).unwrap_err();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let settings = FtpSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            user: "u".to_string(),
            pass: "p".to_string(),
        };
        let uploader = FtpUploader::new(&settings).unwrap();

        let err = uploader.fetch("/uploads/2024/05/a.webp").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Transport(_) | StorageError::Timeout(_)
        ));
    }
}
