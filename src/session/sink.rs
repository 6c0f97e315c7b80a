use std::io::{self, SeekFrom, Write as _};
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWrite};

/// Byte destination of a session log
///
/// `File` is the production sink. The extra operations cover durability,
/// recovery from a partially written record and the blocking write made
/// when a writer is dropped without being closed.
#[async_trait::async_trait]
pub trait LogSink: AsyncWrite + Unpin + Send + 'static {
    /// Make everything written so far durable
    async fn sync(&mut self) -> io::Result<()>;

    /// Discard everything past `len` bytes and continue writing there
    async fn truncate_to(&mut self, len: u64) -> io::Result<()>;

    /// Blocking append, used from `Drop`
    fn write_on_drop(self, bytes: &[u8]) -> io::Result<()>
    where
        Self: Sized;
}

#[async_trait::async_trait]
impl LogSink for File {
    async fn sync(&mut self) -> io::Result<()> {
        self.sync_all().await
    }

    async fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len).await?;
        self.seek(SeekFrom::Start(len)).await?;
        Ok(())
    }

    fn write_on_drop(self, bytes: &[u8]) -> io::Result<()> {
        // Only possible when no async operation is in flight on the handle
        let mut file = self
            .try_into_std()
            .map_err(|_| io::Error::other("operation still in flight"))?;
        file.write_all(bytes)?;
        file.flush()
    }
}
