//! Chunked byte streams used for uploads and downloads.

use std::io;
use std::path::Path;

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::ByteStream;

/// Stream an open file in reads of at most `chunk_size` bytes.
pub fn file_stream(file: File, chunk_size: usize) -> ByteStream {
    let chunk_size = chunk_size.max(1);
    stream::try_unfold(file, move |mut file| async move {
        let mut buffer = vec![0u8; chunk_size];
        let read = file.read(&mut buffer).await?;
        let next = (read > 0).then(|| {
            buffer.truncate(read);
            (Bytes::from(buffer), file)
        });
        Ok::<_, io::Error>(next)
    })
    .boxed()
}

/// Open `path` and stream it in `chunk_size` reads.
pub async fn open_file_stream<P: AsRef<Path>>(
    path: P,
    chunk_size: usize,
) -> io::Result<ByteStream> {
    let file = File::open(path).await?;
    Ok(file_stream(file, chunk_size))
}

/// Wrap in-memory chunks as an upload stream.
pub fn bytes_stream<I>(chunks: I) -> ByteStream
where
    I: IntoIterator<Item = Bytes>,
    I::IntoIter: Send + 'static,
{
    stream::iter(chunks.into_iter().map(Ok)).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_stream_respects_chunk_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        tokio::fs::write(&path, vec![7u8; 10]).await.unwrap();

        let chunks: Vec<Bytes> = open_file_stream(&path, 4)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn test_empty_file_yields_no_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.bin");
        tokio::fs::write(&path, b"").await.unwrap();

        let chunks: Vec<Bytes> = open_file_stream(&path, 4)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }
}
