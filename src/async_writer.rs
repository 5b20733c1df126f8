//! Async streaming ZIP writer for the Tokio runtime
//!
//! Mirrors [`crate::writer::StreamingZipWriter`] method-for-method over any
//! `AsyncWrite` sink (files, sockets, in-memory cursors). The archive
//! offset is the same running 64-bit counter, so no seeking is ever
//! required, and the header/terminator byte builders are shared with the
//! sync writer.

use crate::error::{Result, ZipError};
use crate::format::DosDateTime;
use crate::writer::{
    central_header_bytes, data_descriptor_bytes, eocd_bytes, local_header_bytes,
    zip64_eocd_bytes, CrcCounter, CurrentEntry, EntryOptions, EntryRecord,
};
use std::path::Path;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Async streaming ZIP writer over any `AsyncWrite` sink
pub struct AsyncStreamingZipWriter<W: AsyncWrite + Unpin> {
    output: W,
    offset: u64,
    entries: Vec<EntryRecord>,
    current_entry: Option<CurrentEntry>,
}

impl AsyncStreamingZipWriter<tokio::fs::File> {
    /// Create a new async ZIP writer writing to a file
    pub async fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let output = tokio::fs::File::create(path).await?;
        Ok(Self::from_writer(output))
    }
}

impl<W: AsyncWrite + Unpin> AsyncStreamingZipWriter<W> {
    /// Create a new async ZIP writer from an arbitrary sink
    pub fn from_writer(writer: W) -> Self {
        Self {
            output: writer,
            offset: 0,
            entries: Vec::new(),
            current_entry: None,
        }
    }

    /// Start a new entry (file) in the ZIP
    pub async fn start_entry(&mut self, name: &str) -> Result<()> {
        self.start_entry_with_options(name, EntryOptions::default())
            .await
    }

    /// Start a new entry with explicit metadata
    pub async fn start_entry_with_options(
        &mut self,
        name: &str,
        options: EntryOptions,
    ) -> Result<()> {
        self.finish_current_entry().await?;

        let mut name = name.trim().to_string();
        if name.is_empty() {
            return Err(ZipError::BadFormat("empty entry name".to_string()));
        }
        if options.directory && !name.ends_with('/') {
            name.push('/');
        }
        if self.entries.iter().any(|e| e.name == name) {
            return Err(ZipError::DuplicateName(name));
        }

        let dos = DosDateTime::from_system_time(
            options.last_modified.unwrap_or_else(SystemTime::now),
        );
        let local_header_offset = self.offset;

        let header = local_header_bytes(name.as_bytes(), dos, local_header_offset);
        self.emit(&header).await?;

        self.current_entry = Some(CurrentEntry {
            name,
            comment: options.comment,
            local_header_offset,
            counter: CrcCounter::new(),
            dos,
            directory: options.directory,
        });

        Ok(())
    }

    /// Write data to the current entry (stored verbatim, feeding the CRC
    /// and size counters)
    pub async fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let entry = self
            .current_entry
            .as_mut()
            .ok_or_else(|| ZipError::BadFormat("no entry started".to_string()))?;
        if entry.directory && !data.is_empty() {
            return Err(ZipError::BadFormat(
                "directory entries carry no data".to_string(),
            ));
        }
        entry.counter.update(data);

        self.output.write_all(data).await?;
        self.offset += data.len() as u64;
        Ok(())
    }

    /// Add a whole entry by draining an async source stream
    pub async fn add_entry<R: AsyncRead + Unpin>(
        &mut self,
        name: &str,
        options: EntryOptions,
        mut source: R,
    ) -> Result<()> {
        self.start_entry_with_options(name, options).await?;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            self.write_data(&buf[..n]).await?;
        }
        Ok(())
    }

    /// Add a directory entry
    pub async fn add_directory(&mut self, name: &str, options: EntryOptions) -> Result<()> {
        self.start_entry_with_options(name, options.directory(true))
            .await
    }

    /// Finish current entry and write its data descriptor
    async fn finish_current_entry(&mut self) -> Result<()> {
        if let Some(entry) = self.current_entry.take() {
            let crc = entry.counter.finalize();
            let size = entry.counter.count;
            let zip64 = size > u32::MAX as u64 || entry.local_header_offset > u32::MAX as u64;

            let descriptor = data_descriptor_bytes(crc, size, size, zip64);
            self.emit(&descriptor).await?;

            self.entries.push(EntryRecord {
                name: entry.name,
                comment: entry.comment,
                local_header_offset: entry.local_header_offset,
                crc32: crc,
                compressed_size: size,
                uncompressed_size: size,
                dos: entry.dos,
                directory: entry.directory,
            });
        }
        Ok(())
    }

    /// Finish the archive: emit the central directory and terminators,
    /// flush and shut down the sink, and return it
    pub async fn finish(mut self) -> Result<W> {
        self.finish_current_entry().await?;

        let central_dir_offset = self.offset;
        let entries = std::mem::take(&mut self.entries);

        for entry in &entries {
            let header = central_header_bytes(entry);
            self.emit(&header).await?;
        }

        let central_dir_size = self.offset - central_dir_offset;

        let need_zip64 = entries.iter().any(|e| e.zip64())
            || entries.len() > u16::MAX as usize
            || central_dir_size > u32::MAX as u64
            || central_dir_offset > u32::MAX as u64;

        if need_zip64 {
            let terminators =
                zip64_eocd_bytes(entries.len() as u64, central_dir_size, central_dir_offset);
            self.emit(&terminators).await?;
        }

        let eocd = eocd_bytes(need_zip64, entries.len(), central_dir_size, central_dir_offset);
        self.emit(&eocd).await?;

        self.output.flush().await?;
        self.output.shutdown().await?;
        Ok(self.output)
    }

    async fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.output.write_all(bytes).await?;
        self.offset += bytes.len() as u64;
        Ok(())
    }
}
