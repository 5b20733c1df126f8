//! Async ZIP reader for arbitrary async blobs (files, in-memory cursors,
//! network-backed readers)
//!
//! Locating and fetching bytes is async; the central-directory and EOCD
//! decoding is shared with the sync reader, which keeps the two in
//! lockstep on the format details.

use crate::error::{Result, ZipError};
use crate::format::{
    EOCD_MIN_SIZE, EOCD_SEARCH_MAX, LOCAL_FILE_HEADER_SIGNATURE, METHOD_DEFLATED, METHOD_STORED,
    ZIP64_EOCD_LOCATOR_SIZE, ZIP64_EOCD_SIZE,
};
use crate::reader::{
    find_eocd_in_tail, le_u16, le_u32, parse_central_directory, parse_eocd,
    parse_zip64_eocd_locator, parse_zip64_eocd_record, ZipEntry,
};
use async_compression::tokio::bufread::DeflateDecoder;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, BufReader};

/// Async lazy ZIP archive reader over any async blob
pub struct AsyncZipArchive<R: AsyncRead + AsyncSeek + Unpin + Send> {
    reader: BufReader<R>,
    entries: Vec<ZipEntry>,
}

impl AsyncZipArchive<File> {
    /// Open a ZIP file and read its central directory
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(File::open(path).await?).await
    }
}

impl<R: AsyncRead + AsyncSeek + Unpin + Send> AsyncZipArchive<R> {
    /// Read the central directory of `reader` and build entry handles
    pub async fn new(reader: R) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let entries = read_central_directory(&mut reader).await?;
        Ok(AsyncZipArchive { reader, entries })
    }

    /// All entries, in central-directory order (the order they were written)
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Mutable entry handles, for renaming or re-stamping the in-memory view
    pub fn entries_mut(&mut self) -> &mut [ZipEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find an entry by name
    pub fn find_entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Read an entry's decompressed data into a vector
    pub async fn read_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut stream = self.read_entry_streaming(index).await?;
        stream.read_to_end(&mut data).await?;
        Ok(data)
    }

    /// Read an entry's decompressed data by name
    pub async fn read_entry_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let index = self.index_of(name)?;
        self.read_entry(index).await
    }

    /// Read an entry's raw stored bytes, without decompressing
    pub async fn read_entry_raw(&mut self, index: usize) -> Result<Vec<u8>> {
        let mut reader = self.raw_reader(index).await?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        Ok(data)
    }

    pub async fn read_entry_raw_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let index = self.index_of(name)?;
        self.read_entry_raw(index).await
    }

    /// Get a streaming reader that decompresses on-the-fly (for large
    /// entries). Calling this again restarts from the beginning of the
    /// entry and yields the same bytes.
    pub async fn read_entry_streaming(
        &mut self,
        index: usize,
    ) -> Result<Box<dyn AsyncRead + Unpin + Send + '_>> {
        let method = self
            .entries
            .get(index)
            .ok_or_else(|| ZipError::EntryNotFound(format!("entry #{}", index)))?
            .compression_method;
        match method {
            METHOD_STORED => Ok(Box::new(self.raw_reader(index).await?)),
            METHOD_DEFLATED => Ok(Box::new(DeflateDecoder::new(self.raw_reader(index).await?))),
            other => Err(ZipError::UnsupportedCompression(other)),
        }
    }

    pub async fn read_entry_streaming_by_name(
        &mut self,
        name: &str,
    ) -> Result<Box<dyn AsyncRead + Unpin + Send + '_>> {
        let index = self.index_of(name)?;
        self.read_entry_streaming(index).await
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| ZipError::EntryNotFound(name.to_string()))
    }

    /// Resolve where the entry's stored bytes begin, caching the result.
    async fn data_start(&mut self, index: usize) -> Result<u64> {
        let offset = {
            let entry = self
                .entries
                .get(index)
                .ok_or_else(|| ZipError::EntryNotFound(format!("entry #{}", index)))?;
            if let Some(start) = entry.data_start {
                return Ok(start);
            }
            entry.offset
        };

        self.reader.seek(SeekFrom::Start(offset)).await?;
        let mut header = [0u8; 30];
        self.reader.read_exact(&mut header).await?;
        if le_u32(&header, 0) != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(ZipError::BadFormat(
                "invalid local file header signature".to_string(),
            ));
        }
        let name_len = le_u16(&header, 26) as u64;
        let extra_len = le_u16(&header, 28) as u64;

        let start = offset + 30 + name_len + extra_len;
        self.entries[index].data_start = Some(start);
        Ok(start)
    }

    async fn raw_reader(
        &mut self,
        index: usize,
    ) -> Result<tokio::io::Take<&mut BufReader<R>>> {
        let start = self.data_start(index).await?;
        let length = self.entries[index].compressed_size;
        self.reader.seek(SeekFrom::Start(start)).await?;
        Ok((&mut self.reader).take(length))
    }
}

/// Locate and decode the central directory of an async blob
async fn read_central_directory<R: AsyncRead + AsyncSeek + Unpin + Send>(
    reader: &mut BufReader<R>,
) -> Result<Vec<ZipEntry>> {
    let blob_size = reader.seek(SeekFrom::End(0)).await?;
    if blob_size < EOCD_MIN_SIZE {
        return Err(ZipError::BadFormat(
            "file too small for a ZIP archive".to_string(),
        ));
    }

    // Fast path: an archive without a trailing comment has its EOCD in the
    // last 22 bytes. Fall back to scanning the maximal comment window.
    let mut tail = vec![0u8; EOCD_MIN_SIZE as usize];
    reader.seek(SeekFrom::Start(blob_size - EOCD_MIN_SIZE)).await?;
    reader.read_exact(&mut tail).await?;

    let (tail_start, eocd_index) = match find_eocd_in_tail(&tail) {
        Some(i) => (blob_size - EOCD_MIN_SIZE, i),
        None => {
            let tail_len = EOCD_SEARCH_MAX.min(blob_size);
            let tail_start = blob_size - tail_len;
            tail = vec![0u8; tail_len as usize];
            reader.seek(SeekFrom::Start(tail_start)).await?;
            reader.read_exact(&mut tail).await?;
            let i = find_eocd_in_tail(&tail).ok_or_else(|| {
                ZipError::BadFormat("end of central directory not found".to_string())
            })?;
            (tail_start, i)
        }
    };
    let eocd_offset = tail_start + eocd_index as u64;

    let eocd = parse_eocd(&tail[eocd_index..]);
    let mut entries_total = eocd.entries_total;
    let mut cd_size = eocd.cd_size;
    let mut cd_offset = eocd.cd_offset;

    if eocd.zip64 {
        // The ZIP64 EOCD locator sits immediately before the classic EOCD
        if eocd_offset < ZIP64_EOCD_LOCATOR_SIZE {
            return Err(ZipError::BadFormat(
                "ZIP64 EOCD locator not found".to_string(),
            ));
        }
        let mut locator = [0u8; ZIP64_EOCD_LOCATOR_SIZE as usize];
        reader
            .seek(SeekFrom::Start(eocd_offset - ZIP64_EOCD_LOCATOR_SIZE))
            .await?;
        reader.read_exact(&mut locator).await?;
        let zip64_eocd_offset = parse_zip64_eocd_locator(&locator)?;

        if zip64_eocd_offset > blob_size.saturating_sub(ZIP64_EOCD_SIZE) {
            return Err(ZipError::BadFormat(
                "ZIP64 EOCD offset out of range".to_string(),
            ));
        }
        let mut record = [0u8; ZIP64_EOCD_SIZE as usize];
        reader.seek(SeekFrom::Start(zip64_eocd_offset)).await?;
        reader.read_exact(&mut record).await?;
        let (total, size, offset) = parse_zip64_eocd_record(&record)?;
        entries_total = total;
        cd_size = size;
        cd_offset = offset;
    }

    if cd_offset >= blob_size || cd_size > blob_size - cd_offset {
        return Err(ZipError::BadFormat(
            "central directory extends beyond end of file".to_string(),
        ));
    }

    let mut slab = vec![0u8; cd_size as usize];
    reader.seek(SeekFrom::Start(cd_offset)).await?;
    reader.read_exact(&mut slab).await?;
    parse_central_directory(&slab, entries_total)
}
