//! Lazy ZIP reader over random-access blobs
//!
//! Opening an archive locates the end-of-central-directory record by
//! tail-scanning, follows the ZIP64 locator when present, and decodes the
//! central directory into a list of entry handles. Entry data is fetched
//! lazily: nothing past the central directory is read until a read call,
//! and every read re-resolves from the blob so repeated reads are
//! independent and idempotent.
//!
//! The pure parsing helpers live here and are shared with the async reader.

use crate::error::{Result, ZipError};
use crate::format::{
    cp437_to_string, decode_text, find_extra_field, unicode_path, DosDateTime,
    CENTRAL_DIRECTORY_SIGNATURE, END_OF_CENTRAL_DIRECTORY_SIGNATURE, EOCD_MIN_SIZE,
    EOCD_SEARCH_MAX, FLAG_ENCRYPTED, FLAG_UTF8, LOCAL_FILE_HEADER_SIGNATURE, METHOD_DEFLATED,
    METHOD_STORED, U16_SENTINEL, U32_SENTINEL, ZIP64_EOCD_LOCATOR_SIGNATURE,
    ZIP64_EOCD_LOCATOR_SIZE, ZIP64_EOCD_SIGNATURE, ZIP64_EOCD_SIZE, ZIP64_EXTRA_FIELD_ID,
};
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::SystemTime;

/// Entry in the ZIP central directory
///
/// `name` and `last_modified` are plain fields; assigning them changes only
/// this in-memory view, never the underlying blob.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub comment: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_method: u16,
    pub crc32: u32,
    /// Offset of the entry's local file header within the blob
    pub offset: u64,
    pub last_modified: SystemTime,
    pub(crate) flags: u16,
    pub(crate) external_attrs: u32,
    pub(crate) zip64: bool,
    pub(crate) data_start: Option<u64>,
}

impl ZipEntry {
    /// Directory entries carry external attribute bit 4, or are empty with
    /// a `/`-terminated name.
    pub fn directory(&self) -> bool {
        self.external_attrs & 0x10 != 0
            || (self.uncompressed_size == 0 && self.name.ends_with('/'))
    }

    pub fn encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Whether the classic uncompressed-size field held the ZIP64 sentinel
    pub fn zip64(&self) -> bool {
        self.zip64
    }
}

/// Lazy ZIP archive reader over any `Read + Seek` blob
#[derive(Debug)]
pub struct ZipArchive<R: Read + Seek> {
    reader: BufReader<R>,
    entries: Vec<ZipEntry>,
}

impl ZipArchive<File> {
    /// Open a ZIP file and read its central directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(File::open(path)?)
    }
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Read the central directory of `reader` and build entry handles
    pub fn new(reader: R) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let entries = read_central_directory(&mut reader)?;
        Ok(ZipArchive { reader, entries })
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
    pub fn read_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut stream = self.read_entry_streaming(index)?;
        stream.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Read an entry's decompressed data by name
    pub fn read_entry_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let index = self.index_of(name)?;
        self.read_entry(index)
    }

    /// Read an entry's decompressed data as text
    pub fn read_entry_text(&mut self, index: usize) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.read_entry(index)?).into_owned())
    }

    pub fn read_entry_text_by_name(&mut self, name: &str) -> Result<String> {
        let index = self.index_of(name)?;
        self.read_entry_text(index)
    }

    /// Read an entry's raw stored bytes, without decompressing
    pub fn read_entry_raw(&mut self, index: usize) -> Result<Vec<u8>> {
        let mut reader = self.raw_reader(index)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    }

    pub fn read_entry_raw_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let index = self.index_of(name)?;
        self.read_entry_raw(index)
    }

    /// Get a streaming reader that decompresses on-the-fly (for large
    /// entries). Calling this again restarts from the beginning of the
    /// entry and yields the same bytes.
    pub fn read_entry_streaming(&mut self, index: usize) -> Result<Box<dyn Read + '_>> {
        let method = self.entry_checked(index)?.compression_method;
        match method {
            METHOD_STORED => Ok(Box::new(self.raw_reader(index)?)),
            METHOD_DEFLATED => Ok(Box::new(DeflateDecoder::new(self.raw_reader(index)?))),
            other => Err(ZipError::UnsupportedCompression(other)),
        }
    }

    pub fn read_entry_streaming_by_name(&mut self, name: &str) -> Result<Box<dyn Read + '_>> {
        let index = self.index_of(name)?;
        self.read_entry_streaming(index)
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| ZipError::EntryNotFound(name.to_string()))
    }

    fn entry_checked(&self, index: usize) -> Result<&ZipEntry> {
        self.entries
            .get(index)
            .ok_or_else(|| ZipError::EntryNotFound(format!("entry #{}", index)))
    }

    /// Resolve where the entry's stored bytes begin, caching the result.
    ///
    /// The local header's name/extra lengths are independent of the central
    /// directory's fields and must be read from the local header itself.
    fn data_start(&mut self, index: usize) -> Result<u64> {
        let offset = {
            let entry = self.entry_checked(index)?;
            if let Some(start) = entry.data_start {
                return Ok(start);
            }
            entry.offset
        };

        self.reader.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; 30];
        self.reader.read_exact(&mut header)?;
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

    fn raw_reader(&mut self, index: usize) -> Result<std::io::Take<&mut BufReader<R>>> {
        let start = self.data_start(index)?;
        let length = self.entries[index].compressed_size;
        self.reader.seek(SeekFrom::Start(start))?;
        Ok((&mut self.reader).take(length))
    }
}

/// Locate and decode the central directory of a blob
fn read_central_directory<R: Read + Seek>(reader: &mut BufReader<R>) -> Result<Vec<ZipEntry>> {
    let blob_size = reader.seek(SeekFrom::End(0))?;
    if blob_size < EOCD_MIN_SIZE {
        return Err(ZipError::BadFormat(
            "file too small for a ZIP archive".to_string(),
        ));
    }

    // Fast path: an archive without a trailing comment has its EOCD in the
    // last 22 bytes. Fall back to scanning the maximal comment window.
    let mut tail = vec![0u8; EOCD_MIN_SIZE as usize];
    reader.seek(SeekFrom::Start(blob_size - EOCD_MIN_SIZE))?;
    reader.read_exact(&mut tail)?;

    let (tail_start, eocd_index) = match find_eocd_in_tail(&tail) {
        Some(i) => (blob_size - EOCD_MIN_SIZE, i),
        None => {
            let tail_len = EOCD_SEARCH_MAX.min(blob_size);
            let tail_start = blob_size - tail_len;
            tail = vec![0u8; tail_len as usize];
            reader.seek(SeekFrom::Start(tail_start))?;
            reader.read_exact(&mut tail)?;
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
        reader.seek(SeekFrom::Start(eocd_offset - ZIP64_EOCD_LOCATOR_SIZE))?;
        reader.read_exact(&mut locator)?;
        let zip64_eocd_offset = parse_zip64_eocd_locator(&locator)?;

        if zip64_eocd_offset > blob_size.saturating_sub(ZIP64_EOCD_SIZE) {
            return Err(ZipError::BadFormat(
                "ZIP64 EOCD offset out of range".to_string(),
            ));
        }
        let mut record = [0u8; ZIP64_EOCD_SIZE as usize];
        reader.seek(SeekFrom::Start(zip64_eocd_offset))?;
        reader.read_exact(&mut record)?;
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
    reader.seek(SeekFrom::Start(cd_offset))?;
    reader.read_exact(&mut slab)?;
    parse_central_directory(&slab, entries_total)
}

/// Scan a tail buffer backward for the EOCD signature. The match at the
/// greatest offset is authoritative.
pub(crate) fn find_eocd_in_tail(tail: &[u8]) -> Option<usize> {
    if tail.len() < EOCD_MIN_SIZE as usize {
        return None;
    }
    let mut i = tail.len() - EOCD_MIN_SIZE as usize;
    loop {
        if le_u32(tail, i) == END_OF_CENTRAL_DIRECTORY_SIGNATURE {
            return Some(i);
        }
        if i == 0 {
            return None;
        }
        i -= 1;
    }
}

pub(crate) struct EocdFields {
    pub(crate) entries_total: u64,
    pub(crate) cd_size: u64,
    pub(crate) cd_offset: u64,
    pub(crate) zip64: bool,
}

/// Decode the classic EOCD. `buf` starts at the signature and holds at
/// least 22 bytes.
pub(crate) fn parse_eocd(buf: &[u8]) -> EocdFields {
    let entries_16 = le_u16(buf, 10);
    let cd_size_32 = le_u32(buf, 12);
    let cd_offset_32 = le_u32(buf, 16);
    EocdFields {
        entries_total: entries_16 as u64,
        cd_size: cd_size_32 as u64,
        cd_offset: cd_offset_32 as u64,
        zip64: entries_16 == U16_SENTINEL
            || cd_size_32 == U32_SENTINEL
            || cd_offset_32 == U32_SENTINEL,
    }
}

/// Decode the ZIP64 EOCD locator and return the ZIP64 EOCD record offset
pub(crate) fn parse_zip64_eocd_locator(buf: &[u8]) -> Result<u64> {
    if buf.len() < ZIP64_EOCD_LOCATOR_SIZE as usize
        || le_u32(buf, 0) != ZIP64_EOCD_LOCATOR_SIGNATURE
    {
        return Err(ZipError::BadFormat(
            "ZIP64 EOCD locator not found".to_string(),
        ));
    }
    Ok(le_u64(buf, 8))
}

/// Decode the ZIP64 EOCD record: (total entries, cd size, cd offset)
pub(crate) fn parse_zip64_eocd_record(buf: &[u8]) -> Result<(u64, u64, u64)> {
    if buf.len() < ZIP64_EOCD_SIZE as usize || le_u32(buf, 0) != ZIP64_EOCD_SIGNATURE {
        return Err(ZipError::BadFormat(
            "invalid ZIP64 EOCD signature".to_string(),
        ));
    }
    Ok((le_u64(buf, 32), le_u64(buf, 40), le_u64(buf, 48)))
}

/// Walk a central-directory slab and decode every entry header
pub(crate) fn parse_central_directory(slab: &[u8], entries_total: u64) -> Result<Vec<ZipEntry>> {
    let mut entries = Vec::with_capacity(entries_total.min(65536) as usize);
    let mut pos = 0usize;

    for _ in 0..entries_total {
        if pos + 46 > slab.len() {
            return Err(ZipError::BadFormat(
                "central directory truncated".to_string(),
            ));
        }
        if le_u32(slab, pos) != CENTRAL_DIRECTORY_SIGNATURE {
            return Err(ZipError::BadFormat(
                "invalid central directory signature".to_string(),
            ));
        }

        let flags = le_u16(slab, pos + 8);
        let compression_method = le_u16(slab, pos + 10);
        let timepart = le_u16(slab, pos + 12);
        let datepart = le_u16(slab, pos + 14);
        let crc32 = le_u32(slab, pos + 16);
        let compressed_32 = le_u32(slab, pos + 20);
        let uncompressed_32 = le_u32(slab, pos + 24);
        let name_len = le_u16(slab, pos + 28) as usize;
        let extra_len = le_u16(slab, pos + 30) as usize;
        let comment_len = le_u16(slab, pos + 32) as usize;
        let external_attrs = le_u32(slab, pos + 38);
        let offset_32 = le_u32(slab, pos + 42);

        let end = pos + 46 + name_len + extra_len + comment_len;
        if end > slab.len() {
            return Err(ZipError::BadFormat(
                "central directory entry extends beyond directory".to_string(),
            ));
        }
        let name_raw = &slab[pos + 46..pos + 46 + name_len];
        let extra = &slab[pos + 46 + name_len..pos + 46 + name_len + extra_len];
        let comment_raw = &slab[pos + 46 + name_len + extra_len..end];

        let mut compressed_size = compressed_32 as u64;
        let mut uncompressed_size = uncompressed_32 as u64;
        let mut offset = offset_32 as u64;

        if compressed_32 == U32_SENTINEL
            || uncompressed_32 == U32_SENTINEL
            || offset_32 == U32_SENTINEL
        {
            let field = find_extra_field(extra, ZIP64_EXTRA_FIELD_ID).ok_or_else(|| {
                ZipError::BadFormat("missing ZIP64 extra field".to_string())
            })?;
            // Positional layout: a 64-bit value is present iff its classic
            // field holds the sentinel, in the order uncompressed,
            // compressed, offset.
            let mut cur = 0usize;
            if uncompressed_32 == U32_SENTINEL {
                if cur + 8 > field.len() {
                    return Err(ZipError::BadFormat(
                        "truncated ZIP64 extra field".to_string(),
                    ));
                }
                uncompressed_size = le_u64(field, cur);
                cur += 8;
            }
            if compressed_32 == U32_SENTINEL {
                if cur + 8 > field.len() {
                    return Err(ZipError::BadFormat(
                        "truncated ZIP64 extra field".to_string(),
                    ));
                }
                compressed_size = le_u64(field, cur);
                cur += 8;
            }
            if offset_32 == U32_SENTINEL {
                if cur + 8 > field.len() {
                    return Err(ZipError::BadFormat(
                        "truncated ZIP64 extra field".to_string(),
                    ));
                }
                offset = le_u64(field, cur);
            }
        }

        let utf8 = flags & FLAG_UTF8 != 0;
        let name = if utf8 {
            decode_text(name_raw, true)
        } else if let Some(unicode) = unicode_path(extra) {
            unicode
        } else {
            cp437_to_string(name_raw)
        };
        let comment = decode_text(comment_raw, utf8);

        let dos = DosDateTime::from_parts(datepart, timepart);

        entries.push(ZipEntry {
            name,
            comment,
            compressed_size,
            uncompressed_size,
            compression_method,
            crc32,
            offset,
            last_modified: dos.to_system_time(),
            flags,
            external_attrs,
            zip64: uncompressed_32 == U32_SENTINEL,
            data_start: None,
        });
        pos = end;
    }

    Ok(entries)
}

pub(crate) fn le_u16(buf: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([buf[pos], buf[pos + 1]])
}

pub(crate) fn le_u32(buf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}

pub(crate) fn le_u64(buf: &[u8], pos: usize) -> u64 {
    u64::from_le_bytes([
        buf[pos],
        buf[pos + 1],
        buf[pos + 2],
        buf[pos + 3],
        buf[pos + 4],
        buf[pos + 5],
        buf[pos + 6],
        buf[pos + 7],
    ])
}
