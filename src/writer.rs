//! Streaming ZIP writer that emits archive bytes on-the-fly without temp files
//!
//! The writer never seeks: entry sizes and CRCs are unknown when the local
//! header goes out, so every entry uses the data-descriptor form (general
//! purpose flag bit 3) and the real numbers trail the data. The archive
//! offset is a running 64-bit counter, which makes the writer usable
//! against pure streams (sockets, pipes, Vec<u8>).
//!
//! ZIP64 promotion happens on-the-fly: per entry when any of its sizes or
//! its local header offset overflow 32 bits, and for the archive as a whole
//! when any entry is ZIP64 or the central directory itself overflows.

use crate::error::{Result, ZipError};
use crate::format::{
    DosDateTime, CENTRAL_DIRECTORY_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE,
    END_OF_CENTRAL_DIRECTORY_SIGNATURE, FLAG_DATA_DESCRIPTOR, FLAG_UTF8,
    LOCAL_FILE_HEADER_SIGNATURE, METHOD_STORED, U16_SENTINEL, U32_SENTINEL, VERSION_DEFAULT,
    VERSION_ZIP64, ZIP64_EOCD_LOCATOR_SIGNATURE, ZIP64_EOCD_SIGNATURE, ZIP64_EXTRA_FIELD_ID,
};
use crc32fast::Hasher as Crc32;
use std::io::{Read, Write};
use std::time::SystemTime;

/// Per-entry metadata supplied at `start_entry` time.
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    pub(crate) last_modified: Option<SystemTime>,
    pub(crate) directory: bool,
    pub(crate) comment: String,
}

impl EntryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the last-modified timestamp. The default is the current time.
    /// Stored with MS-DOS 2-second resolution, clamped to 1980..=2107.
    #[must_use]
    pub fn last_modified(mut self, t: SystemTime) -> Self {
        self.last_modified = Some(t);
        self
    }

    /// Mark the entry as a directory. Directory names get a trailing `/`
    /// and carry no data.
    #[must_use]
    pub fn directory(mut self, directory: bool) -> Self {
        self.directory = directory;
        self
    }

    /// Set the entry comment recorded in the central directory.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// Entry bookkeeping kept for the central directory
pub(crate) struct EntryRecord {
    pub(crate) name: String,
    pub(crate) comment: String,
    pub(crate) local_header_offset: u64,
    pub(crate) crc32: u32,
    pub(crate) compressed_size: u64,
    pub(crate) uncompressed_size: u64,
    pub(crate) dos: DosDateTime,
    pub(crate) directory: bool,
}

impl EntryRecord {
    /// An entry is ZIP64 iff any of its three 64-bit quantities overflow
    /// the classic 32-bit fields.
    pub(crate) fn zip64(&self) -> bool {
        self.compressed_size > u32::MAX as u64
            || self.uncompressed_size > u32::MAX as u64
            || self.local_header_offset > u32::MAX as u64
    }
}

/// Metadata tracker for CRC and byte count. Stored entries forward bytes
/// unchanged, so one counter covers both the compressed and uncompressed
/// lengths.
pub(crate) struct CrcCounter {
    crc: Crc32,
    pub(crate) count: u64,
}

impl CrcCounter {
    pub(crate) fn new() -> Self {
        Self {
            crc: Crc32::new(),
            count: 0,
        }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        self.crc.update(data);
        self.count += data.len() as u64;
    }

    pub(crate) fn finalize(&self) -> u32 {
        self.crc.clone().finalize()
    }
}

pub(crate) struct CurrentEntry {
    pub(crate) name: String,
    pub(crate) comment: String,
    pub(crate) local_header_offset: u64,
    pub(crate) counter: CrcCounter,
    pub(crate) dos: DosDateTime,
    pub(crate) directory: bool,
}

/// Streaming ZIP writer over any `Write` sink
pub struct StreamingZipWriter<W: Write> {
    output: W,
    offset: u64,
    entries: Vec<EntryRecord>,
    current_entry: Option<CurrentEntry>,
}

impl<W: Write> StreamingZipWriter<W> {
    /// Create a new ZIP writer over an arbitrary sink
    pub fn new(output: W) -> Self {
        Self {
            output,
            offset: 0,
            entries: Vec::new(),
            current_entry: None,
        }
    }

    /// Start a new entry (file) in the ZIP
    pub fn start_entry(&mut self, name: &str) -> Result<()> {
        self.start_entry_with_options(name, EntryOptions::default())
    }

    /// Start a new entry with explicit metadata
    ///
    /// Finishes the previous entry (emitting its data descriptor) if one is
    /// still open. The name is trimmed of surrounding whitespace; directory
    /// entries are forced to end with `/`. A name already present in the
    /// archive fails with [`ZipError::DuplicateName`].
    pub fn start_entry_with_options(&mut self, name: &str, options: EntryOptions) -> Result<()> {
        self.finish_current_entry()?;

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
        self.emit(&header)?;

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
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
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

        self.output.write_all(data)?;
        self.offset += data.len() as u64;
        Ok(())
    }

    /// Add a whole entry by draining a source stream
    pub fn add_entry<R: Read>(
        &mut self,
        name: &str,
        options: EntryOptions,
        mut source: R,
    ) -> Result<()> {
        self.start_entry_with_options(name, options)?;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.write_data(&buf[..n])?;
        }
        Ok(())
    }

    /// Add a directory entry
    pub fn add_directory(&mut self, name: &str, options: EntryOptions) -> Result<()> {
        self.start_entry_with_options(name, options.directory(true))
    }

    /// Finish current entry and write its data descriptor
    fn finish_current_entry(&mut self) -> Result<()> {
        if let Some(entry) = self.current_entry.take() {
            let crc = entry.counter.finalize();
            let size = entry.counter.count;
            let zip64 = size > u32::MAX as u64 || entry.local_header_offset > u32::MAX as u64;

            let descriptor = data_descriptor_bytes(crc, size, size, zip64);
            self.emit(&descriptor)?;

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
    /// flush, and return the sink
    pub fn finish(mut self) -> Result<W> {
        self.finish_current_entry()?;

        let central_dir_offset = self.offset;
        let entries = std::mem::take(&mut self.entries);

        for entry in &entries {
            let header = central_header_bytes(entry);
            self.emit(&header)?;
        }

        let central_dir_size = self.offset - central_dir_offset;

        let need_zip64 = entries.iter().any(|e| e.zip64())
            || entries.len() > u16::MAX as usize
            || central_dir_size > u32::MAX as u64
            || central_dir_offset > u32::MAX as u64;

        if need_zip64 {
            let terminators =
                zip64_eocd_bytes(entries.len() as u64, central_dir_size, central_dir_offset);
            self.emit(&terminators)?;
        }

        let eocd = eocd_bytes(need_zip64, entries.len(), central_dir_size, central_dir_offset);
        self.emit(&eocd)?;

        self.output.flush()?;
        Ok(self.output)
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.output.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }
}

/// Local file header: CRC and sizes are zero placeholders, the real values
/// follow the data in the descriptor (flag bit 3). Bit 11 marks the name
/// bytes as UTF-8.
pub(crate) fn local_header_bytes(name: &[u8], dos: DosDateTime, local_offset: u64) -> Vec<u8> {
    // Sizes are unknown here, so the offset is the only ZIP64 signal
    // available for version-needed.
    let version = if local_offset > u32::MAX as u64 {
        VERSION_ZIP64
    } else {
        VERSION_DEFAULT
    };
    let flags = FLAG_DATA_DESCRIPTOR | FLAG_UTF8;

    let mut buf = Vec::with_capacity(30 + name.len());
    buf.extend_from_slice(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
    buf.extend_from_slice(&version.to_le_bytes());
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&METHOD_STORED.to_le_bytes());
    buf.extend_from_slice(&dos.timepart().to_le_bytes());
    buf.extend_from_slice(&dos.datepart().to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // crc32 placeholder
    buf.extend_from_slice(&0u32.to_le_bytes()); // compressed size placeholder
    buf.extend_from_slice(&0u32.to_le_bytes()); // uncompressed size placeholder
    buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // extra len
    buf.extend_from_slice(name);
    buf
}

/// Data descriptor: 16 bytes with 32-bit sizes, or 24 bytes with 64-bit
/// sizes when the entry is ZIP64.
pub(crate) fn data_descriptor_bytes(
    crc: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    zip64: bool,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24);
    buf.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
    buf.extend_from_slice(&crc.to_le_bytes());
    if zip64 {
        buf.extend_from_slice(&compressed_size.to_le_bytes());
        buf.extend_from_slice(&uncompressed_size.to_le_bytes());
    } else {
        buf.extend_from_slice(&(compressed_size as u32).to_le_bytes());
        buf.extend_from_slice(&(uncompressed_size as u32).to_le_bytes());
    }
    buf
}

/// Central directory header for one entry, including the variable-length
/// ZIP64 extra field. Each 64-bit field is present iff its classic
/// counterpart holds the sentinel, in the order uncompressed, compressed,
/// offset.
pub(crate) fn central_header_bytes(entry: &EntryRecord) -> Vec<u8> {
    let version = if entry.zip64() {
        VERSION_ZIP64
    } else {
        VERSION_DEFAULT
    };
    let flags = FLAG_DATA_DESCRIPTOR | FLAG_UTF8;

    let mut extra_data: Vec<u8> = Vec::new();
    if entry.uncompressed_size > u32::MAX as u64 {
        extra_data.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
    }
    if entry.compressed_size > u32::MAX as u64 {
        extra_data.extend_from_slice(&entry.compressed_size.to_le_bytes());
    }
    if entry.local_header_offset > u32::MAX as u64 {
        extra_data.extend_from_slice(&entry.local_header_offset.to_le_bytes());
    }
    let mut extra_field: Vec<u8> = Vec::new();
    if !extra_data.is_empty() {
        extra_field.extend_from_slice(&ZIP64_EXTRA_FIELD_ID.to_le_bytes());
        extra_field.extend_from_slice(&(extra_data.len() as u16).to_le_bytes());
        extra_field.extend_from_slice(&extra_data);
    }

    let name = entry.name.as_bytes();
    let comment = entry.comment.as_bytes();
    let external_attrs: u32 = if entry.directory { 0x10 } else { 0 };

    let mut buf = Vec::with_capacity(46 + name.len() + extra_field.len() + comment.len());
    buf.extend_from_slice(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
    buf.extend_from_slice(&version.to_le_bytes()); // version made by
    buf.extend_from_slice(&version.to_le_bytes()); // version needed
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&METHOD_STORED.to_le_bytes());
    buf.extend_from_slice(&entry.dos.timepart().to_le_bytes());
    buf.extend_from_slice(&entry.dos.datepart().to_le_bytes());
    buf.extend_from_slice(&entry.crc32.to_le_bytes());
    if entry.compressed_size > u32::MAX as u64 {
        buf.extend_from_slice(&U32_SENTINEL.to_le_bytes());
    } else {
        buf.extend_from_slice(&(entry.compressed_size as u32).to_le_bytes());
    }
    if entry.uncompressed_size > u32::MAX as u64 {
        buf.extend_from_slice(&U32_SENTINEL.to_le_bytes());
    } else {
        buf.extend_from_slice(&(entry.uncompressed_size as u32).to_le_bytes());
    }
    buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(extra_field.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(comment.len() as u16).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // disk number start
    buf.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
    buf.extend_from_slice(&external_attrs.to_le_bytes());
    if entry.local_header_offset > u32::MAX as u64 {
        buf.extend_from_slice(&U32_SENTINEL.to_le_bytes());
    } else {
        buf.extend_from_slice(&(entry.local_header_offset as u32).to_le_bytes());
    }
    buf.extend_from_slice(name);
    buf.extend_from_slice(&extra_field);
    buf.extend_from_slice(comment);
    buf
}

/// ZIP64 EOCD record (56 bytes) followed by its locator (20 bytes). The
/// record sits directly after the central directory, which is where the
/// locator points.
pub(crate) fn zip64_eocd_bytes(count: u64, cd_size: u64, cd_offset: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(76);
    buf.extend_from_slice(&ZIP64_EOCD_SIGNATURE.to_le_bytes());
    buf.extend_from_slice(&44u64.to_le_bytes()); // size of remaining record
    buf.extend_from_slice(&VERSION_ZIP64.to_le_bytes()); // version made by
    buf.extend_from_slice(&VERSION_ZIP64.to_le_bytes()); // version needed
    buf.extend_from_slice(&0u32.to_le_bytes()); // this disk
    buf.extend_from_slice(&0u32.to_le_bytes()); // disk with central dir
    buf.extend_from_slice(&count.to_le_bytes()); // entries on this disk
    buf.extend_from_slice(&count.to_le_bytes()); // total entries
    buf.extend_from_slice(&cd_size.to_le_bytes());
    buf.extend_from_slice(&cd_offset.to_le_bytes());

    let zip64_eocd_offset = cd_offset + cd_size;
    buf.extend_from_slice(&ZIP64_EOCD_LOCATOR_SIGNATURE.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // disk with ZIP64 EOCD
    buf.extend_from_slice(&zip64_eocd_offset.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes()); // total disks
    buf
}

/// Classic EOCD (22 bytes, no archive comment). Always written, with
/// sentinels in every count/size/offset field when the archive is ZIP64.
pub(crate) fn eocd_bytes(zip64: bool, count: usize, cd_size: u64, cd_offset: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(22);
    buf.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // this disk
    buf.extend_from_slice(&0u16.to_le_bytes()); // disk with central dir
    if zip64 {
        buf.extend_from_slice(&U16_SENTINEL.to_le_bytes());
        buf.extend_from_slice(&U16_SENTINEL.to_le_bytes());
        buf.extend_from_slice(&U32_SENTINEL.to_le_bytes());
        buf.extend_from_slice(&U32_SENTINEL.to_le_bytes());
    } else {
        buf.extend_from_slice(&(count as u16).to_le_bytes());
        buf.extend_from_slice(&(count as u16).to_le_bytes());
        buf.extend_from_slice(&(cd_size as u32).to_le_bytes());
        buf.extend_from_slice(&(cd_offset as u32).to_le_bytes());
    }
    buf.extend_from_slice(&0u16.to_le_bytes()); // comment len
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(compressed: u64, uncompressed: u64, offset: u64) -> EntryRecord {
        EntryRecord {
            name: "a".to_string(),
            comment: String::new(),
            local_header_offset: offset,
            crc32: 0,
            compressed_size: compressed,
            uncompressed_size: uncompressed,
            dos: DosDateTime::EPOCH,
            directory: false,
        }
    }

    #[test]
    fn descriptor_widths() {
        assert_eq!(data_descriptor_bytes(1, 2, 2, false).len(), 16);
        assert_eq!(data_descriptor_bytes(1, 2, 2, true).len(), 24);
    }

    #[test]
    fn zip64_extra_is_positional() {
        // Only the offset overflows: extra field is tag + len + one u64
        let header = central_header_bytes(&record(5, 5, u32::MAX as u64 + 1));
        let extra_len = u16::from_le_bytes([header[30], header[31]]);
        assert_eq!(extra_len, 12);
        // Classic offset field holds the sentinel
        assert_eq!(&header[42..46], &U32_SENTINEL.to_le_bytes());

        // All three overflow: 4 + 24
        let header = central_header_bytes(&record(
            u32::MAX as u64 + 1,
            u32::MAX as u64 + 2,
            u32::MAX as u64 + 3,
        ));
        let extra_len = u16::from_le_bytes([header[30], header[31]]);
        assert_eq!(extra_len, 28);
    }

    #[test]
    fn eocd_sentinels_when_promoted() {
        let eocd = eocd_bytes(true, 3, 100, 200);
        assert_eq!(&eocd[8..12], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&eocd[12..16], &U32_SENTINEL.to_le_bytes());
        assert_eq!(&eocd[16..20], &U32_SENTINEL.to_le_bytes());
    }
}
