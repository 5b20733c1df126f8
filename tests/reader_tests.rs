//! Reader tests over malformed blobs and hand-crafted archives exercising
//! paths the writer never produces (DEFLATE, CP437 names, 0x7075, foreign
//! methods, archive comments)

use std::io::{Cursor, Read, Write};
use zipstream::{StreamingZipWriter, ZipArchive, ZipError};

/// Craft a minimal one-entry archive: local header with known sizes (no
/// data descriptor), raw entry bytes, central directory, classic EOCD.
fn crafted_archive(
    name: &[u8],
    flags: u16,
    method: u16,
    data_crc: u32,
    raw: &[u8],
    uncompressed_len: u32,
    cd_extra: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::new();

    // local file header
    buf.extend_from_slice(&[0x50, 0x4b, 0x03, 0x04]);
    buf.extend_from_slice(&20u16.to_le_bytes()); // version needed
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&method.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // mod time
    buf.extend_from_slice(&0x0021u16.to_le_bytes()); // mod date 1980-01-01
    buf.extend_from_slice(&data_crc.to_le_bytes());
    buf.extend_from_slice(&(raw.len() as u32).to_le_bytes());
    buf.extend_from_slice(&uncompressed_len.to_le_bytes());
    buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // extra len
    buf.extend_from_slice(name);
    buf.extend_from_slice(raw);

    // central directory
    let cd_start = buf.len() as u32;
    buf.extend_from_slice(&[0x50, 0x4b, 0x01, 0x02]);
    buf.extend_from_slice(&20u16.to_le_bytes()); // version made by
    buf.extend_from_slice(&20u16.to_le_bytes()); // version needed
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&method.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // mod time
    buf.extend_from_slice(&0x0021u16.to_le_bytes()); // mod date
    buf.extend_from_slice(&data_crc.to_le_bytes());
    buf.extend_from_slice(&(raw.len() as u32).to_le_bytes());
    buf.extend_from_slice(&uncompressed_len.to_le_bytes());
    buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(cd_extra.len() as u16).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // comment len
    buf.extend_from_slice(&0u16.to_le_bytes()); // disk number start
    buf.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
    buf.extend_from_slice(&0u32.to_le_bytes()); // external attrs
    buf.extend_from_slice(&0u32.to_le_bytes()); // local header offset
    buf.extend_from_slice(name);
    buf.extend_from_slice(cd_extra);
    let cd_size = buf.len() as u32 - cd_start;

    // classic EOCD
    buf.extend_from_slice(&[0x50, 0x4b, 0x05, 0x06]);
    buf.extend_from_slice(&0u16.to_le_bytes()); // this disk
    buf.extend_from_slice(&0u16.to_le_bytes()); // disk with cd
    buf.extend_from_slice(&1u16.to_le_bytes()); // entries on disk
    buf.extend_from_slice(&1u16.to_le_bytes()); // total entries
    buf.extend_from_slice(&cd_size.to_le_bytes());
    buf.extend_from_slice(&cd_start.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // comment len
    buf
}

#[test]
fn invalid_blob_is_bad_format() {
    let err = ZipArchive::new(Cursor::new(vec![1u8, 2, 3, 4, 5])).unwrap_err();
    assert!(matches!(err, ZipError::BadFormat(_)));
}

#[test]
fn garbage_without_eocd_is_bad_format() {
    let err = ZipArchive::new(Cursor::new(vec![0xAAu8; 128])).unwrap_err();
    assert!(matches!(err, ZipError::BadFormat(_)));
}

#[test]
fn truncated_central_directory_is_bad_format() {
    let data = b"hello";
    let mut bytes = crafted_archive(
        b"a.txt",
        0,
        0,
        crc32fast::hash(data),
        data,
        data.len() as u32,
        &[],
    );
    // Lie about the central directory size in the EOCD
    let len = bytes.len();
    bytes[len - 10..len - 6].copy_from_slice(&0xFFFF0u32.to_le_bytes());
    let err = ZipArchive::new(Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, ZipError::BadFormat(_)));
}

#[test]
fn eocd_found_behind_archive_comment() {
    let mut writer = StreamingZipWriter::new(Vec::new());
    writer.start_entry("note.txt").unwrap();
    writer.write_data(b"behind a comment").unwrap();
    let mut bytes = writer.finish().unwrap();

    // Graft an archive comment onto the EOCD so the signature is no longer
    // in the last 22 bytes
    let comment = b"this archive has a trailing comment that pushes the EOCD forward";
    let len = bytes.len();
    bytes[len - 2..].copy_from_slice(&(comment.len() as u16).to_le_bytes());
    bytes.extend_from_slice(comment);

    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.entries()[0].name, "note.txt");
    assert_eq!(
        archive.read_entry_by_name("note.txt").unwrap(),
        b"behind a comment"
    );
}

#[test]
fn cp437_name_without_utf8_flag() {
    let data = b"legacy";
    let bytes = crafted_archive(
        &[0x82, b'.', b't', b'x', b't'], // 0x82 is e-acute in CP437
        0,
        0,
        crc32fast::hash(data),
        data,
        data.len() as u32,
        &[],
    );

    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.entries()[0].name, "é.txt");
    assert_eq!(archive.read_entry(0).unwrap(), data);
}

#[test]
fn unicode_path_extra_field_wins_over_cp437() {
    let data = b"renamed";
    let unicode_name = "файл.txt".as_bytes();
    let mut cd_extra = Vec::new();
    cd_extra.extend_from_slice(&0x7075u16.to_le_bytes());
    cd_extra.extend_from_slice(&((unicode_name.len() + 5) as u16).to_le_bytes());
    cd_extra.push(1); // version
    cd_extra.extend_from_slice(&crc32fast::hash(b"fail.txt").to_le_bytes());
    cd_extra.extend_from_slice(unicode_name);

    let bytes = crafted_archive(
        b"fail.txt",
        0,
        0,
        crc32fast::hash(data),
        data,
        data.len() as u32,
        &cd_extra,
    );

    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.entries()[0].name, "файл.txt");
    assert_eq!(archive.read_entry_by_name("файл.txt").unwrap(), data);
}

#[test]
fn deflate_entry_decodes() {
    let plain = b"The quick brown fox jumps over the lazy dog. ".repeat(64);
    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&plain).unwrap();
    let compressed = encoder.finish().unwrap();

    let bytes = crafted_archive(
        b"fox.txt",
        0,
        8,
        crc32fast::hash(&plain),
        &compressed,
        plain.len() as u32,
        &[],
    );

    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.entries()[0].compression_method, 8);
    assert_eq!(archive.entries()[0].compressed_size, compressed.len() as u64);
    assert_eq!(archive.read_entry(0).unwrap(), plain);

    // Streaming read decodes the same bytes
    let mut streamed = Vec::new();
    archive
        .read_entry_streaming(0)
        .unwrap()
        .read_to_end(&mut streamed)
        .unwrap();
    assert_eq!(streamed, plain);
}

#[test]
fn unsupported_method_listed_but_unreadable() {
    let raw = b"opaque";
    let bytes = crafted_archive(
        b"weird.bin",
        0,
        99,
        crc32fast::hash(raw),
        raw,
        raw.len() as u32,
        &[],
    );

    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.entries()[0].compression_method, 99);

    let err = archive.read_entry(0).unwrap_err();
    assert!(matches!(err, ZipError::UnsupportedCompression(99)));

    // Raw bytes are still reachable
    assert_eq!(archive.read_entry_raw(0).unwrap(), raw);
}

#[test]
fn missing_entry_name() {
    let data = b"hello";
    let bytes = crafted_archive(
        b"a.txt",
        0,
        0,
        crc32fast::hash(data),
        data,
        data.len() as u32,
        &[],
    );
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let err = archive.read_entry_by_name("b.txt").unwrap_err();
    assert!(matches!(err, ZipError::EntryNotFound(name) if name == "b.txt"));
}

#[test]
fn renaming_the_in_memory_view() {
    let data = b"hello";
    let bytes = crafted_archive(
        b"a.txt",
        0,
        0,
        crc32fast::hash(data),
        data,
        data.len() as u32,
        &[],
    );
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    archive.entries_mut()[0].name = "renamed.txt".to_string();
    assert_eq!(archive.read_entry_by_name("renamed.txt").unwrap(), data);
    assert!(archive.read_entry_by_name("a.txt").is_err());
}
