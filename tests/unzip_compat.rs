use std::fs::File;
use std::process::Command;
use tempfile::tempdir;

// This test writes a ZIP using the library and then calls `unzip -t` to verify
// compatibility. If `unzip` is not present on the system, the test is skipped.

#[test]
fn unzip_compatibility() {
    use zipstream::{EntryOptions, StreamingZipWriter};

    // Check if `unzip` exists by trying to run `unzip -v`.
    let check = Command::new("unzip").arg("-v").output();
    if check.is_err() {
        eprintln!("skipping test: `unzip` not found");
        return;
    }

    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("compat.zip");

    // Create zip
    {
        let file = File::create(&zip_path).unwrap();
        let mut writer = StreamingZipWriter::new(file);
        writer.start_entry("hello.txt").unwrap();
        writer.write_data(b"hello from test").unwrap();
        writer.add_directory("nested", EntryOptions::new()).unwrap();
        writer.start_entry("nested/big.bin").unwrap();
        // write a moderate amount of data to ensure non-trivial archive
        for _ in 0..1024 {
            writer.write_data(&vec![0u8; 1024]).unwrap();
        }
        writer.finish().unwrap();
    }

    // Run `unzip -t` to test archive integrity
    let output = Command::new("unzip")
        .arg("-t")
        .arg(&zip_path)
        .output()
        .expect("failed to run unzip");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "unzip reported failure: {} {}",
        stdout,
        stderr
    );
}

// The reverse direction: an archive produced by the system `zip` must be
// readable by ZipArchive. Skipped if `zip` is not installed.

#[test]
fn zip_compatibility() {
    use zipstream::ZipArchive;

    let check = Command::new("zip").arg("-v").output();
    if check.is_err() {
        eprintln!("skipping test: `zip` not found");
        return;
    }

    let dir = tempdir().unwrap();
    let file_path = dir.path().join("payload.txt");
    std::fs::write(&file_path, b"made by infozip").unwrap();
    let zip_path = dir.path().join("foreign.zip");

    let status = Command::new("zip")
        .arg("-j") // junk paths, store just the file name
        .arg(&zip_path)
        .arg(&file_path)
        .status()
        .expect("failed to run zip");
    assert!(status.success());

    let mut archive = ZipArchive::open(&zip_path).unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.entries()[0].name, "payload.txt");
    assert_eq!(
        archive.read_entry_by_name("payload.txt").unwrap(),
        b"made by infozip"
    );
}
