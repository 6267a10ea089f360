//! Packer tests: page naming, compression choices, collision handling and
//! failure cleanup.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::{CompressionMethod, ZipArchive};

use cbx_unpack::{list_entries, Extractor, Packer};

const JPEG_PAGE: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
const PNG_PAGE: &[u8] = b"\x89PNG\r\n\x1a\nfake image payload";

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn archive_names(path: &Path) -> Vec<String> {
    let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..zip.len())
        .map(|index| zip.by_index(index).unwrap().name().to_string())
        .collect()
}

#[test]
fn test_pack_generates_ordered_page_names() {
    let temp = TempDir::new().unwrap();
    let pages = vec![
        write_file(temp.path(), "cover.png", PNG_PAGE),
        write_file(temp.path(), "middle.jpg", JPEG_PAGE),
        write_file(temp.path(), "back.png", PNG_PAGE),
    ];
    let extra = vec![write_file(temp.path(), "info.txt", b"credits")];
    let archive = temp.path().join("My Comic.cbz");

    let mut packer = Packer::new(pages, extra, &archive, "My Comic");
    packer.pack();
    assert!(packer.wait());

    let names = archive_names(&archive);
    assert_eq!(
        names,
        [
            "1 - My Comic.png",
            "2 - My Comic.jpg",
            "3 - My Comic.png",
            "info.txt"
        ]
    );
    // Page names sort lexically into page order
    let mut sorted = names[..3].to_vec();
    sorted.sort();
    assert_eq!(sorted, &names[..3]);

    let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
    {
        let entry = zip.by_name("1 - My Comic.png").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Stored);
    }
    {
        let entry = zip.by_name("info.txt").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
    }
    let mut bytes = Vec::new();
    zip.by_name("2 - My Comic.jpg")
        .unwrap()
        .read_to_end(&mut bytes)
        .unwrap();
    assert_eq!(bytes, JPEG_PAGE);
}

#[test]
fn test_pack_pads_numbers_to_page_count_width() {
    let temp = TempDir::new().unwrap();
    let pages: Vec<PathBuf> = (0..10)
        .map(|index| write_file(temp.path(), &format!("src{index}.png"), PNG_PAGE))
        .collect();
    let archive = temp.path().join("comic.cbz");

    let mut packer = Packer::new(pages, Vec::new(), &archive, "comic");
    packer.pack();
    assert!(packer.wait());

    let names = archive_names(&archive);
    assert_eq!(names.first().unwrap(), "01 - comic.png");
    assert_eq!(names.last().unwrap(), "10 - comic.png");
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(sorted, names);
}

#[test]
fn test_pack_prefixes_colliding_names() {
    let temp = TempDir::new().unwrap();
    let pages = vec![write_file(temp.path(), "page.png", PNG_PAGE)];
    let extra = vec![
        // Collides with the generated name of page one
        write_file(&temp.path().join("a"), "1 - comic.png", b"impostor"),
        write_file(&temp.path().join("b"), "notes.txt", b"first"),
        write_file(&temp.path().join("c"), "notes.txt", b"second"),
    ];
    let archive = temp.path().join("comic.cbz");

    let mut packer = Packer::new(pages, extra, &archive, "comic");
    packer.pack();
    assert!(packer.wait());

    assert_eq!(
        archive_names(&archive),
        ["1 - comic.png", "_1 - comic.png", "notes.txt", "_notes.txt"]
    );
}

#[test]
fn test_pack_failure_removes_partial_archive() {
    let temp = TempDir::new().unwrap();
    let pages = vec![
        write_file(temp.path(), "ok.png", PNG_PAGE),
        temp.path().join("never-created.png"),
    ];
    let archive = temp.path().join("comic.cbz");

    let mut packer = Packer::new(pages, Vec::new(), &archive, "comic");
    packer.pack();
    assert!(!packer.wait());
    assert!(!archive.exists());
}

#[test]
fn test_wait_without_pack_reports_failure() {
    let temp = TempDir::new().unwrap();
    let mut packer = Packer::new(Vec::new(), Vec::new(), temp.path().join("x.cbz"), "x");
    assert!(!packer.wait());
}

#[test]
fn test_packed_archive_round_trips_through_extraction() {
    let temp = TempDir::new().unwrap();
    let pages = vec![
        write_file(temp.path(), "one.png", PNG_PAGE),
        write_file(temp.path(), "two.jpg", JPEG_PAGE),
    ];
    let extra = vec![write_file(temp.path(), "credits.txt", b"drawn by hand")];
    let archive = temp.path().join("comic.cbz");

    let mut packer = Packer::new(pages, extra, &archive, "comic");
    packer.pack();
    assert!(packer.wait());

    assert_eq!(
        list_entries(&archive).unwrap(),
        ["1 - comic.png", "2 - comic.jpg", "credits.txt"]
    );

    let out = temp.path().join("out");
    let mut session = Extractor::setup(&archive, &out).unwrap();
    session.extract();
    for name in session.get_files() {
        assert!(session.wait_until_ready(&name));
    }
    assert_eq!(fs::read(out.join("1 - comic.png")).unwrap(), PNG_PAGE);
    assert_eq!(fs::read(out.join("2 - comic.jpg")).unwrap(), JPEG_PAGE);
    assert_eq!(fs::read(out.join("credits.txt")).unwrap(), b"drawn by hand");
}
