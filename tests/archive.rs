use std::fs;

use camino::Utf8PathBuf;

use ipdc_ldes_mirror::archive::Archive;
use ipdc_ldes_mirror::domain::{LocalPage, OriginPage};

fn archive_in(temp: &tempfile::TempDir) -> Archive {
    Archive::new(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap())
}

fn touch(archive: &Archive, name: &str) {
    fs::write(archive.root().join(name).as_std_path(), b"").unwrap();
}

#[test]
fn cursor_follows_highest_page_file() {
    let temp = tempfile::tempdir().unwrap();
    let archive = archive_in(&temp);
    for name in ["1.ttl", "3.ttl", "5.ttl"] {
        touch(&archive, name);
    }
    assert_eq!(archive.resolve_cursor().unwrap(), OriginPage::new(4));
}

#[test]
fn empty_archive_starts_at_origin_zero() {
    let temp = tempfile::tempdir().unwrap();
    let archive = archive_in(&temp);
    assert_eq!(archive.resolve_cursor().unwrap(), OriginPage::FIRST);
}

#[test]
fn foreign_files_count_as_first_page() {
    let temp = tempfile::tempdir().unwrap();
    let archive = archive_in(&temp);
    touch(&archive, "README.md");
    touch(&archive, ".page-abc.tmp");
    assert_eq!(archive.resolve_cursor().unwrap(), OriginPage::FIRST);

    touch(&archive, "2.ttl");
    assert_eq!(archive.resolve_cursor().unwrap(), OriginPage::new(1));
}

#[test]
fn list_pages_is_sorted_numerically() {
    let temp = tempfile::tempdir().unwrap();
    let archive = archive_in(&temp);
    for name in ["10.ttl", "2.ttl", "1.ttl", "notes.txt"] {
        touch(&archive, name);
    }
    let pages: Vec<u64> = archive
        .list_pages()
        .unwrap()
        .into_iter()
        .map(LocalPage::get)
        .collect();
    assert_eq!(pages, vec![1, 2, 10]);
}

#[test]
fn clear_removes_only_page_files() {
    let temp = tempfile::tempdir().unwrap();
    let archive = archive_in(&temp);
    for name in ["1.ttl", "2.ttl", "keep.txt"] {
        touch(&archive, name);
    }

    assert_eq!(archive.clear().unwrap(), 2);
    assert!(archive.list_pages().unwrap().is_empty());
    assert!(archive.root().join("keep.txt").exists());
    assert_eq!(archive.resolve_cursor().unwrap(), OriginPage::FIRST);
}

#[test]
fn write_creates_the_directory() {
    let temp = tempfile::tempdir().unwrap();
    let archive = Archive::new(
        Utf8PathBuf::from_path_buf(temp.path().join("data").join("ipdc-products")).unwrap(),
    );
    let path = archive
        .write_page(LocalPage::SENTINEL, b"<http://ex.org/s> <http://ex.org/p> \"x\" .\n")
        .unwrap();
    assert_eq!(path, archive.root().join("1.ttl"));
    assert_eq!(archive.list_pages().unwrap(), vec![LocalPage::SENTINEL]);
}
