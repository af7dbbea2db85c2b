use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::domain::{LocalPage, OriginPage};
use crate::error::MirrorError;

pub const PAGE_EXTENSION: &str = "ttl";

/// Directory of page files named `{local page}.ttl`.
#[derive(Debug, Clone)]
pub struct Archive {
    root: Utf8PathBuf,
}

impl Archive {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn page_path(&self, page: LocalPage) -> Utf8PathBuf {
        self.root.join(format!("{page}.{PAGE_EXTENSION}"))
    }

    pub fn ensure_root(&self) -> Result<(), MirrorError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| MirrorError::Filesystem(format!("create {}: {err}", self.root)))
    }

    /// Origin page to resume from: the one behind the highest-numbered file, which
    /// gets fetched and overwritten again. Files that are not page files count as
    /// page 1, so an empty or foreign-only directory resumes from origin page 0.
    pub fn resolve_cursor(&self) -> Result<OriginPage, MirrorError> {
        let highest = self
            .page_numbers()?
            .into_iter()
            .fold(1, u64::max);
        Ok(OriginPage::new(highest - 1))
    }

    /// Page files present, ascending.
    pub fn list_pages(&self) -> Result<Vec<LocalPage>, MirrorError> {
        let mut pages = self
            .entries()?
            .iter()
            .filter_map(|name| page_number(name))
            .filter_map(LocalPage::new)
            .collect::<Vec<_>>();
        pages.sort();
        pages.dedup();
        Ok(pages)
    }

    /// Replaces the file for `page` atomically.
    pub fn write_page(&self, page: LocalPage, content: &[u8]) -> Result<Utf8PathBuf, MirrorError> {
        self.ensure_root()?;
        let path = self.page_path(page);
        let mut temp = Builder::new()
            .prefix(".page-")
            .suffix(".tmp")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .and_then(|_| temp.flush())
            .map_err(|err| MirrorError::Filesystem(format!("write {path}: {err}")))?;
        temp.persist(path.as_std_path())
            .map_err(|err| MirrorError::Filesystem(format!("persist {path}: {}", err.error)))?;
        Ok(path)
    }

    pub fn read_page(&self, page: LocalPage) -> Result<String, MirrorError> {
        let path = self.page_path(page);
        fs::read_to_string(path.as_std_path())
            .map_err(|err| MirrorError::Filesystem(format!("read {path}: {err}")))
    }

    /// Removes every page file, leaving anything else in the directory alone.
    pub fn clear(&self) -> Result<usize, MirrorError> {
        let mut removed = 0;
        for entry in self.entries()? {
            if page_number(&entry).is_none() {
                continue;
            }
            let path = self.root.join(&entry);
            fs::remove_file(path.as_std_path())
                .map_err(|err| MirrorError::Filesystem(format!("remove {path}: {err}")))?;
            removed += 1;
        }
        Ok(removed)
    }

    fn page_numbers(&self) -> Result<Vec<u64>, MirrorError> {
        Ok(self
            .entries()?
            .iter()
            .map(|name| page_number(name).unwrap_or(1))
            .collect())
    }

    fn entries(&self) -> Result<Vec<String>, MirrorError> {
        let entries = match fs::read_dir(self.root.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(MirrorError::Filesystem(format!("list {}: {err}", self.root)));
            }
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| MirrorError::Filesystem(err.to_string()))?;
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }
}

/// Local page number encoded in a page file name, if it is one.
pub fn page_number(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(PAGE_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive_in(temp: &tempfile::TempDir) -> Archive {
        Archive::new(Utf8PathBuf::from_path_buf(temp.path().join("pages")).unwrap())
    }

    #[test]
    fn page_file_names() {
        assert_eq!(page_number("12.ttl"), Some(12));
        assert_eq!(page_number("0.ttl"), Some(0));
        assert_eq!(page_number("12.nq"), None);
        assert_eq!(page_number("abc.ttl"), None);
        assert_eq!(page_number(".ttl"), None);
        assert_eq!(page_number("+3.ttl"), None);
    }

    #[test]
    fn missing_directory_resumes_from_start() {
        let temp = tempfile::tempdir().unwrap();
        let archive = archive_in(&temp);
        assert_eq!(archive.resolve_cursor().unwrap(), OriginPage::FIRST);
        assert!(archive.list_pages().unwrap().is_empty());
    }

    #[test]
    fn write_replaces_existing_page() {
        let temp = tempfile::tempdir().unwrap();
        let archive = archive_in(&temp);
        let page = LocalPage::new(2).unwrap();
        archive.write_page(page, b"first").unwrap();
        let path = archive.write_page(page, b"second").unwrap();
        assert!(path.ends_with("2.ttl"));
        assert_eq!(archive.read_page(page).unwrap(), "second");
        assert_eq!(archive.list_pages().unwrap(), vec![page]);
    }
}
