use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::archive::Archive;
use crate::domain::{LocalPage, OriginPage};
use crate::error::MirrorError;
use crate::feed::FeedClient;
use crate::page::FeedPage;
use crate::rdf::RdfConverter;

/// Absolute base the converter resolves relative links against; swapped back
/// for `./` in the serialized output.
pub const PLACEHOLDER_BASE: &str = "http://replace-me-with-relative-path/";

/// Resume point plus the single-run flag, shared by every trigger source.
#[derive(Debug)]
pub struct ImportState {
    cursor: Mutex<OriginPage>,
    busy: AtomicBool,
}

impl ImportState {
    pub fn new(cursor: OriginPage) -> Arc<Self> {
        Arc::new(Self {
            cursor: Mutex::new(cursor),
            busy: AtomicBool::new(false),
        })
    }

    pub fn cursor(&self) -> OriginPage {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claims the run slot, or reports that a run is already active.
    pub fn try_start(self: &Arc<Self>) -> Result<RunGuard, MirrorError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MirrorError::ImportInProgress)?;
        Ok(RunGuard {
            state: Arc::clone(self),
        })
    }
}

/// Held for the duration of one run. The only handle that moves the cursor;
/// releases the run slot when dropped.
#[derive(Debug)]
pub struct RunGuard {
    state: Arc<ImportState>,
}

impl RunGuard {
    pub fn cursor(&self) -> OriginPage {
        self.state.cursor()
    }

    pub fn advance_to(&self, page: OriginPage) {
        *self
            .state
            .cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = page;
    }

    pub fn finish(self) {}
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.state.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub origin_page: OriginPage,
    pub local_page: LocalPage,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: String,
    pub start_page: OriginPage,
    pub cursor: OriginPage,
    pub pages: Vec<PageReport>,
}

pub struct Importer<F: FeedClient, C: RdfConverter> {
    feed: F,
    converter: C,
    archive: Archive,
    state: Arc<ImportState>,
}

impl<F: FeedClient, C: RdfConverter> Importer<F, C> {
    pub fn new(feed: F, converter: C, archive: Archive, cursor: OriginPage) -> Self {
        Self {
            feed,
            converter,
            archive,
            state: ImportState::new(cursor),
        }
    }

    /// Starts from whatever the archive already holds.
    pub fn resume(feed: F, converter: C, archive: Archive) -> Result<Self, MirrorError> {
        let cursor = archive.resolve_cursor()?;
        info!(archive = %archive.root(), cursor = %cursor, "resuming from archive");
        Ok(Self::new(feed, converter, archive, cursor))
    }

    pub fn state(&self) -> &Arc<ImportState> {
        &self.state
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Runs one import on the calling thread.
    pub fn trigger(&self) -> Result<RunReport, MirrorError> {
        let guard = self.state.try_start()?;
        self.run(guard)
    }

    /// Claims the run slot here and runs the import on a worker thread, so the
    /// caller learns immediately whether the trigger was accepted.
    pub fn spawn_run(self: &Arc<Self>) -> Result<JoinHandle<Result<RunReport, MirrorError>>, MirrorError>
    where
        F: 'static,
        C: 'static,
    {
        let guard = self.state.try_start()?;
        let importer = Arc::clone(self);
        Ok(thread::spawn(move || importer.run(guard)))
    }

    fn run(&self, guard: RunGuard) -> Result<RunReport, MirrorError> {
        let started_at = Utc::now().to_rfc3339();
        let start_page = guard.cursor();
        info!(origin_page = %start_page, "import started");

        let mut pages = Vec::new();
        let result = self.import_pages(&guard, &mut pages);
        let cursor = guard.cursor();
        guard.finish();

        match result {
            Ok(()) => {
                info!(cursor = %cursor, pages = pages.len(), "import finished");
                Ok(RunReport {
                    started_at,
                    finished_at: Utc::now().to_rfc3339(),
                    start_page,
                    cursor,
                    pages,
                })
            }
            Err(err) => {
                match &err {
                    MirrorError::FeedStatus { status, url, body } => {
                        error!(status, url = %url, body = %body, "feed returned an error status");
                    }
                    other => error!(cursor = %cursor, error = %other, "import aborted"),
                }
                Err(err)
            }
        }
    }

    fn import_pages(&self, guard: &RunGuard, pages: &mut Vec<PageReport>) -> Result<(), MirrorError> {
        loop {
            let origin_page = guard.cursor();
            let page = self.feed.fetch_page(origin_page)?;
            debug!(origin_page = %origin_page, "fetched page");

            let rewritten = page.with_relative_links()?;
            let content = self.serialize(&rewritten)?;
            let local_page = origin_page.to_local();
            let path = self.archive.write_page(local_page, content.as_bytes())?;
            info!(origin_page = %origin_page, local_page = %local_page, path = %path, "page written");
            pages.push(PageReport {
                origin_page,
                local_page,
                path: path.to_string(),
            });

            if !page.has_next_page() {
                info!(origin_page = %origin_page, "reached the last page");
                return Ok(());
            }
            let Some(next) = origin_page.next() else {
                warn!(origin_page = %origin_page, "no page number after this one; stopping");
                return Ok(());
            };
            guard.advance_to(next);
        }
    }

    fn serialize(&self, page: &FeedPage) -> Result<String, MirrorError> {
        let mut document = page.to_value()?;
        let Value::Object(members) = &mut document else {
            return Err(MirrorError::Conversion("page is not a JSON object".to_string()));
        };
        let base = serde_json::json!({ "@base": PLACEHOLDER_BASE });
        let context = match members.remove("@context") {
            Some(Value::Array(mut items)) => {
                items.push(base);
                Value::Array(items)
            }
            Some(Value::Null) | None => Value::Array(vec![base]),
            Some(other) => Value::Array(vec![other, base]),
        };
        members.insert("@context".to_string(), context);

        let nquads = self.converter.to_nquads(&document)?;
        Ok(nquads.replace(PLACEHOLDER_BASE, "./"))
    }
}
