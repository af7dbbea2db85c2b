use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde_json::json;

use ipdc_ldes_mirror::archive::Archive;
use ipdc_ldes_mirror::domain::OriginPage;
use ipdc_ldes_mirror::error::MirrorError;
use ipdc_ldes_mirror::feed::FeedClient;
use ipdc_ldes_mirror::importer::Importer;
use ipdc_ldes_mirror::page::FeedPage;
use ipdc_ldes_mirror::rdf::{JsonLdConverter, StaticContextLoader};
use ipdc_ldes_mirror::scheduler::Scheduler;

const EVERY_SECOND: &str = "* * * * * *";

/// The first fetch waits on the gate; later ones answer at once.
struct FirstFetchGated {
    gate: Mutex<Receiver<()>>,
    calls: AtomicUsize,
}

impl FirstFetchGated {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeedClient for FirstFetchGated {
    fn fetch_page(&self, page: OriginPage) -> Result<FeedPage, MirrorError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            let _ = self.gate.lock().unwrap().recv();
        }
        Ok(FeedPage::from_value(json!({
            "@context": {"@vocab": "https://schema.example/"},
            "@id": format!("https://ipdc.example/doc/instantiesnapshot?pageNumber={page}"),
            "name": "snapshot"
        }))
        .unwrap())
    }
}

fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    condition()
}

#[test]
fn ticks_during_a_run_are_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let archive = Archive::new(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap());
    let (open, gate) = mpsc::channel();
    let feed = Arc::new(FirstFetchGated {
        gate: Mutex::new(gate),
        calls: AtomicUsize::new(0),
    });
    let importer = Arc::new(Importer::new(
        Arc::clone(&feed),
        JsonLdConverter::new(StaticContextLoader::new()),
        archive.clone(),
        OriginPage::FIRST,
    ));

    let running = importer.spawn_run().unwrap();
    let scheduler = Scheduler::parse(EVERY_SECOND)
        .unwrap()
        .spawn(Arc::clone(&importer));

    // at least two ticks land while the first run is held open
    thread::sleep(Duration::from_millis(2_500));
    assert_eq!(feed.calls(), 1);
    assert!(importer.state().is_busy());
    assert!(archive.list_pages().unwrap().is_empty());

    open.send(()).unwrap();
    let report = running.join().unwrap().unwrap();
    assert_eq!(report.pages.len(), 1);

    // once idle, the next tick runs an import of its own
    assert!(wait_until(Duration::from_secs(5), || feed.calls() >= 2));
    scheduler.stop();
    assert!(!importer.state().is_busy());
    assert_eq!(archive.list_pages().unwrap().len(), 1);
}

#[test]
fn stop_ends_the_scheduler_thread() {
    let temp = tempfile::tempdir().unwrap();
    let archive = Archive::new(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap());
    let (_open, gate) = mpsc::channel();
    let feed = Arc::new(FirstFetchGated {
        gate: Mutex::new(gate),
        // skip the gate entirely
        calls: AtomicUsize::new(1),
    });
    let importer = Arc::new(Importer::new(
        Arc::clone(&feed),
        JsonLdConverter::new(StaticContextLoader::new()),
        archive,
        OriginPage::FIRST,
    ));

    let scheduler = Scheduler::parse("0 0 0 1 1 * 2099")
        .unwrap()
        .spawn(Arc::clone(&importer));
    let started = Instant::now();
    scheduler.stop();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(feed.calls(), 1);
}
