mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;

use common::{DATE, MockCatalog, utf8_tempdir};
use dr_get_dicom::dedup::SeenSet;
use dr_get_dicom::pipeline::{Artifacts, Pipeline, PipelineSettings};

const NAMESPACE: &str = "/rdm/di/dccn/DAC_3055010.01_490/raw";

fn settings(root: &Utf8PathBuf) -> PipelineSettings {
    PipelineSettings::new(DATE.parse().unwrap(), root.clone()).with_workers(4)
}

fn session_collection(index: usize, series: &str) -> String {
    format!("{NAMESPACE}/{DATE}/sub-{index:03}/{series}")
}

/// Drains `artifacts` on a helper thread, failing the test if the stream does not end in time.
fn collect_within(artifacts: Artifacts, limit: Duration) -> Vec<Utf8PathBuf> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let collected: Vec<_> = artifacts.collect();
        let _ = tx.send(collected);
    });
    rx.recv_timeout(limit)
        .expect("artifact stream did not close in time")
}

fn run_with(catalog: MockCatalog, root: &Utf8PathBuf) -> (Vec<Utf8PathBuf>, Arc<MockCatalog>) {
    let catalog = Arc::new(catalog);
    let pipeline = Pipeline::new(
        Arc::clone(&catalog),
        settings(root),
        Arc::new(SeenSet::new()),
    );
    let artifacts = collect_within(pipeline.run(NAMESPACE), Duration::from_secs(30));
    (artifacts, catalog)
}

fn tarball_catalog(count: usize) -> MockCatalog {
    let collections: Vec<_> = (0..count)
        .map(|index| session_collection(index, "001-t1_mprage"))
        .collect();
    let mut catalog = MockCatalog::with_collections(collections.clone());
    for collection in &collections {
        catalog.add_files(collection, &["series.tar.gz", "series2.tar.gz"]);
    }
    catalog
}

#[test]
fn closes_for_empty_catalog() {
    let (_temp, root) = utf8_tempdir();
    let (artifacts, catalog) = run_with(MockCatalog::default(), &root);
    assert!(artifacts.is_empty());
    assert!(catalog.fetched().is_empty());
}

#[test]
fn closes_after_single_collection() {
    let (_temp, root) = utf8_tempdir();
    let (artifacts, _) = run_with(tarball_catalog(1), &root);
    assert_eq!(
        artifacts,
        vec![root.join(format!("{DATE}/sub-000/001-t1_mprage/IM0001.IMA"))]
    );
}

#[test]
fn closes_after_hundred_collections() {
    let (_temp, root) = utf8_tempdir();
    let (artifacts, catalog) = run_with(tarball_catalog(100), &root);

    assert_eq!(artifacts.len(), 100);
    let unique: HashSet<_> = artifacts.iter().collect();
    assert_eq!(unique.len(), 100);
    assert!(artifacts.iter().all(|path| path.as_std_path().is_file()));
    // one tarball per collection, the second is never fetched
    assert_eq!(catalog.fetched().len(), 100);
    assert!(
        catalog
            .fetched()
            .iter()
            .all(|remote| remote.ends_with("/series.tar.gz"))
    );
}

#[test]
fn processes_one_series_per_session() {
    let (_temp, root) = utf8_tempdir();
    let first = session_collection(1, "001-localizer");
    let second = session_collection(1, "002-t1_mprage");
    let other = session_collection(2, "003-bold");
    let mut catalog =
        MockCatalog::with_collections(vec![first.clone(), second.clone(), other.clone()]);
    catalog.add_files(&first, &["IM0001.IMA"]);
    catalog.add_files(&second, &["IM0001.IMA"]);
    catalog.add_files(&other, &["IM0001.IMA"]);

    let (artifacts, catalog) = run_with(catalog, &root);

    assert_eq!(artifacts.len(), 2);
    let listed: HashSet<_> = catalog.listed().into_iter().collect();
    assert_eq!(listed, HashSet::from([first, other]));
    // single DICOM files land in the session directory
    assert!(artifacts.contains(&root.join(format!("{DATE}/sub-001/IM0001.IMA"))));
    assert!(
        root.join(format!("{DATE}/sub-001/cmd.sh"))
            .as_std_path()
            .is_file()
    );
}

#[test]
fn every_zip_is_delivered() {
    let (_temp, root) = utf8_tempdir();
    let collection = format!("{NAMESPACE}/{DATE}/sub-007");
    let mut catalog = MockCatalog::with_collections(vec![collection.clone()]);
    catalog.add_files(&collection, &["a.zip", "b.zip", "c.zip"]);

    let (artifacts, _) = run_with(catalog, &root);

    let names: HashSet<_> = artifacts
        .iter()
        .filter_map(|path| path.file_name().map(str::to_string))
        .collect();
    assert_eq!(
        names,
        HashSet::from(["a.zip".to_string(), "b.zip".to_string(), "c.zip".to_string()])
    );
}

#[test]
fn failed_items_are_dropped_without_stalling() {
    let (_temp, root) = utf8_tempdir();
    let good = session_collection(1, "001-t1");
    let bad = session_collection(2, "001-t1");
    let undated = "/rdm/di/dccn/other/001-t1".to_string();
    let mut catalog =
        MockCatalog::with_collections(vec![good.clone(), bad.clone(), undated.clone()]);
    catalog.add_files(&good, &["series.tar.gz"]);
    catalog.add_files(&bad, &["series.tar.gz"]);
    catalog.add_files(&undated, &["series.tar.gz"]);
    catalog
        .failing_fetches
        .insert(format!("{bad}/series.tar.gz"));

    let (artifacts, catalog) = run_with(catalog, &root);

    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].as_str().contains("sub-001"));
    // the undated name never reaches the fetch call
    assert_eq!(catalog.fetched().len(), 2);
}

#[test]
fn scan_failure_keeps_received_collections() {
    let (_temp, root) = utf8_tempdir();
    let mut catalog = tarball_catalog(3);
    catalog.scan_fails_after = true;

    let (artifacts, _) = run_with(catalog, &root);
    assert_eq!(artifacts.len(), 3);
}

#[test]
fn dropping_the_stream_early_does_not_hang() {
    let (_temp, root) = utf8_tempdir();
    let catalog = Arc::new(tarball_catalog(50));
    let pipeline = Pipeline::new(catalog, settings(&root), Arc::new(SeenSet::new()));

    let mut artifacts = pipeline.run(NAMESPACE);
    assert!(artifacts.next().is_some());

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        artifacts.wait();
        let _ = tx.send(());
    });
    rx.recv_timeout(Duration::from_secs(30))
        .expect("pipeline threads did not exit");
}

#[test]
fn shared_seen_set_spans_runs() {
    let (_temp, root) = utf8_tempdir();
    let catalog = Arc::new(tarball_catalog(2));
    let seen = Arc::new(SeenSet::new());
    let pipeline = Pipeline::new(catalog, settings(&root), Arc::clone(&seen));

    let first = collect_within(pipeline.run(NAMESPACE), Duration::from_secs(30));
    let second = collect_within(pipeline.run(NAMESPACE), Duration::from_secs(30));

    assert_eq!(first.len(), 2);
    assert!(second.is_empty());
    assert_eq!(seen.len(), 2);
}
