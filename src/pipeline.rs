//! Concurrent discovery and retrieval.
//!
//! ```text
//! catalog scan + dedup ──(2W)──▶ W selectors ──(2W)──▶ W retrievers ──(W)──▶ caller
//! ```
//!
//! Every stage owns the sending half of its output channel through one clone per worker, so
//! the channel closes exactly when the last worker of the stage returns. A supervisor thread
//! per pool joins the workers and reports panics.

use std::ops::ControlFlow;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use camino::{Utf8Path, Utf8PathBuf};

use crate::catalog::CatalogClient;
use crate::config::{DEFAULT_SYNC_TOOL, DEFAULT_WORKERS};
use crate::dedup::{Deduplicator, SeenSet};
use crate::domain::{Query, ScanDate};
use crate::extract::Extractor;
use crate::retriever::Retriever;
use crate::selector::{FileSelector, NO_ROWS_MARKER};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub date: ScanDate,
    pub dest_root: Utf8PathBuf,
    pub workers: usize,
    pub sync_tool: String,
    pub verify_zip: bool,
}

impl PipelineSettings {
    pub fn new(date: ScanDate, dest_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            date,
            dest_root: dest_root.into(),
            workers: DEFAULT_WORKERS,
            sync_tool: DEFAULT_SYNC_TOOL.to_string(),
            verify_zip: false,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

pub struct Pipeline<C: CatalogClient + 'static> {
    client: Arc<C>,
    settings: PipelineSettings,
    seen: Arc<SeenSet>,
}

impl<C: CatalogClient + 'static> Pipeline<C> {
    pub fn new(client: Arc<C>, settings: PipelineSettings, seen: Arc<SeenSet>) -> Self {
        Self {
            client,
            settings,
            seen,
        }
    }

    /// Starts all stages for collections below `namespace` and returns the artifact stream.
    ///
    /// The stream ends once every stage has drained. Dropping it early makes the workers stop
    /// at their next send.
    pub fn run(&self, namespace: &str) -> Artifacts {
        let workers = self.settings.workers.max(1);
        let mut stages = Vec::with_capacity(3);

        let query = Query::CollectionsLike {
            namespace: namespace.trim_end_matches('/').to_string(),
            date: self.settings.date.clone(),
        };
        let (collections_tx, collections_rx) = mpsc::sync_channel::<String>(2 * workers);
        let client = Arc::clone(&self.client);
        let dedup = Deduplicator::new(Arc::clone(&self.seen));
        stages.push(thread::spawn(move || {
            scan_collections(client.as_ref(), &query, &dedup, &collections_tx);
            tracing::debug!("collection scan closed");
        }));

        let selector = FileSelector::new(Arc::clone(&self.client));
        let (files_rx, supervisor) = spawn_pool(
            "select",
            workers,
            collections_rx,
            2 * workers,
            move |collection: String, out: &SyncSender<String>| {
                select_files(&selector, &collection, out)
            },
        );
        stages.push(supervisor);

        let retriever = Retriever::new(
            Arc::clone(&self.client),
            self.settings.date.clone(),
            self.settings.dest_root.clone(),
        );
        let extractor = Extractor::new(self.settings.sync_tool.clone(), self.settings.verify_zip);
        let (artifacts_rx, supervisor) = spawn_pool(
            "retrieve",
            workers,
            files_rx,
            workers,
            move |remote: String, out: &SyncSender<Utf8PathBuf>| {
                retrieve_file(&retriever, &extractor, &remote, out)
            },
        );
        stages.push(supervisor);

        Artifacts {
            receiver: artifacts_rx,
            stages,
        }
    }
}

/// Unordered stream of artifact paths produced by one pipeline run.
pub struct Artifacts {
    receiver: Receiver<Utf8PathBuf>,
    stages: Vec<JoinHandle<()>>,
}

impl Artifacts {
    /// Stops consuming and waits for every stage thread to exit.
    pub fn wait(self) {
        let Artifacts { receiver, stages } = self;
        drop(receiver);
        for stage in stages {
            let _ = stage.join();
        }
    }
}

impl Iterator for Artifacts {
    type Item = Utf8PathBuf;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

fn scan_collections<C: CatalogClient + ?Sized>(
    client: &C,
    query: &Query,
    dedup: &Deduplicator,
    out: &SyncSender<String>,
) {
    tracing::debug!(%query, "scanning collections");
    let lines = match client.list_matching(query) {
        Ok(lines) => lines,
        Err(err) => {
            tracing::error!(error = %err, "collection scan failed");
            return;
        }
    };

    for line in lines {
        let name = match line {
            Ok(name) => name,
            Err(err) => {
                tracing::error!(error = %err, "collection scan failed");
                continue;
            }
        };
        if name.trim().is_empty() || name.contains(NO_ROWS_MARKER) {
            continue;
        }
        if !dedup.admit(&name) {
            tracing::debug!(collection = %name, "session already dispatched");
            continue;
        }
        if out.send(name).is_err() {
            break;
        }
    }
}

fn select_files<C: CatalogClient>(
    selector: &FileSelector<C>,
    collection: &str,
    out: &SyncSender<String>,
) -> ControlFlow<()> {
    let files = match selector.select(collection) {
        Ok(files) => files,
        Err(err) => {
            tracing::error!(collection, error = %err, "cannot list collection");
            return ControlFlow::Continue(());
        }
    };
    for file in files {
        if out.send(file).is_err() {
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

fn retrieve_file<C: CatalogClient>(
    retriever: &Retriever<C>,
    extractor: &Extractor,
    remote: &str,
    out: &SyncSender<Utf8PathBuf>,
) -> ControlFlow<()> {
    let download = match retriever.retrieve(remote) {
        Ok(download) => download,
        Err(err) => {
            tracing::error!(remote, error = %err, "download failed");
            return ControlFlow::Continue(());
        }
    };
    let artifact = match extractor.extract(&download) {
        Ok(artifact) => artifact,
        Err(err) => {
            tracing::error!(local = %download.local, error = %err, "extraction failed");
            return ControlFlow::Continue(());
        }
    };
    if out.send(artifact).is_err() {
        return ControlFlow::Break(());
    }
    ControlFlow::Continue(())
}

/// Spawns `workers` threads sharing `input`. Returns the pool's output and a supervisor that
/// finishes after every worker has.
fn spawn_pool<I, O, F>(
    name: &'static str,
    workers: usize,
    input: Receiver<I>,
    capacity: usize,
    work: F,
) -> (Receiver<O>, JoinHandle<()>)
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I, &SyncSender<O>) -> ControlFlow<()> + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::sync_channel::<O>(capacity);
    let input = Arc::new(Mutex::new(input));
    let work = Arc::new(work);

    let handles = (0..workers)
        .map(|_| {
            let input = Arc::clone(&input);
            let work = Arc::clone(&work);
            let tx = tx.clone();
            thread::spawn(move || {
                while let Some(item) = next_item(&input) {
                    if (*work)(item, &tx).is_break() {
                        break;
                    }
                }
            })
        })
        .collect::<Vec<_>>();
    // only the workers' clones keep the output open from here on
    drop(tx);

    let supervisor = thread::spawn(move || {
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!(pool = name, "worker panicked");
            }
        }
        tracing::debug!(pool = name, "pool closed");
    });
    (rx, supervisor)
}

fn next_item<I>(input: &Mutex<Receiver<I>>) -> Option<I> {
    let receiver = match input.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    receiver.recv().ok()
}

/// Local destination of a run for `date` below `dest_root`.
pub fn run_directory(dest_root: &Utf8Path, date: &ScanDate) -> Utf8PathBuf {
    dest_root.join(date.as_str())
}
