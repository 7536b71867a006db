use std::sync::Arc;

use serde::Serialize;

use crate::catalog::CatalogClient;
use crate::config::ResolvedConfig;
use crate::dedup::SeenSet;
use crate::domain::ScanDate;
use crate::pipeline::{Pipeline, PipelineSettings, run_directory};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub date: String,
    pub run_dir: String,
    pub collections: Vec<CollectionResult>,
}

impl RunSummary {
    pub fn artifact_count(&self) -> usize {
        self.collections
            .iter()
            .map(|coll| coll.artifacts.len())
            .sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionResult {
    pub collection: String,
    pub namespace: String,
    pub artifacts: Vec<String>,
}

/// Runs the pipeline over every configured catch-all collection, one after the other.
pub struct App<C: CatalogClient + 'static> {
    client: Arc<C>,
    config: ResolvedConfig,
    date: ScanDate,
}

impl<C: CatalogClient + 'static> App<C> {
    pub fn new(client: C, config: ResolvedConfig, date: ScanDate) -> Self {
        Self {
            client: Arc::new(client),
            config,
            date,
        }
    }

    pub fn run(&self) -> RunSummary {
        let seen = Arc::new(SeenSet::new());
        let settings = PipelineSettings {
            date: self.date.clone(),
            dest_root: self.config.dest_root.clone(),
            workers: self.config.workers,
            sync_tool: self.config.sync_tool.clone(),
            verify_zip: self.config.verify_zip,
        };
        let pipeline = Pipeline::new(Arc::clone(&self.client), settings, seen);

        let mut collections = Vec::with_capacity(self.config.collections.len());
        for collection in &self.config.collections {
            let namespace = self.config.raw_namespace(collection);
            tracing::debug!(%namespace, "checking collection");

            let mut artifacts = Vec::new();
            for artifact in pipeline.run(&namespace) {
                tracing::info!("{artifact}");
                artifacts.push(artifact.to_string());
            }
            collections.push(CollectionResult {
                collection: collection.clone(),
                namespace,
                artifacts,
            });
        }

        RunSummary {
            date: self.date.to_string(),
            run_dir: run_directory(&self.config.dest_root, &self.date).to_string(),
            collections,
        }
    }
}
