//! ============================================================================
//! Visualization Pipeline - Render the stored embedding space
//! ============================================================================
//! scroll(1000, vectors) -> reducer -> plot points -> self-contained HTML at
//! <app_dir>/visualizations/<user_uuid>/memory_visualization.html
//! ============================================================================

mod plot;
mod reduce;

pub use plot::{render_html, render_svg, PlotPoint, PLOT_TITLE};
pub use reduce::{ReducerKind, RANDOM_SEED, UMAP_THRESHOLD};

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::MemoryConfig;
use crate::memory::{with_deadline, VectorStore};
use crate::paths;
use crate::types::{MemoryError, Result, ScrolledPoint, COLLECTION_NAME};

/// Upper bound on points pulled into one rendering
pub const VISUALIZATION_SAMPLE: u32 = 1000;

const VISUALIZATIONS_DIR: &str = "visualizations";
const OUTPUT_FILE: &str = "memory_visualization.html";

/// Where the rendered document went and what produced it
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizationReport {
    pub path: PathBuf,
    pub point_count: usize,
    pub reducer: ReducerKind,
}

impl fmt::Display for VisualizationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "This is the interactive visualization for your memory embeddings: {}",
            self.path.display()
        )
    }
}

pub struct VisualizationPipeline {
    app_dir: PathBuf,
    store_timeout: Duration,
}

impl VisualizationPipeline {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            app_dir: config.app_dir.clone(),
            store_timeout: config.store_timeout,
        }
    }

    pub async fn run(&self, store: &dyn VectorStore) -> Result<VisualizationReport> {
        let sample = with_deadline(
            "scroll",
            self.store_timeout,
            store.scroll(COLLECTION_NAME, VISUALIZATION_SAMPLE, true),
        )
        .await?;

        let (vectors, entries) = split_sample(sample);
        if vectors.is_empty() {
            return Err(MemoryError::EmptyResult);
        }

        let reducer = ReducerKind::select(vectors.len());
        info!("Visualizing {} memories with {}", vectors.len(), reducer);

        // Reducer fitting is CPU bound
        let layout = tokio::task::spawn_blocking(move || reducer.reduce(&vectors))
            .await
            .map_err(|e| MemoryError::Worker(format!("reducer task failed: {}", e)))?;

        if layout.len() != entries.len() {
            return Err(MemoryError::Visualization(format!(
                "reducer returned {} coordinates for {} points",
                layout.len(),
                entries.len()
            )));
        }

        let points: Vec<PlotPoint> = layout
            .into_iter()
            .zip(entries)
            .map(|([x, y], (content, timestamp))| PlotPoint {
                x,
                y,
                content,
                timestamp,
            })
            .collect();

        let path = self.output_path().await?;
        write_document(&path, &points).await?;
        info!("Visualization written to {}", path.display());

        Ok(VisualizationReport {
            path,
            point_count: points.len(),
            reducer,
        })
    }

    async fn output_path(&self) -> Result<PathBuf> {
        let app_dir = self.app_dir.clone();
        let user_id = tokio::task::spawn_blocking(move || paths::user_uuid(&app_dir))
            .await
            .map_err(|e| MemoryError::Worker(format!("user id task failed: {}", e)))??;
        Ok(self
            .app_dir
            .join(VISUALIZATIONS_DIR)
            .join(user_id)
            .join(OUTPUT_FILE))
    }
}

/// Vectors and their (content, timestamp) pairs, dropping points the store
/// returned without a vector
fn split_sample(sample: Vec<ScrolledPoint>) -> (Vec<Vec<f32>>, Vec<(String, String)>) {
    let mut vectors = Vec::with_capacity(sample.len());
    let mut entries = Vec::with_capacity(sample.len());
    for point in sample {
        match point.vector {
            Some(vector) => {
                vectors.push(vector);
                entries.push((point.entry.content, point.entry.timestamp));
            }
            None => warn!("Skipping point returned without a vector"),
        }
    }
    (vectors, entries)
}

async fn write_document(path: &Path, points: &[PlotPoint]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, render_html(points)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryEntry;

    #[test]
    fn test_report_message() {
        let report = VisualizationReport {
            path: PathBuf::from("/home/u/.brain_in_a_vat/visualizations/x/memory_visualization.html"),
            point_count: 3,
            reducer: ReducerKind::select(3),
        };
        assert_eq!(
            report.to_string(),
            "This is the interactive visualization for your memory embeddings: \
             /home/u/.brain_in_a_vat/visualizations/x/memory_visualization.html"
        );
    }

    #[test]
    fn test_split_sample_drops_vectorless_points() {
        let entry = MemoryEntry::now("a".into(), Default::default());
        let sample = vec![
            ScrolledPoint {
                vector: Some(vec![1.0, 0.0]),
                entry: entry.clone(),
            },
            ScrolledPoint {
                vector: None,
                entry,
            },
        ];
        let (vectors, entries) = split_sample(sample);
        assert_eq!(vectors.len(), 1);
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_output_path_is_keyed_by_user() {
        let tmp = tempfile::tempdir().unwrap();
        let config = MemoryConfig::new("k", tmp.path().to_path_buf());
        let pipeline = VisualizationPipeline::new(&config);

        let path = pipeline.output_path().await.unwrap();
        let user_id = paths::user_uuid(tmp.path()).unwrap();
        assert_eq!(
            path,
            tmp.path()
                .join("visualizations")
                .join(user_id)
                .join("memory_visualization.html")
        );
    }
}
