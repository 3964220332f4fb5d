/// Parallel recovery of many archives
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::engine::{file_stem, RecoveryConfig, RecoveryEngine};
use super::result::{RecoveryResult, RecoveryStatistics};

/// Outcome for one input file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RecoveryResult>,
    /// Set when the input could not be opened at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    pub fn succeeded(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.success)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    /// Sum of every item's statistics
    pub statistics: RecoveryStatistics,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Recover each file into `output_root/<file stem>`
///
/// Inputs sharing a stem get `<stem>_<extension>` instead, so no two workers
/// write into the same directory.
pub fn recover_batch(paths: &[PathBuf], output_root: &Path, config: &RecoveryConfig) -> BatchReport {
    let engine = RecoveryEngine::new(config.clone());
    recover_batch_with(&engine, paths, output_root, |_| {})
}

/// Like `recover_batch`, calling `on_item` as each file completes
pub fn recover_batch_with<F>(
    engine: &RecoveryEngine,
    paths: &[PathBuf],
    output_root: &Path,
    on_item: F,
) -> BatchReport
where
    F: Fn(&BatchItem) + Send + Sync,
{
    let started_at = Utc::now();

    let output_dirs = batch_output_dirs(paths, output_root);

    let run = || -> Vec<BatchItem> {
        paths
            .par_iter()
            .zip(output_dirs.par_iter())
            .map(|(path, output_dir)| {
                let item = match engine.recover_file(path, Some(output_dir)) {
                    Ok(result) => BatchItem {
                        input: path.clone(),
                        result: Some(result),
                        error: None,
                    },
                    Err(e) => {
                        tracing::warn!("Processing error for {}: {:#}", path.display(), e);
                        BatchItem {
                            input: path.clone(),
                            result: None,
                            error: Some(format!("{:#}", e)),
                        }
                    }
                };
                on_item(&item);
                item
            })
            .collect()
    };

    let items = match engine.config().threads {
        Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(run),
            Err(e) => {
                tracing::warn!("Falling back to the global thread pool: {}", e);
                run()
            }
        },
        None => run(),
    };

    // Workers share nothing; counters are folded once they are all done
    let mut statistics = RecoveryStatistics::default();
    for item in &items {
        match &item.result {
            Some(result) => statistics.merge(&result.statistics),
            None => statistics.merge(&RecoveryStatistics {
                files_processed: 1,
                files_failed: 1,
                ..RecoveryStatistics::default()
            }),
        }
    }

    tracing::info!(
        "Batch complete: {}/{} files extracted, {} members",
        statistics.files_extracted,
        statistics.files_processed,
        statistics.members_extracted
    );

    BatchReport {
        items,
        statistics,
        started_at,
        finished_at: Utc::now(),
    }
}

/// One distinct output directory per input, compared case-insensitively
fn batch_output_dirs(paths: &[PathBuf], output_root: &Path) -> Vec<PathBuf> {
    let mut stem_counts: HashMap<String, usize> = HashMap::new();
    for path in paths {
        *stem_counts.entry(file_stem(path).to_lowercase()).or_default() += 1;
    }

    let mut taken = HashSet::new();
    paths
        .iter()
        .map(|path| {
            let stem = file_stem(path);
            let shared = stem_counts.get(&stem.to_lowercase()).copied().unwrap_or(0) > 1;
            let base = match path.extension() {
                Some(ext) if shared => format!("{}_{}", stem, ext.to_string_lossy()),
                _ => stem,
            };

            let mut name = base.clone();
            let mut n = 2;
            while !taken.insert(name.to_lowercase()) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            output_root.join(name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_stems_keep_plain_names() {
        let paths = vec![PathBuf::from("a/One.ac_"), PathBuf::from("b/Two.ac")];
        assert_eq!(
            batch_output_dirs(&paths, Path::new("out")),
            vec![PathBuf::from("out/One"), PathBuf::from("out/Two")]
        );
    }

    #[test]
    fn test_shared_stems_get_extension_suffix() {
        let paths = vec![
            PathBuf::from("Client.ac"),
            PathBuf::from("Client.ac_"),
            PathBuf::from("other/client.AC"),
            PathBuf::from("x/Client.ac"),
        ];
        let dirs = batch_output_dirs(&paths, Path::new("out"));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("out/Client_ac"),
                PathBuf::from("out/Client_ac_"),
                PathBuf::from("out/client_AC_2"),
                PathBuf::from("out/Client_ac_3"),
            ]
        );
    }
}
