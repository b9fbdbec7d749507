/// Loaded model set with snapshot handles.
///
/// Requests take an `Arc` snapshot of the current set and work from it;
/// a reload builds a fresh set from disk and replaces the handle in one
/// assignment, so no request ever sees a half-updated pair of models.

use crate::store::{ArtifactStore, ModelArtifact, ModelKind};
use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub path: PathBuf,
    pub artifact: ModelArtifact,
}

#[derive(Debug, Clone)]
pub struct LoadedModels {
    pub classifier: Option<LoadedArtifact>,
    pub regressor: Option<LoadedArtifact>,
    pub loaded_at: DateTime<Utc>,
}

impl LoadedModels {
    pub fn empty() -> Self {
        Self {
            classifier: None,
            regressor: None,
            loaded_at: Utc::now(),
        }
    }

    pub fn get(&self, kind: ModelKind) -> Option<&LoadedArtifact> {
        match kind {
            ModelKind::Classifier => self.classifier.as_ref(),
            ModelKind::Regressor => self.regressor.as_ref(),
        }
    }
}

/// Outcome of one reload, per artifact.
#[derive(Debug, Clone, Default)]
pub struct ReloadReport {
    pub classifier_loaded: bool,
    pub regressor_loaded: bool,
    /// Human-readable problems, one per artifact that failed
    pub errors: Vec<String>,
    /// Artifacts that failed to load and kept serving their previous version
    pub retained: Vec<ModelKind>,
}

pub struct ModelRegistry {
    store: ArtifactStore,
    current: Arc<LoadedModels>,
}

impl ModelRegistry {
    /// Registry with nothing loaded; call `reload` to read artifacts.
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            current: Arc::new(LoadedModels::empty()),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn snapshot(&self) -> Arc<LoadedModels> {
        Arc::clone(&self.current)
    }

    /// Loads `kind` from disk.
    ///
    /// A missing file unloads the model. A file that fails to read or
    /// validate keeps the currently loaded artifact, if any.
    fn load_one(&self, kind: ModelKind, today: NaiveDate, report: &mut ReloadReport) -> Option<LoadedArtifact> {
        match self.store.load_latest(kind, today) {
            Ok(Some((path, artifact))) => {
                log::info!(
                    "loaded {} from {} ({} features, {} samples)",
                    kind,
                    path.display(),
                    artifact.n_features(),
                    artifact.n_samples
                );
                Some(LoadedArtifact { path, artifact })
            }
            Ok(None) => {
                let msg = format!(
                    "no {} artifact in {} ({}_<date>.json or {}.json)",
                    kind,
                    self.store.dir().display(),
                    kind.file_stem(),
                    kind.file_stem()
                );
                log::warn!("{}", msg);
                report.errors.push(msg);
                None
            }
            Err(e) => {
                let previous = self.current.get(kind).cloned();
                match &previous {
                    Some(kept) => {
                        log::error!(
                            "failed to load {}: {}; keeping {}",
                            kind,
                            e,
                            kept.path.display()
                        );
                        report.errors.push(format!("{} (keeping previously loaded model)", e));
                        report.retained.push(kind);
                    }
                    None => {
                        log::error!("failed to load {}: {}", kind, e);
                        report.errors.push(e.to_string());
                    }
                }
                previous
            }
        }
    }

    /// Re-reads both artifacts, preferring the ones dated `today`, and
    /// swaps in the new set.
    pub fn reload_for(&mut self, today: NaiveDate) -> ReloadReport {
        let mut report = ReloadReport::default();
        let classifier = self.load_one(ModelKind::Classifier, today, &mut report);
        let regressor = self.load_one(ModelKind::Regressor, today, &mut report);
        report.classifier_loaded = classifier.is_some();
        report.regressor_loaded = regressor.is_some();

        self.current = Arc::new(LoadedModels {
            classifier,
            regressor,
            loaded_at: Utc::now(),
        });
        report
    }

    /// `reload_for` with the local calendar date.
    pub fn reload(&mut self) -> ReloadReport {
        self.reload_for(chrono::Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::simulate::synthetic_history;
    use crate::training::train_and_save;
    use chrono::TimeZone;

    #[test]
    fn test_empty_directory_reports_missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ModelRegistry::new(ArtifactStore::new(dir.path()));
        let report = registry.reload_for(NaiveDate::from_ymd_opt(2025, 10, 20).unwrap());

        assert!(!report.classifier_loaded);
        assert!(!report.regressor_loaded);
        assert_eq!(report.errors.len(), 2);
        assert!(registry.snapshot().classifier.is_none());
    }

    #[test]
    fn test_corrupt_artifact_keeps_previous_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let mut config = AppConfig::default();
        config.training.regressor_trees = 5;
        let start = Utc.with_ymd_and_hms(2025, 10, 20, 6, 0, 0).unwrap();
        let report = train_and_save(ModelKind::Regressor, &synthetic_history(120, 5, start), &config, &store, None)
            .unwrap();

        let today = NaiveDate::from_ymd_opt(2025, 10, 20).unwrap();
        let mut registry = ModelRegistry::new(store);
        assert!(registry.reload_for(today).regressor_loaded);
        let before = registry.snapshot();

        std::fs::write(&report.path, b"{ truncated").unwrap();
        let reload = registry.reload_for(today);

        assert!(reload.regressor_loaded);
        assert_eq!(reload.retained, vec![ModelKind::Regressor]);
        assert!(reload.errors.iter().any(|e| e.contains("keeping previously loaded")));
        let after = registry.snapshot();
        assert_eq!(
            after.regressor.as_ref().map(|l| &l.artifact),
            before.regressor.as_ref().map(|l| &l.artifact)
        );

        // Removing the file unloads it
        std::fs::remove_file(&report.path).unwrap();
        let reload = registry.reload_for(today);
        assert!(!reload.regressor_loaded);
        assert!(reload.retained.is_empty());
    }

    #[test]
    fn test_snapshot_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ModelRegistry::new(ArtifactStore::new(dir.path()));
        let before = registry.snapshot();
        registry.reload_for(NaiveDate::from_ymd_opt(2025, 10, 20).unwrap());
        let after = registry.snapshot();

        // The old handle stays valid and distinct from the new set
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(before.classifier.is_none());
    }
}
