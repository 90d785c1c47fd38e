//! Host-facing export service
//!
//! [`ExportService`] wires the engine to a record store and an artifact
//! storage and exposes the three callbacks a host calls around the
//! creation of an export record:
//!
//! 1. [`ExportService::on_before_create`] assigns the output name, validates
//!    and, in synchronous mode, generates the artifact for the host to attach
//! 2. [`ExportService::on_after_create`] sweeps expired exports and, in
//!    background mode, starts one generation task for the new record
//! 3. [`ExportService::on_periodic_sweep`] deletes exports older than a window
//!
//! Background tasks are tracked so callers can wait for them through a
//! [`GenerationHandle`] or [`ExportService::wait_idle`].

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ExportConfig;
use crate::error::Result;
use crate::storage::{ArtifactStorage, artifact_key, generate_file_name};
use crate::store::model::DEFAULT_DATE_LAYOUT;
use crate::store::{Principal, Record, RecordQuery, RecordStore, RequestInfo};
use crate::utils::random_string;

use super::coordinator::{ExportCoordinator, ExportResult};
use super::query::{DEFAULT_PAGE_SIZE, PageDriver};
use super::resolver::Column;
use super::spec::{EXPORT_COLLECTION_NAME, ExportSpecification, OutputFormat, fields};
use super::validate;
use super::writers::create_writer;

/// Registration options of the export engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Generate after the record is created instead of before
    pub generate_in_background: bool,
    /// Sweep expired exports whenever a new one is created
    pub auto_delete: bool,
    /// Age after which exports are swept
    pub auto_delete_after: Duration,
    /// Records fetched per page
    pub page_size: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            generate_in_background: false,
            auto_delete: true,
            auto_delete_after: Duration::from_secs(3600),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl From<&ExportConfig> for ExportOptions {
    fn from(config: &ExportConfig) -> Self {
        Self {
            generate_in_background: config.generate_in_background,
            auto_delete: config.auto_delete,
            auto_delete_after: Duration::from_secs(config.retention_secs),
            page_size: config.page_size,
        }
    }
}

/// Generated output ready to be attached to an export record
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub rows: u64,
}

/// What [`ExportService::on_before_create`] hands back to the host
#[derive(Debug)]
pub struct PreparedExport {
    pub specification: ExportSpecification,
    /// Present in synchronous mode
    pub artifact: Option<Artifact>,
}

/// Terminal state of a background generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The artifact was uploaded under `key`
    Completed { key: String, rows: u64 },
    /// Generation stopped; the export record has no artifact
    Failed(String),
}

/// Handle to one background generation task
#[derive(Debug)]
pub struct GenerationHandle {
    id: Uuid,
    record_id: String,
    handle: JoinHandle<GenerationOutcome>,
}

impl GenerationHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Id of the export record being generated
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Wait for the task to reach its terminal state
    pub async fn wait(self) -> GenerationOutcome {
        self.handle
            .await
            .unwrap_or_else(|e| GenerationOutcome::Failed(format!("generation task aborted: {e}")))
    }
}

/// An export record created through [`ExportService::create_export`]
#[derive(Debug)]
pub struct CreatedExport {
    pub record: Record,
    /// Artifact key in synchronous mode
    pub artifact_key: Option<String>,
    /// Generation task in background mode
    pub generation: Option<GenerationHandle>,
}

/// Export engine composed with its collaborators
pub struct ExportService {
    store: Arc<dyn RecordStore>,
    storage: Arc<dyn ArtifactStorage>,
    options: ExportOptions,
    tasks: TaskTracker,
}

impl ExportService {
    pub fn new(store: Arc<dyn RecordStore>, storage: Arc<dyn ArtifactStorage>, options: ExportOptions) -> Self {
        Self {
            store,
            storage,
            options,
            tasks: TaskTracker::new(),
        }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn storage(&self) -> &Arc<dyn ArtifactStorage> {
        &self.storage
    }

    /// Validate an export record and build its specification
    pub async fn validate_and_fill(&self, record: &Record) -> Result<ExportSpecification> {
        validate::validate_and_fill(self.store.as_ref(), record).await
    }

    /// Stream the export's rows into `dst` in the specification's format
    pub async fn generate_export_output<W>(&self, dst: W, spec: &ExportSpecification) -> Result<ExportResult>
    where
        W: Write + Send,
    {
        generate(self.store.as_ref(), spec, self.options.page_size, dst).await
    }

    /// Called before an export record is persisted
    ///
    /// Returns `Ok(None)` for records of other collections. Otherwise sets
    /// the output file name on `record`, validates it and, unless running
    /// in background mode, generates the artifact.
    pub async fn on_before_create(&self, record: &mut Record) -> Result<Option<PreparedExport>> {
        if !record.belongs_to(EXPORT_COLLECTION_NAME) {
            return Ok(None);
        }

        let file_name = match OutputFormat::parse(&record.get_string(fields::FORMAT)) {
            Some(format) => generate_file_name(format),
            None => random_string(crate::storage::FILE_NAME_LENGTH),
        };
        record.set(fields::OUTPUT, file_name.as_str());

        let specification = self.validate_and_fill(record).await?;
        if self.options.generate_in_background {
            return Ok(Some(PreparedExport {
                specification,
                artifact: None,
            }));
        }

        let (bytes, result) = generate_bytes(self.store.as_ref(), &specification, self.options.page_size).await?;
        Ok(Some(PreparedExport {
            specification,
            artifact: Some(Artifact {
                file_name,
                bytes,
                rows: result.rows_exported,
            }),
        }))
    }

    /// Called after an export record is durably created
    ///
    /// Runs the retention sweep when auto-delete is on, then in background
    /// mode starts the record's generation task. A sweep failure is
    /// returned after the task has been started.
    pub async fn on_after_create(&self, record: &Record) -> Result<Option<GenerationHandle>> {
        if !record.belongs_to(EXPORT_COLLECTION_NAME) {
            return Ok(None);
        }

        let sweep = if self.options.auto_delete {
            self.on_periodic_sweep(self.options.auto_delete_after).await.map(|_| ())
        } else {
            Ok(())
        };

        let generation = self
            .options
            .generate_in_background
            .then(|| self.spawn_generation(record.id()));

        if let Err(e) = &sweep {
            warn!("Retention sweep after export {} failed: {}", record.id(), e);
        }
        sweep?;
        Ok(generation)
    }

    /// Delete export records created at or before `now - retention`
    ///
    /// Records are deleted one at a time together with their artifacts.
    /// The first record deletion error aborts the sweep; artifact removal
    /// failures are only logged.
    ///
    /// # Returns
    /// * `Result<usize>` - Number of export records deleted
    pub async fn on_periodic_sweep(&self, retention: Duration) -> Result<usize> {
        let Some(cutoff) = TimeDelta::from_std(retention)
            .ok()
            .and_then(|delta| Utc::now().checked_sub_signed(delta))
        else {
            return Ok(0);
        };

        let exports = self.store.find_collection(EXPORT_COLLECTION_NAME).await?;
        let filter = format!("created <= '{}'", cutoff.format(DEFAULT_DATE_LAYOUT));
        let page_size = self.options.page_size.max(1);
        let query = RecordQuery::new(exports, RequestInfo::read(Principal::Anonymous))
            .filter(&filter)
            .page(1, page_size);

        let mut expired = Vec::with_capacity(page_size);
        let mut deleted = 0;
        loop {
            self.store.query(&query, &mut expired).await?;
            for record in &expired {
                self.store.delete_record(EXPORT_COLLECTION_NAME, record.id()).await?;
                deleted += 1;

                if let Err(e) = self.storage.delete_prefix(&record.base_files_path()).await {
                    warn!("Failed to remove artifacts of export {}: {}", record.id(), e);
                }
            }
            if expired.len() < page_size {
                break;
            }
        }

        if deleted > 0 {
            info!("Swept {} expired exports", deleted);
        }
        Ok(deleted)
    }

    /// Reference host flow: validate, persist, attach and trigger generation
    pub async fn create_export(&self, mut record: Record) -> Result<CreatedExport> {
        let prepared = self.on_before_create(&mut record).await?;
        let record = self.store.create_record(record).await?;

        let artifact_key = match prepared.and_then(|p| p.artifact) {
            Some(artifact) => Some(self.store_artifact(&record, artifact).await?),
            None => None,
        };

        let generation = self.on_after_create(&record).await?;
        Ok(CreatedExport {
            record,
            artifact_key,
            generation,
        })
    }

    /// Upload an artifact under the record's files path
    pub async fn store_artifact(&self, record: &Record, artifact: Artifact) -> Result<String> {
        let key = artifact_key(&record.base_files_path(), &artifact.file_name);
        self.storage.upload(&key, artifact.bytes).await?;
        Ok(key)
    }

    /// Wait until every background generation has finished
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    fn spawn_generation(&self, record_id: &str) -> GenerationHandle {
        let id = Uuid::new_v4();
        let store = Arc::clone(&self.store);
        let storage = Arc::clone(&self.storage);
        let page_size = self.options.page_size;
        let owned_id = record_id.to_string();

        debug!("Starting generation {} for export {}", id, record_id);
        let handle = self.tasks.spawn(async move {
            match generate_in_background(store.as_ref(), storage.as_ref(), &owned_id, page_size).await {
                Ok((key, rows)) => {
                    info!("Generation {} finished: {} rows stored at {}", id, rows, key);
                    GenerationOutcome::Completed { key, rows }
                }
                Err(e) => {
                    error!("Generation {} for export {} failed: {}", id, owned_id, e);
                    GenerationOutcome::Failed(e.to_string())
                }
            }
        });

        GenerationHandle {
            id,
            record_id: record_id.to_string(),
            handle,
        }
    }
}

async fn generate<W>(store: &dyn RecordStore, spec: &ExportSpecification, page_size: usize, dst: W) -> Result<ExportResult>
where
    W: Write + Send,
{
    let driver = PageDriver::new(store, spec, page_size);
    let writer = create_writer(spec.format, dst)?;
    let mut coordinator = ExportCoordinator::new(driver, Column::compile(&spec.headers), writer);
    coordinator.execute().await
}

async fn generate_bytes(
    store: &dyn RecordStore,
    spec: &ExportSpecification,
    page_size: usize,
) -> Result<(Vec<u8>, ExportResult)> {
    let mut bytes = Vec::new();
    let result = generate(store, spec, page_size, &mut bytes).await?;
    Ok((bytes, result))
}

/// Re-fetch the record, re-fill it, generate and upload
async fn generate_in_background(
    store: &dyn RecordStore,
    storage: &dyn ArtifactStorage,
    record_id: &str,
    page_size: usize,
) -> Result<(String, u64)> {
    let record = store.find_record(EXPORT_COLLECTION_NAME, record_id).await?;
    let spec = validate::fill(store, &record).await?;

    let (bytes, result) = generate_bytes(store, &spec, page_size).await?;
    let key = spec.artifact_key();
    storage.upload(&key, bytes).await?;
    Ok((key, result.rows_exported))
}
