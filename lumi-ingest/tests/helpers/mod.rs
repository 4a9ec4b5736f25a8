//! Shared fakes and fixtures for lumi-ingest integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use lumi_common::events::EventBus;
use lumi_ingest::db::{self, SqliteScanStore};
use lumi_ingest::models::{Classification, GuestCapture, ScanRecord};
use lumi_ingest::services::{
    AnalysisError, AnalysisRequest, AnalysisResponse, AnalysisService, EntitlementGate,
    EntitlementSource, EntitlementSourceError, FixedEntitlementSource, LocalObjectStorage,
    ObjectStorage, PlanGenerationError, PlanGenerator, ReadAccess, StorageError,
};
use lumi_ingest::staging::kv::{KeyValueStore, KvError, MemoryKeyValueStore};
use lumi_ingest::staging::StagingStore;
use lumi_ingest::workflow::{PipelineSettings, ScanStore};
use lumi_ingest::{AppState, Services};
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// "front" and "side", base64
pub const FRONT_B64: &str = "ZnJvbnQ=";
pub const SIDE_B64: &str = "c2lkZQ==";

pub fn sample_capture() -> GuestCapture {
    let answers = json!({"age": 29, "sex": "female", "goal": "skin"})
        .as_object()
        .cloned()
        .unwrap_or_default();
    GuestCapture::new(
        answers,
        format!("data:image/jpeg;base64,{}", FRONT_B64),
        SIDE_B64.to_string(),
    )
}

pub fn raw_scores() -> Map<String, Value> {
    json!({
        "skinQuality": 70.4,
        "jawline": 60,
        "cheekbones": "65",
        "facial_symmetry": 80,
        "eyeArea": 75,
        "potential": 50,
        "overall": 12
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

/// Analysis fake returning a fixed valid response
pub struct CannedAnalysis {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub requests: Mutex<Vec<AnalysisRequest>>,
    pub scores: Map<String, Value>,
}

impl CannedAnalysis {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            requests: Mutex::new(Vec::new()),
            scores: raw_scores(),
        }
    }

    pub fn with_scores(scores: Map<String, Value>) -> Self {
        Self {
            scores,
            ..Self::new()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisService for CannedAnalysis {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(AnalysisResponse {
            classification: Classification::Female,
            scores: self.scores.clone(),
            notes: BTreeMap::from([("skin".to_string(), "even tone".to_string())]),
        })
    }
}

pub struct FailingAnalysis;

#[async_trait]
impl AnalysisService for FailingAnalysis {
    async fn analyze(&self, _: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        Err(AnalysisError::ApiError(503, "overloaded".to_string()))
    }
}

/// Scan store that always fails, as if the database were gone
pub struct FailingScanStore {
    pub attempts: AtomicUsize,
}

impl FailingScanStore {
    pub fn new() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ScanStore for FailingScanStore {
    async fn insert_scan(&self, _: &ScanRecord) -> lumi_common::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(lumi_common::Error::Internal("disk I/O error".to_string()))
    }
}

pub struct FailingPlanGenerator;

#[async_trait]
impl PlanGenerator for FailingPlanGenerator {
    async fn generate(&self, _: &ScanRecord) -> Result<(), PlanGenerationError> {
        Err(PlanGenerationError::ApiError(500, "plan service down".to_string()))
    }
}

pub struct CountingPlanGenerator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PlanGenerator for CountingPlanGenerator {
    async fn generate(&self, _: &ScanRecord) -> Result<(), PlanGenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Entitlement source that counts queries
pub struct CountingEntitlement {
    pub entitled: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl EntitlementSource for CountingEntitlement {
    async fn is_entitled(&self, _: &str) -> Result<Option<bool>, EntitlementSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.entitled))
    }
}

/// Local storage whose read access issuance takes `delay`
pub struct SlowAccessStorage {
    pub inner: LocalObjectStorage,
    pub delay: Duration,
}

#[async_trait]
impl ObjectStorage for SlowAccessStorage {
    async fn put_object(&self, path: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.inner.put_object(path, bytes).await
    }

    async fn issue_read_access(
        &self,
        path: &str,
        ttl: Duration,
    ) -> Result<ReadAccess, StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.issue_read_access(path, ttl).await
    }
}

/// Local storage that refuses every read access request
pub struct DenyingAccessStorage {
    pub inner: LocalObjectStorage,
}

#[async_trait]
impl ObjectStorage for DenyingAccessStorage {
    async fn put_object(&self, path: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.inner.put_object(path, bytes).await
    }

    async fn issue_read_access(&self, _: &str, _: Duration) -> Result<ReadAccess, StorageError> {
        Err(StorageError::InvalidSignature)
    }
}

/// Storage whose writes fail like a full disk
pub struct FailingPutStorage {
    pub puts: AtomicUsize,
}

impl FailingPutStorage {
    pub fn new() -> Self {
        Self {
            puts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ObjectStorage for FailingPutStorage {
    async fn put_object(&self, _: &str, _: Vec<u8>) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Io(std::io::Error::other(
            "no space left on device",
        )))
    }

    async fn issue_read_access(&self, path: &str, _: Duration) -> Result<ReadAccess, StorageError> {
        Err(StorageError::NotFound(path.to_string()))
    }
}

/// Key-value backend that records every key read
pub struct RecordingKv {
    inner: MemoryKeyValueStore,
    pub reads: Mutex<Vec<String>>,
    /// Blocks the calling thread on every write, like a slow disk
    pub write_delay: Duration,
}

impl RecordingKv {
    pub fn new() -> Self {
        Self::with_write_delay(Duration::ZERO)
    }

    pub fn with_write_delay(write_delay: Duration) -> Self {
        Self {
            inner: MemoryKeyValueStore::unbounded(),
            reads: Mutex::new(Vec::new()),
            write_delay,
        }
    }

    pub fn read_keys(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }
}

impl KeyValueStore for RecordingKv {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.reads.lock().unwrap().push(key.to_string());
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        if !self.write_delay.is_zero() {
            std::thread::sleep(self.write_delay);
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, KvError> {
        self.inner.keys()
    }

    fn contains(&self, key: &str) -> Result<bool, KvError> {
        self.inner.contains(key)
    }
}

/// Fully wired service over fakes
pub struct Harness {
    pub state: AppState,
    pub pool: SqlitePool,
    pub kv: Arc<RecordingKv>,
    pub objects: Arc<LocalObjectStorage>,
    pub temp_dir: TempDir,
}

pub struct HarnessBuilder {
    entitlement: Arc<dyn EntitlementSource>,
    storage: Option<Arc<dyn ObjectStorage>>,
    analysis: Arc<dyn AnalysisService>,
    scans: Option<Arc<dyn ScanStore>>,
    plans: Arc<dyn PlanGenerator>,
    staging_write_delay: Duration,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            entitlement: Arc::new(FixedEntitlementSource::new(true)),
            storage: None,
            analysis: Arc::new(CannedAnalysis::new()),
            scans: None,
            plans: Arc::new(CountingPlanGenerator {
                calls: AtomicUsize::new(0),
            }),
            staging_write_delay: Duration::ZERO,
        }
    }

    pub fn entitlement(mut self, source: Arc<dyn EntitlementSource>) -> Self {
        self.entitlement = source;
        self
    }

    pub fn entitled(self, entitled: bool) -> Self {
        self.entitlement(Arc::new(FixedEntitlementSource::new(entitled)))
    }

    /// Storage used by the pipeline; the `/objects` route keeps the local one
    pub fn storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn analysis(mut self, analysis: Arc<dyn AnalysisService>) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn scans(mut self, scans: Arc<dyn ScanStore>) -> Self {
        self.scans = Some(scans);
        self
    }

    pub fn plans(mut self, plans: Arc<dyn PlanGenerator>) -> Self {
        self.plans = plans;
        self
    }

    pub fn staging_write_delay(mut self, delay: Duration) -> Self {
        self.staging_write_delay = delay;
        self
    }

    pub async fn build(self) -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::init_memory_pool().await.unwrap();
        let kv = Arc::new(RecordingKv::with_write_delay(self.staging_write_delay));
        let objects = Arc::new(LocalObjectStorage::new(
            temp_dir.path().join("objects"),
            "http://127.0.0.1:5810",
            "test-secret",
        ));
        let scans: Arc<dyn ScanStore> = match self.scans {
            Some(scans) => scans,
            None => Arc::new(SqliteScanStore::new(pool.clone(), 500)),
        };

        let storage: Arc<dyn ObjectStorage> = match self.storage {
            Some(storage) => storage,
            None => objects.clone(),
        };

        let services = Services {
            gate: EntitlementGate::new(self.entitlement, Duration::from_secs(2)),
            storage,
            objects: objects.clone(),
            analysis: self.analysis,
            scans,
            plans: self.plans,
            staging: StagingStore::new(kv.clone()),
            settings: PipelineSettings {
                read_access_ttl: Duration::from_secs(3600),
                access_issue_timeout: Duration::from_millis(500),
                analysis_timeout: Duration::from_secs(5),
            },
        };

        Harness {
            state: AppState::assemble(pool.clone(), EventBus::new(256), services),
            pool,
            kv,
            objects,
            temp_dir,
        }
    }
}

impl Harness {
    pub async fn sign_in(&self, owner_id: &str) {
        self.state.sessions.sign_in(owner_id).await;
    }

    pub async fn scan_count(&self) -> i64 {
        db::scans::count_scans(&self.pool).await.unwrap()
    }

    /// Stored object files under the objects root
    pub fn object_files(&self) -> Vec<std::path::PathBuf> {
        fn walk(dir: &std::path::Path, out: &mut Vec<std::path::PathBuf>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, out);
                } else {
                    out.push(path);
                }
            }
        }
        let mut files = Vec::new();
        walk(self.objects.root(), &mut files);
        files.sort();
        files
    }
}
