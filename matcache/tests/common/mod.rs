//! Shared fakes and fixtures for the matcache integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use matcache::{
    CacheDeps, CacheMetrics, CacheOptions, CacheResult, CatalogService, CatalogView, ConfigStatus,
    DatasetConfig, DatasetKey, EntryId, ExpandedDescriptor, ExpandedPlan, Expander,
    ExternalReflection, ExternalReflectionStatus, MaterializationCache, MaterializationStore,
    Materialization, MaterializationState, OptionProvider, PlanNode, RawDescriptor, RecordSchema,
    ScanLeaf, ScanSource, SchemaField, StatusService, StoreError, TimeSource,
};
use matcache::CacheError;

// ─── Clock ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct TestClock(AtomicI64);

impl TestClock {
    pub fn at(start_ms: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(start_ms)))
    }

    pub fn advance(&self, by: Duration) {
        let by_ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.0.fetch_add(by_ms, Ordering::SeqCst);
    }
}

impl TimeSource for TestClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

// ─── Options ────────────────────────────────────────────────────────────────

/// Mutable option source, standing in for a live option manager.
#[derive(Debug)]
pub struct TestOptions(Mutex<CacheOptions>);

impl TestOptions {
    pub fn new(options: CacheOptions) -> Arc<Self> {
        Arc::new(Self(Mutex::new(options)))
    }

    pub fn set(&self, options: CacheOptions) {
        *self.0.lock().expect("options lock") = options;
    }
}

impl OptionProvider for TestOptions {
    fn cache_options(&self) -> CacheOptions {
        self.0.lock().expect("options lock").clone()
    }
}

// ─── Catalog ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeCatalogView {
    configs: Mutex<HashMap<DatasetKey, DatasetConfig>>,
    clear_calls: AtomicUsize,
}

impl FakeCatalogView {
    pub fn set_dataset(&self, config: DatasetConfig) {
        self.configs
            .lock()
            .expect("catalog lock")
            .insert(config.key.clone(), config);
    }

    pub fn remove_dataset(&self, key: &DatasetKey) {
        self.configs.lock().expect("catalog lock").remove(key);
    }

    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }
}

impl CatalogView for FakeCatalogView {
    fn dataset_config(&self, key: &DatasetKey) -> Option<DatasetConfig> {
        self.configs.lock().expect("catalog lock").get(key).cloned()
    }

    fn clear_dataset_caches(&self) {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct FakeCatalog {
    pub view: Arc<FakeCatalogView>,
}

impl CatalogService for FakeCatalog {
    fn system_view(&self) -> Arc<dyn CatalogView> {
        Arc::clone(&self.view) as Arc<dyn CatalogView>
    }
}

// ─── Status service ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeStatus {
    out_of_sync: Mutex<HashSet<EntryId>>,
}

impl FakeStatus {
    pub fn mark_out_of_sync(&self, id: &EntryId) {
        self.out_of_sync
            .lock()
            .expect("status lock")
            .insert(id.clone());
    }

    pub fn mark_in_sync(&self, id: &EntryId) {
        self.out_of_sync.lock().expect("status lock").remove(id);
    }
}

impl StatusService for FakeStatus {
    fn external_reflection_status(&self, id: &EntryId) -> ExternalReflectionStatus {
        let out_of_sync = self.out_of_sync.lock().expect("status lock").contains(id);
        ExternalReflectionStatus {
            config_status: if out_of_sync {
                ConfigStatus::OutOfSync
            } else {
                ConfigStatus::Ok
            },
        }
    }
}

// ─── Store ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeStore {
    records: Mutex<HashMap<EntryId, Materialization>>,
    saves: Mutex<Vec<Materialization>>,
    concurrent_modification: AtomicBool,
}

impl FakeStore {
    pub fn put(&self, materialization: Materialization) {
        self.records
            .lock()
            .expect("store lock")
            .insert(materialization.id.clone(), materialization);
    }

    pub fn saves(&self) -> Vec<Materialization> {
        self.saves.lock().expect("store lock").clone()
    }

    pub fn fail_saves_with_concurrent_modification(&self, fail: bool) {
        self.concurrent_modification.store(fail, Ordering::SeqCst);
    }
}

impl MaterializationStore for FakeStore {
    fn get(&self, id: &EntryId) -> Result<Materialization, StoreError> {
        self.records
            .lock()
            .expect("store lock")
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })
    }

    fn save(&self, materialization: &Materialization) -> Result<(), StoreError> {
        if self.concurrent_modification.load(Ordering::SeqCst) {
            return Err(StoreError::ConcurrentModification {
                id: materialization.id.clone(),
            });
        }
        self.saves
            .lock()
            .expect("store lock")
            .push(materialization.clone());
        self.records
            .lock()
            .expect("store lock")
            .insert(materialization.id.clone(), materialization.clone());
        Ok(())
    }
}

// ─── Expander ───────────────────────────────────────────────────────────────

/// How a registered entry should fail to expand.
#[derive(Debug, Clone, Copy)]
pub enum FailureMode {
    Transient,
    SourceDown,
    Timeout,
}

impl FailureMode {
    fn to_error(self, id: &EntryId) -> CacheError {
        match self {
            Self::Transient => CacheError::ExpansionFailed {
                id: id.clone(),
                detail: "simulated expansion failure".into(),
            },
            Self::SourceDown => CacheError::SourceDown {
                source_name: "upstream".into(),
                detail: "simulated outage".into(),
            },
            Self::Timeout => CacheError::ExpansionTimeout {
                id: id.clone(),
                elapsed_ms: 30_000,
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeExpander {
    materializations: Mutex<Vec<Materialization>>,
    externals: Mutex<Vec<ExternalReflection>>,
    plans: Mutex<HashMap<EntryId, Arc<ExpandedPlan>>>,
    schemas: Mutex<HashMap<EntryId, RecordSchema>>,
    descriptors: Mutex<HashMap<EntryId, RawDescriptor>>,
    failures: Mutex<HashMap<EntryId, FailureMode>>,
    absent: Mutex<HashSet<EntryId>>,
    expand_calls: AtomicUsize,
    external_expand_calls: AtomicUsize,
}

impl FakeExpander {
    pub fn set_materializations(&self, materializations: Vec<Materialization>) {
        *self.materializations.lock().expect("expander lock") = materializations;
    }

    pub fn set_externals(&self, externals: Vec<ExternalReflection>) {
        *self.externals.lock().expect("expander lock") = externals;
    }

    pub fn set_plan(&self, id: &EntryId, plan: Arc<ExpandedPlan>) {
        self.plans
            .lock()
            .expect("expander lock")
            .insert(id.clone(), plan);
    }

    pub fn set_schema(&self, id: &EntryId, schema: RecordSchema) {
        self.schemas
            .lock()
            .expect("expander lock")
            .insert(id.clone(), schema);
    }

    pub fn set_external_descriptor(&self, id: &EntryId, descriptor: RawDescriptor) {
        self.descriptors
            .lock()
            .expect("expander lock")
            .insert(id.clone(), descriptor);
    }

    pub fn remove_external_descriptor(&self, id: &EntryId) {
        self.descriptors.lock().expect("expander lock").remove(id);
    }

    pub fn fail_with(&self, id: &EntryId, mode: FailureMode) {
        self.failures
            .lock()
            .expect("expander lock")
            .insert(id.clone(), mode);
    }

    pub fn succeed(&self, id: &EntryId) {
        self.failures.lock().expect("expander lock").remove(id);
    }

    pub fn mark_absent(&self, id: &EntryId) {
        self.absent.lock().expect("expander lock").insert(id.clone());
    }

    pub fn expand_calls(&self) -> usize {
        self.expand_calls.load(Ordering::SeqCst)
    }

    pub fn external_expand_calls(&self) -> usize {
        self.external_expand_calls.load(Ordering::SeqCst)
    }

    fn failure_for(&self, id: &EntryId) -> Option<FailureMode> {
        self.failures.lock().expect("expander lock").get(id).copied()
    }

    fn plan_for(&self, id: &EntryId) -> Arc<ExpandedPlan> {
        self.plans
            .lock()
            .expect("expander lock")
            .get(id)
            .cloned()
            .unwrap_or_else(|| panic!("no plan registered for {id}"))
    }

    fn schema_for(&self, id: &EntryId) -> RecordSchema {
        self.schemas
            .lock()
            .expect("expander lock")
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Expander for FakeExpander {
    fn valid_materializations(&self) -> Vec<Materialization> {
        self.materializations.lock().expect("expander lock").clone()
    }

    fn external_reflections(&self) -> Vec<ExternalReflection> {
        self.externals.lock().expect("expander lock").clone()
    }

    fn descriptor(
        &self,
        reflection: &ExternalReflection,
        _catalog: &dyn CatalogView,
    ) -> CacheResult<Option<RawDescriptor>> {
        if let Some(mode) = self.failure_for(&reflection.id) {
            return Err(mode.to_error(&reflection.id));
        }
        Ok(self
            .descriptors
            .lock()
            .expect("expander lock")
            .get(&reflection.id)
            .cloned())
    }

    fn expand_descriptor(
        &self,
        descriptor: &RawDescriptor,
        _catalog: &dyn CatalogView,
    ) -> CacheResult<Option<ExpandedDescriptor>> {
        self.external_expand_calls.fetch_add(1, Ordering::SeqCst);
        let id = &descriptor.materialization_id;
        if let Some(mode) = self.failure_for(id) {
            return Err(mode.to_error(id));
        }
        if self.absent.lock().expect("expander lock").contains(id) {
            return Ok(None);
        }
        Ok(Some(ExpandedDescriptor::new(
            descriptor.clone(),
            self.plan_for(id),
            self.schema_for(id),
        )))
    }

    fn expand(
        &self,
        materialization: &Materialization,
        _catalog: &dyn CatalogView,
    ) -> CacheResult<Option<ExpandedDescriptor>> {
        self.expand_calls.fetch_add(1, Ordering::SeqCst);
        let id = &materialization.id;
        if let Some(mode) = self.failure_for(id) {
            return Err(mode.to_error(id));
        }
        if self.absent.lock().expect("expander lock").contains(id) {
            return Ok(None);
        }
        let descriptor = RawDescriptor {
            materialization_id: id.clone(),
            reflection_id: materialization.reflection_id.clone(),
            tag: materialization.tag.clone(),
            is_stale: materialization.is_stale,
            plan: materialization.plan.clone(),
        };
        Ok(Some(ExpandedDescriptor::new(
            descriptor,
            self.plan_for(id),
            self.schema_for(id),
        )))
    }
}

// ─── Builders ───────────────────────────────────────────────────────────────

pub fn schema_of(fields: &[(&str, &str)]) -> RecordSchema {
    RecordSchema {
        fields: fields
            .iter()
            .map(|(name, data_type)| SchemaField {
                name: (*name).to_owned(),
                data_type: (*data_type).to_owned(),
                nullable: true,
            })
            .collect(),
    }
}

pub fn plan_scanning(table: &DatasetKey, version: &str) -> Arc<ExpandedPlan> {
    Arc::new(ExpandedPlan::new(PlanNode::Scan(ScanLeaf {
        table: table.clone(),
        source: ScanSource::Catalog {
            version: version.into(),
        },
    })))
}

pub fn internal(id: &str, path: &[&str], tag: &str, is_stale: bool) -> Materialization {
    Materialization {
        id: EntryId::new(id),
        reflection_id: format!("r-{id}"),
        tag: tag.into(),
        is_stale,
        state: MaterializationState::Done,
        failure: None,
        path: DatasetKey::new(path.iter().copied()),
        plan: Vec::new(),
    }
}

pub fn external(id: &str, name: &str) -> ExternalReflection {
    ExternalReflection {
        id: EntryId::new(id),
        name: name.into(),
        query_dataset_id: format!("q-{id}"),
        target_dataset_id: format!("t-{id}"),
    }
}

// ─── Fixture ────────────────────────────────────────────────────────────────

pub struct Fixture {
    pub expander: Arc<FakeExpander>,
    pub catalog: Arc<FakeCatalog>,
    pub status: Arc<FakeStatus>,
    pub store: Arc<FakeStore>,
    pub options: Arc<TestOptions>,
    pub clock: Arc<TestClock>,
    pub metrics: Arc<CacheMetrics>,
    pub cache: MaterializationCache,
}

pub fn fixture() -> Fixture {
    fixture_with(CacheOptions::default())
}

pub fn fixture_with(options: CacheOptions) -> Fixture {
    let expander = Arc::new(FakeExpander::default());
    let catalog = Arc::new(FakeCatalog::default());
    let status = Arc::new(FakeStatus::default());
    let store = Arc::new(FakeStore::default());
    let options = TestOptions::new(options);
    let clock = TestClock::at(1_700_000_000_000);
    let metrics = Arc::new(CacheMetrics::new());

    let cache = MaterializationCache::with_instrumentation(
        CacheDeps {
            expander: Arc::clone(&expander) as Arc<dyn Expander>,
            status: Arc::clone(&status) as Arc<dyn StatusService>,
            catalog: Arc::clone(&catalog) as Arc<dyn CatalogService>,
            store: Arc::clone(&store) as Arc<dyn MaterializationStore>,
            options: Arc::clone(&options) as Arc<dyn OptionProvider>,
        },
        Arc::clone(&metrics) as Arc<dyn matcache::CacheMetricsSink>,
        Arc::clone(&clock) as Arc<dyn TimeSource>,
    );

    Fixture {
        expander,
        catalog,
        status,
        store,
        options,
        clock,
        metrics,
        cache,
    }
}

impl Fixture {
    /// Register an internal materialization end to end: expander plan and
    /// schema, matching catalog dataset, provider listing, and store record.
    pub fn add_internal(
        &self,
        materialization: &Materialization,
        schema: &RecordSchema,
        plan: Arc<ExpandedPlan>,
    ) {
        self.expander.set_plan(&materialization.id, plan);
        self.expander
            .set_schema(&materialization.id, schema.clone());
        self.catalog.view.set_dataset(DatasetConfig {
            key: materialization.path.clone(),
            tag: "1".into(),
            record_schema: schema.to_blob().expect("encode schema"),
        });
        self.store.put(materialization.clone());

        let mut current = self.expander.valid_materializations();
        current.retain(|m| m.id != materialization.id);
        current.push(materialization.clone());
        self.expander.set_materializations(current);
    }

    /// Register an external reflection: stored descriptor, expander plan, and
    /// provider listing. Catalog datasets for the plan's scans are the
    /// caller's responsibility.
    pub fn add_external(&self, reflection: &ExternalReflection, plan: Arc<ExpandedPlan>) {
        self.expander.set_external_descriptor(
            &reflection.id,
            RawDescriptor {
                materialization_id: reflection.id.clone(),
                reflection_id: format!("r-{}", reflection.id),
                tag: "t1".into(),
                is_stale: false,
                plan: Vec::new(),
            },
        );
        self.expander.set_plan(&reflection.id, plan);

        let mut current = self.expander.external_reflections();
        current.retain(|r| r.id != reflection.id);
        current.push(reflection.clone());
        self.expander.set_externals(current);
    }
}
