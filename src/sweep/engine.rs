// src/sweep/engine.rs
use super::{SweepOptions, TrackedField};
use crate::classifier::Classifier;
use crate::crm::{CrmApi, CRM_PAGE_LIMIT};
use crate::error::{RelayError, SweepError};
use crate::relay::RelayService;
use crate::throttle::{acquire_or_cancel, Throttle, Unthrottled};
use crate::types::report::RECORD_LEVEL_FIELD;
use crate::types::{CrmRecord, FieldName, ReferenceClassification, SweepErrorEntry, SweepReport};
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_CONCURRENCY: usize = 4;

/// What happened to one record; folded into the report by the page loop
#[derive(Debug, Default)]
struct RecordOutcome {
    has_files: bool,
    updated: bool,
    converted: usize,
    repaired: usize,
    cleared: usize,
    errors: Vec<SweepErrorEntry>,
}

impl RecordOutcome {
    fn error(&mut self, record_id: &str, field: &str, message: impl Into<String>) {
        self.errors.push(SweepErrorEntry {
            record_id: record_id.to_string(),
            field_name: field.to_string(),
            message: message.into(),
        });
    }
}

/// Planned field changes for one record, keyed by CRM code
#[derive(Debug, Default)]
struct RecordDiff {
    fields: Map<String, Value>,
    converted: usize,
    repaired: usize,
    cleared: usize,
}

impl RecordDiff {
    fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub struct ReconciliationSweep {
    crm: Arc<dyn CrmApi>,
    relay: RelayService,
    classifier: Classifier,
    crm_fields: BTreeMap<FieldName, String>,
    page_size: u64,
    concurrency: usize,
    crm_throttle: Arc<dyn Throttle>,
}

impl ReconciliationSweep {
    pub fn new(
        crm: Arc<dyn CrmApi>,
        relay: RelayService,
        classifier: Classifier,
        crm_fields: BTreeMap<FieldName, String>,
    ) -> Self {
        Self {
            crm,
            relay,
            classifier,
            crm_fields,
            page_size: CRM_PAGE_LIMIT,
            concurrency: DEFAULT_CONCURRENCY,
            crm_throttle: Arc::new(Unthrottled),
        }
    }

    /// Expected size of a full page. Capped at the CRM's own page limit, since
    /// a short page is what ends the sweep.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        if page_size > CRM_PAGE_LIMIT {
            warn!(
                "Sweep page size {} exceeds the CRM page limit, using {}",
                page_size, CRM_PAGE_LIMIT
            );
        }
        self.page_size = page_size.clamp(1, CRM_PAGE_LIMIT);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_crm_throttle(mut self, throttle: Arc<dyn Throttle>) -> Self {
        self.crm_throttle = throttle;
        self
    }

    pub fn crm(&self) -> &Arc<dyn CrmApi> {
        &self.crm
    }

    pub fn crm_fields(&self) -> &BTreeMap<FieldName, String> {
        &self.crm_fields
    }

    fn tracked_fields(&self, fields: &[FieldName]) -> Result<Vec<TrackedField>, SweepError> {
        if fields.is_empty() {
            return Err(SweepError::Config("no fields to track".to_string()));
        }

        let mut tracked: Vec<TrackedField> = Vec::with_capacity(fields.len());
        for field in fields {
            let crm_code = self
                .crm_fields
                .get(field)
                .ok_or_else(|| SweepError::UnmappedField(field.to_string()))?;
            if tracked.iter().all(|t| t.field != *field) {
                tracked.push(TrackedField {
                    field: *field,
                    crm_code: crm_code.clone(),
                });
            }
        }
        Ok(tracked)
    }

    /// Walk every listed record once, converting and repairing tracked file
    /// fields. Record-level failures are collected in the report; only a
    /// failed list call ends the run early.
    pub async fn run_sweep(
        &self,
        fields_to_track: &[FieldName],
        options: SweepOptions,
    ) -> Result<SweepReport, SweepError> {
        let tracked = self.tracked_fields(fields_to_track)?;

        let mut select = vec!["ID".to_string()];
        for tf in &tracked {
            if !select.contains(&tf.crm_code) {
                select.push(tf.crm_code.clone());
            }
        }

        let cancel = options.cancel.child_token();
        let deadline_timer = options.deadline.map(|deadline| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!("Sweep deadline of {:?} reached, cancelling", deadline);
                cancel.cancel();
            })
        });

        let field_names: Vec<&str> = tracked.iter().map(|t| t.field.as_str()).collect();
        let filter = Value::Object(options.filter.clone());
        info!(
            "Starting sweep over {:?} (dry_run={}, filter={}, page_size={}, concurrency={})",
            field_names,
            options.dry_run,
            filter,
            self.page_size,
            self.concurrency
        );

        let mut report = SweepReport::start(options.dry_run);
        let result = self
            .sweep_pages(&tracked, &select, &options, &cancel, &mut report)
            .await;

        if let Some(timer) = deadline_timer {
            timer.abort();
        }

        report.cancelled = cancel.is_cancelled();
        report.finish();
        report.emit();

        result.map(|()| report)
    }

    async fn sweep_pages(
        &self,
        tracked: &[TrackedField],
        select: &[String],
        options: &SweepOptions,
        cancel: &CancellationToken,
        report: &mut SweepReport,
    ) -> Result<(), SweepError> {
        let mut offset: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if !acquire_or_cancel(self.crm_throttle.as_ref(), cancel).await {
                break;
            }

            let records = self
                .crm
                .list(select, &options.filter, offset)
                .await
                .map_err(|e| SweepError::CrmListFailed {
                    offset,
                    message: e.to_string(),
                })?;

            let page_len = records.len() as u64;
            report.records_scanned += records.len();
            debug!("Sweep page at offset {} has {} records", offset, page_len);

            let mut outcomes = stream::iter(records)
                .filter(|record| futures::future::ready(options.accepts(record)))
                .map(|record| self.process_record(record, tracked, options.dry_run, cancel))
                .buffer_unordered(self.concurrency);

            while let Some(outcome) = outcomes.next().await {
                if outcome.has_files {
                    report.records_with_files += 1;
                }
                if outcome.updated {
                    report.records_updated += 1;
                    report.fields_converted += outcome.converted;
                    report.fields_repaired += outcome.repaired;
                    report.fields_cleared += outcome.cleared;
                }
                report.errors.extend(outcome.errors);
            }

            if page_len < self.page_size {
                break;
            }
            offset += page_len;
        }

        Ok(())
    }

    async fn process_record(
        &self,
        record: CrmRecord,
        tracked: &[TrackedField],
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> RecordOutcome {
        let mut outcome = RecordOutcome::default();
        if cancel.is_cancelled() {
            return outcome;
        }

        let record_id = record.external_id.as_str();
        let mut diff = RecordDiff::default();

        for tf in tracked {
            // absent or structured values are left alone
            let Some(value) = record.file_field(tf.field, &tf.crm_code) else {
                continue;
            };

            let classification = self.classifier.classify(&value.raw_value);
            if !classification.is_empty() {
                outcome.has_files = true;
            }

            match classification {
                ReferenceClassification::Empty | ReferenceClassification::Durable(_) => {}
                ReferenceClassification::Opaque(value) => {
                    debug!(
                        "Record {} field {} has unknown format, leaving it: {:?}",
                        record_id, tf.field, value
                    );
                }
                ReferenceClassification::Broken(value) => {
                    match self.relay.store().find_existing(record_id, tf.field).await {
                        Ok(Some(url)) => {
                            info!("Repairing broken {} on record {} with {}", tf.field, record_id, url);
                            diff.fields.insert(tf.crm_code.clone(), Value::String(url));
                            diff.repaired += 1;
                        }
                        Ok(None) => {
                            info!("Clearing broken {} on record {}: {}", tf.field, record_id, value);
                            diff.fields.insert(tf.crm_code.clone(), Value::String(String::new()));
                            diff.cleared += 1;
                        }
                        Err(e) => {
                            outcome.error(record_id, tf.field.as_str(), format!("local lookup failed: {}", e));
                        }
                    }
                }
                ReferenceClassification::Ephemeral(file_id) => {
                    if dry_run {
                        diff.fields.insert(tf.crm_code.clone(), Value::String(file_id));
                        diff.converted += 1;
                        continue;
                    }
                    match self
                        .relay
                        .try_relay_with_cancel(&file_id, tf.field, Some(record_id), cancel)
                        .await
                    {
                        Ok(file) => {
                            diff.fields
                                .insert(tf.crm_code.clone(), Value::String(file.public_url));
                            diff.converted += 1;
                        }
                        Err(RelayError::Cancelled) => {
                            debug!("Relay of {} on record {} cancelled", tf.field, record_id);
                        }
                        Err(e) => {
                            warn!("Relay of {} on record {} failed: {}", tf.field, record_id, e);
                            outcome.error(record_id, tf.field.as_str(), e.to_string());
                        }
                    }
                }
            }
        }

        if diff.is_empty() {
            return outcome;
        }

        if !dry_run {
            // converted files are already stored, so the write is not cancellable
            self.crm_throttle.acquire().await;
            if let Err(e) = self.crm.update(record_id, &diff.fields).await {
                warn!("Update of record {} failed: {}", record_id, e);
                outcome.error(record_id, RECORD_LEVEL_FIELD, e.to_string());
                return outcome;
            }
            info!("Updated record {} ({} fields)", record_id, diff.fields.len());
        }

        outcome.updated = true;
        outcome.converted = diff.converted;
        outcome.repaired = diff.repaired;
        outcome.cleared = diff.cleared;
        outcome
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::CrmError;
    use crate::relay::service::tests::{FakeFileApi, BASE};
    use crate::relay::{DurableStore, LocalStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    pub(crate) const RESUME_CODE: &str = "UF_CRM_RESUME";
    pub(crate) const DIPLOMA_CODE: &str = "UF_CRM_DIPLOMA";

    /// In-memory CRM serving fixed-size pages over a record list
    #[derive(Default)]
    pub(crate) struct FakeCrm {
        pub records: Vec<CrmRecord>,
        pub page_limit: usize,
        pub updates: Mutex<Vec<(String, Map<String, Value>)>>,
        pub list_calls: AtomicUsize,
        pub fail_update_ids: HashSet<String>,
        pub fail_list_at: Option<u64>,
        pub list_delay: Option<Duration>,
    }

    impl FakeCrm {
        pub fn with_records(records: Vec<CrmRecord>) -> Self {
            Self {
                records,
                page_limit: 50,
                ..Self::default()
            }
        }

        pub fn updates(&self) -> Vec<(String, Map<String, Value>)> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CrmApi for FakeCrm {
        async fn list(
            &self,
            _select: &[String],
            filter: &Map<String, Value>,
            offset: u64,
        ) -> Result<Vec<CrmRecord>, CrmError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.list_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_list_at == Some(offset) {
                return Err(CrmError::Status {
                    status: 500,
                    message: "INTERNAL_SERVER_ERROR".to_string(),
                });
            }

            let wanted_id = filter.get("ID").and_then(|v| v.as_str());
            Ok(self
                .records
                .iter()
                .filter(|r| wanted_id.map_or(true, |id| r.external_id == id))
                .skip(offset as usize)
                .take(self.page_limit)
                .cloned()
                .collect())
        }

        async fn get(&self, id: &str) -> Result<CrmRecord, CrmError> {
            self.records
                .iter()
                .find(|r| r.external_id == id)
                .cloned()
                .ok_or_else(|| CrmError::Status {
                    status: 400,
                    message: "Not found".to_string(),
                })
        }

        async fn update(&self, id: &str, fields: &Map<String, Value>) -> Result<(), CrmError> {
            self.updates
                .lock()
                .unwrap()
                .push((id.to_string(), fields.clone()));
            if self.fail_update_ids.contains(id) {
                return Err(CrmError::Status {
                    status: 400,
                    message: "ERROR_CORE: record is locked".to_string(),
                });
            }
            Ok(())
        }
    }

    pub(crate) fn record(id: &str, resume: Value, diploma: Value) -> CrmRecord {
        let mut fields = Map::new();
        fields.insert(RESUME_CODE.to_string(), resume);
        fields.insert(DIPLOMA_CODE.to_string(), diploma);
        CrmRecord::new(id, fields)
    }

    pub(crate) fn field_map() -> BTreeMap<FieldName, String> {
        let mut map = BTreeMap::new();
        map.insert(FieldName::Resume, RESUME_CODE.to_string());
        map.insert(FieldName::Diploma, DIPLOMA_CODE.to_string());
        map
    }

    pub(crate) fn sweep_with(
        crm: Arc<FakeCrm>,
        files: FakeFileApi,
        dir: &std::path::Path,
    ) -> (ReconciliationSweep, Arc<FakeFileApi>) {
        let files = Arc::new(files);
        let store = Arc::new(LocalStore::new(dir, BASE));
        let relay = RelayService::new(files.clone(), store);
        let classifier = Classifier::new(BASE, &["/uploads/".to_string()]);
        (ReconciliationSweep::new(crm, relay, classifier, field_map()), files)
    }

    const TRACKED: &[FieldName] = &[FieldName::Resume, FieldName::Diploma];

    #[tokio::test]
    async fn test_durable_and_empty_records_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let crm = Arc::new(FakeCrm::with_records(vec![
            record("1", json!(format!("{}/contact-1_resume_2025-01-01_aaaaaaaa.pdf", BASE)), json!("")),
            record("2", Value::Null, json!("/uploads/contact-2_diploma_2025-01-01_bbbbbbbb.jpg")),
            record("3", json!(""), json!("")),
        ]));
        let (sweep, files) = sweep_with(crm.clone(), FakeFileApi::default(), dir.path());

        let report = sweep.run_sweep(TRACKED, SweepOptions::default()).await.unwrap();

        assert!(crm.updates().is_empty());
        assert_eq!(files.resolve_calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.records_scanned, 3);
        assert_eq!(report.records_with_files, 2);
        assert_eq!(report.records_updated, 0);
        assert!(report.errors.is_empty());
        assert!(report.finished_at.is_some());
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_ephemeral_fields_are_converted_in_one_update() {
        let dir = tempfile::tempdir().unwrap();
        let crm = Arc::new(FakeCrm::with_records(vec![record(
            "1055",
            json!("ABCDEFGHIJ1234567890"),
            json!("DIPLOMAFILEID_00001"),
        )]));
        let files = FakeFileApi::default()
            .with_file("ABCDEFGHIJ1234567890", "documents/file_1.pdf", b"pdf")
            .with_file("DIPLOMAFILEID_00001", "photos/file_2.jpg", b"jpg");
        let (sweep, _) = sweep_with(crm.clone(), files, dir.path());

        let report = sweep.run_sweep(TRACKED, SweepOptions::default()).await.unwrap();

        let updates = crm.updates();
        assert_eq!(updates.len(), 1);
        let (id, fields) = &updates[0];
        assert_eq!(id, "1055");
        assert_eq!(fields.len(), 2);

        let resume = fields[RESUME_CODE].as_str().unwrap();
        assert!(resume.starts_with(&format!("{}/contact-1055_resume_", BASE)));
        assert!(resume.ends_with(".pdf"));
        assert!(fields[DIPLOMA_CODE].as_str().unwrap().ends_with(".jpg"));
        assert!(sweep.classifier.classify(resume).is_durable());

        assert_eq!(report.records_updated, 1);
        assert_eq!(report.fields_converted, 2);
    }

    #[tokio::test]
    async fn test_only_changed_fields_are_sent() {
        let dir = tempfile::tempdir().unwrap();
        let durable = format!("{}/contact-8_diploma_2025-01-01_cccccccc.pdf", BASE);
        let crm = Arc::new(FakeCrm::with_records(vec![record(
            "8",
            json!("ABCDEFGHIJ1234567890"),
            json!(durable),
        )]));
        let files = FakeFileApi::default().with_file("ABCDEFGHIJ1234567890", "documents/cv.docx", b"doc");
        let (sweep, _) = sweep_with(crm.clone(), files, dir.path());

        sweep.run_sweep(TRACKED, SweepOptions::default()).await.unwrap();

        let updates = crm.updates();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].1.contains_key(RESUME_CODE));
        assert!(!updates[0].1.contains_key(DIPLOMA_CODE));
    }

    #[tokio::test]
    async fn test_failed_update_does_not_stop_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FakeFileApi::default();
        let mut records = Vec::new();
        for i in 1..=5 {
            let file_id = format!("RESUMEFILEID_0000{}", i);
            files = files.with_file(&file_id, &format!("documents/file_{}.pdf", i), b"pdf");
            records.push(record(&i.to_string(), json!(file_id), json!("")));
        }
        let crm = Arc::new(FakeCrm {
            fail_update_ids: HashSet::from(["3".to_string()]),
            ..FakeCrm::with_records(records)
        });
        let (sweep, _) = sweep_with(crm.clone(), files, dir.path());

        let report = sweep.run_sweep(TRACKED, SweepOptions::default()).await.unwrap();

        assert_eq!(report.records_scanned, 5);
        assert_eq!(crm.updates().len(), 5);
        assert_eq!(report.records_updated, 4);
        assert_eq!(report.fields_converted, 4);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].record_id, "3");
        assert_eq!(report.errors[0].field_name, RECORD_LEVEL_FIELD);
        assert!(report.errors[0].message.contains("record is locked"));
    }

    #[tokio::test]
    async fn test_relay_failure_keeps_value_and_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let crm = Arc::new(FakeCrm::with_records(vec![record(
            "4",
            json!("EXPIREDFILEID_00001"),
            json!(""),
        )]));
        let (sweep, _) = sweep_with(crm.clone(), FakeFileApi::default(), dir.path());

        let report = sweep.run_sweep(TRACKED, SweepOptions::default()).await.unwrap();

        assert!(crm.updates().is_empty());
        assert_eq!(report.records_with_files, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].record_id, "4");
        assert_eq!(report.errors[0].field_name, "resume");
        assert!(report.errors[0].message.contains("invalid file_id"));
    }

    #[tokio::test]
    async fn test_broken_reference_is_cleared_without_local_match() {
        let dir = tempfile::tempdir().unwrap();
        let broken = format!("{}/contact-pending_resume_2025-07-31_c57b48ef.docx", BASE);
        let crm = Arc::new(FakeCrm::with_records(vec![record("21", json!(broken), json!(""))]));
        let (sweep, _) = sweep_with(crm.clone(), FakeFileApi::default(), dir.path());

        let report = sweep.run_sweep(TRACKED, SweepOptions::default()).await.unwrap();

        let updates = crm.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1[RESUME_CODE], json!(""));
        assert_eq!(report.fields_cleared, 1);
        assert_eq!(report.fields_repaired, 0);
    }

    #[tokio::test]
    async fn test_broken_reference_is_repaired_from_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), BASE);
        store
            .store("contact-21_resume_2025-07-30_0000000a.docx", b"old")
            .await
            .unwrap();
        store
            .store("contact-21_resume_2025-07-31_0000000b.docx", b"new")
            .await
            .unwrap();

        let broken = format!("{}/contact-pending_resume_2025-07-31_c57b48ef.docx", BASE);
        let crm = Arc::new(FakeCrm::with_records(vec![record("21", json!(broken), json!("contact-undefined"))]));
        let (sweep, _) = sweep_with(crm.clone(), FakeFileApi::default(), dir.path());

        let report = sweep.run_sweep(TRACKED, SweepOptions::default()).await.unwrap();

        let updates = crm.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(
            updates[0].1[RESUME_CODE],
            json!(format!("{}/contact-21_resume_2025-07-31_0000000b.docx", BASE))
        );
        assert_eq!(updates[0].1[DIPLOMA_CODE], json!(""));
        assert_eq!(report.fields_repaired, 1);
        assert_eq!(report.fields_cleared, 1);
    }

    #[tokio::test]
    async fn test_full_page_then_empty_page() {
        let dir = tempfile::tempdir().unwrap();
        let records = (1..=50).map(|i| record(&i.to_string(), json!(""), json!(""))).collect();
        let crm = Arc::new(FakeCrm::with_records(records));
        let (sweep, _) = sweep_with(crm.clone(), FakeFileApi::default(), dir.path());

        let report = sweep.run_sweep(TRACKED, SweepOptions::default()).await.unwrap();

        assert_eq!(report.records_scanned, 50);
        assert_eq!(crm.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_short_page_ends_pagination() {
        let dir = tempfile::tempdir().unwrap();
        let records = (1..=120).map(|i| record(&i.to_string(), json!(""), json!(""))).collect();
        let crm = Arc::new(FakeCrm::with_records(records));
        let (sweep, _) = sweep_with(crm.clone(), FakeFileApi::default(), dir.path());

        let report = sweep.run_sweep(TRACKED, SweepOptions::default()).await.unwrap();

        assert_eq!(report.records_scanned, 120);
        assert_eq!(crm.list_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_page_size_above_crm_limit_still_reads_everything() {
        let dir = tempfile::tempdir().unwrap();
        let records = (1..=120).map(|i| record(&i.to_string(), json!(""), json!(""))).collect();
        let crm = Arc::new(FakeCrm::with_records(records));
        let (sweep, _) = sweep_with(crm.clone(), FakeFileApi::default(), dir.path());
        let sweep = sweep.with_page_size(100);

        let report = sweep.run_sweep(TRACKED, SweepOptions::default()).await.unwrap();

        assert_eq!(report.records_scanned, 120);
        assert_eq!(crm.list_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_list_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let records = (1..=60).map(|i| record(&i.to_string(), json!(""), json!(""))).collect();
        let crm = Arc::new(FakeCrm {
            fail_list_at: Some(50),
            ..FakeCrm::with_records(records)
        });
        let (sweep, _) = sweep_with(crm.clone(), FakeFileApi::default(), dir.path());

        let err = sweep.run_sweep(TRACKED, SweepOptions::default()).await.unwrap_err();
        match err {
            SweepError::CrmListFailed { offset, message } => {
                assert_eq!(offset, 50);
                assert!(message.contains("INTERNAL_SERVER_ERROR"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let broken = "https://files.example.com/uploads/404 Not Found";
        let crm = Arc::new(FakeCrm::with_records(vec![
            record("1", json!("ABCDEFGHIJ1234567890"), json!(broken)),
            record("2", json!(""), json!("")),
        ]));
        let files = FakeFileApi::default().with_file("ABCDEFGHIJ1234567890", "documents/a.pdf", b"a");
        let (sweep, files) = sweep_with(crm.clone(), files, dir.path());

        let report = sweep
            .run_sweep(TRACKED, SweepOptions::default().dry_run(true))
            .await
            .unwrap();

        assert!(report.dry_run);
        assert!(crm.updates().is_empty());
        assert_eq!(files.resolve_calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.records_updated, 1);
        assert_eq!(report.fields_converted, 1);
        assert_eq!(report.fields_cleared, 1);
    }

    #[tokio::test]
    async fn test_filter_and_predicate_narrow_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let crm = Arc::new(FakeCrm::with_records(vec![
            record("1", json!("contact-null"), json!("")),
            record("2", json!("contact-null"), json!("")),
            record("3", json!("contact-null"), json!("")),
        ]));
        let (sweep, _) = sweep_with(crm.clone(), FakeFileApi::default(), dir.path());

        let report = sweep
            .run_sweep(&[FieldName::Resume], SweepOptions::for_contact("2"))
            .await
            .unwrap();
        assert_eq!(report.records_scanned, 1);
        assert_eq!(crm.updates().len(), 1);
        assert_eq!(crm.updates()[0].0, "2");

        let report = sweep
            .run_sweep(
                &[FieldName::Resume],
                SweepOptions::default().with_predicate(|r| r.external_id != "1"),
            )
            .await
            .unwrap();
        assert_eq!(report.records_scanned, 3);
        assert_eq!(report.records_updated, 2);
        assert!(crm.updates().iter().all(|(id, _)| id != "1"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let crm = Arc::new(FakeCrm::with_records(vec![record("1", json!("contact-null"), json!(""))]));
        let (sweep, _) = sweep_with(crm.clone(), FakeFileApi::default(), dir.path());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = sweep
            .run_sweep(TRACKED, SweepOptions::default().with_cancel(cancel))
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.records_scanned, 0);
        assert_eq!(crm.list_calls.load(Ordering::SeqCst), 0);
        assert!(crm.updates().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_cancels_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let records = (1..=200).map(|i| record(&i.to_string(), json!(""), json!(""))).collect();
        let crm = Arc::new(FakeCrm {
            list_delay: Some(Duration::from_millis(100)),
            ..FakeCrm::with_records(records)
        });
        let (sweep, _) = sweep_with(crm.clone(), FakeFileApi::default(), dir.path());

        let report = sweep
            .run_sweep(
                TRACKED,
                SweepOptions::default().with_deadline(Duration::from_millis(150)),
            )
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report.records_scanned < 200);
    }

    #[tokio::test]
    async fn test_unmapped_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let crm = Arc::new(FakeCrm::with_records(Vec::new()));
        let (sweep, _) = sweep_with(crm.clone(), FakeFileApi::default(), dir.path());

        assert!(matches!(
            sweep.run_sweep(&[FieldName::Logo], SweepOptions::default()).await,
            Err(SweepError::UnmappedField(field)) if field == "logo"
        ));
        assert!(matches!(
            sweep.run_sweep(&[], SweepOptions::default()).await,
            Err(SweepError::Config(_))
        ));
        assert_eq!(crm.list_calls.load(Ordering::SeqCst), 0);
    }
}
