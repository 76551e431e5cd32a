//! Absorbing processing-run results: index sync, result codes, relocation,
//! reporting and the drain of waiting files.

mod common;

use common::*;
use ingest_core::clients::IndexKey;
use ingest_core::models::CodeLevel;
use ingest_core::orchestration::{IntakeOutcome, ResultsError, ResultsOutcome};
use ingest_core::FileStatus;
use std::time::Duration;

#[tokio::test]
async fn test_successful_run_is_absorbed() {
    let h = Harness::new();
    h.search.seed(
        IndexKey::Patients,
        vec![patient("p-old", MEMBERS_CHANNEL), patient("p-gone", MEMBERS_CHANNEL)],
    );
    let file_id = h.arrive("load/members.csv").await.file_id();
    let staged_key = h.file(file_id).object_key;

    let payload = ResultsBuilder::success(&h.run_of(file_id))
        .new_records(vec![
            patient("p1", MEMBERS_CHANNEL),
            patient("p2", MEMBERS_CHANNEL),
            patient("p3", MEMBERS_CHANNEL),
        ])
        .deleted(&["p-gone"])
        .updated(4)
        .build();
    let key = h.write_results(&payload);

    let outcome = h.service.results().ingest(EXCHANGE_BUCKET, &key).await.unwrap();
    assert_eq!(
        outcome,
        ResultsOutcome::Processed {
            file_id,
            status: FileStatus::Processed
        }
    );

    let file = h.file(file_id);
    assert_eq!(file.status, FileStatus::Processed);
    assert_eq!(file.counters.loaded, 3);
    assert_eq!(file.counters.updated, 4);
    assert_eq!(file.counters.deleted, 1);
    assert!(file.processed_at.is_some());
    assert!(file.object_key.starts_with("processed/acme/"));
    assert!(h.objects.contains(EXCHANGE_BUCKET, &file.object_key));
    assert!(!h.objects.contains(EXCHANGE_BUCKET, &staged_key));
    assert!(h.store.codes_for(file_id).is_empty());

    assert_eq!(
        h.search.hashes(IndexKey::Patients, MEMBERS_CHANNEL),
        vec!["p-old", "p1", "p2", "p3"]
    );

    let reports = h.notifier.processing_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, FileStatus::Processed);
    assert_eq!(reports[0].filename, "members.csv");
    assert_eq!(reports[0].partner_name, "Acme Health");
    // Two documents before the run, three loaded, one deleted
    assert_eq!(reports[0].total_population, Some(4));
}

#[tokio::test]
async fn test_settled_file_releases_the_next_waiting_file() {
    let h = Harness::new();
    let first = h.arrive("load/members_1.csv").await.file_id();
    let second = h.arrive("load/members_2.csv").await;
    assert!(matches!(second, IntakeOutcome::Waiting { .. }));

    let key = h.write_results(&ResultsBuilder::success(&h.run_of(first)).build());
    h.service.results().ingest(EXCHANGE_BUCKET, &key).await.unwrap();
    h.service.wait_for_dispatches().await;

    let released = h.file(second.file_id());
    assert_eq!(released.status, FileStatus::Processing);
    assert_eq!(released.flow_run_id.as_deref(), Some("run-2"));
    assert_eq!(h.workflow.submitted().len(), 2);
}

#[tokio::test]
async fn test_waiting_file_with_inactive_template_is_skipped() {
    let h = Harness::new();
    let first = h.arrive("load/members_1.csv").await.file_id();
    let second = h.arrive("load/members_2.csv").await.file_id();
    h.store.deactivate_template(MEMBERS_TEMPLATE_ID);

    let key = h.write_results(&ResultsBuilder::success(&h.run_of(first)).build());
    h.service.results().ingest(EXCHANGE_BUCKET, &key).await.unwrap();
    h.service.wait_for_dispatches().await;

    assert_eq!(h.file(second).status, FileStatus::Failed);
    assert_eq!(h.store.codes_for(second), vec!["Int-01"]);
    assert_eq!(h.workflow.submitted().len(), 1);

    // The partner hears about the waiting file that could not be released
    let reports: Vec<_> = h
        .notifier
        .processing_reports()
        .into_iter()
        .filter(|report| report.filename == "members_2.csv")
        .collect();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, FileStatus::Failed);
    assert_eq!(reports[0].result_codes[0].code, "Int-01");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drain_stops_when_a_waiting_file_cannot_be_failed() {
    let h = Harness::new();
    let first = h.arrive("load/members_1.csv").await.file_id();
    let second = h.arrive("load/members_2.csv").await.file_id();
    h.store.deactivate_template(MEMBERS_TEMPLATE_ID);
    h.store.reject_failed_status(true);

    let key = h.write_results(&ResultsBuilder::success(&h.run_of(first)).build());
    let service = h.service.clone();
    let ingest = tokio::spawn(async move { service.results().ingest(EXCHANGE_BUCKET, &key).await });

    let outcome = tokio::time::timeout(Duration::from_secs(5), ingest)
        .await
        .expect("results ingestion should return")
        .unwrap();
    assert!(outcome.is_ok());

    assert_eq!(h.store.rejected_updates(), 1);
    assert_eq!(h.file(first).status, FileStatus::Processed);
    assert_eq!(h.file(second).status, FileStatus::Waiting);
    assert!(h.store.codes_for(second).is_empty());
    assert_eq!(h.workflow.submitted().len(), 1);
}

#[tokio::test]
async fn test_declared_counts_must_match_records() {
    let h = Harness::new();
    let file_id = h.arrive("load/members.csv").await.file_id();

    let payload = ResultsBuilder::success(&h.run_of(file_id))
        .new_records(vec![patient("p1", MEMBERS_CHANNEL)])
        .declared_new(2)
        .build();
    let key = h.write_results(&payload);

    let result = h.service.results().ingest(EXCHANGE_BUCKET, &key).await;
    assert!(matches!(result, Err(ResultsError::Invalid(_))));

    let file = h.file(file_id);
    assert_eq!(file.status, FileStatus::Failed);
    assert_eq!(h.store.codes_for(file_id), vec!["Int-08"]);
    assert!(file.object_key.starts_with("failed/acme/"));
    assert!(h.search.hashes(IndexKey::Patients, MEMBERS_CHANNEL).is_empty());
}

#[tokio::test]
async fn test_index_failure_fails_the_file() {
    let h = Harness::new();
    h.search.fail_upserts(true);
    let file_id = h.arrive("load/members.csv").await.file_id();

    let payload = ResultsBuilder::success(&h.run_of(file_id))
        .new_records(vec![patient("p1", MEMBERS_CHANNEL)])
        .build();
    let key = h.write_results(&payload);

    let result = h.service.results().ingest(EXCHANGE_BUCKET, &key).await;
    assert!(matches!(result, Err(ResultsError::SearchIndex(_))));

    let file = h.file(file_id);
    assert_eq!(file.status, FileStatus::Failed);
    assert!(file.processed_at.is_some());
    assert!(h.store.codes_for(file_id).contains(&"Int-04".to_string()));

    let reports = h.notifier.processing_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, FileStatus::Failed);
}

#[tokio::test]
async fn test_index_delete_failure_is_tagged() {
    let h = Harness::new();
    h.search.fail_deletes(true);
    let file_id = h.arrive("load/members.csv").await.file_id();

    let payload = ResultsBuilder::success(&h.run_of(file_id))
        .deleted(&["p-gone"])
        .build();
    let key = h.write_results(&payload);

    assert!(h.service.results().ingest(EXCHANGE_BUCKET, &key).await.is_err());
    assert_eq!(h.store.codes_for(file_id), vec!["Int-05"]);
}

#[tokio::test]
async fn test_invalid_run_records_row_codes() {
    let h = Harness::new();
    let file_id = h.arrive("load/members.csv").await.file_id();

    let payload = ResultsBuilder::success(&h.run_of(file_id))
        .status("invalid")
        .row_error("inv-10", "dob", 3)
        .row_error("inv-10", "dob", 3)
        .row_error("inv-10", "zipcode", 5)
        .build();
    let key = h.write_results(&payload);

    let outcome = h.service.results().ingest(EXCHANGE_BUCKET, &key).await.unwrap();
    assert_eq!(
        outcome,
        ResultsOutcome::Processed {
            file_id,
            status: FileStatus::Invalid
        }
    );

    // A code is recorded once per attempt, whichever field reported it first
    assert_eq!(h.store.codes_for(file_id), vec!["inv-10"]);
    let file = h.file(file_id);
    assert_eq!(file.status, FileStatus::Invalid);
    assert!(file.object_key.starts_with("failed/acme/"));

    let reports = h.notifier.processing_reports();
    assert_eq!(reports.len(), 1);
    let code = &reports[0].result_codes[0];
    assert_eq!(code.level, CodeLevel::Row);
    assert_eq!(code.occurrences, 3);
    assert_eq!(code.first_occurrence, Some(2));
    assert_eq!(code.fields, vec!["dob"]);
}

#[tokio::test]
async fn test_error_status_fails_the_file() {
    let h = Harness::new();
    let file_id = h.arrive("load/members.csv").await.file_id();

    let key = h.write_results(&ResultsBuilder::success(&h.run_of(file_id)).status("error").build());
    h.service.results().ingest(EXCHANGE_BUCKET, &key).await.unwrap();

    assert_eq!(h.file(file_id).status, FileStatus::Failed);
}

#[tokio::test]
async fn test_undecodable_results_fail_the_correlated_file() {
    let h = Harness::new();
    let file_id = h.arrive("load/members.csv").await.file_id();
    let key = format!("results/{}__results.json", h.run_of(file_id));
    h.objects.insert(EXCHANGE_BUCKET, &key, b"{not json".to_vec());

    let result = h.service.results().ingest(EXCHANGE_BUCKET, &key).await;
    assert!(matches!(result, Err(ResultsError::Decode(_))));

    let file = h.file(file_id);
    assert_eq!(file.status, FileStatus::Failed);
    assert_eq!(h.store.codes_for(file_id), vec!["Int-13"]);
    assert!(file.object_key.starts_with("failed/acme/"));
}

#[tokio::test]
async fn test_results_for_unknown_run_are_rejected() {
    let h = Harness::new();
    let key = h.write_results(&ResultsBuilder::success("run-404").build());

    let result = h.service.results().ingest(EXCHANGE_BUCKET, &key).await;
    assert!(matches!(result, Err(ResultsError::UnknownFlowRun(id)) if id == "run-404"));
}

#[tokio::test]
async fn test_non_results_objects_are_ignored() {
    let h = Harness::new();

    let result = h
        .service
        .results()
        .ingest(EXCHANGE_BUCKET, "results/run-1.json")
        .await;
    assert!(matches!(result, Err(ResultsError::NotAResultsObject(_))));
}

#[tokio::test]
async fn test_refresh_replaces_channel_documents() {
    let h = Harness::new();
    h.search.seed(
        IndexKey::Patients,
        vec![patient("stale", MEMBERS_CHANNEL), patient("other", CLAIMS_CHANNEL)],
    );

    let payload = ResultsBuilder::success("sync-1")
        .refresh()
        .new_records(vec![patient("r1", MEMBERS_CHANNEL), patient("r2", MEMBERS_CHANNEL)])
        .build();
    let key = h.write_results(&payload);

    let outcome = h.service.results().ingest(EXCHANGE_BUCKET, &key).await.unwrap();
    assert_eq!(
        outcome,
        ResultsOutcome::Refreshed {
            channel_id: MEMBERS_CHANNEL,
            indexed: 2
        }
    );
    assert_eq!(h.search.hashes(IndexKey::Patients, MEMBERS_CHANNEL), vec!["r1", "r2"]);
    assert_eq!(h.search.hashes(IndexKey::Patients, CLAIMS_CHANNEL), vec!["other"]);
    assert!(h.store.files().is_empty());
    assert!(h.notifier.processing_reports().is_empty());
}

#[tokio::test]
async fn test_refresh_without_records_is_invalid() {
    let h = Harness::new();
    h.search
        .seed(IndexKey::Patients, vec![patient("kept", MEMBERS_CHANNEL)]);

    let key = h.write_results(&ResultsBuilder::success("sync-2").refresh().build());

    let result = h.service.results().ingest(EXCHANGE_BUCKET, &key).await;
    assert!(matches!(result, Err(ResultsError::Invalid(_))));
    assert_eq!(h.search.hashes(IndexKey::Patients, MEMBERS_CHANNEL), vec!["kept"]);
}
