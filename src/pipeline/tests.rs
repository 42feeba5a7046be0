#![cfg(test)]

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{HandFileInput, JobInputs, Pipeline, PipelineError, ScreenshotInput, CANCELLED_REASON};
use crate::store::{InMemoryJobStore, JobStatus, JobStore, LogLevel};
use crate::test_utils::{sample_hand_text, sample_hand_text_with, sample_player_scan, ts};
use crate::vision::{PlayerScan, ScriptedVisionClient, TableScan, VisionError};

fn shot(id: &str) -> ScreenshotInput {
    ScreenshotInput {
        id: id.to_string(),
        image: crate::vision::ImageRef::Path(PathBuf::from(format!("shots/{id}.png"))),
        captured_at: Some(ts("2024/01/20 17:38:40")),
    }
}

fn sample_scan() -> TableScan {
    TableScan {
        hand_id: Some("RC1001".to_string()),
        hero_cards: vec!["Ah".into(), "Kd".into()],
        board_cards: vec!["2c".into(), "7d".into(), "Jh".into()],
        stacks: vec![10.0, 8.4, 10.25],
        player_count: Some(3),
    }
}

struct Harness {
    pipeline: Pipeline,
    vision: Arc<ScriptedVisionClient>,
    out_dir: tempfile::TempDir,
}

impl Harness {
    fn new(vision: ScriptedVisionClient) -> Self {
        let vision = Arc::new(vision);
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let pipeline = Pipeline::new(
            store,
            Arc::clone(&vision) as Arc<dyn crate::vision::VisionClient>,
            crate::test_utils::config(),
        );
        Self {
            pipeline,
            vision,
            out_dir: tempfile::tempdir().expect("temp dir"),
        }
    }

    fn inputs(&self, files: Vec<HandFileInput>, screenshots: Vec<ScreenshotInput>) -> JobInputs {
        JobInputs {
            hand_files: files,
            screenshots,
            output_dir: self.out_dir.path().to_path_buf(),
        }
    }

    async fn read_output(&self, bucket: &str, file: &str) -> String {
        tokio::fs::read_to_string(self.out_dir.path().join(bucket).join(file))
            .await
            .unwrap_or_else(|e| panic!("missing output {bucket}/{file}: {e}"))
    }
}

#[tokio::test]
async fn happy_path_three_handed_resolves_table() {
    let harness = Harness::new(
        ScriptedVisionClient::new()
            .with_scan("shot-1", Ok(sample_scan()))
            .with_players("shot-1", Ok(sample_player_scan())),
    );
    let store = harness.pipeline.store();
    let job = store.create_job().await.unwrap();

    let inputs = harness.inputs(
        vec![HandFileInput {
            name: "cash.txt".into(),
            text: sample_hand_text(),
        }],
        vec![shot("shot-1")],
    );
    let outcome = harness
        .pipeline
        .run_job(job.id, inputs, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.statistics.hands_parsed, 1);
    assert_eq!(outcome.statistics.matched_screenshots, 1);
    assert_eq!(outcome.statistics.identity_matches, 1);
    assert_eq!(outcome.statistics.tables_resolved, 1);
    assert_eq!(outcome.statistics.hands_resolved, 1);
    assert_eq!(outcome.statistics.tables_incomplete, 0);
    assert!(outcome.statistics.residual_ids.is_empty());

    let text = harness
        .read_output("resolved", "RushAndCash88_resolved.txt")
        .await;
    assert!(text.contains("Seat 3: TuichAAreko ($10 in chips)"));
    assert!(text.contains("v1[nn]1: posts small blind $0.05"));
    assert!(text.contains("Gyodong22: posts big blind $0.1"));
    assert!(!text.contains("e3efcaed"));
    assert!(!text.contains("5641b4a0"));

    let record = store.get_job(job.id).await.unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert!(record.statistics.is_some());
    assert_eq!(record.ocr_processed, record.ocr_total);

    let rows = store.list_screenshots(job.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].matched_hand_id.as_deref(), Some("RC1001"));
    assert_eq!(rows[0].match_source.as_deref(), Some("HAND_ID"));

    assert!(outcome.packaged.resolved_archive.is_some());
    assert!(outcome.packaged.incomplete_archive.is_none());
    assert!(outcome.snapshot_path.as_ref().is_some_and(|p| p.exists()));
}

#[tokio::test]
async fn digit_leading_name_lands_in_every_position() {
    let players = PlayerScan {
        players: vec!["50Zoos".into(), "v1[nn]1".into(), "Gyodong22".into()],
        stacks: Some(vec![10.0, 8.4, 10.25]),
        dealer_player: Some("50Zoos".into()),
        small_blind_player: Some("v1[nn]1".into()),
        big_blind_player: Some("Gyodong22".into()),
    };
    let harness = Harness::new(
        ScriptedVisionClient::new()
            .with_scan("shot-1", Ok(sample_scan()))
            .with_players("shot-1", Ok(players)),
    );
    let store = harness.pipeline.store();
    let job = store.create_job().await.unwrap();

    let inputs = harness.inputs(
        vec![HandFileInput {
            name: "cash.txt".into(),
            text: sample_hand_text(),
        }],
        vec![shot("shot-1")],
    );
    harness
        .pipeline
        .run_job(job.id, inputs, CancellationToken::new())
        .await
        .unwrap();

    let text = harness
        .read_output("resolved", "RushAndCash88_resolved.txt")
        .await;
    assert!(text.contains("Seat 3: 50Zoos ($10 in chips)"));
    assert!(text.contains("Dealt to 50Zoos [Ah Kd]"));
    assert!(text.contains("Uncalled bet ($0.45) returned to 50Zoos"));
    assert!(text.contains("Seat 3: 50Zoos (button) collected ($0.67)"));
    assert!(!text.contains("0Zoos (") || text.contains("50Zoos ("));
}

#[tokio::test]
async fn dealer_only_payload_still_resolves() {
    let players = PlayerScan {
        small_blind_player: None,
        big_blind_player: None,
        ..sample_player_scan()
    };
    let harness = Harness::new(
        ScriptedVisionClient::new()
            .with_scan("shot-1", Ok(sample_scan()))
            .with_players("shot-1", Ok(players)),
    );
    let store = harness.pipeline.store();
    let job = store.create_job().await.unwrap();

    let inputs = harness.inputs(
        vec![HandFileInput {
            name: "cash.txt".into(),
            text: sample_hand_text(),
        }],
        vec![shot("shot-1")],
    );
    let outcome = harness
        .pipeline
        .run_job(job.id, inputs, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.statistics.tables_resolved, 1);
    let text = harness
        .read_output("resolved", "RushAndCash88_resolved.txt")
        .await;
    assert!(text.contains("TuichAAreko"));
    assert!(text.contains("v1[nn]1"));
    assert!(text.contains("Gyodong22"));
}

#[tokio::test]
async fn duplicate_name_sends_hand_to_fallado() {
    let players = PlayerScan {
        players: vec![
            "TuichAAreko".into(),
            "Gyodong22".into(),
            "Gyodong22".into(),
        ],
        stacks: None,
        dealer_player: Some("TuichAAreko".into()),
        small_blind_player: Some("Gyodong22".into()),
        big_blind_player: Some("Gyodong22".into()),
    };
    let harness = Harness::new(
        ScriptedVisionClient::new()
            .with_scan("shot-1", Ok(sample_scan()))
            .with_players("shot-1", Ok(players)),
    );
    let store = harness.pipeline.store();
    let job = store.create_job().await.unwrap();

    let inputs = harness.inputs(
        vec![HandFileInput {
            name: "cash.txt".into(),
            text: sample_hand_text(),
        }],
        vec![shot("shot-1")],
    );
    let outcome = harness
        .pipeline
        .run_job(job.id, inputs, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.statistics.duplicate_discards, 1);
    assert_eq!(outcome.statistics.hand_mappings, 0);
    assert_eq!(outcome.statistics.tables_incomplete, 1);

    let text = harness
        .read_output("fallado", "RushAndCash88_fallado.txt")
        .await;
    assert!(text.contains("e3efcaed"));

    let logs = store.list_logs(job.id).await.unwrap();
    assert!(logs
        .iter()
        .any(|l| l.level == LogLevel::Error && l.message.contains("RC1001")));
}

#[tokio::test]
async fn gate_rejection_keeps_anon_ids_and_skips_phase_two() {
    // the scan reads the right hand id but shows three players against a
    // two-seat hand
    let two_seat_hand = [
        "Poker Hand #RC1001: Hold'em No Limit ($0.05/$0.1) - 2024/01/20 17:38:25",
        "Table 'RushAndCash88' 6-max Seat #1 is the button",
        "Seat 1: Hero ($10 in chips)",
        "Seat 2: e3efcaed ($10.25 in chips)",
        "Hero: posts small blind $0.05",
        "e3efcaed: posts big blind $0.1",
        "*** HOLE CARDS ***",
        "Dealt to Hero [Ah Kd]",
        "Hero: folds",
        "*** SUMMARY ***",
        "Seat 1: Hero (button) folded before Flop",
        "Seat 2: e3efcaed (big blind) collected ($0.1)",
        "",
    ]
    .join("\n");

    let harness = Harness::new(
        ScriptedVisionClient::new()
            .with_scan(
                "shot-1",
                Ok(TableScan {
                    hand_id: Some("RC1001".to_string()),
                    stacks: vec![10.0, 9.0, 11.0],
                    ..Default::default()
                }),
            )
            .with_players("shot-1", Ok(sample_player_scan())),
    );
    let store = harness.pipeline.store();
    let job = store.create_job().await.unwrap();

    let inputs = harness.inputs(
        vec![HandFileInput {
            name: "cash.txt".into(),
            text: two_seat_hand,
        }],
        vec![shot("shot-1")],
    );
    let outcome = harness
        .pipeline
        .run_job(job.id, inputs, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.statistics.matched_screenshots, 0);
    assert!(outcome.statistics.gate_rejections >= 1);
    assert_eq!(outcome.statistics.tables_incomplete, 1);

    // cost gate: no phase-2 call for an unmatched screenshot
    assert_eq!(harness.vision.extract_calls(), 0);

    let rows = store.list_screenshots(job.id).await.unwrap();
    assert!(rows[0].matched_hand_id.is_none());
    assert!(rows[0]
        .discard_reason
        .as_deref()
        .is_some_and(|r| r.contains("gate rejection")));

    let text = harness
        .read_output("fallado", "RushAndCash88_fallado.txt")
        .await;
    assert!(text.contains("e3efcaed"));
}

#[tokio::test]
async fn one_screenshot_names_every_hand_at_the_table() {
    let harness = Harness::new(
        ScriptedVisionClient::new()
            .with_scan("shot-1", Ok(sample_scan()))
            .with_players("shot-1", Ok(sample_player_scan())),
    );
    let store = harness.pipeline.store();
    let job = store.create_job().await.unwrap();

    let both_hands = format!(
        "{}\n{}",
        sample_hand_text(),
        sample_hand_text_with("RC1002", "RushAndCash88")
    );
    let inputs = harness.inputs(
        vec![HandFileInput {
            name: "cash.txt".into(),
            text: both_hands,
        }],
        vec![shot("shot-1")],
    );
    let outcome = harness
        .pipeline
        .run_job(job.id, inputs, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.statistics.hands_parsed, 2);
    assert_eq!(outcome.statistics.matched_screenshots, 1);
    assert_eq!(outcome.statistics.hands_resolved, 2);
    assert_eq!(outcome.statistics.tables_resolved, 1);

    let text = harness
        .read_output("resolved", "RushAndCash88_resolved.txt")
        .await;
    assert!(text.contains("#RC1001"));
    assert!(text.contains("#RC1002"));
    assert_eq!(text.matches("Seat 3: TuichAAreko ($10 in chips)").count(), 2);
}

#[tokio::test]
async fn transient_scan_failure_recovers_in_retry_phase() {
    let harness = Harness::new(
        ScriptedVisionClient::new()
            .with_scan("shot-1", Err(VisionError::Transient("flaky".into())))
            .with_scan("shot-1", Ok(sample_scan()))
            .with_players("shot-1", Ok(sample_player_scan())),
    );
    let store = harness.pipeline.store();
    let job = store.create_job().await.unwrap();

    let mut config = crate::test_utils::config();
    config.ocr1_retry_delay_ms = 10;
    let pipeline = Pipeline::new(
        Arc::clone(&store),
        Arc::clone(&harness.vision) as Arc<dyn crate::vision::VisionClient>,
        config,
    );

    let inputs = harness.inputs(
        vec![HandFileInput {
            name: "cash.txt".into(),
            text: sample_hand_text(),
        }],
        vec![shot("shot-1")],
    );
    let outcome = pipeline
        .run_job(job.id, inputs, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.statistics.ocr1_retries, 1);
    assert_eq!(outcome.statistics.matched_screenshots, 1);
    assert_eq!(outcome.statistics.tables_resolved, 1);

    let rows = store.list_screenshots(job.id).await.unwrap();
    assert_eq!(rows[0].ocr1_retry_count, 1);
    assert!(rows[0].ocr1_error.is_none());
}

#[tokio::test]
async fn missing_credential_fails_the_job_loudly() {
    let harness = Harness::new(
        ScriptedVisionClient::new().with_scan("shot-1", Err(VisionError::AuthMissing)),
    );
    let store = harness.pipeline.store();
    let job = store.create_job().await.unwrap();

    let inputs = harness.inputs(
        vec![HandFileInput {
            name: "cash.txt".into(),
            text: sample_hand_text(),
        }],
        vec![shot("shot-1")],
    );
    let err = harness
        .pipeline
        .run_job(job.id, inputs, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Vision(VisionError::AuthMissing)));

    let record = store.get_job(job.id).await.unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record
        .failure_reason
        .as_deref()
        .is_some_and(|r| r.contains("vision")));
}

#[tokio::test]
async fn cancellation_fails_with_reason() {
    let harness = Harness::new(ScriptedVisionClient::new());
    let store = harness.pipeline.store();
    let job = store.create_job().await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let inputs = harness.inputs(
        vec![HandFileInput {
            name: "cash.txt".into(),
            text: sample_hand_text(),
        }],
        vec![shot("shot-1")],
    );
    let err = harness.pipeline.run_job(job.id, inputs, cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));

    let record = store.get_job(job.id).await.unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.failure_reason.as_deref(), Some(CANCELLED_REASON));
}

#[tokio::test]
async fn malformed_file_fails_the_whole_job() {
    let harness = Harness::new(ScriptedVisionClient::new());
    let store = harness.pipeline.store();
    let job = store.create_job().await.unwrap();

    let inputs = harness.inputs(
        vec![HandFileInput {
            name: "junk.txt".into(),
            text: "not a hand history".into(),
        }],
        vec![],
    );
    let err = harness
        .pipeline
        .run_job(job.id, inputs, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Parse(_)));

    let record = store.get_job(job.id).await.unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    // terminal transition still produced the snapshot
    let debug_dir = harness.out_dir.path().join("debug");
    assert!(std::fs::read_dir(debug_dir).unwrap().next().is_some());
}

#[tokio::test]
async fn input_limits_are_enforced() {
    let harness = Harness::new(ScriptedVisionClient::new());
    let store = harness.pipeline.store();
    let job = store.create_job().await.unwrap();

    let files = (0..25)
        .map(|i| HandFileInput {
            name: format!("cash-{i}.txt"),
            text: sample_hand_text(),
        })
        .collect();
    let err = harness
        .pipeline
        .run_job(job.id, harness.inputs(files, vec![]), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InputLimit { kind: "hand files", .. }));
}

#[tokio::test]
async fn reprocessing_a_completed_job_is_idempotent() {
    let harness = Harness::new(
        ScriptedVisionClient::new()
            .with_scan("shot-1", Ok(sample_scan()))
            .with_players("shot-1", Ok(sample_player_scan())),
    );
    let store = harness.pipeline.store();
    let job = store.create_job().await.unwrap();

    let inputs = harness.inputs(
        vec![HandFileInput {
            name: "cash.txt".into(),
            text: sample_hand_text(),
        }],
        vec![shot("shot-1")],
    );

    let first = harness
        .pipeline
        .run_job(job.id, inputs.clone(), CancellationToken::new())
        .await
        .unwrap();
    let first_text = harness
        .read_output("resolved", "RushAndCash88_resolved.txt")
        .await;

    let second = harness
        .pipeline
        .run_job(job.id, inputs, CancellationToken::new())
        .await
        .unwrap();
    let second_text = harness
        .read_output("resolved", "RushAndCash88_resolved.txt")
        .await;

    assert_eq!(first_text, second_text);
    assert_eq!(
        first.statistics.tables_resolved,
        second.statistics.tables_resolved
    );
    assert_eq!(store.list_screenshots(job.id).await.unwrap().len(), 1);
    assert_eq!(store.list_files(job.id).await.unwrap().len(), 2);
}
