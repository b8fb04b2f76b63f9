//! End-to-end tests for the config sync service: reads, refresh cycles,
//! retries, reset and notifications.

mod common;

use serde_json::json;
use tempfile::TempDir;

use common::{TestRemote, file_sync, finish, memory_sync};
use rtlfix::sync::{ConfigEvent, SchedulerState, TypeOutcome};
use rtlfix_config::{ConfigType, EntrySource, UpdateStatus, bundled, now_millis};
use rtlfix_update::fingerprint;

const MINUTE: i64 = 60_000;

fn compatible_styles() -> serde_json::Value {
    json!({
        "rtl-auto": {"direction": "rtl", "unicode-bidi": "plaintext", "text-align": "start"},
        "rtl-inherit": {"direction": "inherit", "unicode-bidi": "isolate", "text-align": "start"},
        "rtl-force": {"direction": "rtl", "unicode-bidi": "bidi-override", "text-align": "right"},
        "ltr-force": {"direction": "ltr", "unicode-bidi": "embed", "text-align": "left"}
    })
}

// ── Reads ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_read_is_never_absent_on_empty_store() {
    let remote = TestRemote::new();
    let (sync, backend) = memory_sync(&remote, 3);
    assert!(backend.is_empty());

    for t in ConfigType::ALL {
        assert_eq!(&sync.read(t), bundled(t));
    }
}

#[tokio::test]
async fn test_compatible_candidate_round_trips_to_read() {
    let remote = TestRemote::with_bundled();
    remote.serve(ConfigType::Styles, &compatible_styles());
    let (sync, _) = memory_sync(&remote, 3);

    let report = finish(sync.force_refresh()).await;

    assert_eq!(report.status, UpdateStatus::Success);
    assert_eq!(sync.read(ConfigType::Styles).as_value(), &compatible_styles());
    assert!(sync.facade().styles().contains_key("ltr-force"));
}

#[tokio::test]
async fn test_accepted_loose_documents_reach_typed_readers() {
    let remote = TestRemote::with_bundled();
    remote.serve(
        ConfigType::Domains,
        &json!([
            {
                "domain": "chat.mistral.ai",
                "position": {"corner": "top-right", "offsetX": 8, "offsetY": 8},
                "selectors": {"attributes": [], "tags": ["p"], "classes": ["prose"]}
            },
            {"domain": "broken.example"}
        ]),
    );
    let mut defaults = bundled(ConfigType::Defaults).as_value().clone();
    defaults["position"]["offsetX"] = json!(12.5);
    defaults["settings"]["debounceMs"] = json!(400);
    remote.serve(ConfigType::Defaults, &defaults);
    let mut styles = compatible_styles();
    styles["rtl-auto"]["line-height"] = json!(1.6);
    remote.serve(ConfigType::Styles, &styles);
    let (sync, _) = memory_sync(&remote, 3);

    let report = finish(sync.force_refresh()).await;
    assert_eq!(report.status, UpdateStatus::Success);

    let facade = sync.facade();
    let rule = facade.domain_rule_for("chat.mistral.ai").expect("remote rule");
    assert_eq!(rule.position.corner, "top-right");
    assert_eq!(facade.domains().len(), 1);

    let typed = facade.defaults();
    assert_eq!(typed.position.offset_x, 12.5);
    assert_eq!(typed.settings.debounce_ms, 400);

    let styles = facade.styles();
    assert_eq!(styles.class("rtl-auto").unwrap()["line-height"].as_css(), "1.6");
}

// ── Idempotence and unchanged detection ────────────────────────────────

#[tokio::test]
async fn test_repeated_force_refresh_is_idempotent() {
    let remote = TestRemote::with_bundled();
    let (sync, _) = memory_sync(&remote, 3);

    finish(sync.force_refresh()).await;
    let first = sync.status();
    let first_docs: Vec<_> = ConfigType::ALL.iter().map(|&t| sync.read(t)).collect();

    let second_report = finish(sync.force_refresh()).await;
    let second = sync.status();

    for t in ConfigType::ALL {
        assert_eq!(second_report.outcome(t), Some(&TypeOutcome::Unchanged));
        let before = first.type_status(t).unwrap();
        let after = second.type_status(t).unwrap();
        assert_eq!(before.content_hash, after.content_hash);
        assert!(after.timestamp >= before.timestamp);
    }
    let second_docs: Vec<_> = ConfigType::ALL.iter().map(|&t| sync.read(t)).collect();
    assert_eq!(first_docs, second_docs);
}

#[tokio::test]
async fn test_fingerprint_matches_raw_body() {
    let remote = TestRemote::with_bundled();
    let (sync, _) = memory_sync(&remote, 3);
    finish(sync.force_refresh()).await;

    let body = serde_json::to_vec(bundled(ConfigType::Ui).as_value()).unwrap();
    let status = sync.status();
    let ui = status.type_status(ConfigType::Ui).unwrap();
    assert_eq!(ui.content_hash.as_deref(), Some(fingerprint(&body).as_str()));
    assert_eq!(ui.source, EntrySource::Remote);
}

// ── Rejection ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_candidate_missing_baseline_key_is_rejected() {
    let remote = TestRemote::with_bundled();
    let (sync, _) = memory_sync(&remote, 3);
    finish(sync.force_refresh()).await;
    let accepted = sync.read(ConfigType::Ui);

    // Drop a key the baseline has
    let mut broken = bundled(ConfigType::Ui).as_value().clone();
    broken.as_object_mut().unwrap().remove("theme");
    remote.serve(ConfigType::Ui, &broken);

    let report = finish(sync.force_refresh()).await;

    match report.outcome(ConfigType::Ui) {
        Some(TypeOutcome::Rejected(err)) => assert!(err.path.contains("theme"), "{err}"),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(report.status, UpdateStatus::Partial);
    assert_eq!(sync.read(ConfigType::Ui), accepted);
}

#[tokio::test]
async fn test_rejected_first_fetch_keeps_bundled() {
    let remote = TestRemote::with_bundled();
    remote.serve(ConfigType::Domains, &json!({"not": "a list"}));
    let (sync, _) = memory_sync(&remote, 3);

    finish(sync.force_refresh()).await;

    assert_eq!(&sync.read(ConfigType::Domains), bundled(ConfigType::Domains));
}

#[tokio::test]
async fn test_styles_missing_rtl_force_rejected() {
    let remote = TestRemote::with_bundled();
    let mut styles = compatible_styles();
    styles.as_object_mut().unwrap().remove("rtl-force");
    remote.serve(ConfigType::Styles, &styles);
    let (sync, _) = memory_sync(&remote, 3);

    let report = finish(sync.force_refresh()).await;

    assert!(matches!(
        report.outcome(ConfigType::Styles),
        Some(TypeOutcome::Rejected(_))
    ));
    assert!(sync.facade().styles().contains_key("rtl-force"));
    assert!(!sync.facade().styles().contains_key("ltr-force"));
}

// ── Backoff ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_three_failures_then_success() {
    let remote = TestRemote::with_bundled();
    remote.fail_next(ConfigType::Defaults, 3);
    let (sync, _) = memory_sync(&remote, 4);

    let report = finish(sync.force_refresh()).await;

    assert!(matches!(
        report.outcome(ConfigType::Defaults),
        Some(TypeOutcome::Updated { .. })
    ));
    assert_eq!(remote.requests(ConfigType::Defaults), 4);
    assert_eq!(report.status, UpdateStatus::Success);
}

#[tokio::test]
async fn test_persistent_failure_makes_exactly_max_attempts() {
    let remote = TestRemote::with_bundled();
    remote.fail_next(ConfigType::Domains, u32::MAX);
    let (sync, _) = memory_sync(&remote, 3);

    let report = finish(sync.force_refresh()).await;

    assert_eq!(remote.requests(ConfigType::Domains), 3);
    assert!(matches!(
        report.outcome(ConfigType::Domains),
        Some(TypeOutcome::Failed { attempts: 3, .. })
    ));
    assert_eq!(report.status, UpdateStatus::Partial);
    let status = sync.status();
    assert_eq!(status.last_update_status, UpdateStatus::Partial);
    assert!(status.last_successful_update.is_none());
    assert_eq!(&sync.read(ConfigType::Domains), bundled(ConfigType::Domains));
}

// ── Refresh decision ───────────────────────────────────────────────────

#[tokio::test]
async fn test_refresh_due_after_interval() {
    let remote = TestRemote::with_bundled();
    let (sync, _) = memory_sync(&remote, 3);
    assert_eq!(sync.status().refresh_interval_minutes, 360);

    let before = now_millis();
    finish(sync.force_refresh()).await;
    let last_check = sync.status().last_check.expect("check recorded");
    assert!(last_check >= before);

    let scheduler = sync.scheduler();
    assert!(scheduler.should_refresh_at(last_check + 400 * MINUTE));
    assert!(!scheduler.should_refresh_at(last_check + 300 * MINUTE));
}

#[tokio::test]
async fn test_check_and_refresh_skips_when_not_due() {
    let remote = TestRemote::with_bundled();
    let (sync, _) = memory_sync(&remote, 3);

    let first = sync.check_and_refresh().expect("never checked, so due");
    finish(first).await;

    assert!(sync.check_and_refresh().is_none());
    assert_eq!(remote.requests(ConfigType::Ui), 1);
}

#[tokio::test]
async fn test_interval_update_changes_decision() {
    let remote = TestRemote::with_bundled();
    let (sync, _) = memory_sync(&remote, 3);
    finish(sync.force_refresh()).await;
    let last_check = sync.status().last_check.unwrap();

    assert_eq!(sync.update_refresh_interval(30).unwrap(), 30);
    assert!(sync.scheduler().should_refresh_at(last_check + 31 * MINUTE));
    assert_eq!(sync.status().refresh_interval_minutes, 30);
}

// ── Reset ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_clear_all_configs_restores_bundled() {
    let remote = TestRemote::with_bundled();
    let mut domains = bundled(ConfigType::Domains).as_value().clone();
    domains.as_array_mut().unwrap().push(json!({
        "domain": "chat.mistral.ai",
        "position": {"corner": "top-right", "offsetX": 0, "offsetY": 0},
        "selectors": {"attributes": ["dir"], "tags": ["p"], "classes": ["prose"]}
    }));
    remote.serve(ConfigType::Domains, &domains);
    let (sync, backend) = memory_sync(&remote, 3);

    finish(sync.force_refresh()).await;
    assert!(sync.facade().domain_rule_for("chat.mistral.ai").is_some());

    let (_, mut events) = sync.register();
    sync.clear_all_configs().await.unwrap();

    assert!(backend.is_empty());
    assert_eq!(&sync.read(ConfigType::Domains), bundled(ConfigType::Domains));
    let status = sync.status();
    let entry = status.type_status(ConfigType::Domains).unwrap();
    assert_eq!(entry.source, EntrySource::Bundled);
    assert_eq!(status.last_update_status, UpdateStatus::Never);
    assert!(sync.should_refresh());
    assert!(matches!(events.try_recv(), Ok(ConfigEvent::Reset)));
}

// ── Concurrency and notifications ──────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_callers_share_cycle_report() {
    let remote = TestRemote::with_bundled();
    let (sync, _) = memory_sync(&remote, 3);

    let handles: Vec<_> = (0..5).map(|_| sync.force_refresh()).collect();
    let mut reports = Vec::new();
    for handle in handles {
        reports.push(finish(handle).await);
    }

    // Every caller hears about the cycle its request landed in; requests
    // that missed a running drain start the next one
    for report in &reports {
        assert_eq!(report.status, UpdateStatus::Success);
    }
    let cycles: std::collections::BTreeSet<i64> = reports.iter().map(|r| r.started_at).collect();
    assert!(cycles.len() <= 2, "at most one cycle running plus one queued");
    assert_eq!(sync.scheduler().state(), SchedulerState::Idle);
}

#[tokio::test]
async fn test_consumers_notified_and_pruned() {
    let remote = TestRemote::with_bundled();
    let (sync, _) = memory_sync(&remote, 3);
    let (_, mut live) = sync.register();
    let (_, gone) = sync.register();
    drop(gone);
    assert_eq!(sync.broadcaster().consumer_count(), 2);

    let report = finish(sync.force_refresh()).await;

    match live.recv().await {
        Some(ConfigEvent::Refreshed(event)) => assert_eq!(event, report),
        other => panic!("expected refresh event, got {other:?}"),
    }
    assert_eq!(sync.broadcaster().consumer_count(), 1);
}

#[tokio::test]
async fn test_unregistered_consumer_gets_nothing() {
    let remote = TestRemote::with_bundled();
    let (sync, _) = memory_sync(&remote, 3);
    let (id, mut events) = sync.register();
    assert!(sync.unregister(id));

    finish(sync.force_refresh()).await;
    assert!(events.try_recv().is_err());
}

// ── Persistence ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = TempDir::new().unwrap();
    let remote = TestRemote::with_bundled();
    remote.serve(ConfigType::Styles, &compatible_styles());

    {
        let sync = file_sync(&remote, &dir);
        finish(sync.force_refresh()).await;
        sync.shutdown();
    }

    let offline = TestRemote::new();
    let reopened = file_sync(&offline, &dir);
    assert_eq!(
        reopened.read(ConfigType::Styles).as_value(),
        &compatible_styles()
    );
    let status = reopened.status();
    assert_eq!(status.last_update_status, UpdateStatus::Success);
    assert!(!reopened.should_refresh());
}
