//! Full batch generation tests.

use std::time::Duration;

use pageforge::core::Page;
use pageforge::orchestration::{GenerateRequest, GenerationEvent, OrchestratorSettings, Phase};
use pageforge::Error;

use crate::fixtures::{
    completed_indices, default_image, done, failed_indices, pages, rate_limited,
    terminal_count, Harness, ScriptedProvider,
};

fn request(task_id: &str, pages: Vec<Page>) -> GenerateRequest {
    GenerateRequest {
        task_id: task_id.to_string(),
        pages,
        full_outline: "A four page guide".to_string(),
        ..GenerateRequest::default()
    }
}

/// Test: Mixed outcomes
/// Given pages 1 and 3 fail at the provider
/// When the batch runs to completion
/// Then done reports 2 successes, 2 failures and the failed indices
#[tokio::test]
async fn test_partial_failure_reports_done() {
    let provider = ScriptedProvider::new();
    provider.fail(1, rate_limited()).fail(3, rate_limited());
    let harness = Harness::new(provider);

    let events = harness
        .orchestrator
        .generate(request("t1", pages(&[1, 2, 3, 4])))
        .await
        .unwrap()
        .collect_all()
        .await;

    let summary = done(&events).expect("batch should end with done");
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 2);
    assert_eq!(summary.total, 4);
    assert_eq!(summary.failed_indices, vec![1, 3]);
    assert_eq!(completed_indices(&events), vec![2, 4]);
    assert_eq!(failed_indices(&events), vec![1, 3]);
    assert!(matches!(events.last(), Some(GenerationEvent::Done(_))));
    assert_eq!(terminal_count(&events), 1);

    let snapshot = harness.orchestrator.get_task_state("t1").await.unwrap();
    assert_eq!(snapshot.generated.keys().copied().collect::<Vec<_>>(), vec![2, 4]);
    assert_eq!(snapshot.failed.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    assert!(snapshot.failed[&1].starts_with("rate_limited"));
}

/// Test: Failure payload
/// Given a rate-limited page
/// When its page_failed event arrives
/// Then it carries the reason code and is marked retryable
#[tokio::test]
async fn test_failed_event_payload() {
    let provider = ScriptedProvider::new();
    provider.fail(0, rate_limited());
    let harness = Harness::new(provider);

    let events = harness
        .orchestrator
        .generate(request("t1", pages(&[0])))
        .await
        .unwrap()
        .collect_all()
        .await;

    let failed = events
        .iter()
        .find_map(|e| match e {
            GenerationEvent::PageFailed(f) => Some(f.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(failed.reason, "rate_limited");
    assert_eq!(failed.message, "Quota exceeded");
    assert!(failed.retryable);
}

/// Test: Cover first
/// Given a cover page and two content pages
/// When the batch runs
/// Then the cover launches first and its image is attached to later pages
#[tokio::test]
async fn test_cover_runs_first_and_becomes_reference() {
    let provider = ScriptedProvider::new();
    let harness = Harness::new(provider.clone());
    let mut batch = vec![Page::cover(0, crate::fixtures::marker(0))];
    batch.extend(pages(&[1, 2]));

    let events = harness
        .orchestrator
        .generate(request("t1", batch))
        .await
        .unwrap()
        .collect_all()
        .await;

    match &events[0] {
        GenerationEvent::Progress(p) => {
            assert_eq!(p.index, 0);
            assert_eq!(p.phase, Phase::Cover);
            assert_eq!(p.current, 1);
            assert_eq!(p.total, 3);
        }
        other => panic!("expected cover progress first, got {other:?}"),
    }
    assert!(matches!(&events[1], GenerationEvent::PageComplete(c) if c.index == 0));

    let cover_request = provider.request_for(0).unwrap();
    assert!(cover_request.reference_images.is_empty());
    for index in [1, 2] {
        let req = provider.request_for(index).unwrap();
        assert_eq!(req.reference_images, vec![default_image(0)]);
    }
    assert!(harness.orchestrator.get_task_state("t1").await.unwrap().has_cover);
}

/// Test: Progress numbering
/// Given three pages
/// When they launch
/// Then progress events count launches from 1 up to the total
#[tokio::test]
async fn test_progress_counts_launches() {
    let harness = Harness::new(ScriptedProvider::new());
    let events = harness
        .orchestrator
        .generate(request("t1", pages(&[0, 1, 2])))
        .await
        .unwrap()
        .collect_all()
        .await;

    let mut currents: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            GenerationEvent::Progress(p) => Some(p.current),
            _ => None,
        })
        .collect();
    currents.sort_unstable();
    assert_eq!(currents, vec![1, 2, 3]);
}

/// Test: Concurrency bound
/// Given a pool of 2 and six slow pages
/// When the batch runs
/// Then at most two provider calls are ever in flight
#[tokio::test]
async fn test_pool_bounds_concurrency() {
    let provider = ScriptedProvider::new();
    for index in 0..6 {
        provider.delay(index, Duration::from_millis(40));
    }
    let settings = OrchestratorSettings {
        max_concurrent: 2,
        ..OrchestratorSettings::default()
    };
    let harness = Harness::with_settings(provider.clone(), settings);

    let events = harness
        .orchestrator
        .generate(request("t1", pages(&[0, 1, 2, 3, 4, 5])))
        .await
        .unwrap()
        .collect_all()
        .await;

    assert_eq!(done(&events).unwrap().success_count, 6);
    assert_eq!(provider.calls(), 6);
    assert!(provider.peak_concurrency() <= 2);
    assert!(provider.peak_concurrency() >= 1);
}

/// Test: Completion order
/// Given page 0 is slow and page 1 is fast
/// When both run concurrently
/// Then page 1 is reported first
#[tokio::test]
async fn test_events_follow_completion_order() {
    let provider = ScriptedProvider::new();
    provider.delay(0, Duration::from_millis(150));
    let harness = Harness::new(provider);

    let events = harness
        .orchestrator
        .generate(request("t1", pages(&[0, 1])))
        .await
        .unwrap()
        .collect_all()
        .await;

    let order: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            GenerationEvent::PageComplete(c) => Some(c.index),
            _ => None,
        })
        .collect();
    assert_eq!(order, vec![1, 0]);
}

/// Test: Context forwarding
/// Given an outline, a topic and two user images
/// When a page is generated
/// Then the prompt carries the outline and topic and the images are attached
#[tokio::test]
async fn test_context_reaches_provider() {
    let provider = ScriptedProvider::new();
    let harness = Harness::new(provider.clone());
    let req = GenerateRequest {
        task_id: "t1".to_string(),
        pages: pages(&[0]),
        full_outline: "Outline body".to_string(),
        user_topic: Some("Tide pools".to_string()),
        user_images: vec![vec![7], vec![8]],
    };
    harness
        .orchestrator
        .generate(req)
        .await
        .unwrap()
        .collect_all()
        .await;

    let sent = provider.request_for(0).unwrap();
    assert!(sent.prompt.contains("Outline body"));
    assert!(sent.prompt.contains("Tide pools"));
    assert_eq!(sent.reference_images, vec![vec![7], vec![8]]);
}

/// Test: Validation
/// Given an empty page list
/// When generate is called
/// Then it fails with a validation error and the provider is never called
#[tokio::test]
async fn test_empty_pages_rejected() {
    let provider = ScriptedProvider::new();
    let harness = Harness::new(provider.clone());

    let err = harness
        .orchestrator
        .generate(request("t1", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(provider.calls(), 0);
}

/// Test: Concurrent tasks
/// Given two tasks generated at the same time
/// When both finish
/// Then each task's state only holds its own pages
#[tokio::test]
async fn test_tasks_are_isolated() {
    let harness = Harness::new(ScriptedProvider::new());
    let a = harness
        .orchestrator
        .generate(request("a", pages(&[0, 1])))
        .await
        .unwrap();
    let b = harness
        .orchestrator
        .generate(request("b", pages(&[5])))
        .await
        .unwrap();
    let (_, _) = tokio::join!(a.collect_all(), b.collect_all());

    let a = harness.orchestrator.get_task_state("a").await.unwrap();
    let b = harness.orchestrator.get_task_state("b").await.unwrap();
    assert_eq!(a.generated.len(), 2);
    assert_eq!(b.generated.keys().copied().collect::<Vec<_>>(), vec![5]);
}
