mod common;

use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use webcapt::capture::CaptureError;
use webcapt::dispatch::SerializationDispatcher;
use webcapt::engine::{EngineSignal, Size};
use webcapt::format::OutputFormat;
use webcapt::orchestrator::CompletionOrchestrator;
use webcapt::session::FireTrigger;

use common::ScriptedPage;

const LOAD_OK: EngineSignal = EngineSignal::LoadComplete { success: true };

fn orchestrator(dir: &TempDir, delay: Duration, max_wait: Option<Duration>) -> CompletionOrchestrator {
    let dispatcher =
        SerializationDispatcher::new(OutputFormat::PlainText, dir.path().join("page.txt"), 800);
    CompletionOrchestrator::new(delay, max_wait, dispatcher)
}

fn page() -> ScriptedPage {
    ScriptedPage::new(Size::new(800, 600))
}

#[tokio::test(start_paused = true)]
async fn layout_then_load_exports_immediately_without_delay() {
    let dir = TempDir::new().unwrap();
    let page = page();
    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send(EngineSignal::LayoutReady).unwrap();
    tx.send(LOAD_OK).unwrap();

    let start = Instant::now();
    let outcome = orchestrator(&dir, Duration::ZERO, Some(Duration::from_secs(90)))
        .run(&page, &mut rx)
        .await
        .expect("capture");

    assert_eq!(outcome.trigger, FireTrigger::Ready);
    assert_eq!(outcome.load_succeeded, Some(true));
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(page.export_count(), 1);
    assert_eq!(std::fs::read_to_string(dir.path().join("page.txt")).unwrap(), "hi");
}

#[tokio::test(start_paused = true)]
async fn load_then_layout_exports_immediately_without_delay() {
    let dir = TempDir::new().unwrap();
    let page = page();
    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send(LOAD_OK).unwrap();
    tx.send(EngineSignal::LayoutReady).unwrap();

    let start = Instant::now();
    let outcome = orchestrator(&dir, Duration::ZERO, None)
        .run(&page, &mut rx)
        .await
        .expect("capture");

    assert_eq!(outcome.trigger, FireTrigger::Ready);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(page.export_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn delay_starts_after_the_second_signal() {
    let dir = TempDir::new().unwrap();
    let page = page();
    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send(EngineSignal::LayoutReady).unwrap();
    tokio::spawn(async move {
        time::sleep(Duration::from_millis(100)).await;
        tx.send(LOAD_OK).unwrap();
        // Keep the stream open past the delay.
        time::sleep(Duration::from_secs(10)).await;
        drop(tx);
    });

    let start = Instant::now();
    let outcome = orchestrator(&dir, Duration::from_millis(500), Some(Duration::from_secs(90)))
        .run(&page, &mut rx)
        .await
        .expect("capture");

    assert_eq!(outcome.trigger, FireTrigger::Delay);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(600), "fired after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(700), "fired after {elapsed:?}");
    assert_eq!(page.export_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_fires_without_any_signal() {
    let dir = TempDir::new().unwrap();
    let page = page();
    let (_tx, mut rx) = mpsc::unbounded_channel::<EngineSignal>();

    let start = Instant::now();
    let outcome = orchestrator(&dir, Duration::ZERO, Some(Duration::from_millis(1_000)))
        .run(&page, &mut rx)
        .await
        .expect("capture");

    assert_eq!(outcome.trigger, FireTrigger::Timeout);
    assert_eq!(outcome.load_succeeded, None);
    assert!(start.elapsed() >= Duration::from_millis(1_000));
    assert_eq!(page.export_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_preempts_a_pending_delay() {
    let dir = TempDir::new().unwrap();
    let page = page();
    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send(EngineSignal::LayoutReady).unwrap();
    tx.send(LOAD_OK).unwrap();

    let start = Instant::now();
    let outcome = orchestrator(&dir, Duration::from_secs(5), Some(Duration::from_secs(1)))
        .run(&page, &mut rx)
        .await
        .expect("capture");

    assert_eq!(outcome.trigger, FireTrigger::Timeout);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(5));
    assert_eq!(page.export_count(), 1);
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn repeated_signals_export_once() {
    let dir = TempDir::new().unwrap();
    let page = page();
    let (tx, mut rx) = mpsc::unbounded_channel();
    for signal in [
        EngineSignal::LayoutReady,
        LOAD_OK,
        EngineSignal::LoadComplete { success: false },
        EngineSignal::LayoutReady,
    ] {
        tx.send(signal).unwrap();
    }

    let orchestrator = orchestrator(&dir, Duration::from_millis(50), Some(Duration::from_secs(1)));
    let outcome = orchestrator.run(&page, &mut rx).await.expect("capture");

    assert_eq!(outcome.trigger, FireTrigger::Delay);
    assert_eq!(outcome.load_succeeded, Some(true));
    assert_eq!(page.export_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_load_is_still_captured() {
    let dir = TempDir::new().unwrap();
    let page = page();
    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send(EngineSignal::LoadComplete { success: false }).unwrap();
    tx.send(EngineSignal::LayoutReady).unwrap();

    let outcome = orchestrator(&dir, Duration::ZERO, None)
        .run(&page, &mut rx)
        .await
        .expect("capture");

    assert_eq!(outcome.trigger, FireTrigger::Ready);
    assert_eq!(outcome.load_succeeded, Some(false));
}

#[tokio::test(start_paused = true)]
async fn closed_stream_without_timers_is_abandoned() {
    let dir = TempDir::new().unwrap();
    let page = page();
    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send(EngineSignal::LayoutReady).unwrap();
    drop(tx);

    let err = orchestrator(&dir, Duration::ZERO, None)
        .run(&page, &mut rx)
        .await
        .expect_err("nothing left to wait for");

    assert!(matches!(err, CaptureError::Abandoned));
    assert_eq!(page.export_count(), 0);
    assert!(!dir.path().join("page.txt").exists());
}

#[tokio::test(start_paused = true)]
async fn closed_stream_still_honours_the_timeout() {
    let dir = TempDir::new().unwrap();
    let page = page();
    let (tx, mut rx) = mpsc::unbounded_channel::<EngineSignal>();
    drop(tx);

    let outcome = orchestrator(&dir, Duration::ZERO, Some(Duration::from_millis(250)))
        .run(&page, &mut rx)
        .await
        .expect("capture");

    assert_eq!(outcome.trigger, FireTrigger::Timeout);
    assert_eq!(page.export_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn closed_stream_still_honours_a_pending_delay() {
    let dir = TempDir::new().unwrap();
    let page = page();
    let (tx, mut rx) = mpsc::unbounded_channel();
    tx.send(EngineSignal::LayoutReady).unwrap();
    tx.send(LOAD_OK).unwrap();
    drop(tx);

    let outcome = orchestrator(&dir, Duration::from_millis(300), None)
        .run(&page, &mut rx)
        .await
        .expect("capture");

    assert_eq!(outcome.trigger, FireTrigger::Delay);
    assert_eq!(page.export_count(), 1);
}
