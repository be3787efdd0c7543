//! Durability across engine restarts, for each on-disk backend.

#![allow(missing_docs)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use drawer_core::{EventId, EventRecord, MessageContent, SimpleContent};
use drawer_engine::{DrawerEngine, RecordingRenderer, RenderInstruction};
use drawer_settings::{DrawerSettings, PersistenceBackend, PersistenceSettings};

fn settings(backend: PersistenceBackend, path: &Path) -> DrawerSettings {
    DrawerSettings {
        persistence: PersistenceSettings {
            backend,
            path: path.to_string_lossy().into_owned(),
        },
        ..DrawerSettings::default()
    }
}

fn start(settings: DrawerSettings) -> (DrawerEngine, Arc<RecordingRenderer>) {
    let renderer = Arc::new(RecordingRenderer::new());
    let engine = DrawerEngine::builder(renderer.clone())
        .settings(settings)
        .start();
    (engine, renderer)
}

fn records() -> Vec<EventRecord> {
    vec![
        EventRecord::message(
            "e1",
            "!a",
            1,
            MessageContent {
                sender_id: "@bob".into(),
                body: "first".into(),
                ..MessageContent::default()
            },
        )
        .noisy(true),
        EventRecord::message(
            "e2",
            "!a",
            2,
            MessageContent {
                sender_id: "@carol".into(),
                body: "second".into(),
                ..MessageContent::default()
            },
        )
        .with_sound("chime"),
        EventRecord::simple(
            "s1",
            None,
            3,
            SimpleContent {
                title: "Call".into(),
                description: "Missed call".into(),
                kind_tag: "m.call".into(),
            },
        ),
    ]
}

fn live(records: Vec<EventRecord>) -> Vec<(EventId, drawer_core::EventKind)> {
    records
        .into_iter()
        .filter(|r| !r.is_redacted)
        .map(|r| (r.event_id, r.kind))
        .collect()
}

async fn persist_and_restore(backend: PersistenceBackend, file: &str) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(file);

    let before = {
        let (engine, _) = start(settings(backend, &path));
        for r in records() {
            let _ = engine.on_notifiable_event_received(r);
        }
        let _ = engine.on_event_redacted(&EventId::from("e2"));
        assert!(engine.persist());
        live(engine.snapshot())
    };
    assert_eq!(before.len(), 2);

    let (restored, _) = start(settings(backend, &path));
    assert_eq!(live(restored.snapshot()), before);
}

#[tokio::test]
async fn file_backend_restores_live_records() {
    persist_and_restore(PersistenceBackend::File, "cache.json").await;
}

#[tokio::test]
async fn sqlite_backend_restores_live_records() {
    persist_and_restore(PersistenceBackend::Sqlite, "drawer.db").await;
}

#[tokio::test(start_paused = true)]
async fn restored_notifications_rerender_without_alerting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");

    {
        let (engine, _) = start(settings(PersistenceBackend::File, &path));
        for r in records() {
            let _ = engine.on_notifiable_event_received(r);
        }
        // A pass marks everything rendered and writes the snapshot.
        assert!(engine.refresh_now().persisted);
    }

    let (engine, renderer) = start(settings(PersistenceBackend::File, &path));
    assert_eq!(engine.snapshot().len(), 3);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let rendered = renderer.take();
    let labels: Vec<&str> = rendered.iter().map(RenderInstruction::label).collect();
    assert_eq!(labels, ["render_conversation", "render_simple", "render_summary"]);
    assert!(!rendered.iter().any(RenderInstruction::alerts));
}

#[tokio::test]
async fn corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(&path, "{\"version\": 1, \"records\": [tru").unwrap();

    let (engine, _) = start(settings(PersistenceBackend::File, &path));
    assert!(engine.snapshot().is_empty());
}

#[tokio::test]
async fn corrupt_database_starts_empty_and_keeps_persisting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drawer.db");
    std::fs::write(&path, vec![0x42u8; 8192]).unwrap();

    {
        let (engine, _) = start(settings(PersistenceBackend::Sqlite, &path));
        assert!(engine.snapshot().is_empty());
        for r in records() {
            let _ = engine.on_notifiable_event_received(r);
        }
        assert!(engine.persist());
    }

    let (restored, _) = start(settings(PersistenceBackend::Sqlite, &path));
    assert_eq!(restored.snapshot().len(), 3);
}

#[tokio::test]
async fn unusable_store_path_falls_back_to_memory() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let (engine, _) = start(settings(PersistenceBackend::Sqlite, &blocker.join("drawer.db")));
    for r in records() {
        let _ = engine.on_notifiable_event_received(r);
    }
    assert!(engine.persist());
    assert!(format!("{engine:?}").contains("\"memory\""));
}

#[tokio::test]
async fn end_session_deletes_snapshot_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");

    let (engine, _) = start(settings(PersistenceBackend::File, &path));
    for r in records() {
        let _ = engine.on_notifiable_event_received(r);
    }
    assert!(engine.persist());
    assert!(path.exists());

    engine.end_session();
    assert!(!path.exists());

    let (restored, _) = start(settings(PersistenceBackend::File, &path));
    assert!(restored.snapshot().is_empty());
}
