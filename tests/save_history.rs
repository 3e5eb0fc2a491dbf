use std::time::{Duration, Instant};

use anyhow::Result;

use detect_cam::camera::SyntheticCamera;
use detect_cam::detect::StubBackend;
use detect_cam::persistence::SqliteDetectionStore;
use detect_cam::snapshot::decode_data_url;
use detect_cam::{
    AuthSession, CameraConstraints, CameraController, Canvas, DetectionSession, DetectorBackend,
    FrameScheduler, HistoryClient, InMemoryDetectionStore, ModelLoader, SessionError, User,
};

const REFRESH: Duration = Duration::from_millis(10);

fn live_session() -> Result<DetectionSession<Canvas>> {
    let constraints = CameraConstraints {
        ideal_width: 96,
        ideal_height: 72,
        ..CameraConstraints::default()
    };
    let camera = CameraController::new(Box::new(SyntheticCamera::new("stub://desk")), constraints);
    let backend: Box<dyn DetectorBackend> = Box::new(StubBackend::new().with_label("cup"));
    let mut session = DetectionSession::new(ModelLoader::ready(backend), camera, Canvas::new())
        .with_scheduler(FrameScheduler::new(REFRESH));
    let start = Instant::now();
    session.start_camera(start)?;
    session.poll(start + REFRESH);
    Ok(session)
}

fn alice() -> AuthSession {
    AuthSession::signed_in(
        User {
            id: "alice".to_string(),
            name: Some("Alice".to_string()),
        },
        None,
    )
}

#[test]
fn captured_snapshot_round_trips_through_sqlite_history() -> Result<()> {
    let session = live_session()?;
    let capture = session.capture()?.expect("square detected");
    assert_eq!(capture.detection_data[0].label, "cup");

    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("detections.db");
    let store = SqliteDetectionStore::open(&db_path.to_string_lossy())?;
    let mut client = HistoryClient::new(store, alice());

    let saved = client.save(capture.clone())?;
    assert_eq!(client.history().len(), 1);
    assert_eq!(client.history()[0].id, saved.id);
    assert_eq!(client.history()[0].confidence, capture.confidence);
    assert_eq!(client.history()[0].object_count(), 1);

    let image = decode_data_url(&client.history()[0].image_url)?;
    assert_eq!(image.dimensions(), (96, 72));
    Ok(())
}

#[test]
fn failed_save_leaves_session_and_history_untouched() -> Result<()> {
    let session = live_session()?;
    let before = session.state().clone();
    let capture = session.capture()?.expect("square detected");

    let mut store = InMemoryDetectionStore::new();
    store.fail_saves(true);
    let mut client = HistoryClient::new(store, alice());

    assert!(client.save(capture).is_err());
    assert_eq!(client.error(), Some(SessionError::Save));
    assert!(client.history().is_empty());
    assert_eq!(client.store().list_calls(), 0);
    assert_eq!(session.state(), &before);
    Ok(())
}

#[test]
fn retry_after_failed_save_succeeds() -> Result<()> {
    let session = live_session()?;
    let capture = session.capture()?.expect("square detected");

    let mut store = InMemoryDetectionStore::new();
    store.fail_saves(true);
    let mut client = HistoryClient::new(store, alice());
    assert!(client.save(capture.clone()).is_err());

    client.store_mut().fail_saves(false);
    client.save(capture)?;
    assert_eq!(client.error(), None);
    assert_eq!(client.history().len(), 1);
    assert_eq!(client.store().save_calls(), 2);
    assert_eq!(client.store().list_calls(), 1);
    Ok(())
}
