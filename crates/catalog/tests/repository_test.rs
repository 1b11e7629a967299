//! Repository behaviour against an in-memory catalog service.

mod support;

use catalog::repository::peak_item_tag;
use catalog::{CacheEvent, CacheState, DraftField, DraftForm, DraftState, SearchImport};
use common::{Error, PeakPayload};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{repository, search_hit, Calls, FakeApi};

#[tokio::test]
async fn test_create_update_delete_round() {
    let api = FakeApi::new();
    let repo = repository(&api);

    assert!(repo.list().await.unwrap().is_empty());

    let payload = PeakPayload {
        elevation_ft: Some(20310.0),
        ..PeakPayload::named("Denali")
    };
    let created = repo.create(&payload).await.unwrap();

    let peaks = repo.list().await.unwrap();
    assert_eq!(peaks.len(), 1);
    assert_eq!(peaks[0].name, "Denali");

    let update = PeakPayload {
        grade: Some("Grade IV".into()),
        ..payload.clone()
    };
    repo.update(created.id, &update).await.unwrap();

    assert_eq!(repo.list().await.unwrap()[0].grade, "Grade IV");
    assert_eq!(repo.get(created.id).await.unwrap().grade, "Grade IV");

    repo.delete(created.id).await.unwrap();
    assert!(repo.list().await.unwrap().is_empty());
    assert!(repo.cached_item(created.id).is_none());
}

#[tokio::test]
async fn test_list_served_from_cache_until_invalidated() {
    let api = FakeApi::new();
    api.seed(PeakPayload::named("Rainier"));
    let repo = repository(&api);

    repo.list().await.unwrap();
    repo.list().await.unwrap();
    assert_eq!(Calls::count(&api.calls.list), 1);

    repo.refetch_list().await.unwrap();
    assert_eq!(Calls::count(&api.calls.list), 2);
    assert_eq!(repo.list_state(), CacheState::Fresh);
}

#[tokio::test]
async fn test_update_leaves_other_items_untouched() {
    let api = FakeApi::new();
    let seven = api.seed(PeakPayload::named("Shasta"));
    let eight = api.seed(PeakPayload::named("Hood"));
    let repo = repository(&api);

    repo.get(seven.id).await.unwrap();
    repo.get(eight.id).await.unwrap();
    assert_eq!(Calls::count(&api.calls.get), 2);

    repo.update(seven.id, &PeakPayload::named("Mount Shasta"))
        .await
        .unwrap();

    assert_eq!(
        repo.cache().state(&catalog::repository::item_key(eight.id)),
        CacheState::Fresh
    );
    repo.get(eight.id).await.unwrap();
    assert_eq!(repo.get(seven.id).await.unwrap().name, "Mount Shasta");
    // Both served from cache: 8 was never touched, 7 was written by the update.
    assert_eq!(Calls::count(&api.calls.get), 2);
}

#[tokio::test]
async fn test_failed_mutation_keeps_cache() {
    let api = FakeApi::new();
    let peak = api.seed(PeakPayload::named("Baker"));
    let repo = repository(&api);

    repo.list().await.unwrap();
    api.fail_writes(true);

    let err = repo
        .update(peak.id, &PeakPayload::named("Koma Kulshan"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(repo.delete(peak.id).await.is_err());

    assert_eq!(repo.list_state(), CacheState::Fresh);
    assert_eq!(repo.list().await.unwrap()[0].name, "Baker");
    assert_eq!(Calls::count(&api.calls.list), 1);
}

#[tokio::test]
async fn test_invalid_payload_never_reaches_service() {
    let api = FakeApi::new();
    let repo = repository(&api);

    let err = repo.create(&PeakPayload::named("  ")).await.unwrap_err();
    assert_eq!(err, Error::Validation("Name is required".into()));
    assert_eq!(Calls::count(&api.calls.create), 0);
}

#[tokio::test]
async fn test_concurrent_refreshes_share_one_request() {
    let api = FakeApi::new();
    let peak = api.seed(PeakPayload::named("Denali"));
    api.set_refresh_delay(Duration::from_millis(20));
    let repo = repository(&api);

    let (a, b) = tokio::join!(
        repo.refresh_external_snapshot(peak.id),
        repo.refresh_external_snapshot(peak.id)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(Calls::count(&api.calls.refresh), 1);
    assert_eq!(a.snapshot, b.snapshot);
    assert!(a.peak.snapshot.is_present());

    let cached = repo.cached_item(peak.id).unwrap();
    assert_eq!(cached.snapshot.source.as_deref(), Some("osm"));
}

#[tokio::test]
async fn test_refresh_marks_list_stale() {
    let api = FakeApi::new();
    let peak = api.seed(PeakPayload::named("Foraker"));
    let repo = repository(&api);

    repo.list().await.unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&events);
    let _sub = repo.subscribe_list(move |_, event| seen.lock().unwrap().push(event.clone()));

    repo.refresh_external_snapshot(peak.id).await.unwrap();
    assert_eq!(repo.list_state(), CacheState::Stale);
    assert_eq!(*events.lock().unwrap(), vec![CacheEvent::Invalidated]);

    let peaks = repo.list().await.unwrap();
    assert!(peaks[0].snapshot.is_present());
    assert_eq!(Calls::count(&api.calls.list), 2);
}

#[tokio::test]
async fn test_empty_search_makes_no_request() {
    let api = FakeApi::new();
    let mut import = SearchImport::new(repository(&api));

    let err = import.search("   ").await.unwrap_err();
    assert_eq!(err.to_string(), "Enter a peak name to search.");
    assert_eq!(Calls::count(&api.calls.search), 0);
}

#[tokio::test]
async fn test_search_then_import() {
    let api = FakeApi::new();
    api.set_search_results(vec![search_hit("node/9", None, Some(6190.0))]);
    let repo = repository(&api);
    let mut import = SearchImport::new(repo.clone());

    let results = import.search(" denali ").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(import.last_query(), Some("denali"));

    // Same query again is a cache hit.
    import.search("denali").await.unwrap();
    assert_eq!(Calls::count(&api.calls.search), 1);

    let peak = import.import(&results[0]).await.unwrap();
    assert_eq!(peak.name, "denali");
    assert_eq!(peak.elevation_ft, Some(20308.0));
    assert_eq!(peak.region, "");

    // Importing twice creates a second record.
    import.import(&results[0]).await.unwrap();
    assert_eq!(repo.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_draft_submit_failure_keeps_draft() {
    let api = FakeApi::new();
    let peak = api.seed(PeakPayload::named("Adams"));
    let repo = repository(&api);

    let mut draft = DraftForm::new();
    draft.start_edit(&peak);
    draft.set_field(DraftField::Grade, "Class 2");

    api.fail_writes(true);
    assert!(draft.submit(&repo).await.is_err());
    assert_eq!(draft.state(), DraftState::Editing);
    assert_eq!(draft.fields().grade, "Class 2");
    assert!(draft.error().is_some_and(|e| e.contains("500")));

    api.fail_writes(false);
    let saved = draft.submit(&repo).await.unwrap();
    assert_eq!(saved.grade, "Class 2");
    assert_eq!(draft.state(), DraftState::Idle);
    assert_eq!(draft.target(), None);
}

#[tokio::test]
async fn test_draft_requires_name() {
    let api = FakeApi::new();
    let repo = repository(&api);

    let mut draft = DraftForm::new();
    draft.start_new();
    draft.set_field(DraftField::ElevationFt, "14411");

    let err = draft.submit(&repo).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(draft.error(), Some("Name is required"));
    assert_eq!(Calls::count(&api.calls.create), 0);
}

#[tokio::test]
async fn test_deleting_edited_peak_resets_draft() {
    let api = FakeApi::new();
    let peak = api.seed(PeakPayload::named("St. Helens"));
    let repo = repository(&api);

    let mut draft = DraftForm::new();
    draft.start_edit(&peak);

    repo.delete(peak.id).await.unwrap();
    draft.on_deleted(peak.id);
    assert_eq!(draft.state(), DraftState::Idle);
}

#[tokio::test]
async fn test_list_carries_row_tags() {
    let api = FakeApi::new();
    let baker = api.seed(PeakPayload::named("Baker"));
    let hood = api.seed(PeakPayload::named("Hood"));
    let repo = repository(&api);

    repo.list().await.unwrap();
    repo.get(baker.id).await.unwrap();

    // List plus the item entry.
    assert_eq!(repo.cache().invalidate(&peak_item_tag(baker.id)), 2);
    assert_eq!(repo.list_state(), CacheState::Stale);

    repo.list().await.unwrap();
    assert_eq!(repo.cache().invalidate(&peak_item_tag(hood.id)), 1);
    assert_eq!(Calls::count(&api.calls.list), 2);
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_submit_leaves_draft_editable() {
    let api = FakeApi::new();
    let peak = api.seed(PeakPayload::named("Olympus"));
    api.set_write_delay(Duration::from_secs(30));
    let repo = repository(&api);

    let mut draft = DraftForm::new();
    draft.start_edit(&peak);
    draft.set_field(DraftField::Grade, "Class 4");

    let timed_out = tokio::time::timeout(Duration::from_secs(1), draft.submit(&repo)).await;
    assert!(timed_out.is_err());
    assert_eq!(draft.state(), DraftState::Editing);
    assert_eq!(draft.target(), Some(peak.id));
    assert_eq!(draft.fields().grade, "Class 4");
}
