use newtab_core::color::{adjust_lightness, generate_color_from_string, hex_to_hsl};
use newtab_core::search::Navigation;
use newtab_core::storage::{JsonFileStore, MemoryStore, SqliteStore, ACCENT_COLOR_KEY, TILES_KEY};
use newtab_core::theme::CssVariables;
use newtab_core::{
    AppError, Coordinator, InstallReason, KeyValueStore, NewTabSession, StorageScope, TileError,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

fn three_tile_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .set(
            TILES_KEY,
            &json!([
                { "name": "One", "url": "https://one.com", "color": "#111111", "icon": "1" },
                { "name": "Two", "url": "https://two.com", "color": "#222222", "icon": "2" },
                { "name": "Three", "url": "https://three.com", "color": "#333333", "icon": "3" }
            ]),
        )
        .expect("seed tiles");
    store
}

#[test]
fn add_tile_appends_and_persists() {
    let store = three_tile_store();
    let mut session = NewTabSession::open(StorageScope::Local, store.clone());

    // Add a bare host
    session.add_tile("Example", "example.com").expect("add tile");
    assert_eq!(session.tiles().len(), 4);
    let last = session.tiles().last().expect("last tile");
    assert_eq!(last.url, "https://example.com");
    assert_eq!(last.name, "Example");

    // The full collection is written back
    session.flush().expect("flush");
    let stored = store.get(TILES_KEY).expect("read").expect("tiles");
    assert_eq!(stored.as_array().map(Vec::len), Some(4));
    assert_eq!(stored[3]["color"], generate_color_from_string("Example").to_string());
}

#[test]
fn invalid_operations_leave_collection_unchanged() {
    let store = three_tile_store();
    let mut session = NewTabSession::open(StorageScope::Local, store);
    let before = session.tiles().to_vec();

    let err = session.remove_tile_at(99).expect_err("out of range");
    assert!(matches!(
        err,
        AppError::Tile(TileError::OutOfRange { index: 99, len: 3 })
    ));

    let err = session.add_tile("", "x.com").expect_err("validation");
    assert!(matches!(err, AppError::Tile(TileError::Validation(_))));

    assert_eq!(session.tiles(), before.as_slice());
}

#[test]
fn remove_via_rendered_handle() {
    let store = three_tile_store();
    let mut session = NewTabSession::open(StorageScope::Local, store.clone());

    let rendered = session.render_tiles();
    let removed = session.remove_tile(rendered[1].handle).expect("remove");
    assert_eq!(removed.name, "Two");

    // A second click on an outdated render is refused
    let err = session.remove_tile(rendered[2].handle).expect_err("stale");
    assert!(matches!(err, AppError::Tile(TileError::StaleHandle { index: 2 })));
    assert_eq!(session.tiles().len(), 2);

    session.close().expect("close");
    let stored = store.get(TILES_KEY).expect("read").expect("tiles");
    assert_eq!(stored[1]["name"], "Three");
}

#[test]
fn accent_color_drives_theme_and_survives_restart() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("local.json");

    {
        let store = Arc::new(JsonFileStore::new(path.clone()));
        let mut session = NewTabSession::open(StorageScope::Local, store);
        assert_eq!(session.accent_color(), "#6750a4");

        let mut sink = CssVariables::default();
        session
            .apply_accent_color("#1db954", &mut sink)
            .expect("apply");
        assert_eq!(sink.get("--primary-color"), Some("#1db954"));
        assert_eq!(sink.entries().len(), 9);

        let err = session
            .apply_accent_color("#1db95", &mut sink)
            .expect_err("malformed");
        assert!(matches!(err, AppError::Color(_)));
        assert_eq!(session.accent_color(), "#1db954");
    }

    let store = Arc::new(JsonFileStore::new(path));
    let session = NewTabSession::open(StorageScope::Local, store);
    assert_eq!(session.accent_color(), "#1db954");
    let expected = hex_to_hsl("#1db954").expect("hsl");
    assert_eq!(session.palette().gradients[0].h, (expected.h + 30.0) % 360.0);
    assert_eq!(
        session.palette().primary_light,
        adjust_lightness("#1db954", 20.0).expect("light")
    );
}

#[test]
fn corrupt_local_document_is_replaced_on_next_write() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("local.json");
    std::fs::write(&path, r#"{ "tiles": ["#).expect("seed torn file");

    {
        let store = Arc::new(JsonFileStore::new(path.clone()));
        let mut session = NewTabSession::open(StorageScope::Local, store);
        assert_eq!(session.tiles().len(), 8);

        session.add_tile("Example", "example.com").expect("add");
        session.flush().expect("flush");
        assert_eq!(session.last_storage_error(), None);
    }

    let store = Arc::new(JsonFileStore::new(path));
    let session = NewTabSession::open(StorageScope::Local, store);
    assert_eq!(session.tiles().len(), 9);
    assert_eq!(session.tiles()[8].url, "https://example.com");
}

#[test]
fn storage_failure_does_not_roll_back() {
    let store = three_tile_store();
    let mut session = NewTabSession::open(StorageScope::Sync, store.clone());
    store.set_fail_writes(true);

    session.add_tile("Offline", "offline.dev").expect("add");
    session.flush().expect("flush");

    assert_eq!(session.tiles().len(), 4);
    let error = session.last_storage_error().expect("error recorded");
    assert!(error.contains(TILES_KEY));
    let stored = store.get(TILES_KEY).expect("read").expect("tiles");
    assert_eq!(stored.as_array().map(Vec::len), Some(3));
}

#[test]
fn coordinator_and_page_share_the_sync_store() {
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new_in_memory().expect("db"));
    let coordinator = Coordinator::new(Arc::clone(&store));
    coordinator
        .on_installed(InstallReason::Install)
        .expect("install");

    // The popup saves an accent through the coordinator
    let response = coordinator.handle_value(json!({
        "action": "saveSettings",
        "data": { "accentColor": "#e50914" }
    }));
    assert_eq!(
        serde_json::to_value(&response).expect("encode"),
        json!({ "success": true })
    );

    let session = NewTabSession::open(StorageScope::Sync, Arc::clone(&store));
    assert_eq!(session.accent_color(), "#e50914");
    assert_eq!(session.tiles().len(), 8);
    assert_eq!(
        store.get(ACCENT_COLOR_KEY).expect("read"),
        Some(json!("#e50914"))
    );
}

#[test]
fn search_bar_navigation() {
    let session = NewTabSession::open(StorageScope::Local, Arc::new(MemoryStore::new()));
    assert_eq!(
        session.navigate("crates.io"),
        Some(Navigation::Url("https://crates.io".to_string()))
    );
    assert!(matches!(
        session.navigate("how to write a parser"),
        Some(Navigation::Search(_))
    ));
    assert_eq!(session.navigate(" "), None);
}
