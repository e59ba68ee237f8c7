//! Background coordinator: owns the synchronized store on behalf of the
//! extension and answers settings requests from the page and the popup.

use crate::color::parse_hex;
use crate::storage::{KeyValueStore, StorageError, ACCENT_COLOR_KEY, TILES_KEY};
use crate::theme::DEFAULT_ACCENT_COLOR;
use crate::tiles::{default_tiles, Tile};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Only the keys that are present are serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accent_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiles: Option<Vec<Tile>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    GetSettings,
    SaveSettings { data: Settings },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Settings(Settings),
    Saved { success: bool },
    Failed { success: bool, error: String },
}

impl Response {
    fn failed(error: impl Into<String>) -> Self {
        Response::Failed {
            success: false,
            error: error.into(),
        }
    }
}

/// Why the extension's install hook fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallReason {
    Install,
    Update,
    ChromeUpdate,
    SharedModuleUpdate,
}

impl InstallReason {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "install" => Some(InstallReason::Install),
            "update" => Some(InstallReason::Update),
            "chrome_update" => Some(InstallReason::ChromeUpdate),
            "shared_module_update" => Some(InstallReason::SharedModuleUpdate),
            _ => None,
        }
    }
}

pub struct Coordinator {
    store: Arc<dyn KeyValueStore>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Seeds the default accent and tiles on first install only.
    pub fn on_installed(&self, reason: InstallReason) -> Result<(), StorageError> {
        if reason != InstallReason::Install {
            return Ok(());
        }
        info!("seeding default settings");
        self.store
            .set(ACCENT_COLOR_KEY, &Value::String(DEFAULT_ACCENT_COLOR.to_string()))?;
        self.store
            .set(TILES_KEY, &serde_json::to_value(default_tiles())?)?;
        Ok(())
    }

    pub fn on_startup(&self) {
        info!("new tab coordinator started");
    }

    pub fn handle(&self, request: Request) -> Response {
        match request {
            Request::GetSettings => match self.settings() {
                Ok(settings) => Response::Settings(settings),
                Err(err) => {
                    warn!(error = %err, "failed to read settings");
                    Response::failed(err.to_string())
                }
            },
            Request::SaveSettings { data } => self.save(data),
        }
    }

    /// Entry point for raw JSON messages; malformed requests get a failure
    /// response rather than an error.
    pub fn handle_value(&self, message: Value) -> Response {
        match serde_json::from_value::<Request>(message) {
            Ok(request) => self.handle(request),
            Err(err) => {
                warn!(error = %err, "unrecognized message");
                Response::failed(format!("unrecognized message: {err}"))
            }
        }
    }

    pub fn settings(&self) -> Result<Settings, StorageError> {
        let accent_color = match self.store.get(ACCENT_COLOR_KEY)? {
            Some(Value::String(color)) => Some(color),
            Some(other) => {
                warn!(value = %other, "stored accent color is not a string");
                None
            }
            None => None,
        };
        let tiles = match self.store.get(TILES_KEY)? {
            Some(value) => match serde_json::from_value::<Vec<Tile>>(value) {
                Ok(tiles) => Some(tiles),
                Err(err) => {
                    warn!(error = %err, "stored tiles unparsable");
                    None
                }
            },
            None => None,
        };
        Ok(Settings {
            accent_color,
            tiles,
        })
    }

    fn save(&self, data: Settings) -> Response {
        if let Some(color) = data.accent_color.as_deref() {
            if let Err(err) = parse_hex(color) {
                return Response::failed(err.to_string());
            }
        }
        match self.write(data) {
            Ok(()) => Response::Saved { success: true },
            Err(err) => {
                warn!(error = %err, "failed to save settings");
                Response::failed(err.to_string())
            }
        }
    }

    fn write(&self, data: Settings) -> Result<(), StorageError> {
        if let Some(color) = data.accent_color {
            self.store.set(ACCENT_COLOR_KEY, &Value::String(color))?;
        }
        if let Some(tiles) = data.tiles {
            self.store.set(TILES_KEY, &serde_json::to_value(tiles)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn coordinator() -> (Arc<MemoryStore>, Coordinator) {
        let store = Arc::new(MemoryStore::new());
        let coordinator = Coordinator::new(store.clone());
        (store, coordinator)
    }

    #[test]
    fn install_seeds_defaults_once() {
        let (store, coordinator) = coordinator();
        coordinator
            .on_installed(InstallReason::Update)
            .expect("update");
        assert!(store.get(ACCENT_COLOR_KEY).expect("get").is_none());

        coordinator
            .on_installed(InstallReason::Install)
            .expect("install");
        assert_eq!(store.get(ACCENT_COLOR_KEY).expect("get"), Some(json!("#6750a4")));
        let settings = coordinator.settings().expect("settings");
        assert_eq!(settings.tiles.map(|tiles| tiles.len()), Some(8));
    }

    #[test]
    fn only_a_fresh_install_seeds() {
        for name in ["update", "chrome_update", "shared_module_update"] {
            let (store, coordinator) = coordinator();
            let reason = InstallReason::parse(name).expect("known reason");
            coordinator.on_installed(reason).expect("installed");
            assert!(store.get(TILES_KEY).expect("get").is_none(), "{name}");
        }
        assert_eq!(InstallReason::parse("install"), Some(InstallReason::Install));
        assert_eq!(InstallReason::parse("reinstall"), None);
    }

    #[test]
    fn get_settings_omits_missing_keys() {
        let (_store, coordinator) = coordinator();
        let response = coordinator.handle_value(json!({ "action": "getSettings" }));
        assert_eq!(serde_json::to_value(&response).expect("encode"), json!({}));
    }

    #[test]
    fn save_then_get_roundtrips() {
        let (_store, coordinator) = coordinator();
        let saved = coordinator.handle_value(json!({
            "action": "saveSettings",
            "data": {
                "accentColor": "#1db954",
                "tiles": [{ "name": "Rust", "url": "https://rust-lang.org",
                            "color": "#000000", "icon": "R" }]
            }
        }));
        assert_eq!(
            serde_json::to_value(&saved).expect("encode"),
            json!({ "success": true })
        );

        let response = coordinator.handle(Request::GetSettings);
        let body = serde_json::to_value(&response).expect("encode");
        assert_eq!(body["accentColor"], "#1db954");
        assert_eq!(body["tiles"][0]["name"], "Rust");
        assert!(body["tiles"][0].get("favicon").is_none());
    }

    #[test]
    fn save_with_partial_data_keeps_other_keys() {
        let (store, coordinator) = coordinator();
        coordinator
            .on_installed(InstallReason::Install)
            .expect("install");
        coordinator.handle_value(json!({
            "action": "saveSettings",
            "data": { "accentColor": "#ff0000" }
        }));
        assert_eq!(store.get(ACCENT_COLOR_KEY).expect("get"), Some(json!("#ff0000")));
        let tiles = store.get(TILES_KEY).expect("get").expect("tiles");
        assert_eq!(tiles.as_array().map(Vec::len), Some(8));
    }

    #[test]
    fn invalid_accent_is_refused() {
        let (store, coordinator) = coordinator();
        let response = coordinator.handle_value(json!({
            "action": "saveSettings",
            "data": { "accentColor": "purple" }
        }));
        let body = serde_json::to_value(&response).expect("encode");
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap_or_default().contains("invalid color"));
        assert!(store.get(ACCENT_COLOR_KEY).expect("get").is_none());
    }

    #[test]
    fn unknown_actions_fail_gracefully() {
        let (_store, coordinator) = coordinator();
        let response = coordinator.handle_value(json!({ "action": "reboot" }));
        assert!(matches!(response, Response::Failed { success: false, .. }));
        let response = coordinator.handle_value(json!("getSettings"));
        assert!(matches!(response, Response::Failed { .. }));
    }

    #[test]
    fn storage_failures_are_reported() {
        let (store, coordinator) = coordinator();
        store.set_fail_writes(true);
        let response = coordinator.handle(Request::SaveSettings {
            data: Settings {
                accent_color: Some("#123456".to_string()),
                tiles: None,
            },
        });
        match response {
            Response::Failed { success, error } => {
                assert!(!success);
                assert!(error.contains("refused"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
