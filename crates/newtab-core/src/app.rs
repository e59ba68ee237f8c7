use crate::clock::{clock_face, ClockFace};
use crate::color::ColorError;
use crate::persist::PersistQueue;
use crate::search::{classify, Navigation};
use crate::storage::{JsonFileStore, KeyValueStore, SqliteStore, StorageError, StorageScope};
use crate::theme::{Palette, ThemeEngine, ThemeSink};
use crate::tiles::{RenderedTile, Tile, TileError, TileHandle, TileStore};
use directories::ProjectDirs;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const DATA_DIR_ENV: &str = "NEWTAB_DATA_DIR";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Color(#[from] ColorError),
    #[error(transparent)]
    Tile(#[from] TileError),
}

/// On-disk locations of both storage scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirs {
    root: PathBuf,
}

impl DataDirs {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// `$NEWTAB_DATA_DIR` if set, otherwise the platform data directory.
    pub fn default_dirs() -> Result<Self, StorageError> {
        if let Some(root) = std::env::var_os(DATA_DIR_ENV).filter(|value| !value.is_empty()) {
            return Ok(Self::new(PathBuf::from(root)));
        }
        let project_dirs =
            ProjectDirs::from("app", "newtab", "NewTab").ok_or(StorageError::ProjectDir)?;
        Ok(Self::new(project_dirs.data_dir()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sync_db_path(&self) -> PathBuf {
        self.root.join("sync.db")
    }

    pub fn local_store_path(&self) -> PathBuf {
        self.root.join("local.json")
    }

    pub fn open_store(&self, scope: StorageScope) -> Result<Arc<dyn KeyValueStore>, StorageError> {
        let store: Arc<dyn KeyValueStore> = match scope {
            StorageScope::Sync => Arc::new(SqliteStore::open(&self.sync_db_path())?),
            StorageScope::Local => Arc::new(JsonFileStore::new(self.local_store_path())),
        };
        Ok(store)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThemeVariable {
    pub name: String,
    pub value: String,
}

/// Everything the page needs to draw itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageModel {
    pub scope: &'static str,
    pub accent_color: String,
    pub theme: Vec<ThemeVariable>,
    pub tiles: Vec<RenderedTile>,
    pub clock: ClockFace,
}

/// One page's worth of state bound to a single storage scope. Built at
/// startup; dropping it drains pending writes.
pub struct NewTabSession {
    scope: StorageScope,
    store: Arc<dyn KeyValueStore>,
    persist: Arc<PersistQueue>,
    tiles: TileStore,
    theme: ThemeEngine,
}

impl NewTabSession {
    pub fn open(scope: StorageScope, store: Arc<dyn KeyValueStore>) -> Self {
        let persist = Arc::new(PersistQueue::new(Arc::clone(&store)));
        let tiles = TileStore::load(store.as_ref(), Arc::clone(&persist));
        let theme = ThemeEngine::load(store.as_ref(), Arc::clone(&persist));
        debug!(
            scope = scope.as_str(),
            tiles = tiles.len(),
            accent = %theme.accent_color(),
            "session opened"
        );
        Self {
            scope,
            store,
            persist,
            tiles,
            theme,
        }
    }

    pub fn open_in(dirs: &DataDirs, scope: StorageScope) -> Result<Self, AppError> {
        let store = dirs.open_store(scope)?;
        Ok(Self::open(scope, store))
    }

    pub fn scope(&self) -> StorageScope {
        self.scope
    }

    pub fn tiles(&self) -> &[Tile] {
        self.tiles.tiles()
    }

    pub fn render_tiles(&self) -> Vec<RenderedTile> {
        self.tiles.render()
    }

    pub fn add_tile(&mut self, name: &str, url: &str) -> Result<TileHandle, AppError> {
        Ok(self.tiles.add(name, url)?)
    }

    pub fn remove_tile_at(&mut self, index: usize) -> Result<Tile, AppError> {
        Ok(self.tiles.remove_at(index)?)
    }

    pub fn remove_tile(&mut self, handle: TileHandle) -> Result<Tile, AppError> {
        Ok(self.tiles.remove(handle)?)
    }

    pub fn accent_color(&self) -> &str {
        self.theme.accent_color()
    }

    pub fn palette(&self) -> &Palette {
        self.theme.palette()
    }

    pub fn apply_accent_color(
        &mut self,
        color: &str,
        sink: &mut dyn ThemeSink,
    ) -> Result<(), AppError> {
        self.theme.apply_accent_color(color, sink)?;
        Ok(())
    }

    pub fn emit_theme(&self, sink: &mut dyn ThemeSink) {
        self.theme.emit(sink);
    }

    pub fn navigate(&self, input: &str) -> Option<Navigation> {
        classify(input)
    }

    pub fn page(&self) -> PageModel {
        self.page_at(clock_face())
    }

    pub fn page_at(&self, clock: ClockFace) -> PageModel {
        PageModel {
            scope: self.scope.as_str(),
            accent_color: self.theme.accent_color().to_string(),
            theme: self
                .theme
                .palette()
                .css_variables()
                .into_iter()
                .map(|(name, value)| ThemeVariable { name, value })
                .collect(),
            tiles: self.tiles.render(),
            clock,
        }
    }

    /// Re-reads both keys from the store, which is authoritative on reload.
    pub fn reload(&mut self) -> Result<(), AppError> {
        self.persist.flush()?;
        self.tiles.reload(self.store.as_ref());
        self.theme.reload(self.store.as_ref());
        Ok(())
    }

    pub fn flush(&self) -> Result<(), AppError> {
        Ok(self.persist.flush()?)
    }

    pub fn last_storage_error(&self) -> Option<String> {
        self.persist.last_error()
    }

    pub fn close(self) -> Result<(), AppError> {
        self.flush()
    }
}
