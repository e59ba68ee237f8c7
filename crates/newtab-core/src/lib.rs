//! Core of the new-tab page: tile collection, accent theming, color math,
//! and the storage collaborators behind them.

pub mod app;
pub mod clock;
pub mod color;
pub mod coordinator;
pub mod persist;
pub mod search;
pub mod storage;
pub mod theme;
pub mod tiles;

pub use app::{AppError, DataDirs, NewTabSession, PageModel};
pub use color::{ColorError, Hsl};
pub use coordinator::{Coordinator, InstallReason, Request, Response, Settings};
pub use storage::{KeyValueStore, StorageError, StorageScope};
pub use theme::{Palette, ThemeEngine, ThemeSink, DEFAULT_ACCENT_COLOR};
pub use tiles::{Tile, TileError, TileHandle, TileStore};
