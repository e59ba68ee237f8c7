use crate::color::generate_color_from_string;
use crate::persist::PersistQueue;
use crate::storage::{KeyValueStore, TILES_KEY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("tile index {index} out of range for {len} tiles")]
    OutOfRange { index: usize, len: usize },
    #[error("tile handle for index {index} is stale")]
    StaleHandle { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub name: String,
    pub url: String,
    pub color: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

impl Tile {
    fn preset(name: &str, url: &str, color: &str, icon: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
            favicon: None,
        }
    }
}

pub fn default_tiles() -> Vec<Tile> {
    vec![
        Tile::preset("YouTube", "https://youtube.com", "#ff0000", "▶️"),
        Tile::preset("Gmail", "https://gmail.com", "#ea4335", "📧"),
        Tile::preset("GitHub", "https://github.com", "#24292e", "🐙"),
        Tile::preset("Twitter", "https://twitter.com", "#1da1f2", "🐦"),
        Tile::preset("Facebook", "https://facebook.com", "#1877f2", "📘"),
        Tile::preset("Instagram", "https://instagram.com", "#e4405f", "📷"),
        Tile::preset("Netflix", "https://netflix.com", "#e50914", "🎬"),
        Tile::preset("Spotify", "https://spotify.com", "#1db954", "🎵"),
    ]
}

/// Prefixes `https://` unless the input already starts with `http`.
pub fn normalize_url(url: &str) -> String {
    if url.starts_with("http") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

/// Uppercased first character of the name.
pub fn fallback_icon(name: &str) -> String {
    name.chars()
        .next()
        .map(|ch| ch.to_uppercase().collect())
        .unwrap_or_default()
}

/// Addresses a tile as it was when the collection was rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileHandle {
    pub index: usize,
    pub generation: u64,
}

/// Ordered tiles plus a generation counter bumped on every mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileCollection {
    tiles: Vec<Tile>,
    generation: u64,
}

impl TileCollection {
    pub fn new(tiles: Vec<Tile>) -> Self {
        Self {
            tiles,
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn as_slice(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn get(&self, index: usize) -> Option<&Tile> {
        self.tiles.get(index)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn handle(&self, index: usize) -> Option<TileHandle> {
        (index < self.tiles.len()).then_some(TileHandle {
            index,
            generation: self.generation,
        })
    }

    fn push(&mut self, tile: Tile) -> usize {
        self.tiles.push(tile);
        self.generation += 1;
        self.tiles.len() - 1
    }

    fn remove(&mut self, index: usize) -> Result<Tile, TileError> {
        if index >= self.tiles.len() {
            return Err(TileError::OutOfRange {
                index,
                len: self.tiles.len(),
            });
        }
        self.generation += 1;
        Ok(self.tiles.remove(index))
    }

    fn replace_all(&mut self, tiles: Vec<Tile>) {
        self.tiles = tiles;
        self.generation += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum TileIcon {
    Favicon(String),
    Glyph(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedTile {
    pub handle: TileHandle,
    pub name: String,
    pub url: String,
    pub color: String,
    pub icon: TileIcon,
}

/// Reads the stored tiles. Anything other than a readable tile array yields
/// the defaults.
pub fn load_tiles(store: &dyn KeyValueStore) -> TileCollection {
    let tiles = match store.get(TILES_KEY) {
        Ok(Some(value)) => match serde_json::from_value::<Vec<Tile>>(value) {
            Ok(tiles) => tiles,
            Err(err) => {
                warn!(error = %err, "stored tiles unparsable, using defaults");
                default_tiles()
            }
        },
        Ok(None) => default_tiles(),
        Err(err) => {
            warn!(error = %err, "failed to read tiles, using defaults");
            default_tiles()
        }
    };
    TileCollection::new(tiles)
}

pub struct TileStore {
    collection: TileCollection,
    persist: Arc<PersistQueue>,
}

impl TileStore {
    pub fn new(collection: TileCollection, persist: Arc<PersistQueue>) -> Self {
        Self {
            collection,
            persist,
        }
    }

    pub fn load(store: &dyn KeyValueStore, persist: Arc<PersistQueue>) -> Self {
        Self::new(load_tiles(store), persist)
    }

    pub fn collection(&self) -> &TileCollection {
        &self.collection
    }

    pub fn tiles(&self) -> &[Tile] {
        self.collection.as_slice()
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn add(&mut self, name: &str, url: &str) -> Result<TileHandle, TileError> {
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() || url.is_empty() {
            return Err(TileError::Validation(
                "Please enter both name and URL".to_string(),
            ));
        }

        let url = normalize_url(url);
        Url::parse(&url)
            .map_err(|err| TileError::Validation(format!("invalid url {url:?}: {err}")))?;

        let tile = Tile {
            name: name.to_string(),
            url,
            color: generate_color_from_string(name).to_string(),
            icon: fallback_icon(name),
            favicon: None,
        };
        debug!(name = %tile.name, url = %tile.url, "adding tile");
        let index = self.collection.push(tile);
        self.persist();
        Ok(TileHandle {
            index,
            generation: self.collection.generation(),
        })
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Tile, TileError> {
        let removed = self.collection.remove(index)?;
        debug!(index, name = %removed.name, "removed tile");
        self.persist();
        Ok(removed)
    }

    /// Removes the tile a handle from [`TileStore::render`] points at,
    /// refusing handles issued before the latest mutation.
    pub fn remove(&mut self, handle: TileHandle) -> Result<Tile, TileError> {
        if handle.generation != self.collection.generation() {
            return Err(TileError::StaleHandle {
                index: handle.index,
            });
        }
        self.remove_at(handle.index)
    }

    /// Replaces the in-memory tiles with whatever the store holds now.
    pub fn reload(&mut self, store: &dyn KeyValueStore) {
        let loaded = load_tiles(store);
        self.collection.replace_all(loaded.tiles);
    }

    pub fn render(&self) -> Vec<RenderedTile> {
        let generation = self.collection.generation();
        self.collection
            .as_slice()
            .iter()
            .enumerate()
            .map(|(index, tile)| RenderedTile {
                handle: TileHandle { index, generation },
                name: tile.name.clone(),
                url: tile.url.clone(),
                color: tile.color.clone(),
                icon: match &tile.favicon {
                    Some(favicon) => TileIcon::Favicon(favicon.clone()),
                    None => TileIcon::Glyph(tile.icon.clone()),
                },
            })
            .collect()
    }

    fn persist(&self) {
        match serde_json::to_value(self.collection.as_slice()) {
            Ok(value) => self.persist.write(TILES_KEY, value),
            Err(err) => warn!(error = %err, "failed to encode tiles"),
        }
    }
}
