use std::cell::RefCell;
use std::rc::Rc;

use draftwork_core::{AssetEntry, AssetMetadata, Language, impl_record};
use draftwork_storage::{MemoryAssets, MemoryCollection, MemoryLocalization, MemorySingleton, StorageError};
use serde::{Deserialize, Serialize};

// ============================================================================
// Records
// ============================================================================

/// A collection record. `code` mirrors the key and cannot be edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub code: String,
    pub value: i64,
    pub label: String,
}

impl_record!(Item {
    #[readonly]
    code,
    value,
    label,
});

impl Item {
    pub fn new(code: &str, value: i64) -> Self {
        Self {
            code: code.to_string(),
            value,
            label: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub version: u32,
    pub volume: i64,
    pub theme: String,
}

impl_record!(Settings {
    #[readonly]
    version,
    volume,
    theme,
});

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            volume: 50,
            theme: "dark".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Texture {
    pub width: i64,
    pub height: i64,
    pub format: String,
}

impl_record!(Texture {
    width,
    height,
    format,
});

impl Texture {
    pub fn new(width: i64, height: i64) -> Self {
        Self {
            width,
            height,
            format: "rgba8".to_string(),
        }
    }
}

/// A record with a float property, written to by integer values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gauge {
    pub scale: f64,
}

impl_record!(Gauge { scale });

// ============================================================================
// Repositories
// ============================================================================

/// Loaded collection holding `a = 1` and `b = 2`.
pub fn sample_items() -> Result<MemoryCollection<String, Item>, StorageError> {
    MemoryCollection::loaded_with([
        ("a".to_string(), Item::new("a", 1)),
        ("b".to_string(), Item::new("b", 2)),
    ])
}

/// Loaded collection holding gauge `1` at scale `1.0`.
pub fn sample_gauges() -> Result<MemoryCollection<u32, Gauge>, StorageError> {
    MemoryCollection::loaded_with([(1, Gauge { scale: 1.0 })])
}

pub fn sample_settings() -> Result<MemorySingleton<Settings>, StorageError> {
    MemorySingleton::loaded_with(&Settings::default())
}

pub fn sample_texture(name: &str, path: &str) -> AssetEntry<Texture> {
    AssetEntry::new(AssetMetadata::named(name), path, Texture::new(64, 64))
}

/// Loaded asset repository with two textures, returned alongside them.
pub fn sample_assets()
-> Result<(MemoryAssets<Texture>, Vec<AssetEntry<Texture>>), StorageError> {
    let assets = vec![
        sample_texture("grass", "textures/grass.png"),
        sample_texture("stone", "textures/stone.png"),
    ];
    let repo = MemoryAssets::loaded_with(assets.clone())?;
    Ok((repo, assets))
}

pub fn en() -> Language {
    Language::new("en")
}

pub fn fr() -> Language {
    Language::new("fr")
}

pub fn de() -> Language {
    Language::new("de")
}

/// Keys `Hello` and `Bye` in English, French and German. Nothing is loaded.
pub fn sample_localization() -> Result<MemoryLocalization, StorageError> {
    MemoryLocalization::new(
        ["Hello", "Bye"],
        [
            (en(), vec![("Hello", "Hi"), ("Bye", "Goodbye")]),
            (fr(), vec![("Hello", "Salut"), ("Bye", "Au revoir")]),
            (de(), vec![("Hello", "Hallo"), ("Bye", "Tschüss")]),
        ],
    )
}

// ============================================================================
// Notifications
// ============================================================================

/// Collects every value delivered to a modification listener.
#[derive(Debug, Clone, Default)]
pub struct Recorder(Rc<RefCell<Vec<bool>>>);

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(&self) -> impl FnMut(bool) + 'static {
        let sink = Rc::clone(&self.0);
        move |value| sink.borrow_mut().push(value)
    }

    pub fn events(&self) -> Vec<bool> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}
