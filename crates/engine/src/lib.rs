pub mod asset;
pub mod collection;
pub mod config;
pub mod erased;
pub mod error;
pub mod ledger;
pub mod localization;
pub mod notify;
pub mod overlay;
pub mod singleton;
mod tracked;

pub use asset::AssetOverlay;
pub use collection::CollectionOverlay;
pub use config::{LocalizationOptions, OverlayOptions};
pub use erased::ErasedOverlay;
pub use error::EngineError;
pub use ledger::{ChangeLedger, LedgerEntry, PropertyChange};
pub use localization::{LanguageLedger, LocalizationOverlay, SaveScope};
pub use notify::{ChangeNotifier, ListenerId};
pub use overlay::{ItemState, Overlay, OverlayKind};
pub use singleton::{SINGLETON_KEY, SingletonKey, SingletonOverlay};
