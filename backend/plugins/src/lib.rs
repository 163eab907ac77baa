//! `tether-plugins`: module lifecycle, per-module resource tracking and the
//! remote loader, wired together through a [`RuntimeContext`].

pub mod context;
pub mod controller;
pub mod lifecycle;
pub mod loader;
pub mod manifest;
pub mod resources;
pub mod sdk;

pub use context::{RuntimeContext, Services};
pub use controller::{LoginCallback, ModuleController, StartSummary};
pub use lifecycle::{ModuleInfo, ModuleState, Phase, ReleaseReport};
pub use loader::{
    cache_busted, FactoryTable, HttpFetcher, LoadScope, LoadSummary, Loader, ManifestEngine,
    ModuleFactory, ScriptEngine, SourceFetcher,
};
pub use manifest::{Catalog, CatalogEntry, ModuleManifest};
pub use resources::{DisconnectFn, Observer, ResourceTracker};
pub use sdk::{ModuleContext, Plugin};
