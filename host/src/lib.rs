pub mod config;
pub mod error;
pub mod logging;
pub mod seed;

use catalog_core::CatalogService;
use common::{LayerKind, RosterKind};

use crate::config::HostConfig;
use crate::error::HostResult;
use crate::seed::SeedFile;

pub use config::FixtureSettings;
pub use error::HostError;

/// The two catalogs a dashboard session works against.
pub struct Catalogs {
    pub data_layers: CatalogService<LayerKind>,
    pub roster: CatalogService<RosterKind>,
}

impl Catalogs {
    /// Builds empty catalogs with the configured projection and applies any
    /// fixture files.
    pub fn from_config(config: &HostConfig) -> HostResult<Self> {
        let data_layers = CatalogService::with_settings(config.projection, None);
        let roster = CatalogService::with_settings(config.projection, None);

        if let Some(path) = config.fixtures().data_layers.as_deref() {
            log::info!("loading data layer fixtures from {}", path.display());
            SeedFile::<LayerKind>::load(path)?.apply(&data_layers)?;
        }
        if let Some(path) = config.fixtures().roster.as_deref() {
            log::info!("loading roster fixtures from {}", path.display());
            SeedFile::<RosterKind>::load(path)?.apply(&roster)?;
        }

        Ok(Self { data_layers, roster })
    }
}
