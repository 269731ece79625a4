use catalog_host::Catalogs;
use catalog_host::config::HostConfig;
use catalog_host::error::HostResult;
use catalog_host::logging::init_logging;

fn main() -> HostResult<()> {
    let cli_config = std::env::args().nth(1);
    let config = HostConfig::from_sources(cli_config.as_deref())?;
    init_logging(&config)?;

    let catalogs = Catalogs::from_config(&config)?;
    tracing::info!(
        categories = catalogs.data_layers.roots()?.len(),
        districts = catalogs.roster.roots()?.len(),
        "catalog ready"
    );
    Ok(())
}
