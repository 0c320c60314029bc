use std::path::PathBuf;

use config::Config;
use serde::Deserialize;

mod addresses;
pub use addresses::AddressesConfig;

mod transport;
pub use transport::TransportConfig;

mod cluster;
pub use cluster::ClusterConfig;

mod rules;
pub use rules::RulesConfig;

mod logger;
pub use logger::LoggerConfig;

#[derive(Deserialize)]
pub struct NodeConfig {
    pub addresses: AddressesConfig,
    pub transport: TransportConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub logger: LoggerConfig,

    #[serde(default)]
    pub shutdown_timeout: Option<u64>,
}

impl NodeConfig {
    pub fn from_path(path: PathBuf) -> eyre::Result<Self> {
        let config = Config::builder()
            .add_source(config::File::from(path))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
