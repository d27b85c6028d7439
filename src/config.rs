use crate::logic::query_parse::ParseOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub params: ParamConfig,
    pub paging: PagingConfig,
}

/// Reserved query-parameter names. Configurable so deployments can dodge
/// collisions with real field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamConfig {
    pub complex: String,
    pub order_by: String,
    pub offset: String,
    pub limit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingConfig {
    pub max_size: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            params: ParamConfig::default(),
            paging: PagingConfig::default(),
        }
    }
}

impl Default for ParamConfig {
    fn default() -> Self {
        Self {
            complex: "query".to_string(),
            order_by: "order_by".to_string(),
            offset: "offset".to_string(),
            limit: "limit".to_string(),
        }
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            max_size: Some(1000),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // Add environment variables with prefix "PARAMQL_"
        config = config.add_source(
            config::Environment::with_prefix("PARAMQL")
                .separator("__")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            complex_param: self.params.complex.clone(),
            order_by_param: self.params.order_by.clone(),
            offset_param: self.params.offset.clone(),
            limit_param: self.params.limit.clone(),
            only_complex: false,
            page_max_size: self.paging.max_size,
        }
    }
}
