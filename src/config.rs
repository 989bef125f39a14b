//! Configuration for assembling a Stratus instance.

use serde::Deserialize;
use url::Url;

//------------ Config --------------------------------------------------------

/// Everything needed to build a [`StratusServer`].
///
/// The state name list is supplied programmatically at setup; there is
/// no config file handling in the core. The type derives `Deserialize`
/// so that an adapter daemon can load it from its own TOML
/// configuration.
///
/// [`StratusServer`]: crate::server::StratusServer
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Where all stores live: `memory:` or `local://`.
    pub storage_uri: Url,

    /// The ordered lifecycle state list to register on first start.
    ///
    /// Ignored when the storage already has a registered list.
    #[serde(default)]
    pub states: Vec<String>,
}

impl Config {
    pub fn new(storage_uri: Url, states: Vec<String>) -> Self {
        Config {
            storage_uri,
            states,
        }
    }

    /// Parses a configuration from a TOML string.
    pub fn parse_str(toml: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml)
    }
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_toml() {
        let config = Config::parse_str(concat!(
            "storage_uri = \"local:///var/lib/stratus/data\"\n",
            "states = [\"Started\", \"Stopped\"]\n",
        ))
        .unwrap();

        assert_eq!(config.storage_uri.scheme(), "local");
        assert_eq!(config.states, vec!["Started", "Stopped"]);
    }

    #[test]
    fn states_default_to_empty() {
        let config =
            Config::parse_str("storage_uri = \"memory://t\"\n").unwrap();
        assert!(config.states.is_empty());
    }
}
