//! Plugin descriptors as published in a plugin repository.
//!
//! A repository carries one YAML file per plugin:
//!
//! ```text
//! <repo>/vms/<alias>.yaml       vm: { id, alias, ..., sha256, version }
//! <repo>/subnets/<alias>.yaml   subnet: { id, alias, ..., vms }
//! ```

mod version;

pub use version::Version;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Common surface of every plugin kind stored in a repository.
pub trait PluginDefinition: Serialize + DeserializeOwned + Clone + std::fmt::Debug {
    /// Top-level key of the definition file (`vm:` / `subnet:`).
    const KEY: &'static str;
    /// Directory of the repository holding this kind of definition.
    const DIR: &'static str;

    fn id(&self) -> &str;
    fn alias(&self) -> &str;
}

/// A virtual machine binary plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vm {
    pub id: String,
    pub alias: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub maintainers: Vec<String>,
    /// Command line run inside the unpacked archive, if any.
    #[serde(default)]
    pub install_script: String,
    /// Path of the built binary, relative to the unpacked archive.
    pub binary_path: String,
    pub url: String,
    pub sha256: String,
    pub version: Version,
}

impl PluginDefinition for Vm {
    const KEY: &'static str = "vm";
    const DIR: &'static str = "vms";

    fn id(&self) -> &str {
        &self.id
    }

    fn alias(&self) -> &str {
        &self.alias
    }
}

/// A subnet: a named set of VMs plus optional chain configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub id: String,
    pub alias: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub maintainers: Vec<String>,
    /// Aliases of the VMs this subnet runs, relative to the same repository.
    #[serde(default)]
    pub vms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl PluginDefinition for Subnet {
    const KEY: &'static str = "subnet";
    const DIR: &'static str = "subnets";

    fn id(&self) -> &str {
        &self.id
    }

    fn alias(&self) -> &str {
        &self.alias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn vm_definition_file_parses() {
        let yaml = r#"
vm:
  id: "tGas3T58KzdjLHhBDMnH2TvrddhqTji5iZAMZ3RXs2NLpSnhH"
  alias: spacesvm
  homepage: https://example.org
  description: key/value storage
  maintainers:
    - dev@example.org
  installScript: scripts/build.sh build/spacesvm
  binaryPath: build/spacesvm
  url: https://example.org/spacesvm.tar.gz
  sha256: "666f6f626172"
  version:
    major: 0
    minor: 0
    patch: 3
"#;
        let parsed: BTreeMap<String, Vm> = serde_yaml::from_str(yaml).unwrap();
        let vm = &parsed[Vm::KEY];
        assert_eq!(vm.alias(), "spacesvm");
        assert_eq!(vm.install_script, "scripts/build.sh build/spacesvm");
        assert_eq!(vm.version, Version::new(0, 0, 3));
    }

    #[test]
    fn subnet_definition_file_parses_without_config() {
        let yaml = r#"
subnet:
  id: "Ai42MkKqk8yjXFCpoHXw7rdTWSHiKEMqh5h8gbxwjgkCUfkrk"
  alias: spaces
  vms:
    - spacesvm
"#;
        let parsed: BTreeMap<String, Subnet> = serde_yaml::from_str(yaml).unwrap();
        let subnet = &parsed[Subnet::KEY];
        assert_eq!(subnet.vms, vec!["spacesvm".to_string()]);
        assert!(subnet.config.is_none());
    }
}
