use std::sync::Arc;

use crate::admin::AdminClient;
use crate::alias::QualifiedName;
use crate::engine::{Executor, Outcome, Workflow};
use crate::error::{Error, Result};
use crate::registry::Repository;

use super::{Install, InstallEnv};

/// Install every VM a subnet needs, then tell the local node to load them
/// and track the subnet. A node that is not running is only a warning.
#[derive(Clone)]
pub struct JoinSubnet {
    pub name: QualifiedName,
    pub repository: Repository,
    pub env: InstallEnv,
    pub admin: Arc<dyn AdminClient>,
    pub executor: Arc<dyn Executor>,
}

impl Workflow for JoinSubnet {
    fn name(&self) -> String {
        format!("join-subnet {}", self.name)
    }

    fn execute(&self) -> Result<Outcome> {
        let definition = self.repository.subnet(&self.name.plugin)?;
        let subnet = &definition.definition;

        for vm in &subnet.vms {
            self.executor.execute(&Install {
                name: QualifiedName::new(self.name.repo.clone(), vm.clone()),
                repository: self.repository.clone(),
                env: self.env.clone(),
                force: false,
            })?;
        }

        tracing::info!(subnet = %self.name, "reloading VMs on the node");
        tolerate_offline(self.admin.load_vms())?;

        tracing::info!(subnet = %self.name, id = %subnet.id, "whitelisting subnet");
        tolerate_offline(self.admin.whitelist_subnet(&subnet.id))?;

        tracing::info!(subnet = %self.name, "finished installing subnet");
        Ok(Outcome::Done)
    }
}

fn tolerate_offline(result: Result<()>) -> Result<()> {
    match result {
        Err(Error::AdminUnreachable { endpoint, reason }) => {
            tracing::warn!(
                %endpoint,
                %reason,
                "node is not running; restart it for the change to take effect"
            );
            Ok(())
        }
        other => other,
    }
}
