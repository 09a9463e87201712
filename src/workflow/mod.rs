//! The unit-of-work variants behind every apm operation.
//!
//! | Workflow           | Touches                                         |
//! |--------------------|-------------------------------------------------|
//! | `AddRepository`    | sources                                         |
//! | `RemoveRepository` | sources, definitions, reverse index, checkout   |
//! | `Update`           | git, then one `UpdateRepository` per change     |
//! | `UpdateRepository` | definitions, reverse index, sources             |
//! | `Install`          | network, filesystem, installed VMs              |
//! | `Uninstall`        | plugin directory, installed VMs                 |
//! | `Upgrade`          | one `UpgradeVm` per installed VM                |
//! | `UpgradeVm`        | `Install` (forced) when a newer version exists  |
//! | `JoinSubnet`       | `Install` per VM, then the node's admin API     |

mod add_repository;
mod install;
mod join_subnet;
mod remove_repository;
mod uninstall;
mod update;
mod update_repository;
mod upgrade;
mod upgrade_vm;

pub use add_repository::AddRepository;
pub use install::{Install, InstallEnv};
pub use join_subnet::JoinSubnet;
pub use remove_repository::RemoveRepository;
pub use uninstall::Uninstall;
pub use update::Update;
pub use update_repository::UpdateRepository;
pub use upgrade::Upgrade;
pub use upgrade_vm::UpgradeVm;
