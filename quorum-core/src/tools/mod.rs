//! Tool Registry (C2, spec §4.2): ACL, schema validation, path confinement,
//! quotas, and audit around a declarative catalogue of tool handlers.

mod canonical;
mod descriptor;
mod path_guard;
mod registry;
mod validate;

pub use canonical::{register_mission_control_tool, register_workspace_tools};
pub use descriptor::{default_timeout_for, SideEffect, ToolDescriptor, ToolHandler};
pub use path_guard::confine_to_workspace;
pub use registry::{branch_subpath, ClosureHandler, ToolQuotas, ToolRegistry};
pub use validate::validate_arguments;
