// Document rendering: section builders, template assembly and the repair pass.
// Everything here is synchronous and pure; the pipeline calls it from spawn_blocking.

pub mod assembler;
pub mod escape;
pub mod handlers;
pub mod repair;
pub mod sections;
pub mod template;
pub mod toggles;

pub use assembler::{assemble, AssemblyError, AssemblyOptions};
pub use repair::{repair, repair_with_report, RepairReport};
pub use template::DEFAULT_TEMPLATE;
