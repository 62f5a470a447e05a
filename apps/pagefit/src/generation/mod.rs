// Document generation: budget enforcement, rendering and the compile loop.
// The typesetting compiler itself is external and reached only through DocumentCompiler.

pub mod compiler;
pub mod handlers;
pub mod pipeline;
