pub mod block;
pub mod snapshot;
