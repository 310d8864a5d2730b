pub mod assign;
pub mod cancel;
pub mod memory;
pub mod orchestrator;
pub mod store;

pub use assign::*;
pub use cancel::*;
pub use memory::*;
pub use orchestrator::*;
pub use store::*;
