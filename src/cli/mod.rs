pub mod count;
pub mod dedupe;
pub mod sample;
pub mod shuffle;
pub mod split;

pub use count::*;
pub use dedupe::*;
pub use sample::*;
pub use shuffle::*;
pub use split::*;
