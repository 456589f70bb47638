// HTTP routes
pub mod lookup;
pub mod sharecode;
pub mod stats;

pub use lookup::*;
pub use sharecode::*;
pub use stats::*;
