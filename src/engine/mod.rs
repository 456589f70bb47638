//! Dispatch engine: admission, the dispatch queue, and concurrency rescaling.

pub mod admission;
pub mod clock;
pub mod dispatch;
pub mod rescale;

pub use admission::{Admission, InspectService, Limits};
pub use clock::{Clock, ImmediateClock, TokioClock};
pub use dispatch::DispatchQueue;
pub use rescale::{DEFAULT_RESCALE_INTERVAL, Rescaler};
