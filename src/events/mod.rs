pub mod fanout;

pub use fanout::{EventFanout, LiveEvent};
