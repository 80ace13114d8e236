//! The DeepDive session: recap, think and quiz for one checkpoint.

pub mod bootstrap;
pub mod context;
pub mod machine;
pub mod stage;
pub mod worker;

pub use bootstrap::*;
pub use machine::*;
pub use stage::*;
pub use worker::*;
