//! the test_utils folder here will share utils or test components between unit
//! tests and integration tests
mod fake_bus;
mod recorder;

pub use fake_bus::*;
pub use recorder::*;
