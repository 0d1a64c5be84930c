mod faults;
mod fixtures;

pub use faults::{Fault, FaultSwitch, Faulty};
pub use fixtures::*;
