mod converge;

pub use converge::{EXIT_ERROR, cmd_converge};
