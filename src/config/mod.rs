//! Configuration: filesystem locations for persistent state

mod paths;

pub use paths::{Paths, HOME_ENV};
