// Utils module

mod env;

pub use env::*;
