pub mod builtin;
pub mod error;
pub mod execute;
pub mod helper;
pub mod jobs;
pub mod opts;
pub mod parser;
pub mod shellenv;
pub mod signal;
pub mod utils;
