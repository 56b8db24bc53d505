pub mod cli;
pub mod custode;
pub mod session;
