pub mod config;
pub mod list;
pub mod run;
pub mod validate;

pub use config::ConfigArgs;
pub use run::RunArgs;
