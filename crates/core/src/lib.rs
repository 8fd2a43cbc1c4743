pub mod alert;
pub mod config;
pub mod duration;
pub mod error;
pub mod run;
pub mod schedule;

pub use alert::*;
pub use config::MonitorConfig;
pub use error::*;
pub use run::*;
pub use schedule::*;
