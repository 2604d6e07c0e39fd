pub mod config;
pub mod frontier;
pub mod mad;
pub mod outputs;
pub mod pdf;
pub mod pipeline;
pub mod preprocess;
pub mod records;
pub mod report;
pub mod solver_log;
pub mod timeseries;
