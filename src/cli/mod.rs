pub mod config_cmd;
pub mod output;
pub mod renderer;
pub mod report_cmd;
pub mod schedule_cmd;
