pub mod job_files;
pub mod job_logs;
pub mod jobs;
pub mod screenshots;
