pub mod backoff;
pub mod ids;
