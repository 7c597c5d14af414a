pub mod crash_source;
