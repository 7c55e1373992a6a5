pub mod notification_reader;
pub mod plan_writer;
