mod message_records;
mod support;
