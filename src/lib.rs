pub mod aggregator_core;
pub mod decoder;
pub mod pipeline;
pub mod query;
pub mod sqlite_pragma;
pub mod streamer_core;
