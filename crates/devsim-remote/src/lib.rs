mod fault;
mod http;
mod memory;

pub use fault::{is_injected, FaultConfig, FaultStats, FaultyApi, FAULT_PREFIX};
pub use http::{decode_row, parse_timestamp, HttpApi};
pub use memory::MemoryApi;
