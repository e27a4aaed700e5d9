pub mod events;
pub mod export;
pub mod kernel;
pub mod replay;
pub mod sniffer;
pub mod trace;
