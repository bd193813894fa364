//! Mining module for block creation and transaction pooling

pub mod mempool;
pub mod producer;

pub use mempool::Mempool;
pub use producer::BlockProducer;
