//! Persistence of the transaction list.
//!
//! `codec` turns records into a JSON blob that keeps dates and big numbers
//! exact; `store` is the key-value backend the blob is written to.

pub mod codec;
pub mod store;

pub use codec::{decode, encode, is_persistable, CodecError};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
