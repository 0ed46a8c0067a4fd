//! Resilience helpers.
//!
//! Every RPC call already carries a timeout (see `blockchain::client`).
//! What lives here is the retry pacing for loops that must keep running
//! through node outages, such as the block ticker.

pub mod backoff;
