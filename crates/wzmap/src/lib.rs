//! Umbrella crate for wzmap.
//!
//! Re-exports the engine and protocol crates so code that only builds or inspects
//! command plans can depend on a single crate name (`wzmap`).

pub use wzmap_engine as engine;
pub use wzmap_protocol as protocol;
