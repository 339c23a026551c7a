//! Types published to consumers (meters, shader-uniform binders, the host app).
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a host can
//! forward them over its own transport unchanged.

pub mod events;
