//! Data Transfer Objects for REST request/response serialization.

pub mod bridge_dto;
pub mod namespace_dto;

pub use bridge_dto::*;
pub use namespace_dto::*;
