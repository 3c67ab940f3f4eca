pub mod catalog;
pub mod client;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod normalize;
pub mod options;
pub mod payloads;
pub mod resources;
pub mod telemetry;
pub mod uri;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{CrmClient, CrmConfig};
pub use error::GatewayError;
pub use gateway::{Gateway, Operation, Outcome, Resolved};
pub use resources::{Relation, ResourceKind};
