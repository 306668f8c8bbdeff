//! Response specifications, resolution and construction.
//!
//! # Module Structure
//!
//! - `types` - Route response specs and the normalized response config
//! - `resolver` - Unwrapping of functions and pending values
//! - `builder` - Construction of concrete responses
//! - `observable` - The caller-facing response with tracked body reads

mod builder;
mod observable;
mod resolver;
mod types;

pub use builder::{MockResponse, ResponseBuilder};
pub use observable::{BodyRead, BodyReadFuture, BodyReadKind, BodyValue, ObservedResponse};
pub use resolver::{construct, resolve, ConstructOptions, Constructed, Terminal};
pub use types::{
    PendingResponse, ResponseBody, ResponseConfig, ResponseFn, RouteResponse, RESERVED_KEYS,
};
