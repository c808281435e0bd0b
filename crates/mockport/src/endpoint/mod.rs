//! Mock endpoint definitions and their lifecycle.
//!
//! This module is organized into submodules:
//! - `types`: Endpoint definition, request types and protocol enums
//! - `error`: Error taxonomy returned by the manager
//! - `manager`: EndpointManager owning definitions and live servers

mod error;
mod manager;
mod types;


pub use error::EndpointError;
pub use manager::EndpointManager;
pub use types::{
    Charset, CreateEndpointRequest, EndpointDefinition, EndpointStatus, FtpMode, Protocol,
    UpdateEndpointRequest, DEFAULT_FILE_PASSWORD, DEFAULT_FILE_USER,
};
