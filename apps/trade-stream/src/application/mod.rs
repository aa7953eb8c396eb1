//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the stream client services and the port interfaces
//! that define how the domain talks to transports, schedulers and consumers.

/// Port interfaces for transports, frame schedulers and observers.
pub mod ports;

/// Stream client, connection supervisor and observers.
pub mod services;
