//! Mockup Server
//!
//! A configuration-driven HTTP service simulator. Given a document describing
//! users, routes and response fixtures, it serves an endpoint set that behaves
//! like a real backend. Perfect for frontend development, contract tests and
//! demos.
//!
//! # Features
//!
//! - **Fixture Routes**: Exact path and method matching against configured fixtures
//! - **Mock Sessions**: Login, status and logout with signed session tokens
//!   carried in a cookie or a bearer header
//! - **Preferred Responses**: `Prefer: status=404` selects a keyed example
//! - **Latency Simulation**: Random delay within configured bounds
//! - **OpenAPI**: Description of the simulated surface at `/openapi-json`
//!
//! # Example Configuration
//!
//! ```yaml
//! baseURI: /
//! responseTime:
//!   min: 100
//!   max: 500
//! services:
//!   /api/flight-booking/cities:
//!     name: City list
//!     description: Cities served by the booking backend
//!     method: GET
//!     response:
//!       status: 200
//!       body: [Bangkok, Chiang Mai]
//!       examples:
//!         "503": { error: "Upstream unavailable" }
//! ```

pub mod config;
pub mod error;
pub mod negotiate;
pub mod openapi;
pub mod router;
pub mod server;
pub mod session;
pub mod token;

pub use config::SimulatorConfig;
pub use server::{app, AppState};
