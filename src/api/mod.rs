//! JIRA and Confluence REST clients.
//!
//! Layering, bottom up: [`transport`] sends requests and classifies responses,
//! [`session`] keeps the cookie jar and authentication state, [`resolver`] maps
//! user-typed names to entity ids, [`update`] builds request bodies, and the
//! clients tie them together per operation.

mod auth;
mod client;
mod confluence;
mod error;
pub mod resolver;
pub mod session;
pub mod transport;
pub mod types;
pub mod update;

pub use auth::Auth;
pub use client::{JiraClient, LinkRequest};
pub use confluence::ConfluenceClient;
pub use error::{ApiError, Result};
pub use session::{AuthState, CookieJar, Product, Session};
pub use transport::TransportOptions;
pub use update::{CreateRequest, EditRequest, TransitionRequest};
