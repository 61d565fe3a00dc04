//! Request layer
//!
//! Turns a [`DataContext`](crate::streams::DataContext) into paginated GET
//! calls against one Ordway endpoint.
//!
//! # Overview
//!
//! - `RequestHandler` - resolves endpoints and query parameters, fetches pages
//! - `PageNumberPaginator` - 1-indexed pages, stops at the first empty page
//! - `template` - `{field}` substitution from parent records

mod handler;
mod pagination;
pub mod template;

pub use handler::RequestHandler;
pub use pagination::{PageNumberPaginator, PaginationState};
