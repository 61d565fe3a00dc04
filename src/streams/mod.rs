//! Ordway streams
//!
//! Static stream definitions, the per-run [`Stream`] instances built from
//! them, and the context passed to fetch, transform and filter calls.

mod context;
mod definitions;
mod stream;

pub use context::{denest, filter_record, keep_all, updated_date_filter, DataContext, FilterHook};
pub use definitions::{
    get_definition, parent_of, EndpointConfig, StreamDefinition, StreamKind, DEFAULT_PAGE_SIZE,
    STREAMS,
};
pub use stream::{check_dependency_conflicts, Stream, StreamRecord};

#[cfg(test)]
mod tests;
