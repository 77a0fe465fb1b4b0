pub mod marker_search;
pub mod shutdown;
