//! Business logic services

mod search;

pub use search::{SearchService, SiteTorrents};

#[cfg(test)]
pub(crate) use search::tests::{service as test_service, site_record};
