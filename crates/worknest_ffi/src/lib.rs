//! Flutter-facing bindings for `worknest_core`.

pub mod api;
