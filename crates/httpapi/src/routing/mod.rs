//! URL prefix registrations and request routing.

mod table;

pub use table::RoutingTable;
pub(crate) use table::Owner;
