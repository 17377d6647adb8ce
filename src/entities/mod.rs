// Entity Models
//
// Associations are lookup values created on demand during import.
// Records are contact entries that reference up to three associations.
// Countries and states are read-only reference data.

pub mod association;
pub mod record;
pub mod country;

pub use association::{Association, AssociationType};
pub use record::{PhoneEntry, Record};
pub use country::{Country, State};
