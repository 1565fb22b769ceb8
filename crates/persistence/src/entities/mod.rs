//! Database entities (row mappings).

pub mod location_sample;
pub mod session;
pub mod user_account;

pub use location_sample::LocationSampleEntity;
pub use session::{PrincipalEntity, SessionEntity};
pub use user_account::UserAccountEntity;
