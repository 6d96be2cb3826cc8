//! Auth-domain identifiers, signing keys, and the page token service.

pub mod id;
pub mod key;
pub mod token;

pub use id::*;
pub use key::*;
pub use token::*;
