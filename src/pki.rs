pub mod crl;
pub mod issuance;

// Re-export commonly used types
pub use issuance::{Issuer, IssuerDirectory, IssuerNameId};
