pub mod amazonq;
pub mod oidc;
