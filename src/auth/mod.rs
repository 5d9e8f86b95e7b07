//! Credentials, bearer tokens and the session identities handlers rely on.

pub mod password;
mod session;
mod token;

pub use session::{AdminSession, CurrentUser, MaybeUser, SessionUser};
pub use token::{Claims, TokenIssuer};
