//! Accounts: the user factory, password hashing, and the
//! register/login/refresh flow built on top of them.

mod flow;
mod manager;
mod password;

pub use flow::AuthFlow;
pub use manager::{AccountFields, ExtraFlags, UserManager, validate_account_fields};
