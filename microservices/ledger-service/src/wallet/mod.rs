pub mod service;

pub use service::{CreditOutcome, WalletService};

pub(crate) use service::{apply_entry, fetch_user};
