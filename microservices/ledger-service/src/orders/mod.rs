pub mod service;

pub use service::{OrderLine, OrderRequest, OrdersService};
