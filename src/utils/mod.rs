pub mod net;
pub mod sanitize;

pub use net::{extract_host, join_url};
pub use sanitize::{mask_account, sanitize_json};
