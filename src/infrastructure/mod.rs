pub mod js_executor;
pub mod page_lease;

pub use js_executor::JsExecutor;
pub use page_lease::PageLease;
