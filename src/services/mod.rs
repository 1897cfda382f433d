pub mod converter;
pub mod extractor;
pub mod page_driver;

pub use converter::Converter;
pub use extractor::{PageSnapshot, ResultExtractor};
pub use page_driver::PageAutomationDriver;
