pub mod job;
pub mod result;
pub mod site_profile;

pub use job::{ConversionRequest, Job};
pub use result::ConversionResult;
pub use site_profile::SiteProfile;
