pub mod loader;
pub mod scenario;

pub use loader::{DataLoadError, Format};
pub use scenario::{Scenario, load_config, load_named_scenario, load_scenario};
