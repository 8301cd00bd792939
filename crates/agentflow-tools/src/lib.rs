pub mod contract;
pub mod function;
pub mod registry;

pub use contract::{catalog_text, synthesize_contract};
pub use function::{optional_arg, required_arg, FnAction};
pub use registry::ActionRegistry;
