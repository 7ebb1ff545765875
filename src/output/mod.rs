pub mod report;
pub mod summary;

pub use report::{render_plan, write_compiled_report, write_plan};
pub use summary::{build_summary, write_summary};
