pub mod filter;
pub mod parser;
pub mod rules;

pub use filter::ProfileFilter;
pub use parser::ProfileParser;
