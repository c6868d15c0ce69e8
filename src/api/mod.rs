pub mod tools;

pub use tools::ToolHandlers;
