// CLI module
//
// - arguments: command-line flags and their conversion into configuration overrides

pub mod arguments;

pub use arguments::RedgateArguments;
