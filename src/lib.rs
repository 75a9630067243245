// path model, trees and the parser
pub mod error;
pub mod xpath;
pub mod tree;
pub mod parser;

// schema
pub mod valuer;
pub mod xsd;
pub mod schema;

// extraction and its senders
pub mod sender;
pub mod fn_snd;
pub mod skeleton;
pub mod extractor;
pub mod writer;

// jobs and the run
pub mod archive;
pub mod remote;
pub mod job;
pub mod scheduler;
pub mod config;
pub mod logging;
pub mod cli;
