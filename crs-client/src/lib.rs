pub mod cli;
pub mod client;

pub use client::run;
