//! Main module for ebnf library functionality

pub mod combinator;
pub mod compiler;
pub mod config;
pub mod error;
pub mod formats;
pub mod grammar;
pub mod lexing;
pub mod parsing;
pub mod position;
pub mod testing;
pub mod token;
pub mod transform;
