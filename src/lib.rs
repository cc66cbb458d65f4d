#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod cover;
pub mod dom;
pub mod download;
pub mod epub;
pub mod formats;
pub mod layout;
pub mod links;
pub mod logging;
pub mod page;
pub mod registry;
pub mod session;
pub mod toc;
pub mod transform;
