pub mod artifacts;
pub mod config;
pub mod error;
pub mod events;
pub mod gallery;
pub mod selection;
pub mod service;
pub mod workflow;
pub mod tasks {
    pub mod gallery_poll;
    pub mod notices;
}

pub use error::{Error, Result};
pub use workflow::Controller;
