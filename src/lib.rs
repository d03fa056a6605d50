//! Catalog image synchronizer
//!
//! Re-renders product images onto a uniform canvas, uploads the results to the
//! store's media library, swaps them into the product and deletes the images
//! they replace. A fingerprint of the rendering settings stored on each product
//! makes repeated runs skip work that is already done. The same rendering
//! pipeline can also be pointed at local files.

pub mod catalog;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod image;
pub mod job;
pub mod local;
pub mod models;
pub mod naming;
pub mod progress;
pub mod staging;
pub mod sync;

pub use error::{Error, Result};
