//! Data models for lumi-ingest

pub mod capture;
pub mod profile;
pub mod scan;

pub use capture::{decode_image, Demographics, GuestCapture};
pub use profile::Profile;
pub use scan::{Classification, ScanRecord};
