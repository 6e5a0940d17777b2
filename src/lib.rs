//! # adsweep
//!
//! Finds advertisement and duplicate pages appended to scanned comic and
//! manga chapters.
//!
//! adsweep walks a folder tree (treating `.zip`/`.cbz` archives as
//! folders), picks the trailing pages of every chapter, and groups them by
//! perceptual similarity:
//!
//! - **Ad comparison**: each page against a library of known ad images
//! - **Mutual comparison**: pages that repeat across chapters
//! - **QR detection**: pages carrying a QR code, with the ad library as a
//!   fast path
//!
//! Perceptual hashes are cached by content fingerprint and folder listings
//! by folder timestamp, so repeated runs only hash what changed.

pub mod cli;
pub mod common;
pub mod duplicates;
pub mod scanner;
