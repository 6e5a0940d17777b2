use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::perceptual::{self, PerceptualHash};
use super::prefilter::CoarseSignature;
use super::qr::{QrDetector, QrResult};
use crate::common::errors::DecodeError;
use crate::scanner::archive::ArchiveSource;
use crate::scanner::targets::ImageRef;

/// Whether features could be computed for an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum FeatureStatus {
    Ok,
    /// The bytes could not be read
    Unreadable(String),
    /// The bytes are not a decodable image
    DecodeFailed(String),
}

impl FeatureStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, FeatureStatus::Ok)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FeatureStatus::Ok => "ok",
            FeatureStatus::Unreadable(_) => "unreadable",
            FeatureStatus::DecodeFailed(_) => "decode-failed",
        }
    }

    /// Human-readable failure reason, None for `Ok`
    pub fn reason(&self) -> Option<String> {
        match self {
            FeatureStatus::Ok => None,
            FeatureStatus::Unreadable(r) | FeatureStatus::DecodeFailed(r) => {
                Some(format!("{}: {}", self.label(), r))
            }
        }
    }
}

impl From<DecodeError> for FeatureStatus {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Unreadable(r) => FeatureStatus::Unreadable(r),
            DecodeError::Corrupt(r) => FeatureStatus::DecodeFailed(r),
        }
    }
}

/// Features computed for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub image: ImageRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<PerceptualHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<CoarseSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<QrResult>,
    pub status: FeatureStatus,
}

impl FeatureRecord {
    pub fn failed(image: ImageRef, status: FeatureStatus) -> Self {
        Self {
            image,
            hash: None,
            signature: None,
            qr: None,
            status,
        }
    }

    /// Usable for matching: status ok and a hash present
    pub fn is_matchable(&self) -> bool {
        self.status.is_ok() && self.hash.is_some()
    }

    pub fn qr_present(&self) -> bool {
        self.qr.as_ref().is_some_and(|q| q.present)
    }
}

/// When QR decoding happens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrPolicy {
    /// Never decode
    Skip,
    /// Decode while extracting features
    Eager,
    /// Decode later, only for images the ad library did not already match
    Deferred,
}

/// Which optional features a run needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureRequest {
    pub signature: bool,
    pub qr: QrPolicy,
    pub qr_resize: u32,
}

impl FeatureRequest {
    pub fn hash_only() -> Self {
        Self {
            signature: false,
            qr: QrPolicy::Skip,
            qr_resize: 800,
        }
    }

    /// Whether a stored record carries everything this request needs
    pub fn satisfied_by(&self, record: &FeatureRecord) -> bool {
        if !record.status.is_ok() {
            return true;
        }
        if record.hash.is_none() {
            return false;
        }
        if self.signature && record.signature.is_none() {
            return false;
        }
        !(self.qr == QrPolicy::Eager && !self.has_current_qr(record))
    }

    /// Whether the record's QR result was decoded at this request's resize target
    pub fn has_current_qr(&self, record: &FeatureRecord) -> bool {
        record.qr.as_ref().is_some_and(|q| q.resize == self.qr_resize)
    }
}

/// Read and decode an image, from disk or from its archive
pub fn load_image(image: &ImageRef, archives: &dyn ArchiveSource) -> Result<DynamicImage, DecodeError> {
    let bytes = match &image.member {
        Some(member) => archives
            .read_member(&image.path, member)
            .map_err(|e| DecodeError::Unreadable(e.to_string()))?,
        None => std::fs::read(&image.path).map_err(|e| DecodeError::Unreadable(e.to_string()))?,
    };
    image::load_from_memory(&bytes).map_err(|e| DecodeError::Corrupt(e.to_string()))
}

/// Computes feature records; shared read-only by every worker
pub struct FeatureExtractor<'a> {
    request: FeatureRequest,
    archives: &'a dyn ArchiveSource,
    qr: &'a dyn QrDetector,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(request: FeatureRequest, archives: &'a dyn ArchiveSource, qr: &'a dyn QrDetector) -> Self {
        Self {
            request,
            archives,
            qr,
        }
    }

    pub fn request(&self) -> FeatureRequest {
        self.request
    }

    /// Hash (and, as requested, sign and QR-probe) one image. Failures are
    /// recorded in the status, never raised.
    pub fn compute(&self, image: &ImageRef) -> FeatureRecord {
        let img = match load_image(image, self.archives) {
            Ok(img) => img,
            Err(e) => {
                tracing::debug!("{}: {}", image.display_path(), e);
                return FeatureRecord::failed(image.clone(), e.into());
            }
        };

        let hash = perceptual::hash_image(&img);
        let signature = self.request.signature.then(|| CoarseSignature::from_hash(&hash));
        let qr = (self.request.qr == QrPolicy::Eager).then(|| self.qr.probe(&img, self.request.qr_resize));

        FeatureRecord {
            image: image.clone(),
            hash: Some(hash),
            signature,
            qr,
            status: FeatureStatus::Ok,
        }
    }

    /// Fill in the QR result of a record extracted without one
    pub fn probe_qr(&self, record: &FeatureRecord) -> FeatureRecord {
        if self.request.has_current_qr(record) || !record.status.is_ok() {
            return record.clone();
        }
        match load_image(&record.image, self.archives) {
            Ok(img) => FeatureRecord {
                qr: Some(self.qr.probe(&img, self.request.qr_resize)),
                ..record.clone()
            },
            Err(e) => FeatureRecord::failed(record.image.clone(), e.into()),
        }
    }
}
