use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Side of the gradient grid; the hash is `HASH_SIDE * HASH_SIDE` bits
pub const HASH_SIDE: u32 = 8;

/// Width of every hash this crate computes
pub const HASH_BITS: u32 = HASH_SIDE * HASH_SIDE;

/// A perceptual hash (dHash) of decoded pixel data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerceptualHash(ImageHash);

impl PerceptualHash {
    /// Build a hash from raw bits, most useful for fixtures
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        ImageHash::from_bytes(bytes).ok().map(Self)
    }

    pub fn from_base64(encoded: &str) -> Option<Self> {
        ImageHash::from_base64(encoded).ok().map(Self)
    }

    pub fn to_base64(&self) -> String {
        self.0.to_base64()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Width of the hash in bits
    pub fn bits(&self) -> u32 {
        (self.0.as_bytes().len() * 8) as u32
    }

    /// Hamming distance. Hashes of different widths are maximally distant.
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        if self.bits() != other.bits() {
            return self.bits().max(other.bits());
        }
        self.0.dist(&other.0)
    }

    /// Normalized similarity in [0, 1]
    pub fn similarity(&self, other: &PerceptualHash) -> f64 {
        similarity_from_distance(self.distance(other), self.bits().max(other.bits()))
    }
}

impl Serialize for PerceptualHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PerceptualHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        PerceptualHash::from_base64(&encoded)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid perceptual hash '{}'", encoded)))
    }
}

/// Compute the gradient hash of an image.
///
/// The image is reduced to a 9x8 grayscale grid internally, so resizing and
/// recompression move only a few bits.
pub fn hash_image(img: &DynamicImage) -> PerceptualHash {
    let hasher = HasherConfig::new()
        .hash_size(HASH_SIDE, HASH_SIDE)
        .hash_alg(HashAlg::Gradient)
        .to_hasher();

    PerceptualHash(hasher.hash_image(img))
}

/// `1 - distance / width`
pub fn similarity_from_distance(distance: u32, width: u32) -> f64 {
    if width == 0 {
        return 0.0;
    }
    1.0 - (distance.min(width) as f64 / width as f64)
}

/// Whether `distance` out of `width` bits reaches `threshold` percent.
/// Integer arithmetic keeps the boundary exact (2/64 passes 95, 4/64 does not).
pub fn meets_threshold(distance: u32, width: u32, threshold: u8) -> bool {
    if width == 0 {
        return false;
    }
    let allowed = u64::from(width) * u64::from(100u8.saturating_sub(threshold));
    u64::from(distance) * 100 <= allowed
}

/// Largest Hamming distance that still meets `threshold`
pub fn max_distance(width: u32, threshold: u8) -> u32 {
    (u64::from(width) * u64::from(100u8.saturating_sub(threshold)) / 100) as u32
}
