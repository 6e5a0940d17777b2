use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use tempfile::TempDir;

use adsweep::duplicates::hasher;
use adsweep::duplicates::perceptual::{self, PerceptualHash, HASH_BITS};
use adsweep::duplicates::prefilter::{self, CoarseSignature};

/// 9x8 grid of flat blocks with seeded brightness; neighbours never match,
/// so every gradient bit is well defined.
fn block_page(seed: u64) -> DynamicImage {
    const LEVELS: [u8; 5] = [0, 64, 128, 192, 255];
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let mut grid = [[0u8; 9]; 8];
    for row in grid.iter_mut() {
        for col in 0..9 {
            loop {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let level = LEVELS[(state % 5) as usize];
                if col == 0 || row[col - 1] != level {
                    row[col] = level;
                    break;
                }
            }
        }
    }
    let img = RgbImage::from_fn(180, 160, |x, y| {
        let v = grid[(y / 20) as usize][(x / 20) as usize];
        Rgb([v, v, v])
    });
    DynamicImage::ImageRgb8(img)
}

fn reencode_jpeg(img: &DynamicImage) -> DynamicImage {
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Jpeg).unwrap();
    image::load_from_memory(bytes.get_ref()).unwrap()
}

// ─── Content fingerprint ─────────────────────────────────────────────────────

#[test]
fn test_fingerprint_matches_for_identical_content() {
    let tmp = TempDir::new().unwrap();
    let a = tmp.path().join("a.png");
    let b = tmp.path().join("b.png");
    std::fs::write(&a, b"same bytes").unwrap();
    std::fs::write(&b, b"same bytes").unwrap();

    let fa = hasher::fingerprint_file(&a).unwrap();
    let fb = hasher::fingerprint_file(&b).unwrap();
    assert_eq!(fa, fb);
    assert_eq!(fa, hasher::fingerprint_bytes(b"same bytes"));
    assert_eq!(fa.len(), 64);
}

#[test]
fn test_fingerprint_changes_with_content() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("page.png");
    std::fs::write(&path, b"version one").unwrap();
    let before = hasher::fingerprint_file(&path).unwrap();
    std::fs::write(&path, b"version two").unwrap();
    let after = hasher::fingerprint_file(&path).unwrap();
    assert_ne!(before, after);
}

#[test]
fn test_fingerprint_missing_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    assert!(hasher::fingerprint_file(&tmp.path().join("missing.png")).is_err());
}

// ─── Perceptual hash ─────────────────────────────────────────────────────────

#[test]
fn test_hash_is_64_bits_and_deterministic() {
    let img = block_page(1);
    let a = perceptual::hash_image(&img);
    let b = perceptual::hash_image(&img);
    assert_eq!(a.bits(), HASH_BITS);
    assert_eq!(a, b);
}

#[test]
fn test_self_similarity_is_one() {
    for seed in 0..10 {
        let hash = perceptual::hash_image(&block_page(seed));
        assert_eq!(hash.distance(&hash), 0);
        assert_eq!(hash.similarity(&hash), 1.0);
    }
}

#[test]
fn test_similarity_is_symmetric() {
    let hashes: Vec<PerceptualHash> = (0..8).map(|s| perceptual::hash_image(&block_page(s))).collect();
    for a in &hashes {
        for b in &hashes {
            assert_eq!(a.similarity(b), b.similarity(a));
            assert_eq!(a.distance(b), b.distance(a));
        }
    }
}

#[test]
fn test_recompression_stays_above_default_threshold() {
    let original = block_page(42);
    let recompressed = reencode_jpeg(&original);
    let a = perceptual::hash_image(&original);
    let b = perceptual::hash_image(&recompressed);
    assert!(perceptual::meets_threshold(a.distance(&b), HASH_BITS, 95));
}

#[test]
fn test_resized_copy_stays_above_default_threshold() {
    let original = block_page(7);
    let resized = original.resize_exact(360, 320, image::imageops::FilterType::Triangle);
    let a = perceptual::hash_image(&original);
    let b = perceptual::hash_image(&resized);
    assert!(a.similarity(&b) >= 0.95, "similarity was {}", a.similarity(&b));
}

#[test]
fn test_different_pages_are_far_apart() {
    let a = perceptual::hash_image(&block_page(3));
    let b = perceptual::hash_image(&block_page(4));
    assert!(!perceptual::meets_threshold(a.distance(&b), HASH_BITS, 80));
}

#[test]
fn test_threshold_boundary_at_95_percent() {
    // 2/64 is ~96.9%, 4/64 is 93.75%
    assert!(perceptual::meets_threshold(2, 64, 95));
    assert!(perceptual::meets_threshold(3, 64, 95));
    assert!(!perceptual::meets_threshold(4, 64, 95));
    assert_eq!(perceptual::max_distance(64, 95), 3);
    assert_eq!(perceptual::max_distance(64, 100), 0);
    assert!((perceptual::similarity_from_distance(2, 64) - 0.96875).abs() < f64::EPSILON);
}

#[test]
fn test_hashes_of_different_widths_never_match() {
    let short = PerceptualHash::from_bytes(&[0u8; 4]).unwrap();
    let long = PerceptualHash::from_bytes(&[0u8; 8]).unwrap();
    assert_eq!(short.distance(&long), 64);
    assert_eq!(short.similarity(&long), 0.0);
}

#[test]
fn test_hash_survives_base64_encoding() {
    let hash = perceptual::hash_image(&block_page(9));
    let json = serde_json::to_string(&hash).unwrap();
    let back: PerceptualHash = serde_json::from_str(&json).unwrap();
    assert_eq!(back, hash);
}

// ─── Coarse pre-filter ───────────────────────────────────────────────────────

#[test]
fn test_prefilter_never_rejects_a_real_match() {
    let mut images: Vec<DynamicImage> = (0..24).map(block_page).collect();
    // Near-duplicates so that accepted pairs exist
    let near: Vec<DynamicImage> = images.iter().take(8).map(reencode_jpeg).collect();
    images.extend(near);
    let hashes: Vec<PerceptualHash> = images.iter().map(perceptual::hash_image).collect();

    for threshold in [80u8, 90, 95, 100] {
        let max = perceptual::max_distance(HASH_BITS, threshold);
        for a in &hashes {
            for b in &hashes {
                let accepted = perceptual::meets_threshold(a.distance(b), HASH_BITS, threshold);
                let rejected = prefilter::quick_reject(
                    &CoarseSignature::from_hash(a),
                    &CoarseSignature::from_hash(b),
                    max,
                );
                assert!(!(accepted && rejected), "gate dropped a pair at threshold {}", threshold);
            }
        }
    }
}
