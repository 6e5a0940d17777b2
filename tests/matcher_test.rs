use std::path::PathBuf;

use adsweep::common::config::ComparisonMode;
use adsweep::common::errors::MatchError;
use adsweep::duplicates::features::{FeatureRecord, FeatureStatus};
use adsweep::duplicates::grouper::{self, GroupKind, MatchOptions};
use adsweep::duplicates::perceptual::PerceptualHash;
use adsweep::duplicates::prefilter::CoarseSignature;
use adsweep::duplicates::qr::QrResult;
use adsweep::scanner::targets::ImageRef;

fn image(folder: &str, name: &str, position: usize) -> ImageRef {
    ImageRef {
        path: PathBuf::from(format!("/comics/{}/{}", folder, name)),
        member: None,
        folder: PathBuf::from(format!("/comics/{}", folder)),
        position,
        size_bytes: 1000,
        mtime_secs: 0,
        fingerprint: format!("{}/{}", folder, name),
    }
}

fn record(image: ImageRef, bits: u64) -> FeatureRecord {
    let hash = PerceptualHash::from_bytes(&bits.to_be_bytes()).unwrap();
    FeatureRecord {
        image,
        signature: Some(CoarseSignature::from_hash(&hash)),
        hash: Some(hash),
        qr: None,
        status: FeatureStatus::Ok,
    }
}

fn ad(name: &str, bits: u64) -> FeatureRecord {
    record(image("_ads", name, 0), bits)
}

fn options() -> MatchOptions {
    MatchOptions {
        threshold: 95,
        inter_folder_only: true,
        ad_cross_comparison: false,
        qr_hybrid: true,
        color_filter: true,
    }
}

const AD_BITS: u64 = 0xF0F0_F0F0_0F0F_0F0F;

// ─── Ad comparison ───────────────────────────────────────────────────────────

#[test]
fn test_identical_copy_is_grouped_under_the_ad() {
    let ads = vec![ad("promo.png", AD_BITS)];
    let candidates = vec![record(image("ch01", "p20.png", 19), AD_BITS)];

    let outcome =
        grouper::match_features(&candidates, &ads, &ComparisonMode::AdComparison, &options()).unwrap();

    assert_eq!(outcome.groups.len(), 1);
    let group = &outcome.groups[0];
    assert_eq!(group.kind, GroupKind::AdMatch);
    assert_eq!(group.members.len(), 2);

    let reference = &group.members[0];
    assert!(reference.is_reference);
    assert!(!reference.removable);
    assert_eq!(reference.image, ads[0].image);

    let copy = &group.members[1];
    assert!(copy.removable);
    assert_eq!(copy.similarity, 1.0);
    assert_eq!(copy.image, candidates[0].image);
}

#[test]
fn test_threshold_boundary_two_bits_in_four_bits_out() {
    let ads = vec![ad("promo.png", AD_BITS)];
    let candidates = vec![
        record(image("ch01", "p20.png", 19), AD_BITS ^ 0b11),
        record(image("ch02", "p20.png", 19), AD_BITS ^ 0b1111),
    ];

    let outcome =
        grouper::match_features(&candidates, &ads, &ComparisonMode::AdComparison, &options()).unwrap();

    assert_eq!(outcome.groups.len(), 1);
    let members: Vec<&ImageRef> = outcome.groups[0].removable().map(|m| &m.image).collect();
    assert_eq!(members, vec![&candidates[0].image]);
    assert!((outcome.groups[0].members[1].similarity - 0.96875).abs() < 1e-9);
}

#[test]
fn test_first_matching_ad_wins() {
    let ads = vec![ad("a.png", AD_BITS), ad("b.png", AD_BITS ^ 0b1)];
    let candidates = vec![record(image("ch01", "p20.png", 19), AD_BITS ^ 0b1)];

    let outcome =
        grouper::match_features(&candidates, &ads, &ComparisonMode::AdComparison, &options()).unwrap();

    // b.png is the closer match but a.png comes first in library order
    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].reference().unwrap().image, ads[0].image);
}

#[test]
fn test_candidates_are_not_compared_with_each_other_in_ad_mode() {
    let ads = vec![ad("promo.png", AD_BITS)];
    let candidates = vec![
        record(image("ch01", "p20.png", 19), !AD_BITS),
        record(image("ch02", "p20.png", 19), !AD_BITS),
    ];

    let outcome =
        grouper::match_features(&candidates, &ads, &ComparisonMode::AdComparison, &options()).unwrap();
    assert!(outcome.groups.is_empty());
}

#[test]
fn test_ad_mode_needs_a_usable_ad_library() {
    let candidates = vec![record(image("ch01", "p20.png", 19), AD_BITS)];
    let result = grouper::match_features(&candidates, &[], &ComparisonMode::AdComparison, &options());
    assert!(matches!(result, Err(MatchError::EmptyAdLibrary(_))));

    let broken = vec![FeatureRecord::failed(
        image("_ads", "broken.png", 0),
        FeatureStatus::DecodeFailed("bad header".into()),
    )];
    let result = grouper::match_features(&candidates, &broken, &ComparisonMode::AdComparison, &options());
    assert!(matches!(result, Err(MatchError::EmptyAdLibrary(_))));
}

#[test]
fn test_failed_records_are_skipped_not_matched() {
    let ads = vec![ad("promo.png", AD_BITS)];
    let candidates = vec![
        FeatureRecord::failed(
            image("ch01", "p19.png", 18),
            FeatureStatus::DecodeFailed("truncated".into()),
        ),
        FeatureRecord::failed(
            image("ch01", "p20.png", 19),
            FeatureStatus::Unreadable("permission denied".into()),
        ),
    ];

    let outcome =
        grouper::match_features(&candidates, &ads, &ComparisonMode::AdComparison, &options()).unwrap();

    assert!(outcome.groups.is_empty());
    assert_eq!(outcome.skipped.len(), 2);
    assert!(outcome.skipped[0].reason.starts_with("decode-failed"));
    assert!(outcome.skipped[1].reason.starts_with("unreadable"));
    assert!(!outcome.skipped[0].from_ad_library);
}

// ─── Mutual comparison ───────────────────────────────────────────────────────

#[test]
fn test_mutual_groups_connected_components() {
    let candidates = vec![
        record(image("ch01", "p20.png", 19), AD_BITS),
        record(image("ch02", "p20.png", 19), AD_BITS ^ 0b1),
        record(image("ch03", "p20.png", 19), AD_BITS ^ 0b11),
        record(image("ch04", "p20.png", 19), !AD_BITS),
    ];

    let outcome =
        grouper::match_features(&candidates, &[], &ComparisonMode::MutualComparison, &options()).unwrap();

    assert_eq!(outcome.groups.len(), 1);
    let group = &outcome.groups[0];
    assert_eq!(group.kind, GroupKind::Mutual);
    assert!(!group.ad_like);
    assert_eq!(group.members.len(), 3);
    assert!(group.members.iter().all(|m| m.removable && !m.is_reference));
}

#[test]
fn test_inter_folder_only_suppresses_same_folder_pairs() {
    let same_folder = vec![
        record(image("ch01", "p19.png", 18), AD_BITS),
        record(image("ch01", "p20.png", 19), AD_BITS),
    ];
    let outcome =
        grouper::match_features(&same_folder, &[], &ComparisonMode::MutualComparison, &options()).unwrap();
    assert!(outcome.groups.is_empty());

    let mut opts = options();
    opts.inter_folder_only = false;
    let outcome =
        grouper::match_features(&same_folder, &[], &ComparisonMode::MutualComparison, &opts).unwrap();
    assert_eq!(outcome.groups.len(), 1);
}

#[test]
fn test_same_folder_members_joined_through_another_folder() {
    let candidates = vec![
        record(image("ch01", "p19.png", 18), AD_BITS),
        record(image("ch01", "p20.png", 19), AD_BITS),
        record(image("ch02", "p20.png", 19), AD_BITS),
    ];

    let outcome =
        grouper::match_features(&candidates, &[], &ComparisonMode::MutualComparison, &options()).unwrap();

    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].members.len(), 3);
}

#[test]
fn test_mutual_members_follow_page_order() {
    let candidates = vec![
        record(image("ch03", "p30.png", 29), AD_BITS),
        record(image("ch01", "p12.png", 11), AD_BITS),
        record(image("ch02", "p12.png", 11), AD_BITS),
    ];

    let first =
        grouper::match_features(&candidates, &[], &ComparisonMode::MutualComparison, &options()).unwrap();
    let second =
        grouper::match_features(&candidates, &[], &ComparisonMode::MutualComparison, &options()).unwrap();
    assert_eq!(first, second);

    let order: Vec<String> = first.groups[0]
        .members
        .iter()
        .map(|m| m.image.display_path())
        .collect();
    assert_eq!(
        order,
        vec![
            "/comics/ch01/p12.png".to_string(),
            "/comics/ch02/p12.png".to_string(),
            "/comics/ch03/p30.png".to_string(),
        ]
    );
}

#[test]
fn test_ad_cross_comparison_tags_group_and_prefers_earliest_tie() {
    let candidates = vec![
        record(image("ch01", "p20.png", 19), AD_BITS),
        record(image("ch02", "p20.png", 19), AD_BITS),
    ];
    // Both ads are one bit away from the representative
    let ads = vec![ad("x.png", AD_BITS ^ 0b10), ad("y.png", AD_BITS ^ 0b01)];
    let mut opts = options();
    opts.ad_cross_comparison = true;

    let outcome =
        grouper::match_features(&candidates, &ads, &ComparisonMode::MutualComparison, &opts).unwrap();

    assert_eq!(outcome.groups.len(), 1);
    let group = &outcome.groups[0];
    assert!(group.ad_like);
    assert_eq!(group.reference().unwrap().image, ads[0].image);
    assert_eq!(group.removable().count(), 2);
}

#[test]
fn test_ad_cross_comparison_without_ads_fails() {
    let candidates = vec![record(image("ch01", "p20.png", 19), AD_BITS)];
    let mut opts = options();
    opts.ad_cross_comparison = true;
    let result = grouper::match_features(&candidates, &[], &ComparisonMode::MutualComparison, &opts);
    assert!(matches!(result, Err(MatchError::EmptyAdLibrary(_))));
}

#[test]
fn test_color_filter_does_not_change_groups() {
    let candidates: Vec<FeatureRecord> = (0..12u64)
        .map(|i| {
            let bits = if i % 3 == 0 { AD_BITS ^ (1 << i) } else { AD_BITS.rotate_left(i as u32 * 5) };
            record(image(&format!("ch{:02}", i), "p20.png", 19), bits)
        })
        .collect();

    let mut with_gate = options();
    with_gate.threshold = 90;
    let mut without_gate = with_gate;
    without_gate.color_filter = false;

    let a = grouper::match_features(&candidates, &[], &ComparisonMode::MutualComparison, &with_gate).unwrap();
    let b = grouper::match_features(&candidates, &[], &ComparisonMode::MutualComparison, &without_gate).unwrap();
    assert_eq!(a, b);
    assert!(!a.groups.is_empty());
}

// ─── QR detection ────────────────────────────────────────────────────────────

#[test]
fn test_qr_hybrid_uses_ad_match_before_qr() {
    let ads = vec![ad("promo.png", AD_BITS)];
    let mut with_qr = record(image("ch02", "p20.png", 19), !AD_BITS);
    with_qr.qr = Some(QrResult::found("https://example.com/scan".into()));
    let mut without_qr = record(image("ch03", "p20.png", 19), 0x1234_5678_9ABC_DEF0);
    without_qr.qr = Some(QrResult::absent());

    let candidates = vec![
        // Ad match with no QR probe at all
        record(image("ch01", "p20.png", 19), AD_BITS ^ 0b1),
        with_qr,
        without_qr,
    ];

    let outcome =
        grouper::match_features(&candidates, &ads, &ComparisonMode::QrDetection, &options()).unwrap();

    assert!(outcome.skipped.is_empty());
    assert_eq!(outcome.groups.len(), 2);
    assert_eq!(outcome.groups[0].kind, GroupKind::AdMatch);
    assert_eq!(outcome.groups[1].kind, GroupKind::QrCode);
    assert_eq!(
        outcome.groups[1].members[0].qr_payload.as_deref(),
        Some("https://example.com/scan")
    );
    assert_eq!(outcome.groups.iter().map(|g| g.id).collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn test_qr_without_hybrid_ignores_ads() {
    let ads = vec![ad("promo.png", AD_BITS)];
    let mut candidate = record(image("ch01", "p20.png", 19), AD_BITS);
    candidate.qr = Some(QrResult::absent());
    let mut opts = options();
    opts.qr_hybrid = false;

    let outcome =
        grouper::match_features(&[candidate], &ads, &ComparisonMode::QrDetection, &opts).unwrap();
    assert!(outcome.groups.is_empty());
}

#[test]
fn test_qr_missing_result_is_reported() {
    let candidates = vec![record(image("ch01", "p20.png", 19), AD_BITS)];
    let outcome =
        grouper::match_features(&candidates, &[], &ComparisonMode::QrDetection, &options()).unwrap();
    assert!(outcome.groups.is_empty());
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].reason, "qr result unavailable");
}

#[test]
fn test_plugin_mode_is_not_builtin() {
    let result = grouper::match_features(
        &[],
        &[],
        &ComparisonMode::Plugin("color_bands".into()),
        &options(),
    );
    assert!(matches!(result, Err(MatchError::UnsupportedMode { .. })));
}
