use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::features::FeatureRecord;
use super::perceptual;
use super::prefilter;
use crate::common::config::{ComparisonMode, Config};
use crate::common::errors::MatchError;
use crate::scanner::targets::ImageRef;

/// Thresholds and mode flags the matcher reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Minimum similarity, percent
    pub threshold: u8,
    pub inter_folder_only: bool,
    pub ad_cross_comparison: bool,
    pub qr_hybrid: bool,
    pub color_filter: bool,
}

impl MatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.similarity_threshold,
            inter_folder_only: config.enable_inter_folder_only,
            ad_cross_comparison: config.enable_ad_cross_comparison,
            qr_hybrid: config.enable_qr_hybrid_mode,
            color_filter: config.enable_color_filter,
        }
    }
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Why a group was formed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Candidates matched to one ad library image
    AdMatch,
    /// Candidates similar to each other
    Mutual,
    /// A candidate carrying a QR code
    QrCode,
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKind::AdMatch => write!(f, "Ad match"),
            GroupKind::Mutual => write!(f, "Mutual"),
            GroupKind::QrCode => write!(f, "QR code"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMember {
    pub image: ImageRef,
    /// Similarity to the group's anchor (or best neighbour), 0.0 to 1.0
    pub similarity: f64,
    /// Suggested for deletion
    pub removable: bool,
    /// Ad library image the group is anchored on
    pub is_reference: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_payload: Option<String>,
}

impl GroupMember {
    fn candidate(image: &ImageRef, similarity: f64) -> Self {
        Self {
            image: image.clone(),
            similarity,
            removable: true,
            is_reference: false,
            qr_payload: None,
        }
    }

    fn reference(image: &ImageRef, similarity: f64) -> Self {
        Self {
            image: image.clone(),
            similarity,
            removable: false,
            is_reference: true,
            qr_payload: None,
        }
    }
}

/// One duplicate or ad cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    /// 1-based, in output order
    pub id: usize,
    pub kind: GroupKind,
    /// Anchored on, or cross-checked against, the ad library
    pub ad_like: bool,
    /// Reference first (if any), then candidates in page order
    pub members: Vec<GroupMember>,
}

impl Group {
    pub fn reference(&self) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.is_reference)
    }

    pub fn removable(&self) -> impl Iterator<Item = &GroupMember> {
        self.members.iter().filter(|m| m.removable)
    }
}

/// An image left out of matching, with the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedImage {
    pub image: ImageRef,
    pub reason: String,
    pub from_ad_library: bool,
}

/// A candidate pair that cleared the gate and the threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityEdge {
    /// Indices into the compared slice, `a < b`
    pub a: usize,
    pub b: usize,
    pub distance: u32,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    pub groups: Vec<Group>,
    pub skipped: Vec<SkippedImage>,
}

/// Full comparison of two records: coarse gate first, then Hamming
/// distance against the threshold. Returns (distance, similarity).
pub fn compare(a: &FeatureRecord, b: &FeatureRecord, options: &MatchOptions) -> Option<(u32, f64)> {
    let (Some(ha), Some(hb)) = (&a.hash, &b.hash) else {
        return None;
    };
    let width = ha.bits().max(hb.bits());

    if options.color_filter {
        if let (Some(sa), Some(sb)) = (&a.signature, &b.signature) {
            if prefilter::quick_reject(sa, sb, perceptual::max_distance(width, options.threshold)) {
                return None;
            }
        }
    }

    let distance = ha.distance(hb);
    perceptual::meets_threshold(distance, width, options.threshold)
        .then(|| (distance, perceptual::similarity_from_distance(distance, width)))
}

/// First ad library entry, in library order, the candidate matches
pub fn first_ad_match(candidate: &FeatureRecord, ads: &[FeatureRecord], options: &MatchOptions) -> Option<(usize, f64)> {
    ads.iter()
        .enumerate()
        .filter(|(_, ad)| ad.is_matchable())
        .find_map(|(i, ad)| compare(candidate, ad, options).map(|(_, s)| (i, s)))
}

/// Most similar ad library entry; equal similarities go to the earlier entry
pub fn best_ad_match(candidate: &FeatureRecord, ads: &[FeatureRecord], options: &MatchOptions) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, ad) in ads.iter().enumerate().filter(|(_, ad)| ad.is_matchable()) {
        if let Some((_, similarity)) = compare(candidate, ad, options) {
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((i, similarity));
            }
        }
    }
    best
}

/// Ad-library fast path: per candidate, the first matching ad entry
pub fn fast_path_matches(
    candidates: &[FeatureRecord],
    ads: &[FeatureRecord],
    options: &MatchOptions,
) -> Vec<Option<(usize, f64)>> {
    candidates
        .par_iter()
        .map(|c| {
            if c.is_matchable() {
                first_ad_match(c, ads, options)
            } else {
                None
            }
        })
        .collect()
}

/// Every qualifying pair among `records`, in (a, b) order
pub fn similarity_edges(records: &[&FeatureRecord], options: &MatchOptions) -> Vec<SimilarityEdge> {
    let n = records.len();
    (0..n)
        .into_par_iter()
        .flat_map_iter(|a| {
            ((a + 1)..n).filter_map(move |b| {
                if options.inter_folder_only && records[a].image.folder == records[b].image.folder {
                    return None;
                }
                compare(records[a], records[b], options).map(|(distance, similarity)| SimilarityEdge {
                    a,
                    b,
                    distance,
                    similarity,
                })
            })
        })
        .collect()
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Split records into matchable ones and skipped entries
fn partition<'r>(records: &'r [FeatureRecord], from_ad_library: bool, skipped: &mut Vec<SkippedImage>) -> Vec<&'r FeatureRecord> {
    let mut usable = Vec::with_capacity(records.len());
    for record in records {
        if record.is_matchable() {
            usable.push(record);
        } else {
            skipped.push(SkippedImage {
                image: record.image.clone(),
                reason: record
                    .status
                    .reason()
                    .unwrap_or_else(|| "no perceptual hash".to_string()),
                from_ad_library,
            });
        }
    }
    usable
}

/// Build one group per ad entry from (candidate, ad, similarity) hits,
/// ordered by ad library position
fn ad_anchored_groups(hits: Vec<(&FeatureRecord, usize, f64)>, ads: &[FeatureRecord]) -> Vec<Group> {
    let mut by_ad: BTreeMap<usize, Vec<(&FeatureRecord, f64)>> = BTreeMap::new();
    for (candidate, ad, similarity) in hits {
        by_ad.entry(ad).or_default().push((candidate, similarity));
    }

    by_ad
        .into_iter()
        .map(|(ad, mut hits)| {
            hits.sort_by_cached_key(|(c, _)| c.image.page_key());
            let mut members = vec![GroupMember::reference(&ads[ad].image, 1.0)];
            members.extend(hits.iter().map(|(c, s)| GroupMember::candidate(&c.image, *s)));
            Group {
                id: 0,
                kind: GroupKind::AdMatch,
                ad_like: true,
                members,
            }
        })
        .collect()
}

fn match_ad_library(candidates: &[&FeatureRecord], ads: &[FeatureRecord], options: &MatchOptions) -> Vec<Group> {
    let hits: Vec<Option<(usize, f64)>> = candidates
        .par_iter()
        .map(|c| first_ad_match(c, ads, options))
        .collect();

    ad_anchored_groups(
        candidates
            .iter()
            .zip(hits)
            .filter_map(|(c, hit)| hit.map(|(ad, s)| (*c, ad, s)))
            .collect(),
        ads,
    )
}

fn match_mutual(candidates: &[&FeatureRecord], ads: &[FeatureRecord], options: &MatchOptions) -> Vec<Group> {
    let n = candidates.len();
    let edges = similarity_edges(candidates, options);
    tracing::debug!("{} similarity edges among {} candidates", edges.len(), n);

    let mut sets = UnionFind::new(n);
    let mut best = vec![0.0f64; n];
    for edge in &edges {
        sets.union(edge.a, edge.b);
        best[edge.a] = best[edge.a].max(edge.similarity);
        best[edge.b] = best[edge.b].max(edge.similarity);
    }

    let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = sets.find(i);
        components.entry(root).or_default().push(i);
    }
    let mut components: Vec<Vec<usize>> = components.into_values().filter(|c| c.len() > 1).collect();
    components.sort_by_key(|c| c[0]);

    components
        .into_iter()
        .map(|mut component| {
            component.sort_by_cached_key(|&i| candidates[i].image.page_key());
            let representative = candidates[component[0]];
            let ad_hit = if options.ad_cross_comparison {
                best_ad_match(representative, ads, options)
            } else {
                None
            };

            let mut members = Vec::with_capacity(component.len() + 1);
            if let Some((ad, similarity)) = ad_hit {
                members.push(GroupMember::reference(&ads[ad].image, similarity));
            }
            members.extend(
                component
                    .iter()
                    .map(|&i| GroupMember::candidate(&candidates[i].image, best[i])),
            );
            Group {
                id: 0,
                kind: GroupKind::Mutual,
                ad_like: ad_hit.is_some(),
                members,
            }
        })
        .collect()
}

fn match_qr(
    candidates: &[&FeatureRecord],
    ads: &[FeatureRecord],
    options: &MatchOptions,
    skipped: &mut Vec<SkippedImage>,
) -> Vec<Group> {
    let use_fast_path = options.qr_hybrid && ads.iter().any(FeatureRecord::is_matchable);
    let hits: Vec<Option<(usize, f64)>> = if use_fast_path {
        candidates
            .par_iter()
            .map(|c| first_ad_match(c, ads, options))
            .collect()
    } else {
        vec![None; candidates.len()]
    };

    let mut ad_hits = Vec::new();
    let mut qr_groups = Vec::new();
    for (candidate, hit) in candidates.iter().zip(hits) {
        if let Some((ad, similarity)) = hit {
            ad_hits.push((*candidate, ad, similarity));
            continue;
        }
        match &candidate.qr {
            None => skipped.push(SkippedImage {
                image: candidate.image.clone(),
                reason: "qr result unavailable".to_string(),
                from_ad_library: false,
            }),
            Some(qr) if qr.present => qr_groups.push(Group {
                id: 0,
                kind: GroupKind::QrCode,
                ad_like: true,
                members: vec![GroupMember {
                    qr_payload: qr.payload.clone(),
                    ..GroupMember::candidate(&candidate.image, 1.0)
                }],
            }),
            Some(_) => {}
        }
    }

    let mut groups = ad_anchored_groups(ad_hits, ads);
    groups.extend(qr_groups);
    groups
}

/// Group candidates under `mode`.
///
/// Records that are not ok never take part; they are returned in
/// [`MatchOutcome::skipped`]. Output order depends only on the inputs.
pub fn match_features(
    candidates: &[FeatureRecord],
    ads: &[FeatureRecord],
    mode: &ComparisonMode,
    options: &MatchOptions,
) -> Result<MatchOutcome, MatchError> {
    let uses_ads = match mode {
        ComparisonMode::AdComparison => true,
        ComparisonMode::MutualComparison => options.ad_cross_comparison,
        ComparisonMode::QrDetection => options.qr_hybrid,
        ComparisonMode::Plugin(id) => {
            return Err(MatchError::UnsupportedMode {
                mode: id.clone(),
                strategy: "builtin".to_string(),
            })
        }
    };
    let ads_required = match mode {
        ComparisonMode::QrDetection => false,
        _ => uses_ads,
    };

    let mut outcome = MatchOutcome::default();
    let usable = partition(candidates, false, &mut outcome.skipped);
    if uses_ads {
        let usable_ads = partition(ads, true, &mut outcome.skipped);
        if ads_required && usable_ads.is_empty() {
            return Err(MatchError::EmptyAdLibrary(mode.to_string()));
        }
    }

    let mut groups = match mode {
        ComparisonMode::AdComparison => match_ad_library(&usable, ads, options),
        ComparisonMode::MutualComparison => match_mutual(&usable, ads, options),
        ComparisonMode::QrDetection => {
            let ads: &[FeatureRecord] = if uses_ads { ads } else { &[] };
            match_qr(&usable, ads, options, &mut outcome.skipped)
        }
        ComparisonMode::Plugin(_) => Vec::new(),
    };

    for (i, group) in groups.iter_mut().enumerate() {
        group.id = i + 1;
    }
    outcome.groups = groups;
    Ok(outcome)
}
