//! k-d tree index over 3D points with optional per-element normals.
//!
//! Built once from a snapshot of positions; queries never mutate it, so a
//! shared `&SpatialIndex` can be queried from many rayon workers at once.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use tracing::{debug, warn};

use deform_math::{DQuat, DVec3};
use deform_mesh::TriangleMesh;
use deform_mesh::normals::{face_centroids, face_normals};
use deform_types::{DeformError, DeformResult};

/// First candidate count tried by a filtered nearest query; doubled
/// until an element passes.
const INITIAL_CANDIDATES: usize = 8;

/// Once a filtered nearest query would ask the tree for more than
/// `1 / LINEAR_SCAN_FRACTION` of the sites, it scans every element instead.
const LINEAR_SCAN_FRACTION: usize = 4;

/// A single query result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Index of the element in the slice the index was built from.
    pub index: usize,
    /// Squared Euclidean distance from the query point.
    pub distance_sq: f64,
}

enum Filter {
    Any,
    Facing(DVec3),
    Nothing,
}

/// Static nearest-neighbour index.
pub struct SpatialIndex {
    tree: ImmutableKdTree<f64, 3>,
    /// Indexed elements grouped by position; tree item `s` is `sites[s]`.
    /// Coincident elements (UV seams, poles, welded copies) share a site.
    sites: Vec<Vec<usize>>,
    /// Original (unrotated) positions, indexed by element.
    points: Vec<DVec3>,
    /// Per-element normals when filtering is enabled.
    normals: Option<Vec<DVec3>>,
    /// Rotation into the tree's frame.
    frame: DQuat,
    len: usize,
    skipped: usize,
}

impl SpatialIndex {
    /// Builds an index over `points`.
    ///
    /// With `normals`, every query that passes a normal only matches
    /// elements facing the same way, and elements with a zero normal are
    /// left out of the tree. Non-finite points are always left out.
    pub fn build(points: &[DVec3], normals: Option<&[DVec3]>) -> DeformResult<Self> {
        if let Some(normals) = normals {
            if normals.len() != points.len() {
                return Err(DeformError::SizeMismatch {
                    what: "spatial index normals",
                    expected: points.len(),
                    actual: normals.len(),
                });
            }
        }

        // Axis-aligned planar meshes put every point on one split plane;
        // a skewed frame keeps leaf splits balanced. Distances are rotation
        // invariant.
        let frame = DQuat::from_axis_angle(DVec3::new(0.267, 0.535, 0.802).normalize(), 0.9);

        let mut coords: Vec<[f64; 3]> = Vec::new();
        let mut sites: Vec<Vec<usize>> = Vec::new();
        let mut lookup: HashMap<[u64; 3], usize> = HashMap::new();
        let mut len = 0;
        let mut skipped = 0;

        for (i, &p) in points.iter().enumerate() {
            if !p.is_finite() {
                warn!(element = i, "Skipping element with non-finite position");
                skipped += 1;
                continue;
            }
            if let Some(normals) = normals {
                if normals[i] == DVec3::ZERO || !normals[i].is_finite() {
                    warn!(element = i, "Skipping element with zero normal");
                    skipped += 1;
                    continue;
                }
            }
            // + 0.0 folds -0.0 into 0.0
            let key = [(p.x + 0.0).to_bits(), (p.y + 0.0).to_bits(), (p.z + 0.0).to_bits()];
            match lookup.entry(key) {
                Entry::Occupied(site) => sites[*site.get()].push(i),
                Entry::Vacant(site) => {
                    site.insert(sites.len());
                    sites.push(vec![i]);
                    let r = frame * p;
                    coords.push([r.x, r.y, r.z]);
                }
            }
            len += 1;
        }

        let tree = ImmutableKdTree::new_from_slice(&coords);
        debug!(elements = len, sites = sites.len(), skipped, "Built spatial index");

        Ok(Self {
            tree,
            sites,
            points: points.to_vec(),
            normals: normals.map(|n| n.to_vec()),
            frame,
            len,
            skipped,
        })
    }

    /// Index over mesh vertex positions, optionally filtered by vertex normals.
    pub fn from_mesh_vertices(mesh: &TriangleMesh, use_normals: bool) -> DeformResult<Self> {
        let points = mesh.positions();
        if use_normals {
            Self::build(&points, Some(&mesh.normals()))
        } else {
            Self::build(&points, None)
        }
    }

    /// Index over face centroids, optionally filtered by face normals.
    pub fn from_mesh_faces(mesh: &TriangleMesh, use_normals: bool) -> DeformResult<Self> {
        let centroids = face_centroids(mesh);
        if use_normals {
            Self::build(&centroids, Some(&face_normals(mesh)))
        } else {
            Self::build(&centroids, None)
        }
    }

    /// Number of indexed elements (skipped elements excluded).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no element was indexed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements left out at build time.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Returns true if queries can filter by normal.
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Closest element to `point`.
    ///
    /// When the index has normals and `normal` is given, only elements
    /// with a positive dot product against it qualify; a zero query
    /// normal then matches nothing. Ties go to the lower element index.
    ///
    /// Candidates are drawn from the tree in growing batches. When few
    /// elements face the query the batches stop at a quarter of the index
    /// and every element is scanned, so the worst case is linear in the
    /// index size per query.
    pub fn nearest(&self, point: DVec3, normal: Option<DVec3>) -> Option<SearchHit> {
        if self.is_empty() || !point.is_finite() {
            return None;
        }
        let filter = self.filter(normal);
        if matches!(filter, Filter::Nothing) {
            return None;
        }

        let query = self.to_tree(point);
        let sites = self.sites.len();
        let mut k = INITIAL_CANDIDATES.min(sites);
        loop {
            let candidates = self.tree.nearest_n::<SquaredEuclidean>(&query, k);
            let best = self.closest_of(
                point,
                &filter,
                candidates.iter().flat_map(|c| self.sites[c.item as usize].iter().copied()),
            );

            if best.is_some() || k >= sites {
                return best;
            }
            k *= 2;
            if k * LINEAR_SCAN_FRACTION > sites {
                return self.closest_of(point, &filter, self.sites.iter().flatten().copied());
            }
        }
    }

    /// Every element within the closed sphere of `radius` around `point`
    /// passing the same normal filter as [`nearest`](Self::nearest).
    ///
    /// Order is unspecified.
    pub fn range(&self, point: DVec3, normal: Option<DVec3>, radius: f64) -> Vec<SearchHit> {
        if self.is_empty() || !point.is_finite() || radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }
        let filter = self.filter(normal);
        if matches!(filter, Filter::Nothing) {
            return Vec::new();
        }

        let radius_sq = radius * radius;
        // Slightly widened so rounding in the rotated frame never drops
        // a boundary element; the exact test below decides.
        let widened = radius_sq * (1.0 + 1e-9) + f64::EPSILON;

        self.tree
            .within_unsorted::<SquaredEuclidean>(&self.to_tree(point), widened)
            .iter()
            .flat_map(|c| self.sites[c.item as usize].iter().copied())
            .filter(|&i| self.accepts(&filter, i))
            .map(|i| self.hit(point, i))
            .filter(|h| h.distance_sq <= radius_sq)
            .collect()
    }

    fn closest_of(
        &self,
        point: DVec3,
        filter: &Filter,
        elements: impl Iterator<Item = usize>,
    ) -> Option<SearchHit> {
        elements
            .filter(|&i| self.accepts(filter, i))
            .map(|i| self.hit(point, i))
            .min_by(|a, b| {
                a.distance_sq
                    .total_cmp(&b.distance_sq)
                    .then(a.index.cmp(&b.index))
            })
    }

    fn to_tree(&self, p: DVec3) -> [f64; 3] {
        let r = self.frame * p;
        [r.x, r.y, r.z]
    }

    fn hit(&self, point: DVec3, index: usize) -> SearchHit {
        SearchHit {
            index,
            distance_sq: self.points[index].distance_squared(point),
        }
    }

    fn filter(&self, normal: Option<DVec3>) -> Filter {
        match (&self.normals, normal) {
            (Some(_), Some(n)) if n == DVec3::ZERO || !n.is_finite() => Filter::Nothing,
            (Some(_), Some(n)) => Filter::Facing(n),
            _ => Filter::Any,
        }
    }

    fn accepts(&self, filter: &Filter, index: usize) -> bool {
        match (filter, &self.normals) {
            (Filter::Any, _) => true,
            (Filter::Facing(n), Some(normals)) => normals[index].dot(*n) > 0.0,
            (Filter::Facing(_), None) => true,
            (Filter::Nothing, _) => false,
        }
    }
}
