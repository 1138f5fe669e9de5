//! Graph model: tracks and their precomputed pairwise base edges
//!
//! `TrackGraph` is an immutable read view. It is built once from a
//! `GraphSnapshot` supplied by the graph data provider and then shared by
//! reference (`Arc<TrackGraph>`) across concurrent search requests.
//!
//! Tracks are stored sorted by id, so node indices order the same way as
//! track ids. Searches rely on this for deterministic tie-breaking.

pub mod key;

pub use key::{KeyParseError, Mode, MusicalKey, MAX_KEY_DISTANCE};

use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Track identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Create a track id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TrackId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A track with the musical attributes the engine scores on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique identifier
    pub id: TrackId,
    /// Display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Display artist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Tempo in beats per minute
    pub bpm: f64,
    /// Musical key
    pub key: MusicalKey,
    /// Energy level (0.0-1.0)
    pub energy: f64,
    /// Genre tags (lowercase)
    #[serde(default)]
    pub genres: BTreeSet<String>,
    /// Duration in seconds
    pub duration_secs: f64,
}

impl Track {
    /// Create a track with no title, artist, or genres
    pub fn new(
        id: impl Into<TrackId>,
        bpm: f64,
        key: MusicalKey,
        energy: f64,
        duration_secs: f64,
    ) -> Self {
        Self {
            id: id.into(),
            title: None,
            artist: None,
            bpm,
            key,
            energy,
            genres: BTreeSet::new(),
            duration_secs,
        }
    }

    /// Add genre tags (normalized to lowercase)
    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.genres.extend(genres.into_iter().map(|g| normalize_genre(g.as_ref())));
        self
    }

    /// Whether two tracks share at least one genre tag
    pub fn shares_genre(&self, other: &Track) -> bool {
        self.genres.intersection(&other.genres).next().is_some()
    }

    fn validate(&self) -> Result<(), GraphError> {
        let invalid = |reason: &str| GraphError::InvalidTrack {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.as_str().trim().is_empty() {
            return Err(invalid("empty id"));
        }
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(invalid("bpm must be a positive number"));
        }
        if !(0.0..=1.0).contains(&self.energy) {
            return Err(invalid("energy must be within [0, 1]"));
        }
        if !self.duration_secs.is_finite() || self.duration_secs < 0.0 {
            return Err(invalid("duration must be non-negative"));
        }
        Ok(())
    }
}

fn normalize_genre(genre: &str) -> String {
    genre.trim().to_lowercase()
}

/// Why two tracks are connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Tracks appear together in playlists or sets
    #[default]
    CoOccurrence,
    /// Tracks share or neighbour genres
    GenreSimilarity,
    /// Tracks come from related artists
    ArtistSimilarity,
    /// Tracks sound alike
    AudioSimilarity,
    /// Hand-picked transition
    Curated,
}

/// Precomputed undirected edge between two tracks
///
/// `weight` is a traversal distance: lower means closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseEdge {
    /// One endpoint
    pub source: TrackId,
    /// Other endpoint
    pub target: TrackId,
    /// Base traversal distance (non-negative)
    pub weight: f64,
    /// Relationship that produced the edge
    #[serde(default)]
    pub kind: RelationshipKind,
    /// Provider confidence (0.0-1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl BaseEdge {
    /// Create a co-occurrence edge
    pub fn new(source: impl Into<TrackId>, target: impl Into<TrackId>, weight: f64) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            weight,
            kind: RelationshipKind::CoOccurrence,
            confidence: None,
        }
    }

    /// Set the relationship kind
    pub fn with_kind(mut self, kind: RelationshipKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Serialized form of a graph as supplied by the data provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// All tracks
    pub tracks: Vec<Track>,
    /// All base edges
    #[serde(default)]
    pub edges: Vec<BaseEdge>,
}

/// Neighbour entry in the adjacency list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjacent {
    /// Neighbour node index
    pub node: usize,
    /// Index into the edge table
    pub edge: usize,
}

/// Immutable track graph
#[derive(Debug, Clone)]
pub struct TrackGraph {
    tracks: Vec<Track>,
    index: HashMap<TrackId, usize>,
    edges: Vec<BaseEdge>,
    adjacency: Vec<Vec<Adjacent>>,
    edge_lookup: HashMap<(usize, usize), usize>,
    min_edge_weight: f64,
}

impl TrackGraph {
    /// Build a graph, validating tracks and edges
    ///
    /// Parallel edges between the same pair keep the lowest weight.
    pub fn new(mut tracks: Vec<Track>, edges: Vec<BaseEdge>) -> Result<Self, GraphError> {
        for track in &mut tracks {
            track.validate()?;
            track.genres = track.genres.iter().map(|g| normalize_genre(g)).collect();
        }
        tracks.sort_by(|a, b| a.id.cmp(&b.id));

        let mut index = HashMap::with_capacity(tracks.len());
        for (i, track) in tracks.iter().enumerate() {
            if index.insert(track.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateTrack(track.id.clone()));
            }
        }

        let mut kept: Vec<BaseEdge> = Vec::with_capacity(edges.len());
        let mut edge_lookup: HashMap<(usize, usize), usize> = HashMap::with_capacity(edges.len());
        for edge in edges {
            let a = *index.get(&edge.source).ok_or_else(|| GraphError::UnknownEndpoint {
                from: edge.source.clone(),
                to: edge.target.clone(),
                missing: edge.source.clone(),
            })?;
            let b = *index.get(&edge.target).ok_or_else(|| GraphError::UnknownEndpoint {
                from: edge.source.clone(),
                to: edge.target.clone(),
                missing: edge.target.clone(),
            })?;
            if a == b {
                return Err(GraphError::SelfLoop(edge.source.clone()));
            }
            if !edge.weight.is_finite() || edge.weight < 0.0 {
                return Err(GraphError::InvalidWeight {
                    from: edge.source.clone(),
                    to: edge.target.clone(),
                    weight: edge.weight,
                });
            }

            let pair = (a.min(b), a.max(b));
            match edge_lookup.get(&pair) {
                Some(&existing) => {
                    if edge.weight < kept[existing].weight {
                        kept[existing] = edge;
                    }
                }
                None => {
                    edge_lookup.insert(pair, kept.len());
                    kept.push(edge);
                }
            }
        }

        let mut adjacency: Vec<Vec<Adjacent>> = vec![Vec::new(); tracks.len()];
        for (&(a, b), &e) in &edge_lookup {
            adjacency[a].push(Adjacent { node: b, edge: e });
            adjacency[b].push(Adjacent { node: a, edge: e });
        }
        for list in &mut adjacency {
            list.sort_by_key(|adj| adj.node);
        }

        let min_edge_weight = kept.iter().map(|e| e.weight).fold(f64::INFINITY, f64::min);
        let min_edge_weight = if min_edge_weight.is_finite() { min_edge_weight } else { 0.0 };

        debug!(
            tracks = tracks.len(),
            edges = kept.len(),
            min_edge_weight,
            "Track graph built"
        );

        Ok(Self {
            tracks,
            index,
            edges: kept,
            adjacency,
            edge_lookup,
            min_edge_weight,
        })
    }

    /// Build from a deserialized snapshot
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self, GraphError> {
        Self::new(snapshot.tracks, snapshot.edges)
    }

    /// Read a JSON snapshot
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, GraphError> {
        let snapshot: GraphSnapshot = serde_json::from_reader(reader)?;
        Self::from_snapshot(snapshot)
    }

    /// Read a JSON snapshot file
    pub fn from_json_file(path: &Path) -> Result<Self, GraphError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Look up a track by id
    pub fn track(&self, id: &TrackId) -> Option<&Track> {
        self.index.get(id).map(|&i| &self.tracks[i])
    }

    /// Node index of a track id
    pub fn index_of(&self, id: &TrackId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Track at a node index
    ///
    /// # Panics
    /// Panics if `idx` is out of range; indices come from this graph.
    pub fn track_at(&self, idx: usize) -> &Track {
        &self.tracks[idx]
    }

    /// Base edge between two tracks, in either order
    pub fn edge(&self, a: &TrackId, b: &TrackId) -> Option<&BaseEdge> {
        let (a, b) = (self.index_of(a)?, self.index_of(b)?);
        self.edge_between(a, b)
    }

    /// Base edge between two node indices, in either order
    pub fn edge_between(&self, a: usize, b: usize) -> Option<&BaseEdge> {
        self.edge_lookup
            .get(&(a.min(b), a.max(b)))
            .map(|&e| &self.edges[e])
    }

    /// Edge by edge-table index
    pub fn edge_at(&self, idx: usize) -> &BaseEdge {
        &self.edges[idx]
    }

    /// Neighbours of a node, ordered by node index
    pub fn neighbors(&self, idx: usize) -> &[Adjacent] {
        &self.adjacency[idx]
    }

    /// All tracks, ordered by id
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Number of tracks
    pub fn node_count(&self) -> usize {
        self.tracks.len()
    }

    /// Number of distinct undirected edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Smallest base edge weight (0.0 for an edgeless graph)
    pub fn min_edge_weight(&self) -> f64 {
        self.min_edge_weight
    }
}
