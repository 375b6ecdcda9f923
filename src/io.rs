//! Reading placement samples and writing score tables.
//!
//! Two input formats feed the engine:
//! - jplace (JSON): a Newick reference tree whose edges carry `{N}` number
//!   annotations, plus per-query placement records addressed by those
//!   numbers.
//! - NHX: a Newick tree whose edges carry `[&&NHX:species_count=K]`
//!   attributes; each edge's weight becomes mass at the branch midpoint.
//!
//! Newick parsers choke on both annotation styles, so a pre-pass hoists the
//! suffix annotations out of the string and into node-name markers before the
//! tree goes to `phylotree`. After parsing, the markers point back into the
//! collected annotation bodies, per node, and through the topology builder's
//! node map, per edge.

use crate::error::{DiversityError, Result};
use crate::mass::{DiscreteCounts, MassProfile};
use crate::topology::{EdgeIndex, Topology};
use phylotree::tree::Tree as PhyloTree;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// One candidate placement location of a query.
#[derive(Debug, Clone)]
pub struct Placement {
    pub edge: EdgeIndex,
    pub like_weight_ratio: f64,
    /// Offset from the proximal node of the edge. The jplace field is named
    /// `distal_length`, but it is measured from the proximal node.
    pub proximal_offset: f64,
}

/// One query with its candidate placements.
#[derive(Debug, Clone)]
pub struct Pquery {
    pub placements: Vec<Placement>,
    /// Number of query names attached to this record.
    pub name_count: u64,
    /// Summed name multiplicity (equals `name_count` for plain `n` arrays).
    pub multiplicity: f64,
}

/// A parsed jplace sample: its own reference topology plus decoded queries.
#[derive(Debug)]
pub struct PlacedSample {
    pub name: String,
    pub topology: Topology,
    pub pqueries: Vec<Pquery>,
}

impl PlacedSample {
    /// Discrete per-edge counts, taking the best-hit placement per query.
    pub fn best_hit_counts(&self) -> DiscreteCounts {
        let mut counts = DiscreteCounts::new(self.topology.edge_count());
        for pquery in &self.pqueries {
            let best = pquery
                .placements
                .iter()
                .max_by(|a, b| a.like_weight_ratio.total_cmp(&b.like_weight_ratio));
            if let Some(best) = best {
                counts.add(best.edge, pquery.name_count);
            }
        }
        counts
    }

    /// Continuous mass profile: each query's like-weight-ratios are
    /// normalized to sum 1 across its placements, then every placement
    /// deposits its share (scaled by the query's multiplicity) at its offset
    /// on its edge. The result is normalized to total mass 1.0.
    pub fn mass_profile(&self) -> Result<MassProfile> {
        let mut profile = MassProfile::new(self.topology.edge_count());
        for pquery in &self.pqueries {
            let ratio_total: f64 = pquery
                .placements
                .iter()
                .map(|p| p.like_weight_ratio)
                .sum();
            if !(ratio_total > 0.0) {
                return Err(DiversityError::Malformed(
                    "pquery with zero like-weight-ratio total".to_string(),
                ));
            }
            for placement in &pquery.placements {
                let length = self.topology.branch_length(placement.edge);
                let offset = placement.proximal_offset.clamp(0.0, length);
                let mass =
                    placement.like_weight_ratio / ratio_total * pquery.multiplicity;
                profile.deposit(placement.edge, offset, mass);
            }
        }
        profile.normalized(&self.topology)
    }
}

/// A sample that arrives directly as a mass-annotated tree (NHX).
pub struct MassSample {
    pub name: String,
    pub topology: Topology,
    pub profile: MassProfile,
}

// ---------------------------------------------------------------------------
// annotation hoisting
// ---------------------------------------------------------------------------

/// Moves suffix annotations (`{0}` edge numbers, `[&&NHX:…]` comments) out of
/// a Newick string and into `@@k` node-name markers, returning the cleaned
/// string and the annotation bodies indexed by k.
///
/// Annotations follow a node's branch length (`A:1.0{0}`), so the marker is
/// inserted where the node's label ended (right before its `:`), keeping
/// the string parseable by plain Newick readers.
fn hoist_annotations(newick: &str, open: char, close: char) -> (String, Vec<String>) {
    let mut out = String::with_capacity(newick.len());
    let mut notes: Vec<String> = Vec::new();
    // output position where the current node's label ends
    let mut label_end: Option<usize> = None;

    let mut chars = newick.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == open {
            let mut body = String::new();
            for next in chars.by_ref() {
                if next == close {
                    break;
                }
                body.push(next);
            }
            let marker = format!("@@{}", notes.len());
            notes.push(body);
            match label_end {
                Some(pos) => {
                    out.insert_str(pos, &marker);
                    label_end = Some(pos + marker.len());
                }
                None => out.push_str(&marker),
            }
        } else {
            match ch {
                '(' | ',' | ')' | ';' => {
                    out.push(ch);
                    label_end = None;
                }
                ':' => {
                    if label_end.is_none() {
                        label_end = Some(out.len());
                    }
                    out.push(ch);
                }
                _ => out.push(ch),
            }
        }
    }
    (out, notes)
}

/// Extracts the annotation index from a marked node name.
fn marker_note(name: &str) -> Option<usize> {
    let pos = name.rfind("@@")?;
    name[pos + 2..].parse().ok()
}

/// Parses an annotated Newick string into a topology plus the annotation
/// body attached to each annotated edge.
fn parse_annotated_tree(
    newick: &str,
    open: char,
    close: char,
) -> Result<(Topology, Vec<(EdgeIndex, String)>)> {
    let (clean, notes) = hoist_annotations(newick, open, close);
    let tree = PhyloTree::from_newick(&clean)
        .map_err(|e| DiversityError::TreeParse(e.to_string()))?;
    let (topology, node_edges) = Topology::from_tree(&tree)?;

    let mut annotated = Vec::with_capacity(node_edges.len());
    for (&node_id, &edge) in &node_edges {
        let node = tree
            .get(&node_id)
            .map_err(|e| DiversityError::TreeParse(e.to_string()))?;
        if let Some(idx) = node.name.as_deref().and_then(marker_note) {
            let body = notes.get(idx).cloned().ok_or_else(|| {
                DiversityError::Malformed(format!("dangling annotation marker {idx}"))
            })?;
            annotated.push((edge, body));
        }
    }
    Ok((topology, annotated))
}

// ---------------------------------------------------------------------------
// jplace
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct JplaceDocument {
    tree: String,
    placements: Vec<JplacePquery>,
    fields: Vec<String>,
}

#[derive(Deserialize)]
struct JplacePquery {
    p: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    n: Option<Vec<String>>,
    #[serde(default)]
    nm: Option<Vec<(String, f64)>>,
}

/// Reads a `.jplace` (optionally `.gz`) file into a [`PlacedSample`].
pub fn read_jplace_sample<P: AsRef<Path>>(path: P) -> Result<PlacedSample> {
    let text = read_file(path.as_ref())?;
    read_jplace_str(&sample_name(path.as_ref()), &text)
}

/// Parses jplace JSON from a string; `name` identifies the sample in errors
/// and output.
pub fn read_jplace_str(name: &str, text: &str) -> Result<PlacedSample> {
    let doc: JplaceDocument = serde_json::from_str(text)
        .map_err(|e| DiversityError::Malformed(format!("invalid jplace JSON: {e}")))?;

    let (topology, annotated) = parse_annotated_tree(&doc.tree, '{', '}')?;
    let mut edge_numbers: HashMap<u64, EdgeIndex> = HashMap::with_capacity(annotated.len());
    for (edge, note) in annotated {
        let number: u64 = note.trim().parse().map_err(|_| {
            DiversityError::Malformed(format!("bad edge number annotation '{note}'"))
        })?;
        edge_numbers.insert(number, edge);
    }

    let column = |field: &str| doc.fields.iter().position(|f| f == field);
    let edge_col = column("edge_num")
        .ok_or_else(|| DiversityError::Malformed("missing field edge_num".to_string()))?;
    let ratio_col = column("like_weight_ratio").ok_or_else(|| {
        DiversityError::Malformed("missing field like_weight_ratio".to_string())
    })?;
    let offset_col = column("distal_length");

    let mut pqueries = Vec::with_capacity(doc.placements.len());
    for record in &doc.placements {
        let (name_count, multiplicity) = match (&record.n, &record.nm) {
            (_, Some(nm)) => (nm.len() as u64, nm.iter().map(|(_, m)| m).sum()),
            (Some(n), None) => (n.len() as u64, n.len() as f64),
            (None, None) => {
                return Err(DiversityError::Malformed(
                    "pquery without names".to_string(),
                ));
            }
        };

        let mut placements = Vec::with_capacity(record.p.len());
        for row in &record.p {
            let number = row
                .get(edge_col)
                .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
                .ok_or_else(|| {
                    DiversityError::Malformed("non-numeric edge_num".to_string())
                })?;
            let edge = *edge_numbers.get(&number).ok_or_else(|| {
                DiversityError::Malformed(format!("unknown edge number {number}"))
            })?;
            let like_weight_ratio = row
                .get(ratio_col)
                .and_then(serde_json::Value::as_f64)
                .ok_or_else(|| {
                    DiversityError::Malformed("non-numeric like_weight_ratio".to_string())
                })?;
            let proximal_offset = offset_col
                .and_then(|col| row.get(col))
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0);
            placements.push(Placement {
                edge,
                like_weight_ratio,
                proximal_offset,
            });
        }
        pqueries.push(Pquery {
            placements,
            name_count,
            multiplicity,
        });
    }

    Ok(PlacedSample {
        name: name.to_string(),
        topology,
        pqueries,
    })
}

// ---------------------------------------------------------------------------
// NHX species counts
// ---------------------------------------------------------------------------

/// Reads an NHX-annotated Newick file, turning per-edge `species_count`
/// attributes into a normalized mass profile with each edge's weight at its
/// branch midpoint.
pub fn read_nhx_sample<P: AsRef<Path>>(path: P) -> Result<MassSample> {
    let text = read_file(path.as_ref())?;
    read_nhx_str(&sample_name(path.as_ref()), &text)
}

/// Parses an NHX-annotated Newick string; see [`read_nhx_sample`].
pub fn read_nhx_str(name: &str, text: &str) -> Result<MassSample> {
    let (topology, annotated) = parse_annotated_tree(text.trim(), '[', ']')?;

    let mut weights = vec![0.0; topology.edge_count()];
    for (edge, note) in annotated {
        weights[edge] = species_count(&note)?;
    }

    let mut profile = MassProfile::new(topology.edge_count());
    for (edge, weight) in weights.into_iter().enumerate() {
        profile.deposit(edge, topology.branch_length(edge) / 2.0, weight);
    }
    let profile = profile.normalized(&topology)?;

    Ok(MassSample {
        name: name.to_string(),
        topology,
        profile,
    })
}

/// Pulls `species_count` out of an NHX comment body, defaulting to 0.
fn species_count(note: &str) -> Result<f64> {
    let body = note.strip_prefix("&&NHX").unwrap_or(note);
    for part in body.split(':') {
        if let Some(value) = part.strip_prefix("species_count=") {
            return value.parse().map_err(|_| {
                DiversityError::Malformed(format!("bad species_count '{value}'"))
            });
        }
    }
    Ok(0.0)
}

// ---------------------------------------------------------------------------
// plumbing
// ---------------------------------------------------------------------------

/// Reads a file to string, transparently decompressing `.gz`.
fn read_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| DiversityError::Read(format!("{}: {e}", path.display())))?;
    let mut text = String::new();
    let outcome = if path.to_string_lossy().ends_with(".gz") {
        GzDecoder::new(file).read_to_string(&mut text)
    } else {
        file.read_to_string(&mut text)
    };
    outcome.map_err(|e| DiversityError::Read(format!("{}: {e}", path.display())))?;
    Ok(text)
}

/// Sample name from a file path: basename minus compression and format
/// extensions.
pub fn sample_name(path: &Path) -> String {
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("sample");
    let base = base.trim_end_matches(".gz");
    for ext in [".jplace", ".newick", ".nhx", ".nwk"] {
        if let Some(stripped) = base.strip_suffix(ext) {
            return stripped.to_string();
        }
    }
    base.to_string()
}

/// Writes the score table as CSV: header row `sample,<metric names…>`, one
/// row per sample. `-` writes to stdout; a `.gz` suffix gzip-compresses.
pub fn write_scores_csv<P: AsRef<Path>>(
    path: P,
    header: &[String],
    names: &[String],
    rows: &[Vec<f64>],
) -> io::Result<()> {
    let p = path.as_ref();
    let mut out: Box<dyn Write> = if p.as_os_str() == "-" {
        Box::new(BufWriter::new(io::stdout()))
    } else if p.to_string_lossy().ends_with(".gz") {
        let file = File::create(p)?;
        Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    write!(out, "sample")?;
    for name in header {
        write!(out, ",{name}")?;
    }
    writeln!(out)?;

    for (name, row) in names.iter().zip(rows) {
        write!(out, "{name}")?;
        for value in row {
            write!(out, ",{value}")?;
        }
        writeln!(out)?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weighting::equals_approx;
    use std::path::PathBuf;

    #[test]
    fn hoists_jplace_edge_numbers_into_markers() {
        let (clean, notes) =
            hoist_annotations("((A:1.0{0},B:1.0{1}):2.0{2},C:1.0{3}):0{4};", '{', '}');
        assert_eq!(clean, "((A@@0:1.0,B@@1:1.0)@@2:2.0,C@@3:1.0)@@4:0;");
        assert_eq!(notes, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn hoists_nhx_comments_into_markers() {
        let (clean, notes) = hoist_annotations(
            "(A:1.0[&&NHX:species_count=3],B:2.0[&&NHX:species_count=1]):0.0;",
            '[',
            ']',
        );
        assert_eq!(clean, "(A@@0:1.0,B@@1:2.0):0.0;");
        assert_eq!(notes[0], "&&NHX:species_count=3");
        assert_eq!(notes[1], "&&NHX:species_count=1");
    }

    #[test]
    fn annotation_without_branch_length_lands_after_label() {
        let (clean, notes) = hoist_annotations("(A{0},B{1}){2};", '{', '}');
        assert_eq!(clean, "(A@@0,B@@1)@@2;");
        assert_eq!(notes.len(), 3);
    }

    #[test]
    fn marker_note_parses_suffix() {
        assert_eq!(marker_note("A@@0"), Some(0));
        assert_eq!(marker_note("@@17"), Some(17));
        assert_eq!(marker_note("plain"), None);
    }

    const JPLACE: &str = r#"{
        "version": 3,
        "tree": "((A:1.0{0},B:1.0{1}):2.0{2},C:1.0{3}):0{4};",
        "placements": [
            {"p": [[0, -100.0, 0.9, 0.5, 0.1], [3, -102.0, 0.1, 0.25, 0.1]],
             "n": ["q1"]},
            {"p": [[1, -90.0, 1.0, 0.75, 0.2]], "nm": [["q2", 2.0]]}
        ],
        "fields": ["edge_num", "likelihood", "like_weight_ratio",
                   "distal_length", "pendant_length"],
        "metadata": {"invocation": "test"}
    }"#;

    #[test]
    fn jplace_decodes_queries_against_edge_numbers() {
        let sample = read_jplace_str("s1", JPLACE).unwrap();
        assert_eq!(sample.topology.edge_count(), 4);
        assert_eq!(sample.pqueries.len(), 2);
        assert_eq!(sample.pqueries[0].placements.len(), 2);
        assert_eq!(sample.pqueries[0].name_count, 1);
        assert_eq!(sample.pqueries[1].name_count, 1);
        assert!(equals_approx(sample.pqueries[1].multiplicity, 2.0));
    }

    #[test]
    fn jplace_best_hit_counts() {
        let sample = read_jplace_str("s1", JPLACE).unwrap();
        let counts = sample.best_hit_counts();
        assert_eq!(counts.total(), 2);
        // q1's best hit is jplace edge 0 at ratio 0.9, q2 sits on edge 1
        let occupied: Vec<u64> = (0..sample.topology.edge_count())
            .map(|e| counts.count(e))
            .filter(|&c| c > 0)
            .collect();
        assert_eq!(occupied, vec![1, 1]);
    }

    #[test]
    fn jplace_mass_profile_spreads_and_normalizes() {
        let sample = read_jplace_str("s1", JPLACE).unwrap();
        let profile = sample.mass_profile().unwrap();
        assert!(equals_approx(profile.total(), 1.0));
        // q1: 0.9 and 0.1 over two edges; q2: multiplicity 2 on one edge;
        // grand total 3 before normalization
        let mut edge_totals: Vec<f64> = (0..sample.topology.edge_count())
            .map(|e| profile.edge_total(e))
            .collect();
        edge_totals.sort_by(f64::total_cmp);
        assert!(equals_approx(edge_totals[0], 0.0));
        assert!(equals_approx(edge_totals[1], 0.1 / 3.0));
        assert!(equals_approx(edge_totals[2], 0.9 / 3.0));
        assert!(equals_approx(edge_totals[3], 2.0 / 3.0));
    }

    #[test]
    fn jplace_rejects_unknown_edge_number() {
        let text = JPLACE.replace("[0, -100.0", "[9, -100.0");
        assert!(matches!(
            read_jplace_str("s1", &text).unwrap_err(),
            DiversityError::Malformed(_)
        ));
    }

    #[test]
    fn jplace_requires_mandatory_fields() {
        let text = JPLACE.replace("\"edge_num\"", "\"edge\"");
        assert!(matches!(
            read_jplace_str("s1", &text).unwrap_err(),
            DiversityError::Malformed(_)
        ));
    }

    #[test]
    fn nhx_weights_become_midpoint_masses() {
        let sample = read_nhx_str(
            "scrapp",
            "((A:1.0[&&NHX:species_count=3],B:1.0[&&NHX:species_count=1])\
             :2.0[&&NHX:species_count=0],C:1.0[&&NHX:species_count=4]):0.0;",
        )
        .unwrap();
        assert!(equals_approx(sample.profile.total(), 1.0));
        let mut points: Vec<(f64, f64)> = (0..sample.topology.edge_count())
            .flat_map(|e| sample.profile.points(e).to_vec())
            .collect();
        points.sort_by(|a, b| a.1.total_cmp(&b.1));
        // weights 3, 1, 0, 4 over total 8, each at its branch midpoint
        assert_eq!(points.len(), 4);
        assert!(equals_approx(points[0].1, 0.0));
        assert!(equals_approx(points[1].1, 1.0 / 8.0));
        assert!(equals_approx(points[2].1, 3.0 / 8.0));
        assert!(equals_approx(points[3].1, 4.0 / 8.0));
        // the unweighted internal edge holds its zero point at offset 1.0
        assert!(equals_approx(points[0].0, 1.0));
    }

    #[test]
    fn nhx_missing_attribute_defaults_to_zero() {
        assert_eq!(species_count("&&NHX:other=1").unwrap(), 0.0);
        assert_eq!(species_count("&&NHX:species_count=2.5").unwrap(), 2.5);
        assert!(species_count("&&NHX:species_count=x").is_err());
    }

    #[test]
    fn sample_names_strip_format_extensions() {
        assert_eq!(sample_name(&PathBuf::from("/data/s1.jplace")), "s1");
        assert_eq!(sample_name(&PathBuf::from("s2.jplace.gz")), "s2");
        assert_eq!(sample_name(&PathBuf::from("tree.nhx")), "tree");
        assert_eq!(sample_name(&PathBuf::from("odd.txt")), "odd.txt");
    }
}
