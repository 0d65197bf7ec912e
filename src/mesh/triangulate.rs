//! Triangle assembly from GL-style primitive sets.
//!
//! Strips, fans, quads, quad-strips, and polygons all reduce to plain
//! triangle lists here; the primitive-restart sentinel of the source index
//! width resets strip/fan runs. Draw-array-lengths sub-segments are
//! independent runs with no restart handling, matching the source format's
//! semantics.

use log::warn;

use crate::error::{Result, TilerError};
use crate::scene::node::{IndexArray, PrimitiveMode, PrimitiveSet};

/// Expand a primitive set into a `u32` triangle list. Point and line modes
/// yield no triangles. Index values are left as found; callers validate
/// range against the vertex count.
pub fn triangulate(set: &PrimitiveSet) -> Result<Vec<u32>> {
    let mode = set.mode();
    if !mode.is_surface() {
        return Ok(Vec::new());
    }

    match set {
        PrimitiveSet::DrawElements { mode, indices } => {
            let runs = split_restart_runs(indices, *mode);
            let mut out = Vec::new();
            for run in runs {
                emit_run(*mode, &run, &mut out)?;
            }
            Ok(out)
        }
        PrimitiveSet::DrawArrays { mode, first, count } => {
            let run: Vec<u32> = (*first..*first + *count).map(|i| i as u32).collect();
            let mut out = Vec::new();
            emit_run(*mode, &run, &mut out)?;
            Ok(out)
        }
        PrimitiveSet::DrawArrayLengths {
            mode,
            first,
            lengths,
        } => {
            let mut out = Vec::new();
            let mut base = *first;
            for &len in lengths {
                let run: Vec<u32> = (base..base + len).map(|i| i as u32).collect();
                emit_run(*mode, &run, &mut out)?;
                base += len;
            }
            Ok(out)
        }
    }
}

/// Split an index stream into runs separated by the restart sentinel.
/// Restart only applies to strip/fan-style assembly; list modes take the
/// stream as one run.
fn split_restart_runs(indices: &IndexArray, mode: PrimitiveMode) -> Vec<Vec<u32>> {
    let honors_restart = matches!(
        mode,
        PrimitiveMode::TriangleStrip | PrimitiveMode::TriangleFan | PrimitiveMode::Polygon
    );
    if !honors_restart {
        return vec![indices.to_u32_vec()];
    }

    let restart = indices.restart_value();
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for i in 0..indices.len() {
        let idx = indices.get(i);
        if idx == restart {
            if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(idx);
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

fn emit_run(mode: PrimitiveMode, run: &[u32], out: &mut Vec<u32>) -> Result<()> {
    match mode {
        PrimitiveMode::Triangles => {
            for tri in run.chunks_exact(3) {
                out.extend_from_slice(tri);
            }
        }
        PrimitiveMode::TriangleStrip => {
            // A run shorter than 3 yields nothing.
            for i in 2..run.len() {
                if i % 2 == 0 {
                    out.extend_from_slice(&[run[i - 2], run[i - 1], run[i]]);
                } else {
                    out.extend_from_slice(&[run[i - 1], run[i - 2], run[i]]);
                }
            }
        }
        PrimitiveMode::TriangleFan | PrimitiveMode::Polygon => {
            for i in 2..run.len() {
                out.extend_from_slice(&[run[0], run[i - 1], run[i]]);
            }
        }
        PrimitiveMode::Quads => {
            if run.len() % 4 != 0 {
                warn!(
                    "quad primitive has {} indices, discarding {} past the last full quad",
                    run.len(),
                    run.len() % 4
                );
            }
            for quad in run.chunks_exact(4) {
                let (a, b, c, d) = (quad[0], quad[1], quad[2], quad[3]);
                out.extend_from_slice(&[a, b, c, a, c, d]);
            }
        }
        PrimitiveMode::QuadStrip => {
            // Vertices (2i, 2i+1, 2i+2, 2i+3) form one quad; canonical GL
            // winding gives triangles (v0,v1,v2) and (v1,v3,v2).
            let mut i = 0;
            while i + 3 < run.len() {
                let (v0, v1, v2, v3) = (run[i], run[i + 1], run[i + 2], run[i + 3]);
                out.extend_from_slice(&[v0, v1, v2, v1, v3, v2]);
                i += 2;
            }
        }
        other => {
            return Err(TilerError::policy(format!(
                "primitive mode {other:?} cannot be triangulated"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elements(mode: PrimitiveMode, indices: Vec<u32>) -> PrimitiveSet {
        PrimitiveSet::DrawElements {
            mode,
            indices: IndexArray::U32(indices),
        }
    }

    #[test]
    fn test_triangles_pass_through_unchanged() {
        let set = elements(PrimitiveMode::Triangles, vec![0, 1, 2, 2, 1, 3]);
        assert_eq!(triangulate(&set).unwrap(), vec![0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn test_strip_alternates_winding() {
        let set = elements(PrimitiveMode::TriangleStrip, vec![0, 1, 2, 3]);
        assert_eq!(triangulate(&set).unwrap(), vec![0, 1, 2, 1, 3, 2]);
    }

    #[test]
    fn test_degenerate_strip_yields_nothing() {
        for n in 0..3 {
            let set = elements(PrimitiveMode::TriangleStrip, (0..n).collect());
            assert!(triangulate(&set).unwrap().is_empty());
        }
    }

    #[test]
    fn test_fan_pivots_on_first_vertex() {
        let set = elements(PrimitiveMode::TriangleFan, vec![5, 6, 7, 8]);
        assert_eq!(triangulate(&set).unwrap(), vec![5, 6, 7, 5, 7, 8]);
    }

    #[test]
    fn test_quads_split_into_two_triangles() {
        let set = elements(PrimitiveMode::Quads, vec![0, 1, 2, 3]);
        assert_eq!(triangulate(&set).unwrap(), vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_quads_discard_trailing_partial() {
        let set = elements(PrimitiveMode::Quads, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(triangulate(&set).unwrap(), vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_quad_strip_canonical_form() {
        let set = elements(PrimitiveMode::QuadStrip, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(
            triangulate(&set).unwrap(),
            vec![0, 1, 2, 1, 3, 2, 2, 3, 4, 3, 5, 4]
        );
    }

    #[test]
    fn test_restart_resets_strip_run() {
        let set = PrimitiveSet::DrawElements {
            mode: PrimitiveMode::TriangleStrip,
            indices: IndexArray::U16(vec![0, 1, 2, u16::MAX, 3, 4, 5]),
        };
        assert_eq!(triangulate(&set).unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_restart_only_honored_for_strip_family() {
        // In a plain triangle list 255 is a valid index for u16 data.
        let set = PrimitiveSet::DrawElements {
            mode: PrimitiveMode::Triangles,
            indices: IndexArray::U16(vec![0, 1, 255]),
        };
        assert_eq!(triangulate(&set).unwrap(), vec![0, 1, 255]);
    }

    #[test]
    fn test_draw_array_lengths_runs_are_independent() {
        let set = PrimitiveSet::DrawArrayLengths {
            mode: PrimitiveMode::TriangleFan,
            first: 0,
            lengths: vec![3, 4],
        };
        assert_eq!(triangulate(&set).unwrap(), vec![0, 1, 2, 3, 4, 5, 3, 5, 6]);
    }

    #[test]
    fn test_lines_and_points_yield_no_triangles() {
        let set = elements(PrimitiveMode::Lines, vec![0, 1, 2, 3]);
        assert!(triangulate(&set).unwrap().is_empty());
        let set = PrimitiveSet::DrawArrays {
            mode: PrimitiveMode::Points,
            first: 0,
            count: 10,
        };
        assert!(triangulate(&set).unwrap().is_empty());
    }
}
