//! Location search for failed logpoint expressions
//!
//! When a logpoint's expressions fail to resolve at the location the runtime
//! actually chose, nearby lines are probed one at a time: place a temporary
//! breakpoint, wait briefly for the code path to be hit, evaluate every
//! expression in the top frame, score the candidate by the fraction that
//! succeed, and clean up. Candidates come back best first.

use std::cmp::Ordering;

use crate::cdp::SetBreakpointByUrlParams;
use crate::common::{Error, Result};

use super::debug_session::{DebugSession, SourcePosition};

/// One probed line and how well the expressions fared there
#[derive(Debug, Clone)]
pub struct LocationCandidate {
    /// Candidate position in original-source coordinates
    pub position: SourcePosition,
    /// Fraction of expressions that resolved, 0.0..=1.0
    pub score: f64,
    /// Per-expression failure detail for partial scores
    pub failures: Vec<(String, String)>,
}

impl LocationCandidate {
    /// Human-readable suggestion line
    pub fn describe(&self) -> String {
        if self.failures.is_empty() {
            format!("{}: all expressions resolve here", self.position)
        } else {
            let failing = self
                .failures
                .iter()
                .map(|(expr, reason)| format!("{} ({})", expr, reason))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "{}: {:.0}% of expressions resolve, failing: {}",
                self.position,
                self.score * 100.0,
                failing
            )
        }
    }
}

impl DebugSession {
    /// Probe lines within the configured radius of `origin` (runtime
    /// coordinates, 1-based) for one where the expression list resolves.
    ///
    /// Each candidate gets a short bounded wait; a dead-end line that is
    /// never executed cannot stall the whole search. All temporary
    /// breakpoints are removed before returning.
    pub(crate) async fn search_candidates(
        &mut self,
        origin: &SourcePosition,
        expressions: &[String],
    ) -> Result<Vec<LocationCandidate>> {
        if expressions.is_empty() {
            return Ok(Vec::new());
        }
        let radius = self.search_config().search.radius_lines;
        let probe_wait = self.search_config().probe_wait();

        let first = origin.line.saturating_sub(radius).max(1);
        let last = origin.line.saturating_add(radius);
        let mut candidates = Vec::new();

        for line in first..=last {
            if line == origin.line {
                continue;
            }

            let placed = match self
                .client()
                .set_breakpoint_by_url(SetBreakpointByUrlParams {
                    url: origin.file.clone(),
                    line_number: line - 1,
                    column_number: None,
                    condition: None,
                })
                .await
            {
                Ok(placed) => placed,
                Err(e) => {
                    tracing::debug!(line, error = %e, "candidate placement failed");
                    continue;
                }
            };
            if placed.locations.is_empty() {
                let _ = self.client().remove_breakpoint(&placed.breakpoint_id).await;
                continue;
            }

            let mut failures = Vec::new();
            let mut evaluated = false;
            match self.wait_paused(probe_wait).await {
                Ok(()) => {
                    let ours = self
                        .paused_state()
                        .map(|p| p.hit_breakpoints.contains(&placed.breakpoint_id))
                        .unwrap_or(false);
                    if ours {
                        evaluated = true;
                        let frame_id = self
                            .paused_state()
                            .and_then(|p| p.call_frames.first())
                            .map(|f| f.call_frame_id.clone());
                        if let Some(frame_id) = frame_id {
                            for expr in expressions {
                                match self
                                    .client()
                                    .evaluate_on_call_frame(&frame_id, expr)
                                    .await
                                {
                                    Ok(eval) => {
                                        if let Some(details) = eval.exception_details {
                                            failures.push((expr.clone(), details.message()));
                                        }
                                    }
                                    Err(e) => failures.push((expr.clone(), e.to_string())),
                                }
                            }
                        }
                        if let Err(e) = self.resume_quiet().await {
                            tracing::warn!(error = %e, "failed to resume after probing");
                        }
                    }
                    // A pause that is not ours belongs to the caller; leave it
                }
                Err(Error::Timeout(_)) => {
                    tracing::debug!(line, "candidate never hit within the probe window");
                }
                Err(e) => {
                    let _ = self.client().remove_breakpoint(&placed.breakpoint_id).await;
                    return Err(e);
                }
            }
            let _ = self.client().remove_breakpoint(&placed.breakpoint_id).await;

            if evaluated {
                let resolved = self.map_to_original(&origin.file, line - 1, None);
                let succeeded = expressions.len() - failures.len();
                candidates.push(LocationCandidate {
                    position: resolved,
                    score: succeeded as f64 / expressions.len() as f64,
                    failures,
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.position.line.cmp(&b.position.line))
        });
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(line: u32, score: f64, failures: Vec<(String, String)>) -> LocationCandidate {
        LocationCandidate {
            position: SourcePosition {
                file: "app.js".to_string(),
                line,
                column: None,
            },
            score,
            failures,
        }
    }

    #[test]
    fn full_score_describes_a_direct_recommendation() {
        let c = candidate(12, 1.0, Vec::new());
        assert_eq!(c.describe(), "app.js:12: all expressions resolve here");
    }

    #[test]
    fn partial_score_carries_failure_detail() {
        let c = candidate(
            13,
            0.5,
            vec![("cart".to_string(), "cart is not defined".to_string())],
        );
        let text = c.describe();
        assert!(text.contains("50%"));
        assert!(text.contains("cart is not defined"));
    }
}
