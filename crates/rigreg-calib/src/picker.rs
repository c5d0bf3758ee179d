use std::collections::VecDeque;
use std::io::{BufRead, Write};

use rigreg_3d::pointcloud::PointCloud;
use rigreg_icp::CorrespondenceSet;

use crate::error::CalibrationError;

/// Something that lets an operator select points on a cloud.
pub trait PointPicker {
    /// Run one picking session on `cloud` and return the picked indices in order.
    ///
    /// `label` names the cloud to the operator, e.g. `"sub_1"`.
    fn pick_points(&mut self, cloud: &PointCloud, label: &str) -> Result<Vec<usize>, CalibrationError>;
}

/// A picker replaying pre-recorded sessions, one per call.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPicker {
    sessions: VecDeque<Vec<usize>>,
}

impl ScriptedPicker {
    /// Create a picker from the sessions to replay, in call order.
    pub fn new(sessions: impl IntoIterator<Item = Vec<usize>>) -> Self {
        Self {
            sessions: sessions.into_iter().collect(),
        }
    }

    /// Number of sessions not yet replayed.
    pub fn remaining(&self) -> usize {
        self.sessions.len()
    }
}

impl PointPicker for ScriptedPicker {
    fn pick_points(&mut self, _cloud: &PointCloud, label: &str) -> Result<Vec<usize>, CalibrationError> {
        let picks = self.sessions.pop_front().unwrap_or_else(|| {
            log::warn!("no scripted picks left for {label}");
            Vec::new()
        });
        Ok(picks)
    }
}

/// A line-oriented picker for terminal sessions.
///
/// The operator types point indices, several per line. `u` or `undo` removes
/// the last pick; `q`, `done` or end of input closes the session.
pub struct PromptPicker<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptPicker<R, W> {
    /// Create a picker reading commands from `input` and writing prompts to `output`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> PointPicker for PromptPicker<R, W> {
    fn pick_points(&mut self, cloud: &PointCloud, label: &str) -> Result<Vec<usize>, CalibrationError> {
        writeln!(
            self.output,
            "Pick at least three points on {label} ({} points).\n\
             Enter indices separated by spaces, `u` to undo the last pick, `q` when done.",
            cloud.len()
        )?;

        let mut picks: Vec<usize> = Vec::new();
        let mut line = String::new();

        'session: loop {
            write!(self.output, "{label}> ")?;
            self.output.flush()?;

            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                break;
            }

            for token in line.split_whitespace() {
                match token {
                    "q" | "done" => break 'session,
                    "u" | "undo" => match picks.pop() {
                        Some(index) => writeln!(self.output, "removed point {index}")?,
                        None => writeln!(self.output, "nothing to undo")?,
                    },
                    _ => match token.parse::<usize>() {
                        Ok(index) => match cloud.point(index) {
                            Some(p) => {
                                picks.push(index);
                                writeln!(
                                    self.output,
                                    "#{} point {index} at ({:.3}, {:.3}, {:.3})",
                                    picks.len(),
                                    p[0],
                                    p[1],
                                    p[2]
                                )?;
                            }
                            None => writeln!(
                                self.output,
                                "index {index} is out of range, {label} has {} points",
                                cloud.len()
                            )?,
                        },
                        Err(_) => writeln!(self.output, "ignoring `{token}`")?,
                    },
                }
            }
        }

        log::info!("picked {} points on {label}: {:?}", picks.len(), picks);

        Ok(picks)
    }
}

/// Pick matching points on the source cloud, then on the target cloud.
///
/// # Returns
///
/// The pairs, or [`CalibrationError::InsufficientCorrespondences`] when either
/// session has fewer than three picks or the counts differ.
pub fn pick_correspondences<P: PointPicker + ?Sized>(
    picker: &mut P,
    source: &PointCloud,
    source_label: &str,
    target: &PointCloud,
    target_label: &str,
) -> Result<CorrespondenceSet, CalibrationError> {
    let source_picks = picker.pick_points(source, source_label)?;
    let target_picks = picker.pick_points(target, target_label)?;

    let set = CorrespondenceSet::from_picks(&source_picks, &target_picks)?;
    set.validate(source, target)?;

    Ok(set)
}
