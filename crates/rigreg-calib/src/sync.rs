use crate::{device::Device, error::CalibrationError};

/// The timestamps recorded by one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampStream {
    /// The device name.
    pub device: String,
    /// Frame timestamps in microseconds.
    pub timestamps: Vec<u64>,
}

impl TimestampStream {
    /// Create a stream.
    pub fn new(device: impl Into<String>, timestamps: Vec<u64>) -> Self {
        Self {
            device: device.into(),
            timestamps,
        }
    }
}

/// A reference frame that was dropped because some devices had no match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchronizationGap {
    /// The timestamp on the reference (master) timeline.
    pub reference_timestamp: u64,
    /// The devices without a frame within tolerance.
    pub missing_devices: Vec<String>,
}

/// Frames matched across devices.
///
/// Each row holds one timestamp per device, in device order, and the row
/// position is the synthetic frame index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTable {
    devices: Vec<String>,
    rows: Vec<Vec<u64>>,
    gaps: Vec<SynchronizationGap>,
}

impl SyncTable {
    /// The device names, master first.
    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    /// All synchronized rows.
    pub fn rows(&self) -> &[Vec<u64>] {
        &self.rows
    }

    /// The reference frames that were dropped.
    pub fn gaps(&self) -> &[SynchronizationGap] {
        &self.gaps
    }

    /// Number of synchronized rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no frame could be matched.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row at a frame index.
    pub fn row(&self, index: usize) -> Result<&[u64], CalibrationError> {
        self.rows
            .get(index)
            .map(Vec::as_slice)
            .ok_or(CalibrationError::FrameOutOfRange {
                index,
                len: self.rows.len(),
            })
    }

}

// index of the closest unused timestamp within tolerance, scanning past used ones
fn nearest_unused(timestamps: &[u64], used: &[bool], target: u64, tolerance: u64) -> Option<usize> {
    let idx = timestamps.partition_point(|&t| t < target);
    let within = |i: &usize| timestamps[*i].abs_diff(target) <= tolerance;
    let below = (0..idx).rev().take_while(within).find(|&i| !used[i]);
    let above = (idx..timestamps.len()).take_while(within).find(|&i| !used[i]);
    [below, above]
        .into_iter()
        .flatten()
        .min_by_key(|&i| timestamps[i].abs_diff(target))
}

/// Align the frames of several devices on the timeline of the first one.
///
/// For every reference timestamp each other device contributes its nearest
/// timestamp when the difference is at most `tolerance_us`. A device
/// timestamp joins at most one row. Reference frames where any device has no
/// match are dropped, recorded as [`SynchronizationGap`] and logged.
///
/// # Arguments
///
/// * `streams` - One timestamp stream per device, master first.
/// * `tolerance_us` - Accepted difference in microseconds, `0` for exact matches.
pub fn synchronize(
    streams: &[TimestampStream],
    tolerance_us: u64,
) -> Result<SyncTable, CalibrationError> {
    let Some((reference, others)) = streams.split_first() else {
        return Err(CalibrationError::InvalidInput(
            "at least one device is required to synchronize".to_string(),
        ));
    };

    let sorted = |timestamps: &[u64]| {
        let mut timestamps = timestamps.to_vec();
        timestamps.sort_unstable();
        timestamps.dedup();
        timestamps
    };
    let reference_timestamps = sorted(&reference.timestamps);
    let other_timestamps = others
        .iter()
        .map(|s| sorted(&s.timestamps))
        .collect::<Vec<_>>();
    let mut used = other_timestamps
        .iter()
        .map(|t| vec![false; t.len()])
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    let mut gaps = Vec::new();

    for &reference_timestamp in &reference_timestamps {
        let matches = other_timestamps
            .iter()
            .zip(used.iter())
            .map(|(timestamps, used)| nearest_unused(timestamps, used, reference_timestamp, tolerance_us))
            .collect::<Vec<_>>();

        let missing_devices = others
            .iter()
            .zip(matches.iter())
            .filter(|(_, m)| m.is_none())
            .map(|(s, _)| s.device.clone())
            .collect::<Vec<_>>();

        if !missing_devices.is_empty() {
            log::warn!(
                "dropping frame {}: no match within {} us on {:?}",
                reference_timestamp,
                tolerance_us,
                missing_devices
            );
            gaps.push(SynchronizationGap {
                reference_timestamp,
                missing_devices,
            });
            continue;
        }

        let mut row = Vec::with_capacity(streams.len());
        row.push(reference_timestamp);
        for (k, m) in matches.into_iter().flatten().enumerate() {
            used[k][m] = true;
            row.push(other_timestamps[k][m]);
        }
        rows.push(row);
    }

    log::info!(
        "synchronized {} of {} reference frames across {} devices",
        rows.len(),
        reference_timestamps.len(),
        streams.len()
    );

    Ok(SyncTable {
        devices: streams.iter().map(|s| s.device.clone()).collect(),
        rows,
        gaps,
    })
}

/// Scan the recordings of `devices` and synchronize them.
///
/// Fails with [`CalibrationError::EmptySyncTable`] when no frame matches
/// across all devices.
pub fn synchronize_devices(
    devices: &[Device],
    tolerance_us: u64,
) -> Result<SyncTable, CalibrationError> {
    let streams = devices
        .iter()
        .map(|d| Ok(TimestampStream::new(d.name(), d.timestamps()?)))
        .collect::<Result<Vec<_>, CalibrationError>>()?;

    let table = synchronize(&streams, tolerance_us)?;
    if table.is_empty() {
        return Err(CalibrationError::EmptySyncTable);
    }
    Ok(table)
}
