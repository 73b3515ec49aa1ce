use crate::foundation::error::{BeatshadeError, BeatshadeResult};

/// One beat paired with the palette entry it switches to.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimelineEntry {
    pub time: f64,
    pub shade: usize,
}

/// Ordered `(time, shade)` entries, one per beat.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

/// Walk `beats` in order, giving beat `i` shade `i % palette_size`.
pub fn assign(beats: &[f64], palette_size: usize) -> BeatshadeResult<Timeline> {
    if palette_size == 0 {
        return Err(BeatshadeError::validation("palette size must be > 0"));
    }

    let entries = beats
        .iter()
        .enumerate()
        .map(|(i, &time)| TimelineEntry {
            time,
            shade: i % palette_size,
        })
        .collect();
    Ok(Timeline { entries })
}

impl Timeline {
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shade active at `t`: the last entry with `time <= t`, `None` before the first beat.
    pub fn shade_at(&self, t: f64) -> Option<usize> {
        let idx = self.entries.partition_point(|e| e.time <= t);
        idx.checked_sub(1).map(|i| self.entries[i].shade)
    }

    /// Number of shade changes (entries whose shade differs from the previous one).
    pub fn shade_changes(&self) -> usize {
        self.entries
            .windows(2)
            .filter(|w| w[0].shade != w[1].shade)
            .count()
    }
}
