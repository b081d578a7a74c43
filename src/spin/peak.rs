//! First-order (weak coupling) peak list generation.
//!
//! Each nucleus starts as a singlet at its Hz frequency. Every nonzero
//! coupling in its row of the coupling matrix splits all current peaks into
//! doublets of half intensity, so `k` couplings give up to `2^k` lines.
//! Coincident lines are then merged.

use serde::{Deserialize, Serialize};

/// Nucleus index used for peaks that do not belong to a nucleus (solvent).
pub const NO_NUCLEUS: i32 = -1;

/// A single spectral line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Center frequency in Hz.
    pub frequency: f64,
    /// Relative amplitude.
    pub intensity: f64,
    /// Originating nucleus, or [`NO_NUCLEUS`].
    pub nucleus: i32,
}

impl Peak {
    pub fn new(frequency: f64, intensity: f64, nucleus: i32) -> Self {
        Self {
            frequency,
            intensity,
            nucleus,
        }
    }
}

pub type PeakList = Vec<Peak>;

/// Sort a peak list ascending by frequency.
pub fn sort_peaks(peaks: &mut [Peak]) {
    peaks.sort_by(|a, b| {
        a.frequency
            .total_cmp(&b.frequency)
            .then(a.intensity.total_cmp(&b.intensity))
            .then(a.nucleus.cmp(&b.nucleus))
    });
}

/// Split every peak into a doublet separated by `coupling` Hz.
pub fn doublet(peaks: &[Peak], coupling: f64) -> PeakList {
    let mut out = Vec::with_capacity(peaks.len() * 2);
    for p in peaks {
        let half = p.intensity / 2.0;
        out.push(Peak::new(p.frequency - coupling / 2.0, half, p.nucleus));
        out.push(Peak::new(p.frequency + coupling / 2.0, half, p.nucleus));
    }
    out
}

/// Apply a cascade of couplings to a single starting peak.
pub fn multiplet(signal: Peak, couplings: &[f64]) -> PeakList {
    let mut peaks = vec![signal];
    for &j in couplings {
        peaks = doublet(&peaks, j);
    }
    reduce_peaks(peaks, 0.0)
}

/// Merge a group of lines into one: mean frequency, summed intensity.
///
/// The nucleus tag is kept when the whole group shares it, otherwise the
/// merged line is tagged [`NO_NUCLEUS`].
pub fn peak_sum(group: &[Peak]) -> Peak {
    let n = group.len() as f64;
    let frequency = group.iter().map(|p| p.frequency).sum::<f64>() / n;
    let intensity = group.iter().map(|p| p.intensity).sum::<f64>();
    let nucleus = match group.first() {
        Some(first) if group.iter().all(|p| p.nucleus == first.nucleus) => first.nucleus,
        _ => NO_NUCLEUS,
    };
    Peak::new(frequency, intensity, nucleus)
}

/// Sort, then merge runs of consecutive lines whose spacing is within
/// `tolerance` Hz.
pub fn reduce_peaks(mut peaks: PeakList, tolerance: f64) -> PeakList {
    sort_peaks(&mut peaks);

    let mut reduced = Vec::with_capacity(peaks.len());
    let mut work: Vec<Peak> = Vec::new();

    for peak in peaks {
        match work.last() {
            Some(last) if peak.frequency - last.frequency <= tolerance => work.push(peak),
            Some(_) => {
                reduced.push(peak_sum(&work));
                work.clear();
                work.push(peak);
            }
            None => work.push(peak),
        }
    }
    if !work.is_empty() {
        reduced.push(peak_sum(&work));
    }

    reduced
}

/// Generate the weak-coupling peak list of a whole spin system.
///
/// `frequencies` are in Hz, `couplings` is the row-major `n x n` matrix and
/// `intensities` gives each nucleus' total signal.
pub fn generate_weak(frequencies: &[f64], couplings: &[Vec<f64>], intensities: &[f64]) -> PeakList {
    let mut peaks = Vec::new();

    for (i, &freq) in frequencies.iter().enumerate() {
        let js: Vec<f64> = couplings[i]
            .iter()
            .enumerate()
            .filter(|&(j, &c)| j != i && c != 0.0)
            .map(|(_, &c)| c)
            .collect();

        let start = Peak::new(freq, intensities[i], i as i32);
        peaks.extend(multiplet(start, &js));
    }

    // Lines from different nuclei only merge on exact coincidence, which
    // keeps per-nucleus ownership intact.
    reduce_by_nucleus(peaks)
}

/// Global reduction pass that never merges lines of different nuclei.
fn reduce_by_nucleus(mut peaks: PeakList) -> PeakList {
    sort_peaks(&mut peaks);

    let mut reduced: PeakList = Vec::with_capacity(peaks.len());
    let mut i = 0;
    while i < peaks.len() {
        let mut j = i + 1;
        while j < peaks.len() && peaks[j].frequency - peaks[j - 1].frequency <= 0.0 {
            j += 1;
        }
        // peaks[i..j] share one frequency; merge per nucleus.
        let mut group = peaks[i..j].to_vec();
        group.sort_by_key(|p| p.nucleus);
        for chunk in group.chunk_by(|a, b| a.nucleus == b.nucleus) {
            reduced.push(peak_sum(chunk));
        }
        i = j;
    }

    reduced
}

/// Sum of intensities of all lines tagged with `nucleus`.
pub fn nucleus_intensity(peaks: &[Peak], nucleus: i32) -> f64 {
    peaks
        .iter()
        .filter(|p| p.nucleus == nucleus)
        .map(|p| p.intensity)
        .sum()
}
