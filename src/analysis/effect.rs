/// Effect tracking after a perturbation.
///
/// Follows one parameter day by day from a storm onset until the signal is
/// back inside its tolerance band, and records how long the excursion lasted
/// and how it ended.
///
/// State machine:
///
/// ```text
/// AwaitingOnset ──(beyond bound within lag)──▶ Excursing
/// Excursing ──(returning_gap+ days heading back)──▶ Returning
/// Returning ──(turns away, forcing disabled)──▶ Excursing
/// Excursing/Returning ──(re-enters band)──▶ Completed(natural) or dropthrough
/// Returning ──(stalls, no closer value in look-out)──▶ Completed(forced)
/// any ──(max_effect / end of record / dropout)──▶ Completed(kind)
/// ```
///
/// Comparisons use the gap-filled series; the raw series decides dropout and
/// whether any real data backed the effect.

use crate::analysis::compression::fit_line;
use crate::analysis::gaps::fill_gaps;
use crate::config::EffectConfig;
use crate::logging::{self, Stage};
use crate::model::{
    AnalysisError, BandPosition, Direction, EffectProfile, Forcing, Observation, Peak, Series,
    TerminationKind, ToleranceBand,
};

// ---------------------------------------------------------------------------
// Tracker state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    AwaitingOnset,
    Excursing,
    Returning,
    Completed(TerminationKind),
}

/// Day counts by band position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DayTally {
    above: usize,
    below: usize,
    between: usize,
}

impl DayTally {
    fn count(&mut self, band: &ToleranceBand, value: f64) {
        match band.position(value) {
            BandPosition::Above => self.above += 1,
            BandPosition::Below => self.below += 1,
            BandPosition::Within => self.between += 1,
        }
    }

    fn absorb(&mut self, other: DayTally) {
        self.above += other.above;
        self.below += other.below;
        self.between += other.between;
    }
}

/// What one scanned day does to the effect.
enum Step {
    Continue,
    /// The signal dropped through the band; resume on the opposite side at this day.
    DropThrough(usize),
    Finish(usize, TerminationKind, Option<Forcing>),
}

pub struct EffectTracker<'a> {
    series: &'a Series,
    filled: Vec<f64>,
    band: ToleranceBand,
    config: &'a EffectConfig,
    direction: Direction,
    state: TrackerState,
    start: usize,
    tally: DayTally,
    /// Days of a missing-data run not yet closed by a present value.
    pending: DayTally,
    returning_run: usize,
    dropout_run: usize,
    dropthroughs_left: usize,
    /// Days up to here were cleared by a look-out and are not re-checked.
    absorb_until: usize,
    saw_present: bool,
}

impl<'a> EffectTracker<'a> {
    /// Returns `None` when the series has no data at all.
    pub fn new(
        series: &'a Series,
        band: ToleranceBand,
        direction: Direction,
        config: &'a EffectConfig,
    ) -> Option<Self> {
        let filled = fill_gaps(series.values())?;
        Some(Self {
            series,
            filled,
            band,
            config,
            direction,
            state: TrackerState::AwaitingOnset,
            start: 0,
            tally: DayTally::default(),
            pending: DayTally::default(),
            returning_run: 0,
            dropout_run: 0,
            dropthroughs_left: config.dropthrough.count,
            absorb_until: 0,
            saw_present: false,
        })
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Direction currently being tracked; flips on each dropthrough.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Runs the tracker from the perturbation at `start_index`.
    pub fn run(&mut self, start_index: usize) -> EffectProfile {
        let Some(onset) = self.find_onset(start_index) else {
            self.state = TrackerState::Completed(TerminationKind::NoEffect);
            return EffectProfile::no_effect();
        };

        self.start = onset;
        self.state = TrackerState::Excursing;
        self.count_day(onset);

        let last = self.filled.len() - 1;
        let mut i = onset;
        loop {
            i += 1;
            if i - onset >= self.config.max_effect {
                return self.finish(i, TerminationKind::MaxEffect, None);
            }
            if i > last {
                return self.finish(last, TerminationKind::EndOfRecord, None);
            }

            match self.step(i) {
                Step::Continue => {}
                Step::DropThrough(crossing) => {
                    for day in i..crossing {
                        self.count_day(day);
                    }
                    self.direction = self.direction.flipped();
                    self.dropthroughs_left -= 1;
                    self.returning_run = 0;
                    self.state = TrackerState::Excursing;
                    i = crossing;
                }
                Step::Finish(end, kind, forcing) => return self.finish(end, kind, forcing),
            }

            if i == last {
                return self.finish(i, TerminationKind::EndOfRecord, None);
            }
            self.count_day(i);
        }
    }

    // -----------------------------------------------------------------------
    // Scanning
    // -----------------------------------------------------------------------

    fn find_onset(&self, start_index: usize) -> Option<usize> {
        let last = (start_index + self.config.lag).min(self.filled.len() - 1);
        (start_index + 1..=last).find(|&i| self.direction.exceeds(self.filled[i], &self.band))
    }

    fn count_day(&mut self, day: usize) {
        let value = self.filled[day];
        if self.series.get(day).is_some() {
            self.saw_present = true;
            self.dropout_run = 0;
            let gap = std::mem::take(&mut self.pending);
            self.tally.absorb(gap);
            self.tally.count(&self.band, value);
        } else {
            self.dropout_run += 1;
            self.pending.count(&self.band, value);
        }
    }

    fn step(&mut self, i: usize) -> Step {
        if self.series.get(i).is_none() && self.dropout_run + 1 > self.config.max_dropout {
            return Step::Finish(i - self.dropout_run, TerminationKind::Dropout, None);
        }

        let previous = self.filled[i - 1];
        let value = self.filled[i];

        if !self.direction.exceeds(value, &self.band) {
            self.state = TrackerState::Returning;
            if self.dropthroughs_left == 0 {
                return Step::Finish(i, TerminationKind::Natural, None);
            }
            return match self.drops_through(i) {
                Some(crossing) => Step::DropThrough(crossing),
                None => Step::Finish(i, TerminationKind::Natural, None),
            };
        }

        if self.direction.toward(previous, value) {
            self.returning_run += 1;
            if self.returning_run > self.config.returning_gap {
                self.state = TrackerState::Returning;
            }
            return Step::Continue;
        }

        match self.state {
            TrackerState::Returning => self.on_stall(i),
            _ => {
                self.returning_run = 0;
                Step::Continue
            }
        }
    }

    /// Looks for a crossing of the opposite bound shortly after re-entry.
    ///
    /// Scans forward from the last day beyond the bound, for at most
    /// `dropthrough.days` days. A day back out on the original side first
    /// cancels the dropthrough.
    fn drops_through(&self, i: usize) -> Option<usize> {
        let mut j = i - 1;
        while j > self.start && !self.direction.exceeds(self.filled[j], &self.band) {
            j -= 1;
        }

        let opposite = self.direction.flipped();
        let limit = (j + self.config.dropthrough.days)
            .min(self.filled.len() - 1)
            .min(self.start + self.config.max_effect - 1);

        for t in (j + 1)..=limit {
            let value = self.filled[t];
            if opposite.exceeds(value, &self.band) {
                return Some(t);
            }
            if t > i && self.direction.exceeds(value, &self.band) {
                return None;
            }
        }
        None
    }

    /// Handles a day that turns away from the band while returning.
    fn on_stall(&mut self, i: usize) -> Step {
        let forcing = self.config.forcing;
        if !forcing.enabled {
            self.state = TrackerState::Excursing;
            self.returning_run = 0;
            return Step::Continue;
        }
        if i <= self.absorb_until {
            return Step::Continue;
        }

        let anchor = i - 1;
        match self.look_out(anchor, forcing.days_before_force) {
            Some(day) => {
                self.absorb_until = day;
                Step::Continue
            }
            None => self.force_return(anchor, forcing.history_points),
        }
    }

    /// First day within `days` after `anchor` whose value is strictly closer
    /// to the band than the anchor's.
    fn look_out(&self, anchor: usize, days: usize) -> Option<usize> {
        let level = self.filled[anchor];
        let last = (anchor + days).min(self.filled.len() - 1);
        (anchor + 1..=last).find(|&t| self.direction.toward(level, self.filled[t]))
    }

    // -----------------------------------------------------------------------
    // Forced completion
    // -----------------------------------------------------------------------

    fn force_return(&self, anchor: usize, history_points: usize) -> Step {
        match self.return_line(anchor, history_points) {
            Ok(forcing) => {
                let bound = self.direction.bound(&self.band);
                let days = ((bound - forcing.anchor_value) / forcing.slope).ceil().max(1.0);
                let end = anchor.saturating_add(days as usize);
                if end - self.start > self.config.max_effect {
                    return Step::Finish(self.start + self.config.max_effect, TerminationKind::MaxEffect, Some(forcing));
                }
                Step::Finish(end, TerminationKind::Forced, Some(forcing))
            }
            Err(err) => {
                logging::debug(Stage::Effect, None, &err.to_string());
                Step::Finish(anchor + 1, TerminationKind::ForcingError, None)
            }
        }
    }

    /// Fits the return line over the trailing history ending at `anchor`.
    fn return_line(&self, anchor: usize, history_points: usize) -> Result<Forcing, AnalysisError> {
        let impossible = AnalysisError::ForcedReturnImpossible { anchor };

        let mut from = (anchor + 1).saturating_sub(history_points).max(self.start);
        while from < anchor && !self.direction.toward(self.filled[from], self.filled[from + 1]) {
            from += 1;
        }
        // a line needs the anchor and at least one earlier day
        if from >= anchor {
            return Err(impossible);
        }

        let points: Vec<Observation> = (from..=anchor)
            .map(|day| Observation::new(day, self.filled[day]))
            .collect();
        let fit = fit_line(&points, 0, points.len()).map_err(|_| impossible.clone())?;
        if !self.direction.slope_toward(fit.slope) {
            return Err(impossible);
        }

        Ok(Forcing {
            start: anchor,
            anchor_value: self.filled[anchor],
            slope: fit.slope,
        })
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    fn finish(&mut self, end: usize, kind: TerminationKind, forcing: Option<Forcing>) -> EffectProfile {
        // an open missing run is part of the effect unless it caused the dropout
        if kind != TerminationKind::Dropout {
            let gap = std::mem::take(&mut self.pending);
            self.tally.absorb(gap);
        }

        let extrapolated_from = match (kind, forcing) {
            (TerminationKind::Forced | TerminationKind::MaxEffect, Some(f)) => Some(f),
            _ => None,
        };
        if let Some(line) = extrapolated_from {
            for day in line.start + 1..end {
                self.tally.count(&self.band, line.value_at(day));
            }
        }

        if !self.saw_present || end <= self.start {
            self.state = TrackerState::Completed(TerminationKind::NoEffect);
            return EffectProfile::no_effect();
        }

        self.state = TrackerState::Completed(kind);
        EffectProfile {
            start: Some(self.start),
            end: Some(end),
            days_above: self.tally.above,
            days_below: self.tally.below,
            days_between: self.tally.between,
            termination: kind,
            forcing: if kind == TerminationKind::Forced { forcing } else { None },
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Tracks the effect of a perturbation at `start_index`.
///
/// Fails only on unusable arguments; every data-driven outcome, including
/// "no effect", is a termination kind in the returned profile.
pub fn track_effect(
    series: &Series,
    band: &ToleranceBand,
    start_index: usize,
    direction: Direction,
    config: &EffectConfig,
) -> Result<EffectProfile, AnalysisError> {
    if start_index >= series.len() {
        return Err(AnalysisError::IndexOutOfRange {
            index: start_index,
            len: series.len(),
        });
    }
    if config.lag == 0 || config.max_effect == 0 {
        return Err(AnalysisError::InvalidInput(
            "effect lag and max_effect must both be at least 1".to_string(),
        ));
    }
    if config.forcing.enabled && config.forcing.history_points < 2 {
        return Err(AnalysisError::InvalidInput(format!(
            "forcing needs at least 2 history points, got {}",
            config.forcing.history_points
        )));
    }

    match EffectTracker::new(series, *band, direction, config) {
        Some(mut tracker) => Ok(tracker.run(start_index)),
        None => Ok(EffectProfile::no_effect()),
    }
}

/// Most extreme present value in `[start, end]` (clipped), first occurrence
/// winning ties. `None` for a profile without an effect.
pub fn find_peak(series: &Series, profile: &EffectProfile, direction: Direction, baseline_mean: f64) -> Option<Peak> {
    let (start, end) = (profile.start?, profile.end?);
    let best = series
        .observations(start..end.saturating_add(1))
        .into_iter()
        .fold(None, |best: Option<Observation>, obs| match best {
            Some(b) if !direction.more_extreme(obs.value, b.value) => best,
            _ => Some(obs),
        })?;

    Some(Peak {
        index: best.index,
        value: best.value,
        magnitude: best.value - baseline_mean,
    })
}
