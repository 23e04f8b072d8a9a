//! Counting-schedule optimisation.
//!
//! Samples (foil groups) are counted one after another on a single detector.
//! While one group is counted the others keep decaying, so the order matters.
//! [`ScheduleOptimizer`] evaluates every order of the foil groups and keeps the
//! one with the smallest total counting time. Each group is counted for as
//! long as its slowest channel needs to reach its precision target.
//!
//! The search is `O(|G|!)` in the number of groups and is only tractable for
//! a handful of groups; the configured `max_groups` caps it.
#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

use gammacount_core::{
    activity, decay, solid_angle_correction, ActivityUnit, Diagnostic, DiagnosticKind,
    Diagnostics, EfficiencyTable, Error, ReactionChannel, Result, INFEASIBLE_TIME,
};
use rayon::prelude::*;

use crate::count_time::{CountTimeConfig, CountTimeRequest, CountTimeSolver};
use crate::permutations::{factorial, nth_permutation, LexicographicPermutations};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Schedule optimiser settings.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScheduleConfig {
    /// Time to swap samples between counts (s).
    pub handle_time: f64,
    /// Detector crystal radius (cm).
    pub detector_radius: f64,
    /// Background rate under each peak (cps).
    pub background: f64,
    /// Unit of the channels' `init_activity` and `activity_uncertainty`.
    pub units: ActivityUnit,
    /// Round each channel's count time up to a whole minute.
    pub round_to_minute: bool,
    /// Evaluate permutations on the rayon pool.
    pub parallel: bool,
    /// Largest number of foil groups accepted.
    pub max_groups: usize,
    /// Count-time solver settings.
    pub count_time: CountTimeConfig,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            handle_time: 60.0,
            detector_radius: 5.0,
            background: CountTimeRequest::DEFAULT_BACKGROUND,
            units: ActivityUnit::Becquerel,
            round_to_minute: false,
            parallel: true,
            max_groups: 10,
            count_time: CountTimeConfig::default(),
        }
    }
}

impl ScheduleConfig {
    #[must_use]
    pub fn with_handle_time(mut self, seconds: f64) -> Self {
        self.handle_time = seconds;
        self
    }

    #[must_use]
    pub fn with_detector_radius(mut self, radius: f64) -> Self {
        self.detector_radius = radius;
        self
    }

    #[must_use]
    pub fn with_background(mut self, background: f64) -> Self {
        self.background = background;
        self
    }

    #[must_use]
    pub fn with_units(mut self, units: ActivityUnit) -> Self {
        self.units = units;
        self
    }

    #[must_use]
    pub fn with_round_to_minute(mut self, round: bool) -> Self {
        self.round_to_minute = round;
        self
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub fn with_max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = max_groups;
        self
    }

    #[must_use]
    pub fn with_count_time(mut self, count_time: CountTimeConfig) -> Self {
        self.count_time = count_time;
        self
    }

    fn validate(&self) -> Result<()> {
        Error::ensure(
            self.handle_time.is_finite() && self.handle_time >= 0.0,
            "handle_time",
            "must be non-negative",
        )?;
        Error::ensure(
            self.detector_radius.is_finite() && self.detector_radius > 0.0,
            "detector_radius",
            "must be greater than zero",
        )?;
        Error::ensure(
            self.background.is_finite() && self.background >= 0.0,
            "background",
            "must be non-negative",
        )?;
        Error::ensure(self.max_groups > 0, "max_groups", "must be at least 1")
    }
}

/// Count plan for one reaction channel.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelAssignment {
    /// Index of the channel in the optimiser input.
    pub channel_index: usize,
    pub name: String,
    pub foil_group: String,
    pub gamma_energy: f64,
    /// Point-source efficiency corrected for the foil size.
    pub absolute_efficiency: f64,
    /// Activity when the group's count starts (Bq).
    pub count_activity: f64,
    pub count_activity_uncertainty: f64,
    /// Time this channel alone needs (s).
    pub channel_time: f64,
    /// Time its group is counted for (s).
    pub count_time: f64,
}

impl ChannelAssignment {
    /// False if the channel could not reach its target.
    pub fn is_feasible(&self) -> bool {
        self.channel_time < INFEASIBLE_TIME
    }
}

/// One group's slot in the counting sequence.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupSlot {
    pub foil_group: String,
    /// Seconds since the start of the first count, including handling.
    pub start_time: f64,
    pub count_time: f64,
}

/// The best counting order found.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Schedule {
    /// Foil groups in counting order.
    pub order: Vec<String>,
    pub slots: Vec<GroupSlot>,
    /// Channels in counting order.
    pub assignments: Vec<ChannelAssignment>,
    /// Sum of the group count times, excluding handling (s).
    pub total_time: f64,
    pub permutations_evaluated: usize,
    pub diagnostics: Diagnostics,
}

impl Schedule {
    /// True when every channel reaches its target.
    pub fn is_feasible(&self) -> bool {
        self.assignments.iter().all(ChannelAssignment::is_feasible)
    }

    /// Time from the start of the first count to the end of the last one.
    pub fn elapsed_time(&self) -> f64 {
        self.slots
            .last()
            .map_or(0.0, |slot| slot.start_time + slot.count_time)
    }
}

/// A validated channel with its activity in Bq and absolute efficiency.
struct PreparedChannel<'a> {
    channel: &'a ReactionChannel,
    efficiency: f64,
    activity: f64,
    uncertainty: f64,
}

struct FoilGroup {
    name: String,
    members: Vec<usize>,
}

/// Per-candidate working copy of the decaying activities.
#[derive(Clone, Debug)]
struct WorkingState {
    count_activity: Vec<f64>,
    count_activity_uncertainty: Vec<f64>,
    channel_time: Vec<f64>,
    counted: Vec<bool>,
}

impl WorkingState {
    fn new(channels: &[PreparedChannel<'_>]) -> Self {
        Self {
            count_activity: channels.iter().map(|c| c.activity).collect(),
            count_activity_uncertainty: channels.iter().map(|c| c.uncertainty).collect(),
            channel_time: vec![0.0; channels.len()],
            counted: vec![false; channels.len()],
        }
    }
}

struct Evaluation {
    total: f64,
    group_times: Vec<f64>,
    state: WorkingState,
}

/// Exhaustive counting-order search.
pub struct ScheduleOptimizer {
    config: ScheduleConfig,
    solver: CountTimeSolver,
}

impl Default for ScheduleOptimizer {
    fn default() -> Self {
        Self::new(ScheduleConfig::default())
    }
}

impl ScheduleOptimizer {
    pub fn new(config: ScheduleConfig) -> Self {
        let solver = CountTimeSolver::new(config.count_time.clone());
        Self { config, solver }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Finds the counting order with the smallest total count time.
    ///
    /// Ties keep the earliest order in lexicographic order over the groups'
    /// first appearance in `channels`. Channels that cannot reach their
    /// target are charged [`INFEASIBLE_TIME`] and reported in the schedule's
    /// diagnostics.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for invalid settings or channels, too many
    /// foil groups, or an impossible geometry, and `MissingEfficiency` when a
    /// channel's counting position has no efficiency curve.
    pub fn optimize(
        &self,
        channels: &[ReactionChannel],
        efficiency: &EfficiencyTable,
    ) -> Result<Schedule> {
        self.config.validate()?;

        let mut diagnostics = Diagnostics::new();
        let prepared = self.prepare(channels, efficiency, &mut diagnostics)?;
        let groups = group_channels(channels);
        Error::ensure(
            groups.len() <= self.config.max_groups,
            "channels",
            format!(
                "{} foil groups exceed the limit of {}",
                groups.len(),
                self.config.max_groups
            ),
        )?;
        let n = groups.len();
        let overflow = || Error::invalid("channels", format!("{n}! orders overflow"));
        let count = factorial(n).ok_or_else(overflow)?;

        log::info!(
            "optimising count order of {} channels in {n} groups ({count} orders)",
            prepared.len()
        );

        let (best_total, best_rank) = if self.config.parallel {
            (0..count)
                .into_par_iter()
                .map(|rank| {
                    let order = nth_permutation(n, rank);
                    self.evaluate(&prepared, &groups, &order, None)
                        .map(|evaluation| (evaluation.total, rank))
                })
                .try_reduce(|| (f64::INFINITY, usize::MAX), |a, b| Ok(better(a, b)))?
        } else {
            let mut best = (f64::INFINITY, usize::MAX);
            for (rank, order) in LexicographicPermutations::new(n).enumerate() {
                let evaluation = self.evaluate(&prepared, &groups, &order, None)?;
                best = better(best, (evaluation.total, rank));
            }
            best
        };
        log::debug!("best order rank {best_rank} with total {best_total:.1} s");

        let order = nth_permutation(n, best_rank);
        let mut run = Diagnostics::new();
        let evaluation = self.evaluate(&prepared, &groups, &order, Some(&mut run))?;
        run.emit();
        diagnostics.extend(run);

        let schedule =
            self.build_schedule(&prepared, &groups, &order, evaluation, count, diagnostics);
        Ok(schedule)
    }

    fn prepare<'a>(
        &self,
        channels: &'a [ReactionChannel],
        efficiency: &EfficiencyTable,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<PreparedChannel<'a>>> {
        Error::ensure(
            !channels.is_empty(),
            "channels",
            "at least one reaction channel is required",
        )?;
        let units = &self.config.units;
        if !units.is_recognized() {
            diagnostics.push(Diagnostic::warning(DiagnosticKind::UnrecognizedUnits {
                units: units.to_string(),
            }));
        }

        channels
            .iter()
            .map(|channel| {
                channel.validate()?;
                let model = efficiency.lookup(channel.detector_distance)?;
                let correction = solid_angle_correction(
                    channel.foil_radius,
                    self.config.detector_radius,
                    channel.detector_distance,
                )?;
                let (activity, uncertainty) = if units.is_atoms() {
                    (
                        activity(channel.half_life, channel.init_activity, 0.0)?,
                        activity(channel.half_life, channel.activity_uncertainty, 0.0)?,
                    )
                } else {
                    let factor = units.to_base_factor();
                    (
                        channel.init_activity * factor,
                        channel.activity_uncertainty * factor,
                    )
                };
                Ok(PreparedChannel {
                    channel,
                    efficiency: model.eval(channel.gamma_energy) * correction,
                    activity,
                    uncertainty,
                })
            })
            .collect()
    }

    /// Plays one counting order through and returns its total count time.
    fn evaluate(
        &self,
        channels: &[PreparedChannel<'_>],
        groups: &[FoilGroup],
        order: &[usize],
        mut sink: Option<&mut Diagnostics>,
    ) -> Result<Evaluation> {
        let mut state = WorkingState::new(channels);
        let mut group_times = Vec::with_capacity(order.len());
        let mut total = 0.0;

        for &g in order {
            let members = &groups[g].members;
            let mut group_time = 0.0_f64;
            for &idx in members {
                let time = self.channel_time(
                    &channels[idx],
                    state.count_activity[idx],
                    state.count_activity_uncertainty[idx],
                    sink.as_deref_mut(),
                );
                state.channel_time[idx] = time;
                group_time = group_time.max(time);
            }
            for &idx in members {
                state.counted[idx] = true;
            }
            total += group_time;
            group_times.push(group_time);

            let elapsed = group_time + self.config.handle_time;
            for (idx, prepared) in channels.iter().enumerate() {
                if state.counted[idx] {
                    continue;
                }
                let half_life = prepared.channel.half_life;
                state.count_activity[idx] = decay(
                    half_life,
                    state.count_activity[idx],
                    elapsed,
                    &ActivityUnit::Becquerel,
                )?;
                state.count_activity_uncertainty[idx] = decay(
                    half_life,
                    state.count_activity_uncertainty[idx],
                    elapsed,
                    &ActivityUnit::Becquerel,
                )?;
            }
        }

        Ok(Evaluation {
            total,
            group_times,
            state,
        })
    }

    /// Count time for one channel, counting only activity three sigma below
    /// the estimate.
    fn channel_time(
        &self,
        prepared: &PreparedChannel<'_>,
        count_activity: f64,
        uncertainty: f64,
        sink: Option<&mut Diagnostics>,
    ) -> f64 {
        let channel = prepared.channel;
        let request = CountTimeRequest {
            sigma: channel.rel_stat_target,
            half_life: channel.half_life,
            initial: count_activity - 3.0 * uncertainty,
            efficiency: prepared.efficiency,
            background: self.config.background,
            units: ActivityUnit::Becquerel,
            label: sink.is_some().then(|| channel.name.clone()),
        };

        let time = match self.solver.solve_quiet(&request) {
            Ok(solution) => {
                if let Some(sink) = sink {
                    sink.extend(solution.diagnostics);
                }
                solution.live_time
            }
            Err(err) => {
                if let Some(sink) = sink {
                    let reason = err.to_string();
                    let rejected = Diagnostic::warning(DiagnosticKind::RejectedChannel { reason });
                    sink.record(rejected.with_subject(channel.name.clone()));
                }
                INFEASIBLE_TIME
            }
        };

        if self.config.round_to_minute && time < INFEASIBLE_TIME {
            (time / 60.0).ceil() * 60.0
        } else {
            time
        }
    }

    fn build_schedule(
        &self,
        channels: &[PreparedChannel<'_>],
        groups: &[FoilGroup],
        order: &[usize],
        evaluation: Evaluation,
        permutations_evaluated: usize,
        diagnostics: Diagnostics,
    ) -> Schedule {
        let Evaluation {
            total,
            group_times,
            state,
        } = evaluation;

        let mut slots = Vec::with_capacity(order.len());
        let mut assignments = Vec::with_capacity(channels.len());
        let mut clock = 0.0;
        for (&g, &count_time) in order.iter().zip(&group_times) {
            let group = &groups[g];
            slots.push(GroupSlot {
                foil_group: group.name.clone(),
                start_time: clock,
                count_time,
            });
            clock += count_time + self.config.handle_time;

            for &idx in &group.members {
                let prepared = &channels[idx];
                assignments.push(ChannelAssignment {
                    channel_index: idx,
                    name: prepared.channel.name.clone(),
                    foil_group: group.name.clone(),
                    gamma_energy: prepared.channel.gamma_energy,
                    absolute_efficiency: prepared.efficiency,
                    count_activity: state.count_activity[idx],
                    count_activity_uncertainty: state.count_activity_uncertainty[idx],
                    channel_time: state.channel_time[idx],
                    count_time,
                });
            }
        }

        Schedule {
            order: order.iter().map(|&g| groups[g].name.clone()).collect(),
            slots,
            assignments,
            total_time: total,
            permutations_evaluated,
            diagnostics,
        }
    }
}

/// Groups channel indices by foil group in order of first appearance.
fn group_channels(channels: &[ReactionChannel]) -> Vec<FoilGroup> {
    let mut groups: Vec<FoilGroup> = Vec::new();
    for (idx, channel) in channels.iter().enumerate() {
        match groups.iter_mut().find(|g| g.name == channel.foil_group) {
            Some(group) => group.members.push(idx),
            None => groups.push(FoilGroup {
                name: channel.foil_group.clone(),
                members: vec![idx],
            }),
        }
    }
    groups
}

/// Lower total wins; equal totals keep the lower rank.
fn better(a: (f64, usize), b: (f64, usize)) -> (f64, usize) {
    let order = a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
    if order.is_gt() { b } else { a }
}
