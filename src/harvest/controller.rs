//! Adaptive harvest loop
//!
//! A [`Harvester`] repeatedly advances a lazily-loaded [`Feed`], samples two
//! growth signals and the currently rendered items, and stops when an end
//! marker shows up, when the [`StopPolicy`] says so, when the item cap is
//! reached, when a response listener reports the end of the feed, or when the
//! idle timer fires because nothing new arrived for a whole window.
//!
//! Errors raised by the feed never escape: they end the harvest early and the
//! items collected so far are returned.

use crate::harvest::collector::{Collector, Inserted};
use crate::harvest::cutoff::Cutoff;
use crate::harvest::timer::{IdleAbort, Raced};
use crate::surface::{NetworkResponse, SurfaceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Items that carry an optional publication date
pub trait Dated {
    fn date(&self) -> Option<DateTime<Utc>>;
}

/// Marker-only feeds collect nothing and carry no date
impl Dated for () {
    fn date(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Two monotonic growth signals, typically scroll offset and body height
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GrowthSample {
    pub a: f64,
    pub b: f64,
}

/// A lazily-loaded list on the rendering surface
#[async_trait]
pub trait Feed: Send + Sync {
    type Item: Dated + Send;

    /// Triggers loading of more content (scroll, click "more", ...)
    ///
    /// Returns false when there was nothing to trigger.
    async fn advance(&self) -> Result<bool, SurfaceError>;

    /// Reads the growth signals after an advance
    async fn sample(&self) -> Result<GrowthSample, SurfaceError>;

    /// Parses the currently rendered items with their stable ids
    async fn items(&self) -> Result<Vec<(String, Self::Item)>, SurfaceError>;

    /// Returns true once an end-of-feed marker is visible
    async fn end_reached(&self) -> Result<bool, SurfaceError> {
        Ok(false)
    }
}

/// Snapshot handed to a [`StopPolicy`] after every iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopContext {
    /// Completed iterations before this one
    pub count: u32,

    /// Signal `a` grew past every previous value
    pub a_changed: bool,

    /// Signal `b` grew past every previous value
    pub b_changed: bool,

    /// Advances that found nothing to trigger
    pub fruitless_advances: u32,
}

/// When a harvest decides it has seen enough
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Neither signal grew and more than `min_iterations` ran
    Stable { min_iterations: u32 },

    /// Either signal stalled and more than `min_iterations` ran
    EitherStalled { min_iterations: u32 },

    /// Signal `b` stalled after more than `max` fruitless advances
    Fruitless { max: u32 },

    /// A fixed number of iterations
    Iterations(u32),
}

impl StopPolicy {
    /// Evaluates the policy for one iteration
    pub fn should_stop(&self, ctx: &StopContext) -> bool {
        match *self {
            Self::Stable { min_iterations } => {
                ctx.count > min_iterations && !ctx.a_changed && !ctx.b_changed
            }
            Self::EitherStalled { min_iterations } => {
                ctx.count > min_iterations && (!ctx.a_changed || !ctx.b_changed)
            }
            Self::Fruitless { max } => ctx.fruitless_advances > max && !ctx.b_changed,
            Self::Iterations(max) => ctx.count > max,
        }
    }
}

/// What a response listener made of one background response
#[derive(Debug)]
pub enum ResponseSignal<T> {
    /// Parsed items plus whether the feed has more to give
    Items { items: Vec<(String, T)>, has_more: bool },

    /// New data is arriving, but nothing to collect from this response
    Progress,

    /// Stop the harvest gracefully
    Finish,

    /// Not relevant to this feed
    Ignore,
}

/// Parses background responses into items for one harvest
pub type ResponseListener<T> = Box<dyn FnMut(&NetworkResponse) -> ResponseSignal<T> + Send>;

/// Why a harvest ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestEnd {
    /// The stop policy fired
    Exhausted,

    /// An end-of-feed marker was visible
    EndMarker,

    /// The item cap was reached
    CapReached,

    /// A response listener reported the end of the feed
    Finished,

    /// Nothing new arrived within the idle window
    Aborted,

    /// The feed raised an error; the partial result stands
    Failed,
}

/// Items returned by a harvest
#[derive(Debug)]
pub struct HarvestReport<T> {
    /// Items kept after the cutoff, in harvest order
    pub items: Vec<T>,

    /// Items collected before the cutoff was applied
    pub raw_count: usize,

    /// Iterations of the advance loop
    pub iterations: u32,

    pub end: HarvestEnd,

    pub elapsed: Duration,
}

/// Knobs for a single harvest
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Human readable name used in logs
    pub name: &'static str,

    pub cap: Option<usize>,

    pub cutoff: Cutoff,

    pub stop: StopPolicy,

    /// Delay that lets lazily loaded content render between steps
    pub settle: Duration,

    pub idle_timeout: Duration,
}

impl HarvestOptions {
    pub fn new(name: &'static str, stop: StopPolicy) -> Self {
        Self {
            name,
            cap: None,
            cutoff: Cutoff::none(),
            stop,
            settle: Duration::from_millis(300),
            idle_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the item cap; zero means uncapped
    pub fn cap(mut self, cap: usize) -> Self {
        self.cap = (cap > 0).then_some(cap);
        self
    }

    pub fn cutoff(mut self, cutoff: Cutoff) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// Running record of one growth signal
///
/// A sample counts as growth only if it is strictly greater than every value
/// seen before. Zero readings are treated as missing and never recorded.
#[derive(Debug, Default)]
struct GrowthHistory {
    max: Option<f64>,
}

impl GrowthHistory {
    fn record(&mut self, value: f64) -> bool {
        if value == 0.0 || value.is_nan() {
            return false;
        }

        let changed = self.max.map_or(true, |max| value > max);

        if changed {
            self.max = Some(value);
        }

        changed
    }
}

/// Drives one harvest against a feed
pub struct Harvester<'a, F: Feed> {
    feed: &'a F,
    options: HarvestOptions,
    responses: Option<(broadcast::Receiver<NetworkResponse>, ResponseListener<F::Item>)>,
}

impl<'a, F: Feed> Harvester<'a, F> {
    pub fn new(feed: &'a F, options: HarvestOptions) -> Self {
        Self {
            feed,
            options,
            responses: None,
        }
    }

    /// Feeds background responses through `listener` for the duration of the harvest
    pub fn listen(
        mut self,
        responses: broadcast::Receiver<NetworkResponse>,
        listener: ResponseListener<F::Item>,
    ) -> Self {
        self.responses = Some((responses, listener));
        self
    }

    /// Runs the harvest to completion
    ///
    /// Never fails: errors and timeouts end the loop and the items collected
    /// so far are returned, filtered by the cutoff.
    pub async fn run(self) -> HarvestReport<F::Item> {
        let Self {
            feed,
            options,
            responses,
        } = self;

        let start = Instant::now();
        let collector = Collector::new(options.cap);
        let timer = IdleAbort::arm(options.idle_timeout);
        let (finish_tx, _) = watch::channel(None::<HarvestEnd>);
        let mut iterations = 0u32;

        let finish = |end: HarvestEnd| {
            finish_tx.send_if_modified(|current| {
                if current.is_none() {
                    *current = Some(end);
                    true
                } else {
                    false
                }
            });
        };

        let work = async {
            if let Some(end) = collect(feed, &collector, &timer, options.name).await {
                return end;
            }

            let scroll = advance_loop(feed, &options, &collector, &timer, &mut iterations);

            let finished = async {
                let mut rx = finish_tx.subscribe();
                let end = rx.wait_for(Option::is_some).await.ok().and_then(|end| *end);
                match end {
                    Some(end) => end,
                    None => std::future::pending().await,
                }
            };

            let pump = async {
                let Some((mut rx, mut listener)) = responses else {
                    return std::future::pending().await;
                };

                loop {
                    match rx.recv().await {
                        Ok(response) => match listener(&response) {
                            ResponseSignal::Items { items, has_more } => {
                                for (id, item) in items {
                                    match collector.insert(id, item) {
                                        Inserted::Added => timer.postpone(),
                                        Inserted::Duplicate => {}
                                        Inserted::CapReached => break,
                                    }
                                }

                                if collector.is_full() {
                                    finish(HarvestEnd::CapReached);
                                } else if !has_more {
                                    finish(HarvestEnd::Finished);
                                }
                            }
                            ResponseSignal::Progress => timer.postpone(),
                            ResponseSignal::Finish => finish(HarvestEnd::Finished),
                            ResponseSignal::Ignore => {}
                        },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(harvest = options.name, skipped, "Response listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return std::future::pending().await;
                        }
                    }
                }
            };

            tokio::select! {
                end = scroll => end,
                end = finished => end,
                end = pump => end,
            }
        };

        let end = match timer.run(work).await {
            Raced::Completed(end) => end,
            Raced::Aborted => HarvestEnd::Aborted,
        };

        let raw = collector.into_items();
        let raw_count = raw.len();
        let items: Vec<F::Item> = raw
            .into_iter()
            .filter(|item| options.cutoff.keeps(item.date()))
            .collect();

        let elapsed = start.elapsed();

        if end == HarvestEnd::Aborted {
            warn!(
                harvest = options.name,
                collected = raw_count,
                "Loading of {} aborted",
                options.name
            );
        }

        info!(
            harvest = options.name,
            kept = items.len(),
            collected = raw_count,
            iterations,
            end = ?end,
            "Got {} {} in {:.2}s",
            items.len(),
            options.name,
            elapsed.as_secs_f64()
        );

        HarvestReport {
            items,
            raw_count,
            iterations,
            end,
            elapsed,
        }
    }
}

/// Parses the rendered items into the collector
///
/// Returns the end reason if collecting should stop the harvest.
async fn collect<F: Feed>(
    feed: &F,
    collector: &Collector<F::Item>,
    timer: &IdleAbort,
    name: &'static str,
) -> Option<HarvestEnd> {
    let items = match feed.items().await {
        Ok(items) => items,
        Err(e) => {
            debug!(harvest = name, collected = collector.len(), "Sampling failed: {}", e);
            return Some(HarvestEnd::Failed);
        }
    };

    for (id, item) in items {
        match collector.insert(id, item) {
            Inserted::Added => timer.postpone(),
            Inserted::Duplicate => {}
            Inserted::CapReached => break,
        }
    }

    collector.is_full().then_some(HarvestEnd::CapReached)
}

async fn advance_loop<F: Feed>(
    feed: &F,
    options: &HarvestOptions,
    collector: &Collector<F::Item>,
    timer: &IdleAbort,
    iterations: &mut u32,
) -> HarvestEnd {
    let mut a_history = GrowthHistory::default();
    let mut b_history = GrowthHistory::default();
    let mut count = 0u32;
    let mut fruitless_advances = 0u32;

    loop {
        tokio::time::sleep(options.settle).await;

        match feed.advance().await {
            Ok(true) => {}
            Ok(false) => fruitless_advances += 1,
            Err(e) => {
                debug!(harvest = options.name, "Advance failed: {}", e);
                return HarvestEnd::Failed;
            }
        }

        tokio::time::sleep(options.settle).await;

        let sample = match feed.sample().await {
            Ok(sample) => sample,
            Err(e) => {
                debug!(harvest = options.name, "Growth sample failed: {}", e);
                return HarvestEnd::Failed;
            }
        };

        let a_changed = a_history.record(sample.a);
        let b_changed = b_history.record(sample.b);

        if let Some(end) = collect(feed, collector, timer, options.name).await {
            return end;
        }

        debug!(
            harvest = options.name,
            count,
            a = sample.a,
            b = sample.b,
            a_changed,
            b_changed,
            collected = collector.len(),
            "Harvest step"
        );

        match feed.end_reached().await {
            Ok(true) => {
                debug!(harvest = options.name, "End of feed marker found");
                return HarvestEnd::EndMarker;
            }
            Ok(false) => {}
            Err(e) => {
                debug!(harvest = options.name, "End marker probe failed: {}", e);
                return HarvestEnd::Failed;
            }
        }

        let ctx = StopContext {
            count,
            a_changed,
            b_changed,
            fruitless_advances,
        };

        if options.stop.should_stop(&ctx) {
            return HarvestEnd::Exhausted;
        }

        count += 1;
        *iterations = count;
    }
}
