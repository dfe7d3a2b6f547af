//! The detection orchestrator.

use crate::detector::{IssueDetector, default_detectors};
use crate::error::Error;
use crate::issue::Issue;
use crate::network_scores::{NetworkScores, NetworkScoresCalculate, NetworkScoresCalculator};
use crate::stats::{SSRC, TaggedStats};
use log::{debug, warn};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::time::Instant;

/// Output of [`WebRTCIssueDetector`], read through `poll_read`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum IssueDetectorEvent {
    /// Queued for every snapshot, before any issue of the same snapshot.
    NetworkScoresUpdated(NetworkScores),
    /// Issues found in one snapshot. Never empty.
    Issues {
        connection_id: String,
        issues: Vec<Issue>,
    },
}

/// Builder for [`WebRTCIssueDetector`].
///
/// # Example
///
/// ```ignore
/// use rtc_issue_detector::{FramesDroppedIssueDetector, WebRTCIssueDetectorBuilder};
///
/// let detector = WebRTCIssueDetectorBuilder::new()
///     .with_default_detectors()
///     .with_detector(FramesDroppedIssueDetector::default())
///     .with_ignore_ssrc_list([1234])
///     .build();
/// ```
#[derive(Default)]
pub struct WebRTCIssueDetectorBuilder {
    detectors: Vec<Box<dyn IssueDetector>>,
    ignore_ssrc_list: HashSet<SSRC>,
    network_scores_calculator: Option<Box<dyn NetworkScoresCalculate>>,
}

impl WebRTCIssueDetectorBuilder {
    /// Create a builder with no detector registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detector. Detectors run in registration order.
    pub fn with_detector(mut self, detector: impl IssueDetector + 'static) -> Self {
        self.detectors.push(Box::new(detector));
        self
    }

    /// Register the [`default_detectors`] set.
    pub fn with_default_detectors(mut self) -> Self {
        self.detectors.extend(default_detectors());
        self
    }

    /// Drop issues attributed to any of these SSRCs.
    pub fn with_ignore_ssrc_list(mut self, ssrcs: impl IntoIterator<Item = SSRC>) -> Self {
        self.ignore_ssrc_list.extend(ssrcs);
        self
    }

    /// Replace the default [`NetworkScoresCalculator`].
    pub fn with_network_scores_calculator(
        mut self,
        calculator: impl NetworkScoresCalculate + 'static,
    ) -> Self {
        self.network_scores_calculator = Some(Box::new(calculator));
        self
    }

    pub fn build(self) -> WebRTCIssueDetector {
        WebRTCIssueDetector {
            detectors: self.detectors,
            ignore_ssrc_list: self.ignore_ssrc_list,
            network_scores_calculator: self
                .network_scores_calculator
                .unwrap_or_else(|| Box::new(NetworkScoresCalculator::new())),
            read_queue: VecDeque::new(),
        }
    }
}

/// Feeds stats snapshots through the network scores calculator and every
/// registered detector.
///
/// A sans-I/O [`sansio::Protocol`]: snapshots go in through `handle_read`,
/// events come out of `poll_read`, and idle connection state is evicted by
/// `handle_timeout` at the instant `poll_timeout` asks for. No timer or
/// thread is spawned.
///
/// A detector that fails is logged and skipped; the issues of the other
/// detectors are still emitted.
///
/// # Example
///
/// ```ignore
/// use rtc_issue_detector::{TaggedStats, WebRTCIssueDetector};
/// use sansio::Protocol;
///
/// let mut detector = WebRTCIssueDetector::default();
/// detector.handle_read(TaggedStats { now: Instant::now(), stats })?;
/// while let Some(event) = detector.poll_read() {
///     println!("{event:?}");
/// }
/// ```
pub struct WebRTCIssueDetector {
    detectors: Vec<Box<dyn IssueDetector>>,
    ignore_ssrc_list: HashSet<SSRC>,
    network_scores_calculator: Box<dyn NetworkScoresCalculate>,
    read_queue: VecDeque<IssueDetectorEvent>,
}

impl Default for WebRTCIssueDetector {
    /// The default detector set with the default calculator.
    fn default() -> Self {
        WebRTCIssueDetectorBuilder::new()
            .with_default_detectors()
            .build()
    }
}

impl WebRTCIssueDetector {
    /// Names of the registered detectors, in evaluation order.
    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    fn is_ignored(&self, issue: &Issue) -> bool {
        issue
            .ssrc
            .is_some_and(|ssrc| self.ignore_ssrc_list.contains(&ssrc))
    }
}

impl sansio::Protocol<TaggedStats, (), ()> for WebRTCIssueDetector {
    type Rout = IssueDetectorEvent;
    type Wout = ();
    type Eout = ();
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedStats) -> Result<(), Self::Error> {
        let TaggedStats { now, stats } = msg;
        let connection_id = stats.connection_id().to_owned();

        let network_scores = self.network_scores_calculator.calculate(now, &stats);

        let mut issues = vec![];
        for detector in self.detectors.iter_mut() {
            match detector.detect(now, &stats, &network_scores) {
                Ok(found) => issues.extend(found),
                Err(err) => warn!("{}", Error::detector_failed(detector.name(), err)),
            }
        }
        issues.retain(|issue| !self.is_ignored(issue));

        self.read_queue
            .push_back(IssueDetectorEvent::NetworkScoresUpdated(network_scores));
        if !issues.is_empty() {
            debug!("{} issue(s) detected on {}", issues.len(), connection_id);
            self.read_queue.push_back(IssueDetectorEvent::Issues {
                connection_id,
                issues,
            });
        }

        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.read_queue.pop_front()
    }

    fn handle_write(&mut self, _msg: ()) -> Result<(), Self::Error> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        None
    }

    fn handle_event(&mut self, _evt: ()) -> Result<(), Self::Error> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        None
    }

    fn handle_timeout(&mut self, now: Self::Time) -> Result<(), Self::Error> {
        self.network_scores_calculator.handle_timeout(now);
        for detector in self.detectors.iter_mut() {
            detector.handle_timeout(now);
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        self.detectors
            .iter()
            .filter_map(|d| d.poll_timeout())
            .chain(self.network_scores_calculator.poll_timeout())
            .min()
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.read_queue.clear();
        self.network_scores_calculator.close();
        for detector in self.detectors.iter_mut() {
            detector.close();
        }
        Ok(())
    }
}
