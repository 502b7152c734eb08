use imgprep_fetch::FetchOutcome;
use std::fmt;

/// Final state of one manifest record after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordOutcome {
    Downloaded,
    AlreadyPresent,
    /// Every attempt failed; a placeholder stands in for the image.
    Placeholder,
    InvalidLink,
    /// Shares its artifact name with an earlier record and was not fetched.
    Duplicate,
    /// No artifact could be produced.
    Dropped,
}

impl RecordOutcome {
    pub fn has_artifact(self) -> bool {
        matches!(
            self,
            RecordOutcome::Downloaded | RecordOutcome::AlreadyPresent | RecordOutcome::Placeholder
        )
    }
}

impl From<&FetchOutcome> for RecordOutcome {
    fn from(outcome: &FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::InvalidLink => RecordOutcome::InvalidLink,
            FetchOutcome::AlreadyPresent => RecordOutcome::AlreadyPresent,
            FetchOutcome::Downloaded { .. } => RecordOutcome::Downloaded,
            FetchOutcome::Placeholder { .. } => RecordOutcome::Placeholder,
            FetchOutcome::Failed { .. } => RecordOutcome::Dropped,
        }
    }
}

/// Tally of record outcomes for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub downloaded: usize,
    pub already_present: usize,
    pub placeholder: usize,
    pub invalid_link: usize,
    pub duplicate: usize,
    pub dropped: usize,
}

impl RunReport {
    pub fn record(&mut self, outcome: RecordOutcome) {
        let slot = match outcome {
            RecordOutcome::Downloaded => &mut self.downloaded,
            RecordOutcome::AlreadyPresent => &mut self.already_present,
            RecordOutcome::Placeholder => &mut self.placeholder,
            RecordOutcome::InvalidLink => &mut self.invalid_link,
            RecordOutcome::Duplicate => &mut self.duplicate,
            RecordOutcome::Dropped => &mut self.dropped,
        };
        *slot += 1;
    }

    pub fn merge(&mut self, other: &RunReport) {
        self.downloaded += other.downloaded;
        self.already_present += other.already_present;
        self.placeholder += other.placeholder;
        self.invalid_link += other.invalid_link;
        self.duplicate += other.duplicate;
        self.dropped += other.dropped;
    }

    pub fn total(&self) -> usize {
        self.downloaded
            + self.already_present
            + self.placeholder
            + self.invalid_link
            + self.duplicate
            + self.dropped
    }

    /// Records that ended with an artifact on disk.
    pub fn with_artifact(&self) -> usize {
        self.downloaded + self.already_present + self.placeholder
    }
}

impl FromIterator<RecordOutcome> for RunReport {
    fn from_iter<I: IntoIterator<Item = RecordOutcome>>(iter: I) -> Self {
        let mut report = RunReport::default();
        for outcome in iter {
            report.record(outcome);
        }
        report
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} already present, {} placeholders, {} invalid links, {} duplicates, {} dropped",
            self.downloaded,
            self.already_present,
            self.placeholder,
            self.invalid_link,
            self.duplicate,
            self.dropped
        )
    }
}

/// Result of a preprocessing pass over a directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessReport {
    pub processed: usize,
    pub failed: usize,
}

impl fmt::Display for PreprocessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} preprocessed, {} failed", self.processed, self.failed)
    }
}
