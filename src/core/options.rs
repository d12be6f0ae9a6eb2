//! Fly options and their reconciliation
//!
//! Options come in three mutually exclusive pairs. A pipeline may override any
//! of the process defaults; the reconciled set always holds at most one member
//! of each pair.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A `fly set-pipeline` behaviour switch
///
/// Variants are declared in name order so the derived `Ord` sorts them the
/// same way their names sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlyOption {
    ExposePipeline,
    HidePipeline,
    Interactive,
    NonInteractive,
    PausePipeline,
    UnpausePipeline,
}

/// The exclusive pair an option belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionPair {
    Interaction,
    Visibility,
    PauseState,
}

impl OptionPair {
    pub const ALL: [OptionPair; 3] = [
        OptionPair::Interaction,
        OptionPair::Visibility,
        OptionPair::PauseState,
    ];

    /// Both members of the pair
    pub fn members(self) -> (FlyOption, FlyOption) {
        match self {
            OptionPair::Interaction => (FlyOption::Interactive, FlyOption::NonInteractive),
            OptionPair::Visibility => (FlyOption::HidePipeline, FlyOption::ExposePipeline),
            OptionPair::PauseState => (FlyOption::UnpausePipeline, FlyOption::PausePipeline),
        }
    }
}

impl FlyOption {
    pub const ALL: [FlyOption; 6] = [
        FlyOption::ExposePipeline,
        FlyOption::HidePipeline,
        FlyOption::Interactive,
        FlyOption::NonInteractive,
        FlyOption::PausePipeline,
        FlyOption::UnpausePipeline,
    ];

    /// The mutually exclusive counterpart of this option
    pub fn counterpart(self) -> FlyOption {
        match self {
            FlyOption::Interactive => FlyOption::NonInteractive,
            FlyOption::NonInteractive => FlyOption::Interactive,
            FlyOption::HidePipeline => FlyOption::ExposePipeline,
            FlyOption::ExposePipeline => FlyOption::HidePipeline,
            FlyOption::PausePipeline => FlyOption::UnpausePipeline,
            FlyOption::UnpausePipeline => FlyOption::PausePipeline,
        }
    }

    pub fn pair(self) -> OptionPair {
        match self {
            FlyOption::Interactive | FlyOption::NonInteractive => OptionPair::Interaction,
            FlyOption::HidePipeline | FlyOption::ExposePipeline => OptionPair::Visibility,
            FlyOption::PausePipeline | FlyOption::UnpausePipeline => OptionPair::PauseState,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlyOption::ExposePipeline => "expose-pipeline",
            FlyOption::HidePipeline => "hide-pipeline",
            FlyOption::Interactive => "interactive",
            FlyOption::NonInteractive => "non-interactive",
            FlyOption::PausePipeline => "pause-pipeline",
            FlyOption::UnpausePipeline => "unpause-pipeline",
        }
    }
}

impl fmt::Display for FlyOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlyOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlyOption::ALL
            .into_iter()
            .find(|option| option.as_str() == s)
            .ok_or_else(|| format!("unknown fly option: {}", s))
    }
}

/// Pipeline visibility decided by the reconciled options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Hidden,
    Exposed,
}

/// Pause state decided by the reconciled options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseState {
    Paused,
    Unpaused,
}

/// A reconciled, duplicate-free option set
///
/// Iteration is sorted, which is what plan output relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FlyOptions(BTreeSet<FlyOption>);

impl FlyOptions {
    pub fn contains(&self, option: FlyOption) -> bool {
        self.0.contains(&option)
    }

    pub fn iter(&self) -> impl Iterator<Item = FlyOption> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<FlyOption> {
        self.iter().collect()
    }

    pub fn is_non_interactive(&self) -> bool {
        self.contains(FlyOption::NonInteractive)
    }

    /// Hidden unless the set explicitly exposes the pipeline
    pub fn visibility(&self) -> Visibility {
        if self.contains(FlyOption::ExposePipeline) {
            Visibility::Exposed
        } else {
            Visibility::Hidden
        }
    }

    /// Unpaused unless the set explicitly pauses the pipeline
    pub fn pause_state(&self) -> PauseState {
        if self.contains(FlyOption::PausePipeline) {
            PauseState::Paused
        } else {
            PauseState::Unpaused
        }
    }
}

impl FromIterator<FlyOption> for FlyOptions {
    fn from_iter<I: IntoIterator<Item = FlyOption>>(iter: I) -> Self {
        FlyOptions(iter.into_iter().collect())
    }
}

impl fmt::Display for FlyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(FlyOption::as_str).collect();
        f.write_str(&names.join(" "))
    }
}

/// Merge process defaults with a pipeline's own options
///
/// Pipeline options are taken first, then each default whose counterpart is
/// not already present. Within either list the first member of a pair wins.
pub fn reconcile(defaults: &[FlyOption], pipeline: &[FlyOption]) -> FlyOptions {
    let mut result = BTreeSet::new();
    for option in pipeline.iter().chain(defaults) {
        if !result.contains(&option.counterpart()) {
            result.insert(*option);
        }
    }
    FlyOptions(result)
}

/// The first pair in which both members appear, if any
pub fn find_conflict(options: &[FlyOption]) -> Option<(FlyOption, FlyOption)> {
    options
        .iter()
        .find(|option| options.contains(&option.counterpart()))
        .map(|option| (*option, option.counterpart()))
}
