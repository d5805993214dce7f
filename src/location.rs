//! Storage locations, location modes, and endpoint pairs.
//!
//! A geo-replicated storage account exposes the same logical resources at two
//! physical endpoints: a read-write primary and an eventually-consistent
//! secondary. [`LocationMode`] is the client-side policy for which endpoint(s)
//! a request may target and in which order; [`StorageLocation`] names the
//! endpoint one particular attempt went to.
//!
//! The resolver contract is deliberately dumb: [`LocationMode::next_location`]
//! always computes the plain round-robin candidate, independent of any retry
//! verdict. Retry policies receive that candidate and may override it (see
//! `policy`), but the default alternation lives here so it can be tested in
//! isolation.

use http::Uri;

/// One of the two physical endpoints serving a logical resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageLocation {
    /// No location recorded; used by empty tokens and unsent requests.
    #[default]
    Unspecified,
    /// The read-write primary endpoint.
    Primary,
    /// The read-only secondary endpoint.
    Secondary,
}

impl StorageLocation {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageLocation::Unspecified => "unspecified",
            StorageLocation::Primary => "primary",
            StorageLocation::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which location(s) an operation may target, and in what order.
///
/// The pinned modes send every attempt to one location. The alternating modes
/// flip between the two on every attempt, starting from the named first
/// location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LocationMode {
    /// No mode chosen yet; executing with this is a configuration error.
    Unspecified,
    /// All attempts go to the primary location.
    #[default]
    PrimaryOnly,
    /// Start at the primary, alternate to the secondary on retry.
    PrimaryThenSecondary,
    /// All attempts go to the secondary location.
    SecondaryOnly,
    /// Start at the secondary, alternate to the primary on retry.
    SecondaryThenPrimary,
}

impl LocationMode {
    /// The location the first attempt of an operation targets, or `None` for
    /// [`LocationMode::Unspecified`].
    pub fn first_location(self) -> Option<StorageLocation> {
        match self {
            LocationMode::PrimaryOnly | LocationMode::PrimaryThenSecondary => {
                Some(StorageLocation::Primary)
            }
            LocationMode::SecondaryOnly | LocationMode::SecondaryThenPrimary => {
                Some(StorageLocation::Secondary)
            }
            LocationMode::Unspecified => None,
        }
    }

    /// The round-robin candidate for the attempt after one at `current`.
    ///
    /// Pinned modes always return their location; alternating modes flip
    /// strictly between the two.
    pub fn next_location(self, current: StorageLocation) -> StorageLocation {
        match self {
            LocationMode::PrimaryOnly => StorageLocation::Primary,
            LocationMode::SecondaryOnly => StorageLocation::Secondary,
            LocationMode::PrimaryThenSecondary | LocationMode::SecondaryThenPrimary => {
                match current {
                    StorageLocation::Primary => StorageLocation::Secondary,
                    StorageLocation::Secondary => StorageLocation::Primary,
                    // Not yet attempted anywhere: start at the mode's first location.
                    StorageLocation::Unspecified => match self.first_location() {
                        Some(location) => location,
                        None => StorageLocation::Unspecified,
                    },
                }
            }
            LocationMode::Unspecified => StorageLocation::Unspecified,
        }
    }

    pub fn uses_primary(self) -> bool {
        !matches!(self, LocationMode::SecondaryOnly)
    }

    pub fn uses_secondary(self) -> bool {
        !matches!(self, LocationMode::PrimaryOnly)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LocationMode::Unspecified => "unspecified",
            LocationMode::PrimaryOnly => "primary_only",
            LocationMode::PrimaryThenSecondary => "primary_then_secondary",
            LocationMode::SecondaryOnly => "secondary_only",
            LocationMode::SecondaryThenPrimary => "secondary_then_primary",
        }
    }
}

impl std::fmt::Display for LocationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-command location constraint.
///
/// Write operations only make sense against the primary; a handful of
/// operations (secondary replication stats) only exist on the secondary; most
/// reads can go either way. The executor narrows the caller's
/// [`LocationMode`] with this before the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandLocationMode {
    /// The command must run against the primary location.
    #[default]
    PrimaryOnly,
    /// The command must run against the secondary location.
    SecondaryOnly,
    /// The command may run against either location.
    PrimaryOrSecondary,
}

/// The pair of endpoint URIs for one logical resource.
#[derive(Debug, Clone)]
pub struct StorageUri {
    primary: Uri,
    secondary: Option<Uri>,
}

impl StorageUri {
    /// Endpoints for a resource with no secondary replica.
    pub fn new(primary: Uri) -> Self {
        Self { primary, secondary: None }
    }

    /// Endpoints for a geo-replicated resource.
    pub fn with_secondary(primary: Uri, secondary: Uri) -> Self {
        Self { primary, secondary: Some(secondary) }
    }

    pub fn primary_uri(&self) -> &Uri {
        &self.primary
    }

    pub fn secondary_uri(&self) -> Option<&Uri> {
        self.secondary.as_ref()
    }

    /// The endpoint for `location`, if one is configured.
    pub fn location_uri(&self, location: StorageLocation) -> Option<&Uri> {
        match location {
            StorageLocation::Primary => Some(&self.primary),
            StorageLocation::Secondary => self.secondary.as_ref(),
            StorageLocation::Unspecified => None,
        }
    }

    /// Whether every location `mode` can target has a configured endpoint.
    pub fn supports(&self, mode: LocationMode) -> bool {
        !(mode.uses_secondary() && self.secondary.is_none())
    }
}
