//! Bus configuration and builder.

use std::sync::{Arc, OnceLock};

use crate::bus::EventBus;
#[cfg(feature = "serde")]
use crate::error::{EventBusError, EventBusResult};
use crate::exception::{EventExceptionHandler, LoggingExceptionHandler};
use crate::validator::{AcceptAll, EventClassChecker, MarkerTypeChecker};

#[cfg(feature = "metrics")]
use crate::metrics::BusMetrics;

/// Environment variable forcing event class checks on every post, for all buses.
pub const CHECK_TYPES_ON_DISPATCH_ENV: &str = "EVENTBUS_CHECK_TYPES_ON_DISPATCH";

/// Whether the process-wide dispatch check override is set.
///
/// Read once per process.
pub fn check_types_on_dispatch_override() -> bool {
    static OVERRIDE: OnceLock<bool> = OnceLock::new();
    *OVERRIDE.get_or_init(|| {
        std::env::var(CHECK_TYPES_ON_DISPATCH_ENV)
            .map(|value| parse_flag(&value))
            .unwrap_or(false)
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Configuration options for the EventBus.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BusConfig {
    /// Whether the bus starts shut down. Posts are ignored until `start` is called.
    pub start_shutdown: bool,

    /// Whether every post re-runs the event class checker on the posted kind.
    pub check_types_on_dispatch: bool,

    /// Whether `post_phase` may be used. Also enables per-priority caches.
    pub allow_per_phase_post: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            start_shutdown: false,
            check_types_on_dispatch: false,
            allow_per_phase_post: false,
        }
    }
}

#[cfg(feature = "serde")]
impl BusConfig {
    /// Parses a configuration from JSON. Missing fields keep their defaults.
    ///
    /// ```rust
    /// use eventbus::BusConfig;
    ///
    /// let config = BusConfig::from_json(r#"{ "allow_per_phase_post": true }"#).unwrap();
    /// assert!(config.allow_per_phase_post);
    /// assert!(!config.start_shutdown);
    /// ```
    pub fn from_json(json: &str) -> EventBusResult<Self> {
        serde_json::from_str(json)
            .map_err(|error| EventBusError::configuration(format!("invalid bus config: {error}")))
    }
}

/// Builder for [`EventBus`].
///
/// # Examples
///
/// ```rust
/// use eventbus::EventBus;
///
/// let bus = EventBus::builder()
///     .start_shutdown()
///     .allow_per_phase_post()
///     .build();
///
/// assert!(bus.is_shutdown());
/// assert!(bus.config().allow_per_phase_post);
/// ```
pub struct BusBuilder {
    pub(crate) config: BusConfig,
    pub(crate) exception_handler: Arc<dyn EventExceptionHandler>,
    pub(crate) class_checker: Arc<dyn EventClassChecker>,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: Option<BusMetrics>,
}

impl BusBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: BusConfig::default(),
            exception_handler: Arc::new(LoggingExceptionHandler),
            class_checker: Arc::new(AcceptAll),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the handler notified of listener failures.
    pub fn with_exception_handler<H: EventExceptionHandler + 'static>(mut self, handler: H) -> Self {
        self.exception_handler = Arc::new(handler);
        self
    }

    /// Starts the bus shut down.
    pub fn start_shutdown(mut self) -> Self {
        self.config.start_shutdown = true;
        self
    }

    /// Re-runs the event class checker on every post.
    pub fn check_types_on_dispatch(mut self) -> Self {
        self.config.check_types_on_dispatch = true;
        self
    }

    /// Sets the event class checker.
    pub fn with_class_checker<C: EventClassChecker + 'static>(mut self, checker: C) -> Self {
        self.class_checker = Arc::new(checker);
        self
    }

    /// Only accepts event kinds carrying marker `M`.
    pub fn marker_type<M: 'static>(self) -> Self {
        self.with_class_checker(MarkerTypeChecker::new::<M>())
    }

    /// Allows posting a single priority phase.
    pub fn allow_per_phase_post(mut self) -> Self {
        self.config.allow_per_phase_post = true;
        self
    }

    /// Records bus activity in `metrics`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: BusMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the bus.
    pub fn build(self) -> EventBus {
        EventBus::from_builder(self)
    }
}

impl Default for BusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BusBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
