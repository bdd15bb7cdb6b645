//! Tree configuration.

use alloc::rc::Rc;
use core::fmt;
use core::str::FromStr;

use crate::error::BuildError;
use crate::owner::ScheduleBuild;
use crate::widget::AnyWidget;
use crate::widgets::ErrorWidget;

/// Environment variable read by [`Mode::from_env`].
pub const MODE_ENV: &str = "CANOPY_MODE";

/// How the tree is being driven.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Rebuilds are triggered by user interaction. First builds are always synchronous.
    #[default]
    Interactive,
    /// The tree is rendered once ahead of time. Stateful elements may defer their first build
    /// until a [`preload`](crate::State::preload) future resolves.
    PreRender,
}

impl Mode {
    /// Reads the mode from `CANOPY_MODE`, falling back to [`Mode::Interactive`].
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var(MODE_ENV) {
            Ok(value) => value.parse().unwrap_or_else(|error: ParseModeError| {
                tracing::warn!(%error, "falling back to interactive mode");
                Self::Interactive
            }),
            Err(_) => Self::Interactive,
        }
    }

    /// Whether stateful elements may suspend their first build.
    #[must_use]
    pub const fn allows_preload(self) -> bool {
        matches!(self, Self::PreRender)
    }
}

/// The value did not name a [`Mode`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mode `{0}`, expected `interactive` or `prerender`")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interactive" => Ok(Self::Interactive),
            "prerender" | "pre-render" => Ok(Self::PreRender),
            other => Err(ParseModeError(other.to_owned())),
        }
    }
}

/// Produces the placeholder shown in place of a child whose build failed.
pub type ErrorWidgetBuilder = Rc<dyn Fn(&BuildError) -> AnyWidget>;

/// Configuration of an [`ElementTree`](crate::ElementTree).
#[derive(Clone)]
pub struct TreeConfig {
    /// The driving mode.
    pub mode: Mode,
    /// Enables contract checks such as the dirty-marking scope check and duplicate global key
    /// detection. Defaults to `cfg!(debug_assertions)`.
    pub debug_checks: bool,
    error_widget: ErrorWidgetBuilder,
    scheduler: Rc<dyn ScheduleBuild>,
}

impl TreeConfig {
    /// The default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mode.
    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables or disables contract checks.
    #[must_use]
    pub fn debug_checks(mut self, enabled: bool) -> Self {
        self.debug_checks = enabled;
        self
    }

    /// Replaces the widget shown in place of failed builds.
    #[must_use]
    pub fn error_widget(mut self, builder: impl Fn(&BuildError) -> AnyWidget + 'static) -> Self {
        self.error_widget = Rc::new(builder);
        self
    }

    /// Installs the hook invoked whenever the tree goes from idle to having scheduled work.
    #[must_use]
    pub fn scheduler(mut self, hook: impl ScheduleBuild + 'static) -> Self {
        self.scheduler = Rc::new(hook);
        self
    }

    pub(crate) fn build_error_widget(&self, error: &BuildError) -> AnyWidget {
        (self.error_widget)(error)
    }

    pub(crate) fn schedule_hook(&self) -> Rc<dyn ScheduleBuild> {
        self.scheduler.clone()
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            debug_checks: cfg!(debug_assertions),
            error_widget: Rc::new(|error: &BuildError| -> AnyWidget {
                ErrorWidget::from_error(error).into()
            }),
            scheduler: Rc::new(|| {}),
        }
    }
}

impl fmt::Debug for TreeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeConfig")
            .field("mode", &self.mode)
            .field("debug_checks", &self.debug_checks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes() {
        assert_eq!("interactive".parse::<Mode>(), Ok(Mode::Interactive));
        assert_eq!(" PreRender ".parse::<Mode>(), Ok(Mode::PreRender));
        assert!("server".parse::<Mode>().is_err());
        assert!(Mode::PreRender.allows_preload());
        assert!(!Mode::Interactive.allows_preload());
    }
}
