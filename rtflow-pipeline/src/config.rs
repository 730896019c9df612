//! Pipeline configuration.

/// Behavioral switches of a [`crate::Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Require every slot to provide the same feature set as the first slot.
    pub homogeneous_features: bool,
    /// Initial value of activation-matrix entries created by add operations.
    pub new_elements_active: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            homogeneous_features: true,
            new_elements_active: false,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether slots must share one feature set.
    #[must_use]
    pub fn with_homogeneous_features(mut self, homogeneous: bool) -> Self {
        self.homogeneous_features = homogeneous;
        self
    }

    /// Sets the initial value of new activation-matrix entries.
    #[must_use]
    pub fn with_new_elements_active(mut self, active: bool) -> Self {
        self.new_elements_active = active;
        self
    }
}
